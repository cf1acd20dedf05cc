// SPDX-License-Identifier: PMPL-1.0-or-later
//! Plan hints: parsing from SQL, and serializing a plan back into hints.
//!
//! Bindings carry their plan as hints inside the bound statement. Two
//! spellings are understood:
//!
//! - inline table hints: `FROM t USE INDEX (idx)`, `FORCE INDEX`, `IGNORE INDEX`
//! - hint comments: `/*+ USE_INDEX(@sel_1 db.t idx) TIDB_SMJ(t1, t2) */`
//!
//! Serialization always produces the comment form, one `USE_INDEX` per table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BindError;
use crate::lexer::{tokenize, Token, TokenKind};

/// Query block name used when serializing hints for single-block statements.
pub const DEFAULT_QUERY_BLOCK: &str = "sel_1";

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_lowercase),
            name: name.to_lowercase(),
        }
    }

    /// Fill in the schema from `db` when unqualified.
    pub fn resolve(&self, db: &str) -> TableName {
        TableName {
            schema: Some(self.schema.clone().unwrap_or_else(|| db.to_lowercase())),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One optimizer hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanHint {
    /// Restrict the access paths of `table` to `indexes`; empty means table scan.
    UseIndex { table: TableName, indexes: Vec<String> },
    /// Remove `indexes` from the access paths of `table`.
    IgnoreIndex { table: TableName, indexes: Vec<String> },
    /// Any other hint, kept opaque (join methods, memory quotas, ...).
    Other { name: String, args: Vec<String> },
}

impl PlanHint {
    /// The table an index hint applies to.
    pub fn table(&self) -> Option<&TableName> {
        match self {
            PlanHint::UseIndex { table, .. } | PlanHint::IgnoreIndex { table, .. } => Some(table),
            PlanHint::Other { .. } => None,
        }
    }

    /// Render in hint-comment syntax.
    pub fn to_hint_text(&self) -> String {
        match self {
            PlanHint::UseIndex { table, indexes } => {
                format!("USE_INDEX(@`{}` {} {})", DEFAULT_QUERY_BLOCK, quote_table(table), quote_list(indexes))
            }
            PlanHint::IgnoreIndex { table, indexes } => {
                format!("IGNORE_INDEX(@`{}` {} {})", DEFAULT_QUERY_BLOCK, quote_table(table), quote_list(indexes))
            }
            PlanHint::Other { name, args } => format!("{}({})", name.to_uppercase(), args.join(", ")),
        }
    }
}

fn quote_table(table: &TableName) -> String {
    match &table.schema {
        Some(schema) => format!("`{}`.`{}`", schema, table.name),
        None => format!("`{}`", table.name),
    }
}

fn quote_list(indexes: &[String]) -> String {
    indexes
        .iter()
        .map(|idx| format!("`{idx}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse the body of one `/*+ ... */` comment.
pub fn parse_hint_comment(body: &str) -> Result<Vec<PlanHint>, BindError> {
    let tokens = tokenize(body)?;
    let mut hints = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if tokens[i].is_op(",") {
            i += 1;
            continue;
        }
        if tokens[i].kind != TokenKind::Word || !tokens.get(i + 1).is_some_and(|t| t.is_op("(")) {
            return Err(BindError::Parse(format!("malformed hint near `{}`", tokens[i].text)));
        }
        let name = tokens[i].text.clone();
        let close = tokens[i + 2..]
            .iter()
            .position(|t| t.is_op(")"))
            .map(|p| p + i + 2)
            .ok_or_else(|| BindError::Parse(format!("unclosed hint `{name}`")))?;
        hints.push(build_hint(&name, &tokens[i + 2..close])?);
        i = close + 1;
    }

    Ok(hints)
}

fn build_hint(name: &str, args: &[Token]) -> Result<PlanHint, BindError> {
    let is_use = matches!(name, "use_index" | "force_index");
    if !is_use && name != "ignore_index" {
        let args = args
            .iter()
            .filter(|t| !t.is_op(","))
            .map(|t| t.text.clone())
            .collect();
        return Ok(PlanHint::Other {
            name: name.to_string(),
            args,
        });
    }

    let mut rest: Vec<&Token> = args.iter().filter(|t| !t.is_op(",")).collect();
    // Optional query block: `@name` or `@`name``.
    if rest.first().is_some_and(|t| t.is_op("@")) {
        rest.drain(..2.min(rest.len()));
    }

    let (table, consumed) = match rest.as_slice() {
        [schema, dot, name, ..] if schema.is_identifier() && dot.is_op(".") && name.is_identifier() => {
            (TableName::new(Some(schema.text.as_str()), &name.text), 3)
        }
        [name, ..] if name.is_identifier() => (TableName::new(None, &name.text), 1),
        _ => return Err(BindError::Parse(format!("hint `{name}` needs a table"))),
    };
    let indexes = rest[consumed..]
        .iter()
        .filter(|t| t.is_identifier())
        .map(|t| t.text.to_lowercase())
        .collect();

    Ok(if is_use {
        PlanHint::UseIndex { table, indexes }
    } else {
        PlanHint::IgnoreIndex { table, indexes }
    })
}

/// Rewrite `sql` so that its only hint comment carries `hints`.
///
/// Existing hint comments are removed; the new comment is placed after the
/// first `SELECT` keyword. Statements without `SELECT` are returned with
/// their hint comments stripped.
pub fn with_hints(sql: &str, hints: &[PlanHint]) -> Result<String, BindError> {
    let tokens = tokenize(sql)?;
    let mut out = String::with_capacity(sql.len() + 64);
    let mut cursor = 0;
    let mut placed = hints.is_empty();

    for token in &tokens {
        if token.kind == TokenKind::Hint {
            out.push_str(sql[cursor..token.start].trim_end());
            cursor = token.end;
            continue;
        }
        if !placed && token.is_word("select") {
            out.push_str(&sql[cursor..token.end]);
            out.push_str(" /*+ ");
            let body: Vec<String> = hints.iter().map(PlanHint::to_hint_text).collect();
            out.push_str(&body.join(" "));
            out.push_str("*/");
            cursor = token.end;
            placed = true;
        }
    }
    out.push_str(&sql[cursor..]);
    Ok(out)
}
