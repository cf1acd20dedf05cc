// SPDX-License-Identifier: PMPL-1.0-or-later
//! SQL front-end: normalization into a pattern + fingerprint, and the
//! shallow statement analysis the binding cache needs.
//!
//! The cache only depends on the [`SqlParser`] trait. [`DefaultSqlParser`]
//! is a lexer-based implementation good enough for single-block DML:
//! it finds base tables, plan hints and simple `column <op> number`
//! conjuncts, but does not build an AST.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BindError;
use crate::hint::{parse_hint_comment, PlanHint, TableName};
use crate::lexer::{tokenize, Token, TokenKind};

/// A normalized statement pattern and its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedSql {
    /// Pattern text; the authoritative identity.
    pub pattern: String,
    /// SHA-256 hex of `pattern`; a lookup accelerator only.
    pub digest: String,
}

impl NormalizedSql {
    /// Build from an already-normalized pattern.
    pub fn from_pattern(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let digest = fingerprint(&pattern);
        Self { pattern, digest }
    }
}

/// SHA-256 hex of a pattern string.
pub fn fingerprint(pattern: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pattern.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Kind of DML statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Replace,
    Update,
    Delete,
}

/// A base table referenced by a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub table: TableName,
    pub alias: Option<String>,
}

impl TableRef {
    /// Whether a hint naming `name` (optionally schema-qualified) targets this table.
    pub fn matches(&self, name: &TableName, db: &str) -> bool {
        let by_name = self.alias.as_deref() == Some(name.name.as_str()) || self.table.name == name.name;
        let by_schema = name
            .schema
            .as_ref()
            .map_or(true, |schema| *schema == self.table.resolve(db).schema.unwrap_or_default());
        by_name && by_schema
    }
}

/// Comparison operator of a simple predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "=" | "<=>" => CmpOp::Eq,
            "!=" | "<>" => CmpOp::Ne,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            _ => return None,
        })
    }

    /// The operator with its operands swapped (`5 < a` is `a > 5`).
    fn flip(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            other => other,
        }
    }
}

/// A `column <op> literal` conjunct of the top-level WHERE clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Table name or alias qualifying the column, if written.
    pub qualifier: Option<String>,
    pub column: String,
    pub op: CmpOp,
    /// Numeric value of the literal; `None` for strings and placeholders.
    pub value: Option<f64>,
}

/// What the cache needs to know about a statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub kind: StatementKind,
    pub normalized: NormalizedSql,
    pub tables: Vec<TableRef>,
    pub hints: Vec<PlanHint>,
    pub predicates: Vec<Predicate>,
}

impl ParsedStatement {
    /// Referenced base tables with unqualified names resolved against `db`.
    pub fn base_tables(&self, db: &str) -> BTreeSet<TableName> {
        self.tables.iter().map(|t| t.table.resolve(db)).collect()
    }
}

/// The normalizer/parser seam.
pub trait SqlParser: Send + Sync {
    /// Normalize `sql` into its pattern and fingerprint.
    fn normalize(&self, sql: &str) -> Result<NormalizedSql, BindError>;

    /// Parse `sql` as it would be under `charset`/`collation`.
    fn parse(&self, sql: &str, charset: &str, collation: &str) -> Result<ParsedStatement, BindError>;
}

/// Lexer-based [`SqlParser`].
///
/// Charset and collation do not change tokenization for the statements it
/// supports, so they are accepted and ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSqlParser;

impl DefaultSqlParser {
    pub fn new() -> Self {
        Self
    }
}

impl SqlParser for DefaultSqlParser {
    fn normalize(&self, sql: &str) -> Result<NormalizedSql, BindError> {
        let tokens = statement_tokens(sql)?;
        let sites = scan_tables(&tokens);
        Ok(NormalizedSql::from_pattern(normalize_tokens(&tokens, &sites)))
    }

    fn parse(&self, sql: &str, _charset: &str, _collation: &str) -> Result<ParsedStatement, BindError> {
        let tokens = statement_tokens(sql)?;
        if tokens.is_empty() {
            return Err(BindError::Parse("empty statement".to_string()));
        }
        let kind = match tokens[0].text.as_str() {
            "select" if tokens[0].kind == TokenKind::Word => StatementKind::Select,
            "insert" if tokens[0].kind == TokenKind::Word => StatementKind::Insert,
            "replace" if tokens[0].kind == TokenKind::Word => StatementKind::Replace,
            "update" if tokens[0].kind == TokenKind::Word => StatementKind::Update,
            "delete" if tokens[0].kind == TokenKind::Word => StatementKind::Delete,
            other => return Err(BindError::Parse(format!("unsupported statement starting with `{other}`"))),
        };
        check_parens(&tokens)?;

        let sites = scan_tables(&tokens);
        for site in &sites {
            if site.name.is_none() {
                return Err(BindError::Parse(format!(
                    "expected table name after `{}`",
                    tokens[site.keyword].text
                )));
            }
        }

        let mut hints = Vec::new();
        for token in tokens.iter().filter(|t| t.kind == TokenKind::Hint) {
            hints.extend(parse_hint_comment(&token.text)?);
        }
        let mut tables = Vec::new();
        for site in &sites {
            let Some(table_ref) = site.table_ref(&tokens) else { continue };
            for inline in &site.index_hints {
                hints.push(inline.to_plan_hint(&table_ref.table));
            }
            tables.push(table_ref);
        }

        Ok(ParsedStatement {
            kind,
            normalized: NormalizedSql::from_pattern(normalize_tokens(&tokens, &sites)),
            tables,
            hints,
            predicates: where_predicates(&tokens),
        })
    }
}

/// Tokenize and drop one trailing `;`; any other `;` is a second statement.
fn statement_tokens(sql: &str) -> Result<Vec<Token>, BindError> {
    let mut tokens = tokenize(sql)?;
    if tokens.last().is_some_and(|t| t.is_op(";")) {
        tokens.pop();
    }
    if tokens.iter().any(|t| t.is_op(";")) {
        return Err(BindError::Parse("multiple statements are not supported".to_string()));
    }
    Ok(tokens)
}

fn check_parens(tokens: &[Token]) -> Result<(), BindError> {
    let mut depth: i64 = 0;
    for token in tokens {
        if token.is_op("(") {
            depth += 1;
        } else if token.is_op(")") {
            depth -= 1;
            if depth < 0 {
                return Err(BindError::Parse(format!("unbalanced `)` at offset {}", token.start)));
            }
        }
    }
    if depth != 0 {
        return Err(BindError::Parse("unbalanced parentheses".to_string()));
    }
    Ok(())
}

/// Words that end a table factor instead of aliasing it.
const RESERVED_AFTER_TABLE: &[&str] = &[
    "where", "on", "using", "join", "inner", "left", "right", "cross", "natural", "straight_join",
    "group", "order", "limit", "having", "union", "set", "values", "value", "select", "use",
    "force", "ignore", "for", "lock", "window", "partition", "as", "except", "intersect",
];

/// Inline `USE|FORCE|IGNORE INDEX (...)` attached to a table factor.
#[derive(Debug, Clone)]
struct InlineIndexHint {
    ignore: bool,
    indexes: Vec<String>,
}

impl InlineIndexHint {
    fn to_plan_hint(&self, table: &TableName) -> PlanHint {
        if self.ignore {
            PlanHint::IgnoreIndex {
                table: table.clone(),
                indexes: self.indexes.clone(),
            }
        } else {
            PlanHint::UseIndex {
                table: table.clone(),
                indexes: self.indexes.clone(),
            }
        }
    }
}

/// Token positions of one table factor.
#[derive(Debug, Clone)]
struct TableSite {
    /// Index of the keyword that introduced the table list.
    keyword: usize,
    /// Index of the schema identifier, when qualified.
    schema: Option<usize>,
    /// Index of the table identifier; `None` when nothing usable followed.
    name: Option<usize>,
    alias: Option<String>,
    index_hints: Vec<InlineIndexHint>,
}

impl TableSite {
    fn table_ref(&self, tokens: &[Token]) -> Option<TableRef> {
        let name = &tokens[self.name?].text;
        if name == "dual" && self.schema.is_none() {
            return None;
        }
        Some(TableRef {
            table: TableName::new(self.schema.map(|i| tokens[i].text.as_str()), name),
            alias: self.alias.clone(),
        })
    }
}

/// Locate every table factor following `FROM`, `JOIN`, `UPDATE` or `INTO`.
fn scan_tables(tokens: &[Token]) -> Vec<TableSite> {
    let mut sites = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        // `UPDATE` opens a table list only as the statement verb, not in
        // `FOR UPDATE` or `ON DUPLICATE KEY UPDATE`.
        let is_list = token.is_word("from") || (i == 0 && token.is_word("update"));
        if !(is_list || token.is_word("join") || token.is_word("straight_join") || token.is_word("into")) {
            i += 1;
            continue;
        }
        let keyword = i;
        i += 1;

        loop {
            // Subqueries and derived tables are scanned by the outer loop.
            if tokens.get(i).map_or(true, |t| t.is_op("(") || !t.is_identifier()) {
                if tokens.get(i).map_or(true, |t| !t.is_op("(")) {
                    sites.push(TableSite {
                        keyword,
                        schema: None,
                        name: None,
                        alias: None,
                        index_hints: Vec::new(),
                    });
                }
                break;
            }

            let mut site = TableSite {
                keyword,
                schema: None,
                name: Some(i),
                alias: None,
                index_hints: Vec::new(),
            };
            if tokens.get(i + 1).is_some_and(|t| t.is_op("."))
                && tokens.get(i + 2).is_some_and(Token::is_identifier)
            {
                site.schema = Some(i);
                site.name = Some(i + 2);
                i += 3;
            } else {
                i += 1;
            }

            if tokens.get(i).is_some_and(|t| t.is_word("as")) {
                i += 1;
            }
            if let Some(alias) = tokens.get(i) {
                let reserved = alias.kind == TokenKind::Word && RESERVED_AFTER_TABLE.contains(&alias.text.as_str());
                if alias.is_identifier() && !reserved {
                    site.alias = Some(alias.text.to_lowercase());
                    i += 1;
                }
            }

            while let Some((hint, next)) = inline_index_hint(tokens, i) {
                site.index_hints.push(hint);
                i = next;
            }

            sites.push(site);
            if is_list && tokens.get(i).is_some_and(|t| t.is_op(",")) {
                i += 1;
                continue;
            }
            break;
        }
    }

    sites
}

/// Parse `USE|FORCE|IGNORE INDEX|KEY [FOR ...] (a, b)` at `i`.
fn inline_index_hint(tokens: &[Token], mut i: usize) -> Option<(InlineIndexHint, usize)> {
    let verb = tokens.get(i)?;
    let ignore = verb.is_word("ignore");
    if !(ignore || verb.is_word("use") || verb.is_word("force")) {
        return None;
    }
    if !tokens.get(i + 1).is_some_and(|t| t.is_word("index") || t.is_word("key")) {
        return None;
    }
    i += 2;
    if tokens.get(i).is_some_and(|t| t.is_word("for")) {
        i += 1;
        while tokens.get(i).is_some_and(|t| t.kind == TokenKind::Word) {
            i += 1;
        }
    }
    if !tokens.get(i).is_some_and(|t| t.is_op("(")) {
        return None;
    }
    i += 1;
    let mut indexes = Vec::new();
    while let Some(token) = tokens.get(i) {
        i += 1;
        if token.is_op(")") {
            return Some((InlineIndexHint { ignore, indexes }, i));
        }
        if token.is_identifier() {
            indexes.push(token.text.to_lowercase());
        }
    }
    None
}

/// Keywords after which `-`/`+` can only be a unary sign.
const SIGN_PREFIX_WORDS: &[&str] = &[
    "select", "where", "and", "or", "not", "on", "by", "limit", "offset", "values", "value", "in",
    "between", "when", "then", "else", "set", "having", "return", "like",
];

/// Render tokens as a pattern: literals become `?`, schema qualifiers of
/// table references are dropped, literal lists and `LIMIT` arguments collapse.
fn normalize_tokens(tokens: &[Token], sites: &[TableSite]) -> String {
    let skipped: BTreeSet<usize> = sites
        .iter()
        .filter_map(|site| site.schema)
        .flat_map(|schema| [schema, schema + 1])
        .collect();

    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        if skipped.contains(&i) {
            continue;
        }
        let text = match token.kind {
            TokenKind::Str | TokenKind::Number | TokenKind::Param => "?".to_string(),
            TokenKind::Hint => {
                let body: Vec<&str> = token.text.split_whitespace().collect();
                format!("/*+ {} */", body.join(" "))
            }
            TokenKind::Word | TokenKind::QuotedIdent => token.text.to_lowercase(),
            TokenKind::Op => {
                // A sign directly before a number is part of the literal.
                let signed = (token.text == "-" || token.text == "+")
                    && tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::Number)
                    && i.checked_sub(1).map_or(true, |p| {
                        let prev = &tokens[p];
                        (prev.kind == TokenKind::Op && prev.text != ")")
                            || (prev.kind == TokenKind::Word && SIGN_PREFIX_WORDS.contains(&prev.text.as_str()))
                    });
                if signed {
                    continue;
                }
                token.text.clone()
            }
        };
        out.push(text);
    }

    collapse_lists(&mut out);
    out.join(" ")
}

/// `( ? , ? , ? )` → `( ... )` and `limit ? , ?` / `limit ? offset ?` → `limit ...`.
fn collapse_lists(out: &mut Vec<String>) {
    let mut i = 0;
    while i < out.len() {
        if out[i] == "limit" && out.len() >= i + 4 && out[i + 1] == "?" && out[i + 3] == "?" && (out[i + 2] == "," || out[i + 2] == "offset") {
            out.splice(i + 1..i + 4, ["...".to_string()]);
        } else if out[i] == "(" {
            let mut j = i + 1;
            let mut count = 0;
            let mut closed = false;
            while j + 1 < out.len() && out[j] == "?" && (out[j + 1] == "," || out[j + 1] == ")") {
                count += 1;
                if out[j + 1] == ")" {
                    closed = true;
                    break;
                }
                j += 2;
            }
            if closed && count > 1 {
                out.splice(i + 1..j + 1, ["...".to_string()]);
            }
        }
        i += 1;
    }
}

/// Simple conjuncts of the top-level WHERE clause.
///
/// Returns nothing when the clause has a top-level `OR`; conjuncts that are
/// not `column <op> literal` are ignored.
fn where_predicates(tokens: &[Token]) -> Vec<Predicate> {
    let mut depth = 0i32;
    let mut start = None;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_op("(") {
            depth += 1;
        } else if token.is_op(")") {
            depth -= 1;
        } else if depth == 0 && token.is_word("where") {
            start = Some(i + 1);
            break;
        }
    }
    let Some(start) = start else { return Vec::new() };

    let mut conjuncts: Vec<&[Token]> = Vec::new();
    let mut depth = 0i32;
    let mut begin = start;
    let mut end = tokens.len();
    for (i, token) in tokens.iter().enumerate().skip(start) {
        if token.is_op("(") {
            depth += 1;
        } else if token.is_op(")") {
            depth -= 1;
            if depth < 0 {
                end = i;
                break;
            }
        } else if depth == 0 && token.kind == TokenKind::Word {
            match token.text.as_str() {
                "or" | "xor" => return Vec::new(),
                "and" => {
                    conjuncts.push(&tokens[begin..i]);
                    begin = i + 1;
                }
                "group" | "order" | "limit" | "having" | "union" | "for" | "window" | "lock" => {
                    end = i;
                    break;
                }
                _ => {}
            }
        }
    }
    if begin < end {
        conjuncts.push(&tokens[begin..end]);
    }

    conjuncts.into_iter().filter_map(simple_predicate).collect()
}

/// `column <op> literal`, or the reversed `literal <op> column`.
fn simple_predicate(tokens: &[Token]) -> Option<Predicate> {
    if let Some(((qualifier, column), rest)) = column_ref(tokens) {
        let op = comparison(rest.first()?)?;
        let value = literal_value(&rest[1..])?;
        return Some(Predicate {
            qualifier,
            column,
            op,
            value,
        });
    }

    let at = tokens.iter().position(|t| comparison(t).is_some())?;
    let value = literal_value(&tokens[..at])?;
    let ((qualifier, column), rest) = column_ref(&tokens[at + 1..])?;
    if !rest.is_empty() {
        return None;
    }
    Some(Predicate {
        qualifier,
        column,
        op: comparison(&tokens[at])?.flip(),
        value,
    })
}

fn comparison(token: &Token) -> Option<CmpOp> {
    (token.kind == TokenKind::Op).then(|| CmpOp::parse(&token.text)).flatten()
}

fn column_ref(tokens: &[Token]) -> Option<((Option<String>, String), &[Token])> {
    match tokens {
        [q, dot, c, rest @ ..] if q.is_identifier() && dot.is_op(".") && c.is_identifier() => {
            Some(((Some(q.text.to_lowercase()), c.text.to_lowercase()), rest))
        }
        [c, rest @ ..] if c.is_identifier() => Some(((None, c.text.to_lowercase()), rest)),
        _ => None,
    }
}

/// Parse the remaining tokens as a single (optionally signed) literal.
fn literal_value(tokens: &[Token]) -> Option<Option<f64>> {
    match tokens {
        [lit] if lit.kind == TokenKind::Number => Some(lit.text.parse::<f64>().ok()),
        [sign, lit] if (sign.is_op("-") || sign.is_op("+")) && lit.kind == TokenKind::Number => {
            let v = lit.text.parse::<f64>().ok()?;
            Some(Some(if sign.is_op("-") { -v } else { v }))
        }
        [lit] if lit.is_literal() => Some(None),
        _ => None,
    }
}

/// Convenience wrapper normalizing with the default parser.
pub fn normalize(sql: &str) -> Result<NormalizedSql, BindError> {
    DefaultSqlParser.normalize(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(sql: &str) -> String {
        normalize(sql).unwrap().pattern
    }

    fn parse(sql: &str) -> ParsedStatement {
        DefaultSqlParser.parse(sql, "utf8mb4", "utf8mb4_bin").unwrap()
    }

    #[test]
    fn test_normalize_literals_and_whitespace() {
        assert_eq!(pattern("select * from t where i          >      30.0"), "select * from t where i > ?");
        assert_eq!(pattern("SELECT * FROM t WHERE i > 99"), "select * from t where i > ?");
    }

    #[test]
    fn test_normalize_limit_symbol_list() {
        assert_eq!(
            pattern("select a, b from t where a = 1 limit 0, 1"),
            "select a , b from t where a = ? limit ..."
        );
        assert_eq!(
            pattern("select a, b from t where a = 3 limit 1, 100"),
            pattern("select a, b from t where a = 1 limit 0, 1")
        );
        assert_eq!(pattern("select a from t limit 10"), "select a from t limit ?");
    }

    #[test]
    fn test_normalize_in_list_collapses() {
        assert_eq!(
            pattern("select * from t where a in (1, 2, 3)"),
            pattern("select * from t where a in (4, 5)")
        );
        assert_eq!(pattern("select * from t where a in (1, 2)"), "select * from t where a in ( ... )");
    }

    #[test]
    fn test_normalize_erases_schema_qualifier() {
        assert_eq!(pattern("select * from test.t where a = 1"), "select * from t where a = ?");
        assert_eq!(pattern("select * from `test`.`t`"), pattern("select * from t"));
    }

    #[test]
    fn test_normalize_negative_literal() {
        assert_eq!(pattern("select * from t where a > -5"), pattern("select * from t where a > 5"));
        assert_eq!(pattern("select a - 1 from t"), "select a - ? from t");
    }

    #[test]
    fn test_hints_stay_in_pattern() {
        let a = pattern("select /*+ use_index(t, a) */ * from t");
        let b = pattern("select /*+ use_index(t, b) */ * from t");
        assert_ne!(a, b);
        assert_ne!(a, pattern("select * from t"));
    }

    #[test]
    fn test_digest_is_sha256_of_pattern() {
        let n = normalize("select * from t").unwrap();
        assert_eq!(n.digest.len(), 64);
        assert_eq!(n.digest, fingerprint("select * from t"));
    }

    #[test]
    fn test_parse_tables_aliases_and_inline_hints() {
        let stmt = parse("select * from t1 as a use index(idx_a), test.t2 b join t3 on b.id = t3.id");
        assert_eq!(stmt.kind, StatementKind::Select);
        let names: Vec<String> = stmt.tables.iter().map(|t| t.table.to_string()).collect();
        assert_eq!(names, vec!["t1", "test.t2", "t3"]);
        assert_eq!(stmt.tables[0].alias.as_deref(), Some("a"));
        assert_eq!(stmt.tables[1].alias.as_deref(), Some("b"));
        assert_eq!(
            stmt.hints,
            vec![PlanHint::UseIndex {
                table: TableName::new(None, "t1"),
                indexes: vec!["idx_a".to_string()],
            }]
        );
    }

    #[test]
    fn test_parse_comment_hints() {
        let stmt = parse("SELECT /*+ TIDB_SMJ(t1, t2) */ * from t1,t2 where t1.id = t2.id");
        assert_eq!(stmt.tables.len(), 2);
        assert!(matches!(&stmt.hints[0], PlanHint::Other { name, .. } if name == "tidb_smj"));
    }

    #[test]
    fn test_parse_predicates() {
        let stmt = parse("select * from t where a >= 4 and b >= 1 and c = 0 and 3 < t.d");
        assert_eq!(stmt.predicates.len(), 4);
        assert_eq!(stmt.predicates[0].column, "a");
        assert_eq!(stmt.predicates[0].op, CmpOp::Ge);
        assert_eq!(stmt.predicates[0].value, Some(4.0));
        assert_eq!(stmt.predicates[2].op, CmpOp::Eq);
        assert_eq!(stmt.predicates[3].qualifier.as_deref(), Some("t"));
        assert_eq!(stmt.predicates[3].op, CmpOp::Gt);
        assert_eq!(stmt.predicates[3].value, Some(3.0));
    }

    #[test]
    fn test_parse_predicates_with_or_is_empty() {
        let stmt = parse("select * from t where a = 1 or b = 2");
        assert!(stmt.predicates.is_empty());
    }

    #[test]
    fn test_parse_predicates_stop_at_limit() {
        let stmt = parse("select * from t where a = 1 and b = 'x' limit 10");
        assert_eq!(stmt.predicates.len(), 2);
        assert_eq!(stmt.predicates[1].value, None);
    }

    #[test]
    fn test_parse_dml_statements() {
        assert_eq!(parse("update t set a = 1 where b = 2").kind, StatementKind::Update);
        assert_eq!(parse("delete from t where a = 1").kind, StatementKind::Delete);
        let insert = parse("insert into test.t values (1, 2)");
        assert_eq!(insert.kind, StatementKind::Insert);
        assert_eq!(insert.tables[0].table, TableName::new(Some("test"), "t"));
    }

    #[test]
    fn test_parse_failures() {
        let parser = DefaultSqlParser;
        assert!(parser.parse("", "", "").is_err());
        assert!(parser.parse("create table t(a int)", "", "").is_err());
        assert!(parser.parse("select * from t where (a = 1", "", "").is_err());
        assert!(parser.parse("select * from", "", "").is_err());
        assert!(parser.parse("select 1; select 2", "", "").is_err());
        assert!(parser.parse("select * from t /*+ USE_INDEX( */", "", "").is_err());
    }

    #[test]
    fn test_for_update_is_not_a_table_list() {
        let stmt = parse("select * from t where a = 1 for update");
        assert_eq!(stmt.tables.len(), 1);
        assert_eq!(pattern("select * from t where a in (1, 2, b)"), "select * from t where a in ( ? , ? , b )");
    }

    #[test]
    fn test_parse_dual_has_no_tables() {
        let stmt = parse("select 1 from dual");
        assert!(stmt.tables.is_empty());
    }

    #[test]
    fn test_base_tables_resolve_default_db() {
        let stmt = parse("select * from t, tmp.t");
        let tables: Vec<String> = stmt.base_tables("test").iter().map(|t| t.to_string()).collect();
        assert_eq!(tables, vec!["test.t", "tmp.t"]);
    }

    #[test]
    fn test_table_ref_matches_hint() {
        let stmt = parse("select * from test.t x");
        let t = &stmt.tables[0];
        assert!(t.matches(&TableName::new(None, "x"), "test"));
        assert!(t.matches(&TableName::new(Some("test"), "t"), "other"));
        assert!(!t.matches(&TableName::new(Some("tmp"), "t"), "test"));
    }
}
