// SPDX-License-Identifier: PMPL-1.0-or-later
//! Bindings and binding records.
//!
//! A [`BindRecord`] groups every [`Binding`] of one normalized pattern in one
//! database. Records are immutable once published in a cache snapshot; the
//! mutating methods here all return a new record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use planbind_storage::{BindRow, STATUS_DELETED};
use serde::{Deserialize, Serialize};

use crate::error::BindError;
use crate::parser::{fingerprint, SqlParser};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a binding.
///
/// ```text
/// create / capture ──► using
/// propose ──► pending verify ──► using | rejected
/// any ──► deleted (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BindStatus {
    Using,
    PendingVerify,
    Rejected,
    Deleted,
}

impl BindStatus {
    /// All statuses, in metric label order.
    pub const ALL: [BindStatus; 4] = [
        BindStatus::Using,
        BindStatus::PendingVerify,
        BindStatus::Rejected,
        BindStatus::Deleted,
    ];

    /// Persisted text of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            BindStatus::Using => "using",
            BindStatus::PendingVerify => "pending verify",
            BindStatus::Rejected => "rejected",
            BindStatus::Deleted => STATUS_DELETED,
        }
    }

    /// Whether a binding in this state may be selected at compile time.
    pub fn is_usable(self) -> bool {
        self == BindStatus::Using
    }
}

impl fmt::Display for BindStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindStatus {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "using" => Ok(BindStatus::Using),
            "pending verify" => Ok(BindStatus::PendingVerify),
            "rejected" => Ok(BindStatus::Rejected),
            "deleted" => Ok(BindStatus::Deleted),
            _ => Err(BindError::UnknownStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// One alternate, hint-annotated statement for a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Normalized pattern of `bind_sql`; two bindings with the same id are
    /// the same plan.
    pub id: String,
    pub bind_sql: String,
    pub status: BindStatus,
    pub charset: String,
    pub collation: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Binding {
    /// Rebuild a binding from a stored row, re-parsing the bound SQL under
    /// the row's charset and collation.
    pub fn from_row(parser: &dyn SqlParser, row: &BindRow) -> Result<Self, BindError> {
        let status: BindStatus = row.status.parse()?;
        let parsed = parser.parse(&row.bind_sql, &row.charset, &row.collation)?;
        Ok(Self {
            id: parsed.normalized.pattern,
            bind_sql: row.bind_sql.clone(),
            status,
            charset: row.charset.clone(),
            collation: row.collation.clone(),
            create_time: row.create_time,
            update_time: row.update_time,
        })
    }

    /// Estimated in-memory footprint in bytes.
    pub fn size(&self) -> usize {
        self.bind_sql.len()
            + self.status.as_str().len()
            + self.charset.len()
            + self.collation.len()
            + 2 * std::mem::size_of::<DateTime<Utc>>()
    }

    pub fn to_row(&self, original_sql: &str, db: &str) -> BindRow {
        BindRow {
            original_sql: original_sql.to_string(),
            bind_sql: self.bind_sql.clone(),
            default_db: db.to_string(),
            status: self.status.as_str().to_string(),
            create_time: self.create_time,
            update_time: self.update_time,
            charset: self.charset.clone(),
            collation: self.collation.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// BindRecord
// ---------------------------------------------------------------------------

/// All bindings of one normalized pattern within one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRecord {
    /// Normalized pattern of the original statement.
    pub original_sql: String,
    pub db: String,
    /// Insertion order; only a tie-break between equal-cost plans.
    pub bindings: Vec<Binding>,
}

impl BindRecord {
    pub fn new(original_sql: impl Into<String>, db: impl Into<String>, bindings: Vec<Binding>) -> Self {
        Self {
            original_sql: original_sql.into(),
            db: db.into(),
            bindings,
        }
    }

    /// Fingerprint of `original_sql`, the cache key of this record.
    pub fn digest(&self) -> String {
        fingerprint(&self.original_sql)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn find_binding(&self, id: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.id == id)
    }

    pub fn has_using(&self) -> bool {
        self.bindings.iter().any(|b| b.status.is_usable())
    }

    pub fn using_bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(|b| b.status.is_usable())
    }

    /// Estimated footprint: the record header plus every binding.
    pub fn size(&self) -> usize {
        self.original_sql.len() + self.db.len() + self.bindings.iter().map(Binding::size).sum::<usize>()
    }

    /// Overlay `newer` on this record.
    ///
    /// A binding of `newer` replaces the one with the same id when it is not
    /// older; unseen bindings are appended. Deleted bindings are dropped from
    /// the result, so merging a tombstone removes the binding.
    pub fn merge(&self, newer: &BindRecord) -> BindRecord {
        let mut bindings = self.bindings.clone();
        for binding in &newer.bindings {
            match bindings.iter().position(|b| b.id == binding.id) {
                Some(pos) if binding.update_time >= bindings[pos].update_time => bindings[pos] = binding.clone(),
                Some(_) => {}
                None => bindings.push(binding.clone()),
            }
        }
        bindings.retain(|b| b.status != BindStatus::Deleted);
        BindRecord::new(self.original_sql.clone(), self.db.clone(), bindings)
    }

    /// This record without the binding `id`, or without any binding when `id` is `None`.
    pub fn remove(&self, id: Option<&str>) -> BindRecord {
        let bindings = match id {
            Some(id) => self.bindings.iter().filter(|b| b.id != id).cloned().collect(),
            None => Vec::new(),
        };
        BindRecord::new(self.original_sql.clone(), self.db.clone(), bindings)
    }

    /// This record with binding `id` moved to `status`; `None` when absent.
    pub fn with_status(&self, id: &str, status: BindStatus, at: DateTime<Utc>) -> Option<BindRecord> {
        let pos = self.bindings.iter().position(|b| b.id == id)?;
        let mut record = self.clone();
        record.bindings[pos].status = status;
        record.bindings[pos].update_time = at;
        Some(record)
    }

    pub fn to_rows(&self) -> Vec<BindRow> {
        self.bindings.iter().map(|b| b.to_row(&self.original_sql, &self.db)).collect()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Input of a create-binding command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRequest {
    /// Original statement, literal or already normalized.
    pub original_sql: String,
    /// Hint-annotated statement to bind it to.
    pub bind_sql: String,
    /// Current database of the caller.
    pub db: String,
    pub charset: String,
    pub collation: String,
}

impl BindRequest {
    pub fn new(original_sql: impl Into<String>, bind_sql: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            original_sql: original_sql.into(),
            bind_sql: bind_sql.into(),
            db: db.into(),
            ..Default::default()
        }
    }

    pub fn with_charset(mut self, charset: impl Into<String>, collation: impl Into<String>) -> Self {
        self.charset = charset.into();
        self.collation = collation.into();
        self
    }
}

/// Validate a request and build a single-binding record.
///
/// Both statements must parse and must reference the same base tables once
/// unqualified names are resolved against the request database. `charset`
/// and `collation` of the request must already be resolved.
pub fn build_record(
    parser: &dyn SqlParser,
    request: &BindRequest,
    status: BindStatus,
    now: DateTime<Utc>,
) -> Result<BindRecord, BindError> {
    let db = request.db.to_lowercase();
    let original = parser.parse(&request.original_sql, &request.charset, &request.collation)?;
    let bound = parser.parse(&request.bind_sql, &request.charset, &request.collation)?;

    let original_tables = original.base_tables(&db);
    let bound_tables = bound.base_tables(&db);
    if original_tables != bound_tables {
        return Err(BindError::TableMismatch {
            original: original_tables.iter().map(ToString::to_string).collect(),
            bound: bound_tables.iter().map(ToString::to_string).collect(),
        });
    }

    let binding = Binding {
        id: bound.normalized.pattern,
        bind_sql: request.bind_sql.clone(),
        status,
        charset: request.charset.clone(),
        collation: request.collation.clone(),
        create_time: now,
        update_time: now,
    };
    Ok(BindRecord::new(original.normalized.pattern, db, vec![binding]))
}
