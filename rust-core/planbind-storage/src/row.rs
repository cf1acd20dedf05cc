// SPDX-License-Identifier: PMPL-1.0-or-later
//! The logical row shape of the bind-info table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status string written for tombstoned bindings.
pub const STATUS_DELETED: &str = "deleted";

/// One persisted binding.
///
/// The table is keyed by `(default_db, original_sql, bind_sql)`; writing a
/// row with an existing key replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRow {
    /// Normalized pattern of the original statement.
    pub original_sql: String,
    /// Hint-annotated statement the pattern is bound to.
    pub bind_sql: String,
    /// Database the pattern was bound in.
    pub default_db: String,
    /// Status text (`using`, `pending verify`, `rejected`, `deleted`).
    pub status: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub charset: String,
    pub collation: String,
}

impl BindRow {
    /// Primary key of this row.
    pub fn key(&self) -> RowKey {
        RowKey::new(&self.default_db, &self.original_sql, &self.bind_sql)
    }

    /// Whether this row is a deletion tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.status == STATUS_DELETED
    }
}

/// Primary key of a [`BindRow`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub default_db: String,
    pub original_sql: String,
    pub bind_sql: String,
}

impl RowKey {
    pub fn new(default_db: &str, original_sql: &str, bind_sql: &str) -> Self {
        Self {
            default_db: default_db.to_string(),
            original_sql: original_sql.to_string(),
            bind_sql: bind_sql.to_string(),
        }
    }

    /// Encode the key as bytes for ordered key-value backends.
    ///
    /// Components are separated by a NUL byte, which cannot appear in SQL
    /// text handed to the table, so all rows of one `(db, original)` pair
    /// share the prefix returned by [`RowKey::record_prefix`].
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Self::record_prefix(&self.default_db, &self.original_sql);
        out.extend_from_slice(self.bind_sql.as_bytes());
        out
    }

    /// Byte prefix shared by every binding of one pattern in one database.
    pub fn record_prefix(default_db: &str, original_sql: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(default_db.len() + original_sql.len() + 2);
        out.extend_from_slice(default_db.as_bytes());
        out.push(0);
        out.extend_from_slice(original_sql.as_bytes());
        out.push(0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> BindRow {
        let now = Utc::now();
        BindRow {
            original_sql: "select * from t".to_string(),
            bind_sql: "select * from t use index(idx)".to_string(),
            default_db: "test".to_string(),
            status: status.to_string(),
            create_time: now,
            update_time: now,
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_bin".to_string(),
        }
    }

    #[test]
    fn test_tombstone_detection() {
        assert!(row("deleted").is_tombstone());
        assert!(!row("using").is_tombstone());
    }

    #[test]
    fn test_key_prefix_groups_record() {
        let r = row("using");
        let prefix = RowKey::record_prefix("test", "select * from t");
        assert!(r.key().encode().starts_with(&prefix));

        let other_db = RowKey::record_prefix("tmp", "select * from t");
        assert!(!r.key().encode().starts_with(&other_db));
    }

    #[test]
    fn test_row_serde_roundtrip() {
        let r = row("pending verify");
        let json = serde_json::to_string(&r).unwrap();
        let parsed: BindRow = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, r);
    }
}
