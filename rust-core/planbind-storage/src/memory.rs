// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory bind-info table.
//
// Uses a `BTreeMap` keyed by `RowKey` inside a tokio `RwLock`. Intended for
// tests, embedded deployments and as the reference behaviour for persistent
// tables.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::row::{BindRow, RowKey, STATUS_DELETED};
use crate::table::{sort_rows, BindTable};

/// A bind-info table that lives in process memory and is lost on drop.
///
/// Cloning shares the underlying rows, which lets tests hand the same table
/// to several cache handles.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBindTable {
    rows: Arc<RwLock<BTreeMap<RowKey, BindRow>>>,
}

impl InMemoryBindTable {
    /// Create a new, empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, tombstones included.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Return true if the table holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl BindTable for InMemoryBindTable {
    async fn load(&self, since: Option<DateTime<Utc>>) -> Result<Vec<BindRow>, StorageError> {
        let rows = self.rows.read().await;
        let mut out: Vec<BindRow> = rows
            .values()
            .filter(|row| since.map_or(true, |ts| row.update_time >= ts))
            .cloned()
            .collect();
        sort_rows(&mut out);
        Ok(out)
    }

    async fn upsert(&self, new_rows: &[BindRow]) -> Result<(), StorageError> {
        let mut rows = self.rows.write().await;
        for row in new_rows {
            rows.insert(row.key(), row.clone());
        }
        Ok(())
    }

    async fn delete(
        &self,
        original_sql: &str,
        default_db: &str,
        bind_sql: &str,
    ) -> Result<bool, StorageError> {
        let mut rows = self.rows.write().await;
        Ok(rows
            .remove(&RowKey::new(default_db, original_sql, bind_sql))
            .is_some())
    }

    async fn mark_deleted(
        &self,
        original_sql: &str,
        default_db: &str,
        bind_sql: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut rows = self.rows.write().await;
        let mut changed = 0;
        for row in rows.values_mut() {
            if row.original_sql != original_sql || row.default_db != default_db {
                continue;
            }
            if bind_sql.map_or(false, |sql| sql != row.bind_sql) || row.is_tombstone() {
                continue;
            }
            row.status = STATUS_DELETED.to_string();
            row.update_time = at;
            changed += 1;
        }
        Ok(changed)
    }

    async fn purge_deleted(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut rows = self.rows.write().await;
        let start = rows.len();
        rows.retain(|_, row| !(row.is_tombstone() && row.update_time < before));
        Ok((start - rows.len()) as u64)
    }

    async fn truncate(&self) -> Result<(), StorageError> {
        self.rows.write().await.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
