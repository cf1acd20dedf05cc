// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core bind-info table trait.
//
// The table is the source of truth for global bindings. Caches read it in
// bulk (full or incremental) and write through it before reflecting any
// mutation in memory. Implementations must be `Send + Sync` and fully async.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::row::BindRow;

/// The persisted bind-info table.
#[async_trait]
pub trait BindTable: Send + Sync {
    /// Load rows, tombstones included.
    ///
    /// With `since = None` every row is returned; otherwise only rows whose
    /// `update_time >= since`. Rows come back ordered by `create_time`, ties
    /// broken by primary key, so binding order is stable across reloads.
    async fn load(&self, since: Option<DateTime<Utc>>) -> Result<Vec<BindRow>, StorageError>;

    /// Insert or replace rows by primary key. All rows are written or none.
    async fn upsert(&self, rows: &[BindRow]) -> Result<(), StorageError>;

    /// Physically remove one row.
    ///
    /// Returns `Ok(true)` if the row existed.
    async fn delete(
        &self,
        original_sql: &str,
        default_db: &str,
        bind_sql: &str,
    ) -> Result<bool, StorageError>;

    /// Turn live rows into tombstones stamped with `at`.
    ///
    /// With `bind_sql = None` every non-deleted binding of the pattern is
    /// tombstoned. Returns the number of rows changed.
    async fn mark_deleted(
        &self,
        original_sql: &str,
        default_db: &str,
        bind_sql: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Physically remove tombstones last updated before `before`.
    async fn purge_deleted(&self, before: DateTime<Utc>) -> Result<u64, StorageError>;

    /// Remove every row.
    async fn truncate(&self) -> Result<(), StorageError>;

    /// A human-readable name for this table, used in logging.
    fn name(&self) -> &str;
}

/// Sort rows into the order promised by [`BindTable::load`].
pub(crate) fn sort_rows(rows: &mut [BindRow]) {
    rows.sort_by(|a, b| {
        a.create_time
            .cmp(&b.create_time)
            .then_with(|| a.key().cmp(&b.key()))
    });
}
