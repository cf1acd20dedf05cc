// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// redb-backed persistent bind-info table.
//
// # Design
//
// - Single redb `Database` file with one table of `RowKey::encode()` -> JSON row.
// - Read transactions for `load` (concurrent, lock-free).
// - One write transaction per mutation, so `upsert` of several rows and the
//   tombstoning of a whole pattern are atomic.
// - All redb work runs on `spawn_blocking`; redb is synchronous.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::row::{BindRow, RowKey, STATUS_DELETED};
use crate::table::{sort_rows, BindTable};

const BIND_INFO: TableDefinition<&[u8], &[u8]> = TableDefinition::new("bind_info");

/// A persistent bind-info table powered by redb.
pub struct RedbBindTable {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbBindTable {
    /// Open or create a redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::BackendUnavailable(format!(
                "failed to open redb at {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "opened redb bind-info table");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode_row(row: &BindRow) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec(row)?)
    }

    fn decode_row(bytes: &[u8]) -> Result<BindRow, StorageError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Run `f` inside a write transaction on the blocking pool.
    async fn write<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut redb::Table<'_, &'static [u8], &'static [u8]>) -> Result<T, StorageError>
            + Send
            + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
            let out = {
                let mut table = txn
                    .open_table(BIND_INFO)
                    .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
                f(&mut table)?
            };
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            Ok(out)
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }
}

impl std::fmt::Debug for RedbBindTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBindTable")
            .field("path", &self.path)
            .finish()
    }
}

/// Decode every row of the table, optionally filtered.
fn scan<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    mut keep: impl FnMut(&BindRow) -> bool,
) -> Result<Vec<BindRow>, StorageError> {
    let mut out = Vec::new();
    let iter = table
        .iter()
        .map_err(|e| StorageError::CorruptedData(format!("scan: {e}")))?;
    for entry in iter {
        let entry = entry.map_err(|e| StorageError::CorruptedData(format!("scan entry: {e}")))?;
        let row = RedbBindTable::decode_row(entry.1.value())?;
        if keep(&row) {
            out.push(row);
        }
    }
    Ok(out)
}

#[async_trait]
impl BindTable for RedbBindTable {
    async fn load(&self, since: Option<DateTime<Utc>>) -> Result<Vec<BindRow>, StorageError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<Vec<BindRow>, StorageError> {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
            let table = match txn.open_table(BIND_INFO) {
                Ok(t) => t,
                // Table doesn't exist yet: no binding has been written
                Err(_) => return Ok(Vec::new()),
            };
            let mut rows = Vec::new();
            let iter = table
                .iter()
                .map_err(|e| StorageError::CorruptedData(format!("scan: {e}")))?;
            for entry in iter {
                let (key, value) = entry.map_err(|e| StorageError::CorruptedData(format!("scan entry: {e}")))?;
                match RedbBindTable::decode_row(value.value()) {
                    Ok(row) if since.map_or(true, |ts| row.update_time >= ts) => rows.push(row),
                    Ok(_) => {}
                    Err(e) => warn!(
                        key = %String::from_utf8_lossy(key.value()).replace('\0', "/"),
                        error = %e,
                        "skipping undecodable bind row"
                    ),
                }
            }
            sort_rows(&mut rows);
            Ok(rows)
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }

    async fn upsert(&self, rows: &[BindRow]) -> Result<(), StorageError> {
        let encoded = rows
            .iter()
            .map(|row| Ok((row.key().encode(), Self::encode_row(row)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;

        self.write(move |table| {
            for (key, value) in &encoded {
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("insert: {e}")))?;
            }
            Ok(())
        })
        .await
    }

    async fn delete(
        &self,
        original_sql: &str,
        default_db: &str,
        bind_sql: &str,
    ) -> Result<bool, StorageError> {
        let key = RowKey::new(default_db, original_sql, bind_sql).encode();
        self.write(move |table| {
            let existed = table
                .remove(key.as_slice())
                .map_err(|e| StorageError::CorruptedData(format!("remove: {e}")))?
                .is_some();
            Ok(existed)
        })
        .await
    }

    async fn mark_deleted(
        &self,
        original_sql: &str,
        default_db: &str,
        bind_sql: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let original_sql = original_sql.to_string();
        let default_db = default_db.to_string();
        let bind_sql = bind_sql.map(str::to_string);

        self.write(move |table| {
            let prefix = RowKey::record_prefix(&default_db, &original_sql);
            let mut targets = Vec::new();
            let range = table
                .range::<&[u8]>(prefix.as_slice()..)
                .map_err(|e| StorageError::CorruptedData(format!("range: {e}")))?;
            for entry in range {
                let (key, value) = entry.map_err(|e| StorageError::CorruptedData(format!("range entry: {e}")))?;
                if !key.value().starts_with(&prefix) {
                    break;
                }
                let row = Self::decode_row(value.value())?;
                if !row.is_tombstone() && bind_sql.as_deref().map_or(true, |sql| sql == row.bind_sql) {
                    targets.push(row);
                }
            }
            for mut row in targets.iter().cloned() {
                row.status = STATUS_DELETED.to_string();
                row.update_time = at;
                let value = Self::encode_row(&row)?;
                table
                    .insert(row.key().encode().as_slice(), value.as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("tombstone: {e}")))?;
            }
            Ok(targets.len() as u64)
        })
        .await
    }

    async fn purge_deleted(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        self.write(move |table| {
            let expired = scan(&*table, |row| row.is_tombstone() && row.update_time < before)?;
            for row in &expired {
                table
                    .remove(row.key().encode().as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("purge: {e}")))?;
            }
            Ok(expired.len() as u64)
        })
        .await
    }

    async fn truncate(&self) -> Result<(), StorageError> {
        self.write(|table| {
            let all = scan(&*table, |_| true)?;
            for row in &all {
                table
                    .remove(row.key().encode().as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("truncate: {e}")))?;
            }
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "redb"
    }
}
