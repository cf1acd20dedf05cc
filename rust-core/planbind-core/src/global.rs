// SPDX-License-Identifier: PMPL-1.0-or-later
//! The process-wide binding cache.
//!
//! Readers take an `Arc` of the current [`BindCache`] and never wait on a
//! writer. Writers (refresh and every mutation) are serialized by an async
//! mutex, write through to the backing [`BindTable`] first, then build a new
//! cache from a copy of the current one and publish it with a single pointer
//! swap.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use planbind_storage::{BindRow, BindTable};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::binding::{BindRecord, BindStatus, Binding};
use crate::cache::BindCache;
use crate::error::BindError;
use crate::metrics::{BindMetrics, BindStats};
use crate::parser::{fingerprint, SqlParser};
use crate::schema::{missing_reference, SchemaCatalog};
use crate::Scope;

/// Outcome of one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Rows read from the table.
    pub rows: usize,
    /// Rows skipped because they could not be rebuilt.
    pub skipped: usize,
    /// Records in the published snapshot.
    pub records: usize,
}

#[derive(Debug, Default)]
struct WriterState {
    /// Largest `update_time` observed by a refresh.
    last_update: Option<DateTime<Utc>>,
}

/// Handle on the global binding cache and its backing table.
pub struct GlobalBindHandle {
    snapshot: RwLock<Arc<BindCache>>,
    writer: Mutex<WriterState>,
    table: Arc<dyn BindTable>,
    parser: Arc<dyn SqlParser>,
    metrics: BindMetrics,
}

impl GlobalBindHandle {
    pub fn new(table: Arc<dyn BindTable>, parser: Arc<dyn SqlParser>, metrics: BindMetrics) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(BindCache::new())),
            writer: Mutex::new(WriterState::default()),
            table,
            parser,
            metrics,
        }
    }

    /// The currently published cache.
    pub fn snapshot(&self) -> Arc<BindCache> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn publish(&self, cache: BindCache) {
        let records = cache.all();
        let stats = BindStats::of_records(records.iter().map(Arc::as_ref));
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(cache);
        self.metrics.set(Scope::Global, &stats);
        debug!(records = records.len(), "published global binding snapshot");
    }

    pub fn table(&self) -> &Arc<dyn BindTable> {
        &self.table
    }

    pub fn parser(&self) -> &Arc<dyn SqlParser> {
        &self.parser
    }

    /// Timestamp the next incremental refresh reads from.
    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        self.writer.lock().await.last_update
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Reload from the backing table.
    ///
    /// A full reload rebuilds the cache from scratch; otherwise only rows
    /// updated since the previous refresh are merged into a copy of the
    /// current cache. On a read failure the published cache is left as is.
    pub async fn refresh(&self, full: bool) -> Result<RefreshReport, BindError> {
        let mut state = self.writer.lock().await;
        let since = if full { None } else { state.last_update };

        let rows = match self.table.load(since).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table = self.table.name(), error = %e, "binding refresh failed, keeping previous snapshot");
                return Err(e.into());
            }
        };

        let mut cache = if full {
            BindCache::new()
        } else {
            self.snapshot().copy()
        };

        let mut report = RefreshReport {
            rows: rows.len(),
            ..Default::default()
        };
        let mut newest = state.last_update;
        let mut grouped: BTreeMap<(String, String), Vec<Binding>> = BTreeMap::new();
        let mut order: Vec<(String, String)> = Vec::new();

        for row in &rows {
            newest = Some(newest.map_or(row.update_time, |n| n.max(row.update_time)));
            let binding = match self.binding_from_row(row) {
                Ok(binding) => binding,
                Err(e) => {
                    warn!(
                        original_sql = %row.original_sql,
                        bind_sql = %row.bind_sql,
                        error = %e,
                        "skipping malformed binding row"
                    );
                    report.skipped += 1;
                    continue;
                }
            };
            let key = (row.default_db.clone(), row.original_sql.clone());
            if !grouped.contains_key(&key) {
                order.push(key.clone());
            }
            grouped.entry(key).or_default().push(binding);
        }

        for key in order {
            let Some(bindings) = grouped.remove(&key) else { continue };
            let (db, original) = key;
            let digest = fingerprint(&original);
            let newer = BindRecord::new(original.clone(), db.clone(), bindings);
            let merged = match cache.get(&digest, &original, &db) {
                Some(old) => old.merge(&newer),
                None => BindRecord::new(original.clone(), db.clone(), Vec::new()).merge(&newer),
            };
            if merged.is_empty() {
                cache.remove(&digest, &original, &db);
            } else {
                cache.set(merged);
            }
        }

        report.records = cache.len();
        self.publish(cache);
        state.last_update = newest;

        debug!(full, rows = report.rows, skipped = report.skipped, records = report.records, "binding refresh done");
        Ok(report)
    }

    /// Tombstones only need an identity, so they are not re-parsed.
    fn binding_from_row(&self, row: &BindRow) -> Result<Binding, BindError> {
        if !row.is_tombstone() {
            return Binding::from_row(self.parser.as_ref(), row);
        }
        let id = self
            .parser
            .normalize(&row.bind_sql)
            .map(|n| n.pattern)
            .unwrap_or_else(|_| row.bind_sql.clone());
        Ok(Binding {
            id,
            bind_sql: row.bind_sql.clone(),
            status: BindStatus::Deleted,
            charset: row.charset.clone(),
            collation: row.collation.clone(),
            create_time: row.create_time,
            update_time: row.update_time,
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Exact `(pattern, db)` match within the `digest` bucket.
    pub fn lookup(&self, digest: &str, pattern: &str, db: &str) -> Option<Arc<BindRecord>> {
        self.snapshot().get(digest, pattern, db)
    }

    pub fn all_records(&self) -> Vec<Arc<BindRecord>> {
        self.snapshot().all()
    }

    /// Records ordered by `(original_sql, db)`.
    pub fn show_records(&self) -> Vec<Arc<BindRecord>> {
        let mut records = self.all_records();
        records.sort_by(|a, b| a.original_sql.cmp(&b.original_sql).then_with(|| a.db.cmp(&b.db)));
        records
    }

    /// Number of records.
    pub fn size(&self) -> usize {
        self.snapshot().len()
    }

    /// Drop the in-memory cache; the backing table is untouched and the next
    /// incremental refresh reloads everything.
    pub async fn clear(&self) {
        let mut state = self.writer.lock().await;
        state.last_update = None;
        self.publish(BindCache::new());
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Persist and publish the bindings of `record`.
    ///
    /// A binding whose id already exists replaces it and the replaced row is
    /// deleted; a `pending verify` binding whose id already exists is ignored.
    /// Returns the number of bindings written.
    pub async fn add_bind_record(&self, record: &BindRecord) -> Result<usize, BindError> {
        let _state = self.writer.lock().await;
        let current = self.snapshot();
        let digest = record.digest();
        let existing = current.get(&digest, &record.original_sql, &record.db);

        let mut kept = Vec::with_capacity(record.bindings.len());
        for binding in &record.bindings {
            let old = existing.as_ref().and_then(|r| r.find_binding(&binding.id));
            match old {
                Some(_) if binding.status == BindStatus::PendingVerify => {
                    debug!(bind_sql = %binding.bind_sql, "candidate already known, ignoring");
                    continue;
                }
                Some(old) if old.bind_sql != binding.bind_sql => {
                    self.table
                        .delete(&record.original_sql, &record.db, &old.bind_sql)
                        .await?;
                }
                _ => {}
            }
            kept.push(binding.clone());
        }
        if kept.is_empty() {
            return Ok(0);
        }

        let update = BindRecord::new(record.original_sql.clone(), record.db.clone(), kept);
        self.table.upsert(&update.to_rows()).await?;

        let merged = match &existing {
            Some(old) => old.merge(&update),
            None => BindRecord::new(record.original_sql.clone(), record.db.clone(), Vec::new()).merge(&update),
        };
        let mut cache = current.copy();
        cache.set(merged);
        self.publish(cache);

        info!(original_sql = %record.original_sql, db = %record.db, added = update.bindings.len(), "global binding added");
        Ok(update.bindings.len())
    }

    /// Tombstone one binding (by bound SQL) or every binding of a pattern.
    ///
    /// Returns the number of bindings removed from the cache.
    pub async fn drop_bind_record(&self, pattern: &str, db: &str, bind_sql: Option<&str>) -> Result<usize, BindError> {
        let _state = self.writer.lock().await;
        let now = Utc::now();
        let current = self.snapshot();
        let digest = fingerprint(pattern);
        let existing = current.get(&digest, pattern, db);

        let id = match bind_sql {
            Some(sql) => Some(self.parser.normalize(sql)?.pattern),
            None => None,
        };
        let targets: Vec<&Binding> = existing
            .as_deref()
            .map(|r| {
                r.bindings
                    .iter()
                    .filter(|b| id.as_ref().map_or(true, |id| b.id == *id))
                    .collect()
            })
            .unwrap_or_default();

        match (bind_sql, targets.is_empty()) {
            (Some(sql), true) => {
                self.table.mark_deleted(pattern, db, Some(sql), now).await?;
            }
            (Some(_), false) => {
                for binding in &targets {
                    self.table.mark_deleted(pattern, db, Some(&binding.bind_sql), now).await?;
                }
            }
            (None, _) => {
                self.table.mark_deleted(pattern, db, None, now).await?;
            }
        }

        let removed = targets.len();
        if let Some(old) = &existing {
            let remaining = old.remove(id.as_deref());
            let mut cache = current.copy();
            if remaining.is_empty() {
                cache.remove(&digest, pattern, db);
            } else {
                cache.set(remaining);
            }
            self.publish(cache);
        }

        info!(original_sql = %pattern, db = %db, removed, "global binding dropped");
        Ok(removed)
    }

    /// Move binding `id` of `(pattern, db)` to `status`.
    ///
    /// Moving to `deleted` tombstones the row and removes the binding from
    /// the cache. Returns `false` when the binding is not cached.
    pub async fn update_binding_status(
        &self,
        pattern: &str,
        db: &str,
        id: &str,
        status: BindStatus,
    ) -> Result<bool, BindError> {
        let _state = self.writer.lock().await;
        let now = Utc::now();
        let current = self.snapshot();
        let digest = fingerprint(pattern);
        let Some(existing) = current.get(&digest, pattern, db) else { return Ok(false) };
        let Some(binding) = existing.find_binding(id) else { return Ok(false) };

        let updated = if status == BindStatus::Deleted {
            self.table.mark_deleted(pattern, db, Some(&binding.bind_sql), now).await?;
            existing.remove(Some(id))
        } else {
            let Some(updated) = existing.with_status(id, status, now) else { return Ok(false) };
            if let Some(b) = updated.find_binding(id) {
                self.table.upsert(&[b.to_row(pattern, db)]).await?;
            }
            updated
        };

        let mut cache = current.copy();
        if updated.is_empty() {
            cache.remove(&digest, pattern, db);
        } else {
            cache.set(updated);
        }
        self.publish(cache);
        debug!(original_sql = %pattern, db = %db, %status, "binding status updated");
        Ok(true)
    }

    /// Tombstone every binding whose tables or hinted indexes no longer exist.
    ///
    /// Validation runs against the published snapshot without holding the
    /// writer lock; the removals are then applied in one swap. Returns the
    /// number of bindings pruned.
    pub async fn prune_invalid(&self, catalog: &dyn SchemaCatalog) -> Result<usize, BindError> {
        let snapshot = self.snapshot();
        let mut invalid: Vec<(String, String, String, String)> = Vec::new();
        for record in snapshot.all() {
            for binding in &record.bindings {
                let missing = match self.parser.parse(&binding.bind_sql, &binding.charset, &binding.collation) {
                    Ok(stmt) => missing_reference(catalog, &stmt, &record.db),
                    Err(e) => Some(e.to_string()),
                };
                if let Some(missing) = missing {
                    info!(bind_sql = %binding.bind_sql, %missing, "binding references missing schema object");
                    invalid.push((
                        record.original_sql.clone(),
                        record.db.clone(),
                        binding.id.clone(),
                        binding.bind_sql.clone(),
                    ));
                }
            }
        }
        if invalid.is_empty() {
            return Ok(0);
        }

        let _state = self.writer.lock().await;
        let now = Utc::now();
        let mut cache = self.snapshot().copy();
        let mut pruned = 0;
        for (pattern, db, id, bind_sql) in &invalid {
            let digest = fingerprint(pattern);
            let Some(record) = cache.get(&digest, pattern, db) else { continue };
            // The binding may have been replaced since validation.
            if record.find_binding(id).map_or(true, |b| b.bind_sql != *bind_sql) {
                debug!(%bind_sql, "binding changed before prune, skipping");
                continue;
            }
            self.table.mark_deleted(pattern, db, Some(bind_sql), now).await?;
            let remaining = record.remove(Some(id));
            pruned += 1;
            if remaining.is_empty() {
                cache.remove(&digest, pattern, db);
            } else {
                cache.set(remaining);
            }
        }
        self.publish(cache);

        info!(pruned, "invalid bindings pruned");
        Ok(pruned)
    }

    /// Physically delete tombstones last updated before `before`.
    pub async fn purge_tombstones(&self, before: DateTime<Utc>) -> Result<u64, BindError> {
        let _state = self.writer.lock().await;
        let purged = self.table.purge_deleted(before).await?;
        if purged > 0 {
            info!(purged, "binding tombstones purged");
        }
        Ok(purged)
    }
}

impl std::fmt::Debug for GlobalBindHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalBindHandle")
            .field("table", &self.table.name())
            .field("records", &self.size())
            .finish()
    }
}
