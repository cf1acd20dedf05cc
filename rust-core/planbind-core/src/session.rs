// SPDX-License-Identifier: PMPL-1.0-or-later
//! Per-session binding overlay.
//!
//! Owned by exactly one session, never persisted. A record present here
//! shadows the global record for the same pattern, including an empty record
//! left behind by a session-scoped drop.

use std::sync::Arc;

use tracing::debug;

use crate::binding::{BindRecord, BindStatus};
use crate::cache::BindCache;
use crate::error::BindError;
use crate::metrics::{BindMetrics, BindStats};
use crate::parser::{fingerprint, SqlParser};
use crate::Scope;

pub struct SessionBindHandle {
    cache: BindCache,
    parser: Arc<dyn SqlParser>,
    metrics: BindMetrics,
}

impl SessionBindHandle {
    pub fn new(parser: Arc<dyn SqlParser>, metrics: BindMetrics) -> Self {
        Self {
            cache: BindCache::new(),
            parser,
            metrics,
        }
    }

    /// Replace the stored record for `(pattern, db)` and account for the change.
    fn store(&mut self, old: Option<&BindRecord>, new: BindRecord) {
        let before = old.map(BindStats::of_record).unwrap_or_default();
        let after = BindStats::of_record(&new);
        self.cache.set(new);
        self.metrics.apply_delta(Scope::Session, &after.minus(&before));
    }

    /// Add the bindings of `record`, with the same identity rules as the
    /// global cache. Returns the number of bindings added.
    pub fn create_bind_record(&mut self, record: &BindRecord) -> usize {
        let existing = self.cache.get(&record.digest(), &record.original_sql, &record.db);
        let kept: Vec<_> = record
            .bindings
            .iter()
            .filter(|b| {
                !(b.status == BindStatus::PendingVerify
                    && existing.as_ref().is_some_and(|r| r.find_binding(&b.id).is_some()))
            })
            .cloned()
            .collect();
        if kept.is_empty() {
            return 0;
        }
        let added = kept.len();
        let update = BindRecord::new(record.original_sql.clone(), record.db.clone(), kept);
        let merged = match &existing {
            Some(old) => old.merge(&update),
            None => BindRecord::new(record.original_sql.clone(), record.db.clone(), Vec::new()).merge(&update),
        };
        self.store(existing.as_deref(), merged);
        debug!(original_sql = %record.original_sql, added, "session binding added");
        added
    }

    /// Remove one binding (by bound SQL) or all bindings of a pattern.
    ///
    /// The record stays behind, possibly empty, so the pattern remains
    /// unbound in this session even if a global binding exists.
    pub fn drop_bind_record(&mut self, pattern: &str, db: &str, bind_sql: Option<&str>) -> Result<usize, BindError> {
        let id = match bind_sql {
            Some(sql) => Some(self.parser.normalize(sql)?.pattern),
            None => None,
        };
        let digest = fingerprint(pattern);
        let existing = self.cache.get(&digest, pattern, db);
        let remaining = match &existing {
            Some(old) => old.remove(id.as_deref()),
            None => BindRecord::new(pattern, db, Vec::new()),
        };
        let removed = existing.as_ref().map_or(0, |old| old.bindings.len() - remaining.bindings.len());
        self.store(existing.as_deref(), remaining);
        debug!(original_sql = %pattern, removed, "session binding dropped");
        Ok(removed)
    }

    pub fn lookup(&self, digest: &str, pattern: &str, db: &str) -> Option<Arc<BindRecord>> {
        self.cache.get(digest, pattern, db)
    }

    pub fn all_records(&self) -> Vec<Arc<BindRecord>> {
        self.cache.all()
    }

    /// Records ordered by `(original_sql, db)`.
    pub fn show_records(&self) -> Vec<Arc<BindRecord>> {
        let mut records = self.cache.all();
        records.sort_by(|a, b| a.original_sql.cmp(&b.original_sql).then_with(|| a.db.cmp(&b.db)));
        records
    }

    pub fn size(&self) -> usize {
        self.cache.len()
    }
}

impl Drop for SessionBindHandle {
    fn drop(&mut self) {
        let records = self.cache.all();
        let stats = BindStats::of_records(records.iter().map(Arc::as_ref));
        self.metrics.apply_delta(Scope::Session, &BindStats::default().minus(&stats));
    }
}

impl std::fmt::Debug for SessionBindHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBindHandle")
            .field("records", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{build_record, BindRequest};
    use crate::parser::DefaultSqlParser;
    use chrono::Utc;
    use prometheus::Registry;

    fn record(bind: &str, status: BindStatus) -> BindRecord {
        let request = BindRequest::new("select * from t where i > 1", bind, "test").with_charset("utf8mb4", "utf8mb4_bin");
        build_record(&DefaultSqlParser, &request, status, Utc::now()).unwrap()
    }

    #[test]
    fn test_create_lookup_and_drop_leaves_empty_record() {
        let metrics = BindMetrics::new(&Registry::new()).unwrap();
        let mut session = SessionBindHandle::new(Arc::new(DefaultSqlParser), metrics);
        let rec = record("select * from t use index(idx) where i > 1", BindStatus::Using);
        assert_eq!(session.create_bind_record(&rec), 1);
        assert_eq!(session.create_bind_record(&rec), 1);

        let digest = rec.digest();
        let found = session.lookup(&digest, &rec.original_sql, "test").unwrap();
        assert_eq!(found.bindings.len(), 1);

        assert_eq!(session.drop_bind_record(&rec.original_sql, "test", None).unwrap(), 1);
        let shadow = session.lookup(&digest, &rec.original_sql, "test").unwrap();
        assert!(shadow.is_empty());
        assert_eq!(session.size(), 1);
    }

    #[test]
    fn test_drop_unknown_pattern_creates_shadow() {
        let metrics = BindMetrics::new(&Registry::new()).unwrap();
        let mut session = SessionBindHandle::new(Arc::new(DefaultSqlParser), metrics);
        assert_eq!(session.drop_bind_record("select * from t", "test", None).unwrap(), 0);
        assert!(session.lookup(&fingerprint("select * from t"), "select * from t", "test").is_some());
    }

    #[test]
    fn test_metrics_follow_session_lifetime() {
        let metrics = BindMetrics::new(&Registry::new()).unwrap();
        {
            let mut session = SessionBindHandle::new(Arc::new(DefaultSqlParser), metrics.clone());
            session.create_bind_record(&record("select * from t use index(a) where i > 1", BindStatus::Using));
            session.create_bind_record(&record("select * from t use index(b) where i > 1", BindStatus::Using));
            assert_eq!(metrics.total(Scope::Session, BindStatus::Using), 2.0);

            session
                .drop_bind_record("select * from t where i > ?", "test", Some("select * from t use index(a) where i > 5"))
                .unwrap();
            assert_eq!(metrics.total(Scope::Session, BindStatus::Using), 1.0);
        }
        assert_eq!(metrics.total(Scope::Session, BindStatus::Using), 0.0);
        assert_eq!(metrics.memory_usage(Scope::Session, BindStatus::Using), 0.0);
    }
}
