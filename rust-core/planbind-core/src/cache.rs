// SPDX-License-Identifier: PMPL-1.0-or-later
//! Fingerprint-keyed map of binding records.
//!
//! A `BindCache` is a plain value. The global handle publishes it behind an
//! `Arc` and replaces it wholesale; writers work on a [`BindCache::copy`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::binding::BindRecord;

/// Records grouped by the fingerprint of their pattern.
///
/// Distinct patterns may share a fingerprint, so every lookup compares the
/// pattern text and database as well.
#[derive(Debug, Clone, Default)]
pub struct BindCache {
    entries: HashMap<String, Vec<Arc<BindRecord>>>,
}

impl BindCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact match on `(pattern, db)` within the `digest` bucket.
    pub fn get(&self, digest: &str, pattern: &str, db: &str) -> Option<Arc<BindRecord>> {
        self.entries
            .get(digest)?
            .iter()
            .find(|r| r.original_sql == pattern && r.db == db)
            .cloned()
    }

    /// Insert or replace the record for its `(pattern, db)`.
    pub fn set(&mut self, record: BindRecord) {
        let digest = record.digest();
        let bucket = self.entries.entry(digest).or_default();
        match bucket
            .iter()
            .position(|r| r.original_sql == record.original_sql && r.db == record.db)
        {
            Some(pos) => bucket[pos] = Arc::new(record),
            None => bucket.push(Arc::new(record)),
        }
    }

    /// Remove the record for `(pattern, db)`; returns it when present.
    pub fn remove(&mut self, digest: &str, pattern: &str, db: &str) -> Option<Arc<BindRecord>> {
        let bucket = self.entries.get_mut(digest)?;
        let pos = bucket.iter().position(|r| r.original_sql == pattern && r.db == db)?;
        let removed = bucket.remove(pos);
        if bucket.is_empty() {
            self.entries.remove(digest);
        }
        Some(removed)
    }

    /// Shallow copy for copy-on-write updates; records are shared.
    pub fn copy(&self) -> BindCache {
        self.clone()
    }

    /// Every record, in no particular order.
    pub fn all(&self) -> Vec<Arc<BindRecord>> {
        self.entries.values().flatten().cloned().collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
