// SPDX-License-Identifier: PMPL-1.0-or-later
//! Statement summary: the feed of recently executed statements that
//! capture draws from.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BindConfig;
use crate::hint::PlanHint;
use crate::parser::ParsedStatement;

/// Aggregated executions of one pattern in one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub db: String,
    pub digest: String,
    pub pattern: String,
    /// Most recent literal text seen for the pattern.
    pub sample_sql: String,
    pub exec_count: u64,
    /// Hints reproducing the plan of the most recent execution.
    pub plan_hints: Vec<PlanHint>,
    pub last_seen: DateTime<Utc>,
}

/// Source of frequently executed statements.
pub trait StmtSummary: Send + Sync {
    /// Record one execution of `stmt` (literal text `sql`) planned with `plan_hints`.
    fn record(&self, db: &str, stmt: &ParsedStatement, sql: &str, plan_hints: &[PlanHint]);

    /// Entries executed at least `min_exec_count` times, most frequent first.
    fn frequent(&self, min_exec_count: u64) -> Vec<SummaryEntry>;
}

/// Default bound on distinct `(db, pattern)` entries.
pub const DEFAULT_MAX_ENTRIES: usize = 3000;

#[derive(Debug)]
struct Slot {
    entry: SummaryEntry,
    touched: u64,
}

#[derive(Debug, Default)]
struct Entries {
    slots: HashMap<(String, String), Slot>,
    clock: u64,
}

/// In-memory [`StmtSummary`] holding at most `max_entries` patterns.
///
/// Recording a new pattern into a full summary evicts the least recently
/// seen one.
#[derive(Debug)]
pub struct StatementSummary {
    entries: Mutex<Entries>,
    max_entries: usize,
}

impl Default for StatementSummary {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }
}

impl StatementSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A summary bounded to `max_entries` patterns (at least one).
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// A summary sized by `config.max_stmt_summary_entries`.
    pub fn from_config(config: &BindConfig) -> Self {
        Self::with_capacity(config.max_stmt_summary_entries)
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).slots.clear();
    }
}

impl StmtSummary for StatementSummary {
    fn record(&self, db: &str, stmt: &ParsedStatement, sql: &str, plan_hints: &[PlanHint]) {
        let key = (db.to_string(), stmt.normalized.pattern.clone());
        let now = Utc::now();
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = &mut *guard;
        entries.clock += 1;

        if !entries.slots.contains_key(&key) && entries.slots.len() >= self.max_entries {
            let oldest = entries
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.touched)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.slots.remove(&oldest);
                debug!(db = %oldest.0, pattern = %oldest.1, "statement summary evicted entry");
            }
        }

        let slot = entries.slots.entry(key).or_insert_with(|| Slot {
            entry: SummaryEntry {
                db: db.to_string(),
                digest: stmt.normalized.digest.clone(),
                pattern: stmt.normalized.pattern.clone(),
                sample_sql: String::new(),
                exec_count: 0,
                plan_hints: Vec::new(),
                last_seen: now,
            },
            touched: 0,
        });
        slot.touched = entries.clock;
        slot.entry.exec_count += 1;
        slot.entry.sample_sql = sql.to_string();
        slot.entry.plan_hints = plan_hints.to_vec();
        slot.entry.last_seen = now;
    }

    fn frequent(&self, min_exec_count: u64) -> Vec<SummaryEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<SummaryEntry> = entries
            .slots
            .values()
            .filter(|slot| slot.entry.exec_count >= min_exec_count)
            .map(|slot| slot.entry.clone())
            .collect();
        out.sort_by(|a, b| b.exec_count.cmp(&a.exec_count).then_with(|| a.pattern.cmp(&b.pattern)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DefaultSqlParser, SqlParser};

    fn run(summary: &StatementSummary, db: &str, sql: &str) {
        let stmt = DefaultSqlParser.parse(sql, "", "").unwrap();
        summary.record(db, &stmt, sql, &[]);
    }

    #[test]
    fn test_literals_aggregate_into_one_entry() {
        let summary = StatementSummary::new();
        run(&summary, "test", "select * from t where a = 1");
        run(&summary, "test", "select * from t where a = 2");
        run(&summary, "other", "select * from t where a = 3");

        assert_eq!(summary.len(), 2);
        let frequent = summary.frequent(2);
        assert_eq!(frequent.len(), 1);
        assert_eq!(frequent[0].db, "test");
        assert_eq!(frequent[0].sample_sql, "select * from t where a = 2");
        assert_eq!(frequent[0].pattern, "select * from t where a = ?");
    }

    #[test]
    fn test_frequent_is_ordered_and_clear_empties() {
        let summary = StatementSummary::new();
        run(&summary, "test", "select * from u");
        for _ in 0..3 {
            run(&summary, "test", "select * from t");
        }
        let all = summary.frequent(1);
        assert_eq!(all[0].pattern, "select * from t");
        assert_eq!(all[0].exec_count, 3);
        summary.clear();
        assert!(summary.is_empty());
    }

    #[test]
    fn test_full_summary_evicts_least_recently_seen() {
        let summary = StatementSummary::with_capacity(2);
        run(&summary, "test", "select * from t1");
        run(&summary, "test", "select * from t2");
        run(&summary, "test", "select * from t1");
        run(&summary, "test", "select * from t3");

        assert_eq!(summary.len(), 2);
        let patterns: Vec<String> = summary.frequent(1).into_iter().map(|e| e.pattern).collect();
        assert_eq!(patterns, vec!["select * from t1", "select * from t3"]);
    }

    #[test]
    fn test_many_distinct_patterns_stay_bounded() {
        let summary = StatementSummary::from_config(&BindConfig {
            max_stmt_summary_entries: 100,
            ..Default::default()
        });
        for i in 0..2_000 {
            run(&summary, "test", &format!("select * from t where c{i} = 1"));
        }
        assert_eq!(summary.len(), 100);
        assert_eq!(summary.capacity(), 100);
    }
}
