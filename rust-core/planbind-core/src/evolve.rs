// SPDX-License-Identifier: PMPL-1.0-or-later
//! Plan evolution: capture, propose, flush and verify.
//!
//! - **capture** turns frequent unbound statements from the summary feed
//!   into `using` bindings of the plan they actually ran with.
//! - **propose** buffers an alternative plan when the unconstrained
//!   optimizer beats every `using` binding of a pattern.
//! - **flush** writes buffered candidates as `pending verify`.
//! - **verify** re-costs each candidate against the incumbents under the
//!   candidate's literals; cheaper or equal is promoted, otherwise rejected.
//!   Incumbents are left alone and compete by cost at compile time.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::binding::{build_record, BindRecord, BindRequest, BindStatus, Binding};
use crate::config::BindConfig;
use crate::error::BindError;
use crate::global::GlobalBindHandle;
use crate::hint::with_hints;
use crate::optimizer::{OptimizedPlan, PlanOptimizer};
use crate::parser::SqlParser;
use crate::summary::StmtSummary;

/// Outcome of one verify pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub promoted: usize,
    pub rejected: usize,
}

pub struct EvolutionEngine {
    global: Arc<GlobalBindHandle>,
    parser: Arc<dyn SqlParser>,
    optimizer: Arc<dyn PlanOptimizer>,
    config: BindConfig,
    pending: Mutex<Vec<BindRecord>>,
}

impl EvolutionEngine {
    pub fn new(
        global: Arc<GlobalBindHandle>,
        parser: Arc<dyn SqlParser>,
        optimizer: Arc<dyn PlanOptimizer>,
        config: BindConfig,
    ) -> Self {
        Self {
            global,
            parser,
            optimizer,
            config,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Number of buffered candidates.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Capture every frequent statement that has no global record yet.
    ///
    /// Returns the number of records created. Statements that fail to bind
    /// are logged and skipped.
    pub async fn capture(&self, summary: &dyn StmtSummary) -> Result<usize, BindError> {
        let mut captured = 0;
        for entry in summary.frequent(self.config.capture_min_exec_count) {
            if entry.plan_hints.is_empty() || self.global.lookup(&entry.digest, &entry.pattern, &entry.db).is_some() {
                continue;
            }
            let record = with_hints(&entry.sample_sql, &entry.plan_hints).and_then(|bind_sql| {
                let request = BindRequest::new(entry.sample_sql.clone(), bind_sql, entry.db.clone())
                    .with_charset(self.config.default_charset.clone(), self.config.default_collation.clone());
                build_record(self.parser.as_ref(), &request, BindStatus::Using, Utc::now())
            });
            match record {
                Ok(record) => {
                    captured += self.global.add_bind_record(&record).await?.min(1);
                }
                Err(e) => warn!(sql = %entry.sample_sql, error = %e, "capture skipped statement"),
            }
        }
        if captured > 0 {
            info!(captured, "plan baselines captured");
        }
        Ok(captured)
    }

    /// Buffer `plan` as a candidate for statement `sql`.
    ///
    /// Returns `false` when the candidate is already buffered or the buffer
    /// is full.
    pub fn propose(
        &self,
        sql: &str,
        db: &str,
        charset: &str,
        collation: &str,
        plan: &OptimizedPlan,
    ) -> Result<bool, BindError> {
        let bind_sql = with_hints(sql, &plan.hints())?;
        let request = BindRequest::new(sql, bind_sql, db).with_charset(charset, collation);
        let record = build_record(self.parser.as_ref(), &request, BindStatus::PendingVerify, Utc::now())?;

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let duplicate = pending.iter().any(|p| {
            p.original_sql == record.original_sql
                && p.db == record.db
                && p.bindings.iter().any(|b| record.find_binding(&b.id).is_some())
        });
        if duplicate {
            return Ok(false);
        }
        if pending.len() >= self.config.max_pending_candidates {
            warn!(limit = self.config.max_pending_candidates, "evolution candidate buffer full, dropping candidate");
            return Ok(false);
        }
        debug!(bind_sql = %record.bindings[0].bind_sql, "evolution candidate proposed");
        pending.push(record);
        Ok(true)
    }

    /// Write every buffered candidate as `pending verify`.
    ///
    /// Returns the number of bindings written; candidates duplicating an
    /// existing binding are dropped. On a write failure the failed candidate
    /// and everything after it go back to the buffer for the next flush.
    pub async fn flush(&self) -> Result<usize, BindError> {
        let drained: Vec<BindRecord> = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        let mut written = 0;
        for (i, record) in drained.iter().enumerate() {
            match self.global.add_bind_record(record).await {
                Ok(n) => written += n,
                Err(e) => {
                    self.requeue(drained[i..].to_vec());
                    warn!(written, requeued = drained.len() - i, error = %e, "evolution flush interrupted");
                    return Err(e);
                }
            }
        }
        if written > 0 {
            info!(written, "evolution candidates flushed");
        }
        Ok(written)
    }

    /// Put unwritten candidates back ahead of anything proposed meanwhile,
    /// keeping the buffer within its bound.
    fn requeue(&self, mut unwritten: Vec<BindRecord>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        unwritten.append(&mut pending);
        unwritten.truncate(self.config.max_pending_candidates);
        *pending = unwritten;
    }

    /// Promote or reject every `pending verify` binding.
    pub async fn verify(&self) -> Result<VerifyReport, BindError> {
        let mut report = VerifyReport::default();
        for record in self.global.all_records() {
            for candidate in record.bindings.iter().filter(|b| b.status == BindStatus::PendingVerify) {
                let status = match self.judge(&record, candidate) {
                    Ok(true) => BindStatus::Using,
                    Ok(false) => BindStatus::Rejected,
                    Err(e) => {
                        warn!(bind_sql = %candidate.bind_sql, error = %e, "candidate failed to plan");
                        BindStatus::Rejected
                    }
                };
                if self
                    .global
                    .update_binding_status(&record.original_sql, &record.db, &candidate.id, status)
                    .await?
                {
                    match status {
                        BindStatus::Using => report.promoted += 1,
                        _ => report.rejected += 1,
                    }
                }
            }
        }
        if report.promoted + report.rejected > 0 {
            info!(promoted = report.promoted, rejected = report.rejected, "evolution verify done");
        }
        Ok(report)
    }

    /// Whether `candidate` is at least as cheap as the best incumbent, costed
    /// with the candidate's own literals.
    fn judge(&self, record: &BindRecord, candidate: &Binding) -> Result<bool, BindError> {
        let stmt = self.parser.parse(&candidate.bind_sql, &candidate.charset, &candidate.collation)?;
        let candidate_cost = self.optimizer.optimize(&record.db, &stmt, &stmt.hints)?.cost;

        let mut best: Option<f64> = None;
        for incumbent in record.using_bindings() {
            let hints = match self.parser.parse(&incumbent.bind_sql, &incumbent.charset, &incumbent.collation) {
                Ok(parsed) => parsed.hints,
                Err(_) => continue,
            };
            match self.optimizer.optimize(&record.db, &stmt, &hints) {
                Ok(plan) => best = Some(best.map_or(plan.cost, |b| b.min(plan.cost))),
                Err(e) => debug!(bind_sql = %incumbent.bind_sql, error = %e, "incumbent failed to plan"),
            }
        }
        debug!(candidate = candidate_cost, incumbent = ?best, "verifying candidate");
        Ok(best.map_or(true, |incumbent| candidate_cost <= incumbent))
    }
}

impl std::fmt::Debug for EvolutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionEngine")
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BindMetrics;
    use crate::optimizer::StatsPlanner;
    use crate::parser::DefaultSqlParser;
    use crate::schema::{InfoSchema, TableInfo};
    use crate::summary::StatementSummary;
    use async_trait::async_trait;
    use chrono::DateTime;
    use planbind_storage::{BindRow, BindTable, InMemoryBindTable, StorageError};
    use prometheus::Registry;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory table whose writes can be switched off.
    #[derive(Default)]
    struct OfflineWrites {
        inner: InMemoryBindTable,
        offline: AtomicBool,
    }

    #[async_trait]
    impl BindTable for OfflineWrites {
        async fn load(&self, since: Option<DateTime<Utc>>) -> Result<Vec<BindRow>, StorageError> {
            self.inner.load(since).await
        }
        async fn upsert(&self, rows: &[BindRow]) -> Result<(), StorageError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(StorageError::BackendUnavailable("offline".to_string()));
            }
            self.inner.upsert(rows).await
        }
        async fn delete(&self, original_sql: &str, default_db: &str, bind_sql: &str) -> Result<bool, StorageError> {
            self.inner.delete(original_sql, default_db, bind_sql).await
        }
        async fn mark_deleted(
            &self,
            original_sql: &str,
            default_db: &str,
            bind_sql: Option<&str>,
            at: DateTime<Utc>,
        ) -> Result<u64, StorageError> {
            self.inner.mark_deleted(original_sql, default_db, bind_sql, at).await
        }
        async fn purge_deleted(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
            self.inner.purge_deleted(before).await
        }
        async fn truncate(&self) -> Result<(), StorageError> {
            self.inner.truncate().await
        }
        fn name(&self) -> &str {
            "offline-writes"
        }
    }

    const QUERY: &str = "select * from t where a >= 4 and b >= 1 and c = 0";

    fn engine(config: BindConfig) -> (Arc<GlobalBindHandle>, EvolutionEngine, Arc<StatsPlanner>) {
        engine_on(config, Arc::new(InMemoryBindTable::new()))
    }

    fn engine_on(
        config: BindConfig,
        table: Arc<dyn BindTable>,
    ) -> (Arc<GlobalBindHandle>, EvolutionEngine, Arc<StatsPlanner>) {
        let schema = InfoSchema::new();
        schema.add_table(
            TableInfo::new("test", "t", 5)
                .with_index("idx_a", &["a"])
                .with_index("idx_b", &["b"])
                .with_index("idx_c", &["c"])
                .with_column_stats("a", 1.0, 5.0, 5)
                .with_column_stats("b", 1.0, 5.0, 5)
                .with_column_stats("c", 1.0, 5.0, 5),
        );
        let parser: Arc<dyn SqlParser> = Arc::new(DefaultSqlParser);
        let planner = Arc::new(StatsPlanner::new(Arc::new(schema)));
        let metrics = BindMetrics::new(&Registry::new()).unwrap();
        let global = Arc::new(GlobalBindHandle::new(table, parser.clone(), metrics));
        let engine = EvolutionEngine::new(global.clone(), parser, planner.clone(), config);
        (global, engine, planner)
    }

    fn unconstrained(planner: &StatsPlanner, sql: &str) -> OptimizedPlan {
        let stmt = DefaultSqlParser.parse(sql, "", "").unwrap();
        planner.optimize("test", &stmt, &[]).unwrap()
    }

    #[tokio::test]
    async fn test_propose_flush_verify_promotes_cheaper() {
        let (global, engine, planner) = engine(BindConfig::default());
        let incumbent = build_record(
            &DefaultSqlParser,
            &BindRequest::new(QUERY, "select * from t use index(idx_a) where a >= 4 and b >= 1 and c = 0", "test")
                .with_charset("utf8mb4", "utf8mb4_bin"),
            BindStatus::Using,
            Utc::now(),
        )
        .unwrap();
        global.add_bind_record(&incumbent).await.unwrap();

        let plan = unconstrained(&planner, QUERY);
        assert!(engine.propose(QUERY, "test", "utf8mb4", "utf8mb4_bin", &plan).unwrap());
        assert!(!engine.propose(QUERY, "test", "utf8mb4", "utf8mb4_bin", &plan).unwrap());
        assert_eq!(engine.flush().await.unwrap(), 1);
        assert_eq!(engine.pending_len(), 0);

        let record = global.all_records().remove(0);
        assert_eq!(record.bindings.len(), 2);
        assert_eq!(record.bindings[1].status, BindStatus::PendingVerify);

        let report = engine.verify().await.unwrap();
        assert_eq!(report, VerifyReport { promoted: 1, rejected: 0 });
        let record = global.all_records().remove(0);
        assert!(record.bindings.iter().all(|b| b.status == BindStatus::Using));
    }

    #[tokio::test]
    async fn test_verify_rejects_more_expensive_candidate() {
        let (global, engine, planner) = engine(BindConfig::default());
        let incumbent = build_record(
            &DefaultSqlParser,
            &BindRequest::new(QUERY, "select * from t use index(idx_c) where a >= 4 and b >= 1 and c = 0", "test")
                .with_charset("utf8mb4", "utf8mb4_bin"),
            BindStatus::Using,
            Utc::now(),
        )
        .unwrap();
        global.add_bind_record(&incumbent).await.unwrap();

        let worse = unconstrained(&planner, "select * from t where a >= 4 and b >= 1");
        assert_eq!(worse.index_names(), vec!["t:idx_a"]);
        engine.propose(QUERY, "test", "utf8mb4", "utf8mb4_bin", &worse).unwrap();
        engine.flush().await.unwrap();

        let report = engine.verify().await.unwrap();
        assert_eq!(report.rejected, 1);
        let record = global.all_records().remove(0);
        assert!(record.bindings.iter().any(|b| b.status == BindStatus::Rejected));
        assert!(record.bindings.iter().all(|b| b.status != BindStatus::PendingVerify));
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_candidates_for_next_cycle() {
        let table = Arc::new(OfflineWrites::default());
        let (global, engine, planner) = engine_on(BindConfig::default(), table.clone());
        for sql in [QUERY, "select * from t where a >= 4"] {
            let plan = unconstrained(&planner, sql);
            assert!(engine.propose(sql, "test", "utf8mb4", "utf8mb4_bin", &plan).unwrap());
        }

        table.offline.store(true, Ordering::SeqCst);
        assert!(matches!(engine.flush().await, Err(BindError::Storage(_))));
        assert_eq!(engine.pending_len(), 2);
        assert_eq!(global.size(), 0);

        table.offline.store(false, Ordering::SeqCst);
        assert_eq!(engine.flush().await.unwrap(), 2);
        assert_eq!(engine.pending_len(), 0);
        assert_eq!(global.size(), 2);
    }

    #[tokio::test]
    async fn test_buffer_is_bounded() {
        let (_global, engine, planner) = engine(BindConfig {
            max_pending_candidates: 1,
            ..Default::default()
        });
        let plan = unconstrained(&planner, QUERY);
        assert!(engine.propose(QUERY, "test", "utf8mb4", "utf8mb4_bin", &plan).unwrap());
        let other = "select * from t where a >= 4";
        let plan = unconstrained(&planner, other);
        assert!(!engine.propose(other, "test", "utf8mb4", "utf8mb4_bin", &plan).unwrap());
        assert_eq!(engine.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_capture_creates_using_record_once() {
        let (global, engine, planner) = engine(BindConfig::default());
        let summary = StatementSummary::new();
        let sql = "select * from t where a >= 4";
        let stmt = DefaultSqlParser.parse(sql, "", "").unwrap();
        let hints = unconstrained(&planner, sql).hints();
        summary.record("test", &stmt, sql, &hints);
        assert_eq!(engine.capture(&summary).await.unwrap(), 0, "single execution is not frequent");

        summary.record("test", &stmt, sql, &hints);
        assert_eq!(engine.capture(&summary).await.unwrap(), 1);
        assert_eq!(engine.capture(&summary).await.unwrap(), 0);

        let record = global.all_records().remove(0);
        assert_eq!(record.bindings.len(), 1);
        assert_eq!(record.bindings[0].status, BindStatus::Using);
        assert_eq!(
            record.bindings[0].bind_sql,
            "select /*+ USE_INDEX(@`sel_1` `test`.`t` `idx_a`)*/ * from t where a >= 4"
        );
    }
}
