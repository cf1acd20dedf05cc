// SPDX-License-Identifier: PMPL-1.0-or-later
//! Compile-time binding selection and the administrative surface.

use std::sync::Arc;

use chrono::Utc;
use planbind_storage::BindTable;
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::binding::{build_record, BindRecord, BindRequest, BindStatus};
use crate::config::BindConfig;
use crate::error::BindError;
use crate::evolve::EvolutionEngine;
use crate::global::GlobalBindHandle;
use crate::metrics::BindMetrics;
use crate::optimizer::{OptimizedPlan, PlanOptimizer};
use crate::parser::{ParsedStatement, SqlParser, StatementKind};
use crate::session::SessionBindHandle;
use crate::summary::StmtSummary;
use crate::Scope;

/// The binding a compilation ended up using.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedBinding {
    pub scope: Scope,
    pub original_sql: String,
    pub bind_sql: String,
}

/// Result of [`Binder::bind_plan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindOutcome {
    pub plan: OptimizedPlan,
    /// `None` when the statement was planned without a binding.
    pub used: Option<UsedBinding>,
}

pub struct Binder {
    config: BindConfig,
    parser: Arc<dyn SqlParser>,
    optimizer: Arc<dyn PlanOptimizer>,
    summary: Arc<dyn StmtSummary>,
    global: Arc<GlobalBindHandle>,
    evolution: Arc<EvolutionEngine>,
    metrics: BindMetrics,
}

impl Binder {
    /// Wire up the caches over `table`, registering metrics into `registry`.
    pub fn new(
        config: BindConfig,
        table: Arc<dyn BindTable>,
        parser: Arc<dyn SqlParser>,
        optimizer: Arc<dyn PlanOptimizer>,
        summary: Arc<dyn StmtSummary>,
        registry: &Registry,
    ) -> Result<Self, BindError> {
        config.validate()?;
        let metrics = BindMetrics::new(registry)?;
        let global = Arc::new(GlobalBindHandle::new(table, parser.clone(), metrics.clone()));
        let evolution = Arc::new(EvolutionEngine::new(
            global.clone(),
            parser.clone(),
            optimizer.clone(),
            config.clone(),
        ));
        Ok(Self {
            config,
            parser,
            optimizer,
            summary,
            global,
            evolution,
            metrics,
        })
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    pub fn global(&self) -> &Arc<GlobalBindHandle> {
        &self.global
    }

    pub fn evolution(&self) -> &Arc<EvolutionEngine> {
        &self.evolution
    }

    pub fn summary(&self) -> &Arc<dyn StmtSummary> {
        &self.summary
    }

    pub fn metrics(&self) -> &BindMetrics {
        &self.metrics
    }

    /// A fresh, empty session overlay.
    pub fn new_session(&self) -> SessionBindHandle {
        SessionBindHandle::new(self.parser.clone(), self.metrics.clone())
    }

    // -----------------------------------------------------------------------
    // Administrative operations
    // -----------------------------------------------------------------------

    /// Validate and store a `using` binding in `scope`.
    pub async fn create_binding(
        &self,
        session: &mut SessionBindHandle,
        scope: Scope,
        request: &BindRequest,
    ) -> Result<usize, BindError> {
        let (charset, collation) = self.config.resolve_charset(&request.charset, &request.collation);
        let request = request.clone().with_charset(charset, collation);
        let record = build_record(self.parser.as_ref(), &request, BindStatus::Using, Utc::now())?;
        match scope {
            Scope::Session => Ok(session.create_bind_record(&record)),
            Scope::Global => self.global.add_bind_record(&record).await,
        }
    }

    /// Drop one binding (by bound SQL) or all bindings of `original_sql` in `scope`.
    pub async fn drop_binding(
        &self,
        session: &mut SessionBindHandle,
        scope: Scope,
        original_sql: &str,
        db: &str,
        bind_sql: Option<&str>,
    ) -> Result<usize, BindError> {
        let pattern = self.parser.normalize(original_sql)?.pattern;
        let db = db.to_lowercase();
        match scope {
            Scope::Session => session.drop_bind_record(&pattern, &db, bind_sql),
            Scope::Global => self.global.drop_bind_record(&pattern, &db, bind_sql).await,
        }
    }

    /// Records of `scope`, ordered by `(original_sql, db)`.
    pub fn show_bindings(&self, session: &SessionBindHandle, scope: Scope) -> Vec<Arc<BindRecord>> {
        match scope {
            Scope::Session => session.show_records(),
            Scope::Global => self.global.show_records(),
        }
    }

    // -----------------------------------------------------------------------
    // Compile time
    // -----------------------------------------------------------------------

    /// Plan `sql` in `db`, preferring the cheapest usable binding.
    ///
    /// The session overlay is consulted first and, when it has a record for
    /// the pattern, hides the global one. A binding that fails to plan is
    /// skipped; only a failure to plan the statement itself is an error.
    pub fn bind_plan(&self, session: &SessionBindHandle, sql: &str, db: &str) -> Result<BindOutcome, BindError> {
        let db = db.to_lowercase();
        let (charset, collation) = self.config.resolve_charset("", "");
        let stmt = self.parser.parse(sql, charset, collation)?;
        let base = self.optimizer.optimize(&db, &stmt, &stmt.hints)?;

        let bound = if self.config.use_plan_baselines {
            self.match_binding(session, &stmt, &db)
        } else {
            None
        };

        let outcome = match bound {
            Some((scope, record, bind_sql, plan)) => {
                self.metrics.inc_usage(scope);
                if self.config.evolve_plan_baselines
                    && scope == Scope::Global
                    && base.cost < plan.cost
                    && !base.same_access(&plan)
                {
                    if let Err(e) = self.evolution.propose(sql, &db, charset, collation, &base) {
                        warn!(sql, error = %e, "could not propose evolution candidate");
                    }
                }
                BindOutcome {
                    plan,
                    used: Some(UsedBinding {
                        scope,
                        original_sql: record.original_sql.clone(),
                        bind_sql,
                    }),
                }
            }
            None => BindOutcome { plan: base, used: None },
        };

        if self.config.enable_stmt_summary && stmt.kind == StatementKind::Select {
            self.summary.record(&db, &stmt, sql, &outcome.plan.hints());
        }
        Ok(outcome)
    }

    /// Cheapest usable binding for `stmt`, with the scope it came from.
    fn match_binding(
        &self,
        session: &SessionBindHandle,
        stmt: &ParsedStatement,
        db: &str,
    ) -> Option<(Scope, Arc<BindRecord>, String, OptimizedPlan)> {
        let key = &stmt.normalized;
        let (scope, record) = match session.lookup(&key.digest, &key.pattern, db) {
            Some(record) => (Scope::Session, record),
            None => (Scope::Global, self.global.lookup(&key.digest, &key.pattern, db)?),
        };

        let mut best: Option<(String, OptimizedPlan)> = None;
        for binding in record.using_bindings() {
            let planned = self
                .parser
                .parse(&binding.bind_sql, &binding.charset, &binding.collation)
                .and_then(|bound| self.optimizer.optimize(db, stmt, &bound.hints));
            match planned {
                Ok(plan) => {
                    if best.as_ref().map_or(true, |(_, b)| plan.cost < b.cost) {
                        best = Some((binding.bind_sql.clone(), plan));
                    }
                }
                Err(e) => warn!(bind_sql = %binding.bind_sql, error = %e, "skipping binding that fails to plan"),
            }
        }

        if best.is_none() {
            debug!(pattern = %key.pattern, %scope, "no usable binding");
        }
        best.map(|(bind_sql, plan)| (scope, record, bind_sql, plan))
    }
}

impl std::fmt::Debug for Binder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder")
            .field("config", &self.config)
            .field("global", &self.global)
            .finish_non_exhaustive()
    }
}
