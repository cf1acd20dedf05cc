// SPDX-License-Identifier: PMPL-1.0-or-later
//! PlanBind Core
//!
//! SQL plan-binding cache and plan-evolution engine.
//! Pins normalized query shapes to hint-annotated plans, keeps a
//! copy-on-write global cache consistent with its backing table, layers
//! per-session overrides on top, and evolves bindings from observed plans.

pub mod binder;
pub mod binding;
pub mod cache;
pub mod config;
pub mod error;
pub mod evolve;
pub mod global;
pub mod hint;
pub mod lexer;
pub mod metrics;
pub mod optimizer;
pub mod parser;
pub mod schema;
pub mod session;
pub mod summary;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use binder::{BindOutcome, Binder, UsedBinding};
pub use binding::{build_record, BindRecord, BindRequest, BindStatus, Binding};
pub use cache::BindCache;
pub use config::BindConfig;
pub use error::BindError;
pub use evolve::{EvolutionEngine, VerifyReport};
pub use global::{GlobalBindHandle, RefreshReport};
pub use hint::{PlanHint, TableName};
pub use metrics::{BindMetrics, BindStats};
pub use optimizer::{AccessPath, OptimizedPlan, PlanOptimizer, StatsPlanner};
pub use parser::{fingerprint, DefaultSqlParser, NormalizedSql, ParsedStatement, SqlParser};
pub use schema::{InfoSchema, SchemaCatalog, TableInfo};
pub use session::SessionBindHandle;
pub use summary::{StatementSummary, StmtSummary, SummaryEntry};
pub use worker::{run_cycle, BindWorker, CycleReport};

/// Where a binding lives.
///
/// Session bindings belong to one connection and are never persisted;
/// global bindings are shared and backed by the bind-info table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Session,
    Global,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::Session, Scope::Global];
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Session => write!(f, "session"),
            Scope::Global => write!(f, "global"),
        }
    }
}

impl FromStr for Scope {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "session" => Ok(Scope::Session),
            "global" => Ok(Scope::Global),
            _ => Err(BindError::UnknownScope(s.to_string())),
        }
    }
}
