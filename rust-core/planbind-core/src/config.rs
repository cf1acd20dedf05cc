// SPDX-License-Identifier: PMPL-1.0-or-later
//! Binding cache configuration.
//!
//! Defaults follow the server's session variables: baselines are used but
//! neither captured nor evolved unless switched on, and the background
//! worker ticks every three seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BindError;

/// Configuration shared by the binder, the evolution engine and the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Background refresh/evolve interval in milliseconds. 0 disables the worker.
    pub lease_ms: u64,
    /// Consult bindings when compiling a query.
    pub use_plan_baselines: bool,
    /// Capture frequent unbound statements on every worker tick.
    pub capture_plan_baselines: bool,
    /// Propose candidates at compile time; flush and verify on every tick.
    pub evolve_plan_baselines: bool,
    /// Minimum executions before a statement is eligible for capture.
    pub capture_min_exec_count: u64,
    /// Upper bound on candidates buffered between flushes.
    pub max_pending_candidates: usize,
    /// Charset recorded when the caller supplies none.
    pub default_charset: String,
    /// Collation recorded when the caller supplies none.
    pub default_collation: String,
    /// Tombstones older than this are physically purged by the worker.
    pub tombstone_retention_secs: u64,
    /// Record compiled statements into the statement summary.
    pub enable_stmt_summary: bool,
    /// Distinct statements the summary keeps before evicting the least recently seen.
    pub max_stmt_summary_entries: usize,
}

impl BindConfig {
    /// The worker interval, or `None` when the worker is disabled.
    pub fn lease(&self) -> Option<Duration> {
        (self.lease_ms > 0).then(|| Duration::from_millis(self.lease_ms))
    }

    /// Reject settings the cache cannot run with.
    pub fn validate(&self) -> Result<(), BindError> {
        if self.capture_min_exec_count == 0 {
            return Err(BindError::InvalidConfig(
                "capture_min_exec_count must be at least 1".to_string(),
            ));
        }
        if self.max_pending_candidates == 0 {
            return Err(BindError::InvalidConfig(
                "max_pending_candidates must be at least 1".to_string(),
            ));
        }
        if self.max_stmt_summary_entries == 0 {
            return Err(BindError::InvalidConfig(
                "max_stmt_summary_entries must be at least 1".to_string(),
            ));
        }
        if self.default_charset.is_empty() || self.default_collation.is_empty() {
            return Err(BindError::InvalidConfig(
                "default charset and collation must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Fill in empty charset/collation with the configured defaults.
    pub fn resolve_charset<'a>(&'a self, charset: &'a str, collation: &'a str) -> (&'a str, &'a str) {
        let charset = if charset.is_empty() { &self.default_charset } else { charset };
        let collation = if collation.is_empty() { &self.default_collation } else { collation };
        (charset, collation)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            lease_ms: 3000,
            use_plan_baselines: true,
            capture_plan_baselines: false,
            evolve_plan_baselines: false,
            capture_min_exec_count: 2,
            max_pending_candidates: 1024,
            default_charset: "utf8mb4".to_string(),
            default_collation: "utf8mb4_bin".to_string(),
            tombstone_retention_secs: 24 * 60 * 60,
            enable_stmt_summary: true,
            max_stmt_summary_entries: crate::summary::DEFAULT_MAX_ENTRIES,
        }
    }
}
