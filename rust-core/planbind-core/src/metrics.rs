// SPDX-License-Identifier: PMPL-1.0-or-later
//! Prometheus counters and gauges for the binding caches.

use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};

use crate::binding::{BindRecord, BindStatus};
use crate::error::BindError;
use crate::Scope;

/// Binding count and estimated bytes per status.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BindStats {
    count: [f64; 4],
    bytes: [f64; 4],
}

fn slot(status: BindStatus) -> usize {
    match status {
        BindStatus::Using => 0,
        BindStatus::PendingVerify => 1,
        BindStatus::Rejected => 2,
        BindStatus::Deleted => 3,
    }
}

impl BindStats {
    /// Contribution of one record. The record header is charged to the
    /// status of its first binding; an empty record contributes nothing.
    pub fn of_record(record: &BindRecord) -> Self {
        let mut stats = Self::default();
        for binding in &record.bindings {
            let i = slot(binding.status);
            stats.count[i] += 1.0;
            stats.bytes[i] += binding.size() as f64;
        }
        if let Some(first) = record.bindings.first() {
            stats.bytes[slot(first.status)] += (record.original_sql.len() + record.db.len()) as f64;
        }
        stats
    }

    pub fn of_records<'a>(records: impl IntoIterator<Item = &'a BindRecord>) -> Self {
        records.into_iter().fold(Self::default(), |acc, r| acc.plus(&Self::of_record(r)))
    }

    pub fn plus(&self, other: &BindStats) -> BindStats {
        let mut out = *self;
        for i in 0..4 {
            out.count[i] += other.count[i];
            out.bytes[i] += other.bytes[i];
        }
        out
    }

    pub fn minus(&self, other: &BindStats) -> BindStats {
        let mut out = *self;
        for i in 0..4 {
            out.count[i] -= other.count[i];
            out.bytes[i] -= other.bytes[i];
        }
        out
    }

    pub fn count(&self, status: BindStatus) -> f64 {
        self.count[slot(status)]
    }

    pub fn bytes(&self, status: BindStatus) -> f64 {
        self.bytes[slot(status)]
    }
}

/// The metric families updated by the caches and the binder.
#[derive(Clone)]
pub struct BindMetrics {
    total: GaugeVec,
    memory: GaugeVec,
    usage: IntCounterVec,
}

impl BindMetrics {
    /// Create the families and register them into `registry`.
    pub fn new(registry: &Registry) -> Result<Self, BindError> {
        let total = GaugeVec::new(
            Opts::new("bind_total", "Number of bindings by scope and status"),
            &["scope", "status"],
        )?;
        let memory = GaugeVec::new(
            Opts::new("bind_memory_usage", "Estimated memory used by bindings, in bytes"),
            &["scope", "status"],
        )?;
        let usage = IntCounterVec::new(
            Opts::new("bind_usage_counter", "Compilations that selected a bound plan"),
            &["scope"],
        )?;
        registry.register(Box::new(total.clone()))?;
        registry.register(Box::new(memory.clone()))?;
        registry.register(Box::new(usage.clone()))?;
        Ok(Self { total, memory, usage })
    }

    /// Overwrite the gauges of `scope` with `stats`.
    pub fn set(&self, scope: Scope, stats: &BindStats) {
        let scope = scope.to_string();
        for status in BindStatus::ALL {
            let labels = [scope.as_str(), status.as_str()];
            self.total.with_label_values(&labels).set(stats.count(status));
            self.memory.with_label_values(&labels).set(stats.bytes(status));
        }
    }

    /// Add `delta` (which may be negative) to the gauges of `scope`.
    pub fn apply_delta(&self, scope: Scope, delta: &BindStats) {
        let scope = scope.to_string();
        for status in BindStatus::ALL {
            let labels = [scope.as_str(), status.as_str()];
            if delta.count(status) != 0.0 {
                self.total.with_label_values(&labels).add(delta.count(status));
            }
            if delta.bytes(status) != 0.0 {
                self.memory.with_label_values(&labels).add(delta.bytes(status));
            }
        }
    }

    pub fn inc_usage(&self, scope: Scope) {
        self.usage.with_label_values(&[scope.to_string().as_str()]).inc();
    }

    pub fn total(&self, scope: Scope, status: BindStatus) -> f64 {
        self.total
            .with_label_values(&[scope.to_string().as_str(), status.as_str()])
            .get()
    }

    pub fn memory_usage(&self, scope: Scope, status: BindStatus) -> f64 {
        self.memory
            .with_label_values(&[scope.to_string().as_str(), status.as_str()])
            .get()
    }

    pub fn usage(&self, scope: Scope) -> u64 {
        self.usage.with_label_values(&[scope.to_string().as_str()]).get()
    }
}

impl std::fmt::Debug for BindMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use chrono::{DateTime, Utc};

    fn binding(sql: &str, status: BindStatus) -> Binding {
        let now = Utc::now();
        Binding {
            id: sql.to_string(),
            bind_sql: sql.to_string(),
            status,
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_bin".to_string(),
            create_time: now,
            update_time: now,
        }
    }

    #[test]
    fn test_record_header_charged_to_first_status() {
        let rec = BindRecord::new(
            "select * from t",
            "test",
            vec![binding("a", BindStatus::PendingVerify), binding("bb", BindStatus::Using)],
        );
        let stats = BindStats::of_record(&rec);
        let fixed = "utf8mb4".len() + "utf8mb4_bin".len() + 2 * std::mem::size_of::<DateTime<Utc>>();
        assert_eq!(stats.count(BindStatus::Using), 1.0);
        assert_eq!(stats.count(BindStatus::PendingVerify), 1.0);
        assert_eq!(stats.bytes(BindStatus::Using), (2 + "using".len() + fixed) as f64);
        assert_eq!(
            stats.bytes(BindStatus::PendingVerify),
            (1 + "pending verify".len() + fixed + "select * from t".len() + "test".len()) as f64
        );
    }

    #[test]
    fn test_empty_record_contributes_nothing() {
        let rec = BindRecord::new("select * from t", "test", vec![]);
        assert_eq!(BindStats::of_record(&rec), BindStats::default());
    }

    #[test]
    fn test_set_and_delta() {
        let registry = Registry::new();
        let metrics = BindMetrics::new(&registry).unwrap();
        let rec = BindRecord::new("select * from t", "test", vec![binding("a", BindStatus::Using)]);
        let stats = BindStats::of_record(&rec);

        metrics.set(Scope::Global, &stats);
        assert_eq!(metrics.total(Scope::Global, BindStatus::Using), 1.0);

        metrics.apply_delta(Scope::Session, &stats);
        metrics.apply_delta(Scope::Session, &stats);
        assert_eq!(metrics.total(Scope::Session, BindStatus::Using), 2.0);
        metrics.apply_delta(Scope::Session, &BindStats::default().minus(&stats.plus(&stats)));
        assert_eq!(metrics.total(Scope::Session, BindStatus::Using), 0.0);
        assert_eq!(metrics.memory_usage(Scope::Session, BindStatus::Using), 0.0);
    }

    #[test]
    fn test_usage_counter_and_registration() {
        let registry = Registry::new();
        let metrics = BindMetrics::new(&registry).unwrap();
        metrics.inc_usage(Scope::Global);
        metrics.inc_usage(Scope::Global);
        assert_eq!(metrics.usage(Scope::Global), 2);
        assert_eq!(metrics.usage(Scope::Session), 0);

        assert!(!registry.gather().is_empty());
        assert!(matches!(BindMetrics::new(&registry), Err(BindError::Metrics(_))));
    }
}
