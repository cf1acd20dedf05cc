// SPDX-License-Identifier: PMPL-1.0-or-later
//! Cost-based access-path selection.
//!
//! The binder only needs two things from an optimizer: the estimated cost of
//! a statement planned under a set of hints, and a description of the chosen
//! plan it can turn back into hints. [`PlanOptimizer`] is that seam and
//! [`StatsPlanner`] a reference implementation over an [`InfoSchema`]-style
//! catalog.
//!
//! Cost model (per table, summed over tables):
//!
//! | path        | cost                          |
//! |-------------|-------------------------------|
//! | table scan  | `rows * 1.0`                  |
//! | index range | `max(rows * sel, 1) * 1.5`    |
//!
//! where `sel` is the product of the selectivities of the predicates on the
//! index's leading column, estimated from a uniform distribution over
//! `[min, max]` with `ndv` distinct values.
//!
//! [`InfoSchema`]: crate::schema::InfoSchema

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BindError;
use crate::hint::{PlanHint, TableName};
use crate::parser::{CmpOp, ParsedStatement, Predicate, TableRef};
use crate::schema::{ColumnStats, SchemaCatalog, TableInfo};

/// Cost of reading one row in a full table scan.
pub const SCAN_ROW_COST: f64 = 1.0;
/// Cost of reading one row through an index.
pub const INDEX_ROW_COST: f64 = 1.5;

const PSEUDO_EQ_SELECTIVITY: f64 = 0.1;
const PSEUDO_RANGE_SELECTIVITY: f64 = 1.0 / 3.0;

// ---------------------------------------------------------------------------
// Plan description
// ---------------------------------------------------------------------------

/// How one table is read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPath {
    TableScan,
    Index(String),
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPath::TableScan => write!(f, "table_scan"),
            AccessPath::Index(name) => write!(f, "{name}"),
        }
    }
}

/// Chosen access for one table reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableAccess {
    /// Fully qualified table name.
    pub table: TableName,
    pub path: AccessPath,
    pub est_rows: f64,
    pub cost: f64,
}

/// Result of planning a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPlan {
    pub cost: f64,
    pub accesses: Vec<TableAccess>,
}

impl OptimizedPlan {
    /// Hints that reproduce this plan's access paths.
    pub fn hints(&self) -> Vec<PlanHint> {
        self.accesses
            .iter()
            .map(|access| PlanHint::UseIndex {
                table: access.table.clone(),
                indexes: match &access.path {
                    AccessPath::TableScan => Vec::new(),
                    AccessPath::Index(name) => vec![name.clone()],
                },
            })
            .collect()
    }

    /// `table:path` for every access, e.g. `t:idx_a`.
    pub fn index_names(&self) -> Vec<String> {
        self.accesses
            .iter()
            .map(|a| format!("{}:{}", a.table.name, a.path))
            .collect()
    }

    /// Whether both plans read every table the same way.
    pub fn same_access(&self, other: &OptimizedPlan) -> bool {
        self.accesses.len() == other.accesses.len()
            && self
                .accesses
                .iter()
                .zip(&other.accesses)
                .all(|(a, b)| a.table == b.table && a.path == b.path)
    }
}

/// Plans statements under a set of hints.
pub trait PlanOptimizer: Send + Sync {
    /// Plan `stmt` in database `db` constrained by `hints`.
    ///
    /// `hints` replace whatever hints `stmt` itself carries.
    fn optimize(&self, db: &str, stmt: &ParsedStatement, hints: &[PlanHint]) -> Result<OptimizedPlan, BindError>;
}

// ---------------------------------------------------------------------------
// StatsPlanner
// ---------------------------------------------------------------------------

/// Statistics-driven reference planner.
#[derive(Clone)]
pub struct StatsPlanner {
    catalog: Arc<dyn SchemaCatalog>,
}

impl StatsPlanner {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self { catalog }
    }

    fn plan_table(
        &self,
        db: &str,
        stmt: &ParsedStatement,
        table_ref: &TableRef,
        hints: &[PlanHint],
    ) -> Result<TableAccess, BindError> {
        let name = table_ref.table.resolve(db);
        let info = self
            .catalog
            .table(&name)
            .ok_or_else(|| BindError::Optimizer(format!("table {name} doesn't exist")))?;

        let allowed = allowed_paths(db, &info, table_ref, hints)?;
        let predicates: Vec<&Predicate> = stmt
            .predicates
            .iter()
            .filter(|p| predicate_applies(p, stmt, table_ref, &info))
            .collect();

        let rows = info.row_count as f64;
        let mut best: Option<TableAccess> = None;
        for path in allowed {
            let (est_rows, cost) = match &path {
                AccessPath::TableScan => (rows, rows * SCAN_ROW_COST),
                AccessPath::Index(index) => {
                    let leading = info
                        .index(index)
                        .and_then(|i| i.columns.first())
                        .map(String::as_str)
                        .unwrap_or_default();
                    let sel: f64 = predicates
                        .iter()
                        .filter(|p| p.column == leading)
                        .map(|p| selectivity(info.stats(&p.column), p.op, p.value))
                        .product();
                    let est = (rows * sel).max(1.0);
                    (est, est * INDEX_ROW_COST)
                }
            };
            if best.as_ref().map_or(true, |b| cost < b.cost) {
                best = Some(TableAccess {
                    table: name.clone(),
                    path,
                    est_rows,
                    cost,
                });
            }
        }

        best.ok_or_else(|| BindError::Optimizer(format!("no access path left for {name}")))
    }
}

impl PlanOptimizer for StatsPlanner {
    fn optimize(&self, db: &str, stmt: &ParsedStatement, hints: &[PlanHint]) -> Result<OptimizedPlan, BindError> {
        let mut accesses = Vec::with_capacity(stmt.tables.len());
        for table_ref in &stmt.tables {
            accesses.push(self.plan_table(db, stmt, table_ref, hints)?);
        }
        Ok(OptimizedPlan {
            cost: accesses.iter().map(|a| a.cost).sum(),
            accesses,
        })
    }
}

impl fmt::Debug for StatsPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsPlanner").finish_non_exhaustive()
    }
}

/// Candidate paths for a table after applying index hints.
fn allowed_paths(
    db: &str,
    info: &TableInfo,
    table_ref: &TableRef,
    hints: &[PlanHint],
) -> Result<Vec<AccessPath>, BindError> {
    let check = |index: &String| {
        if info.index(index).is_some() {
            Ok(())
        } else {
            Err(BindError::Optimizer(format!("index {index} doesn't exist on {}", info.name)))
        }
    };

    let mut used: Option<Vec<AccessPath>> = None;
    let mut ignored: Vec<&String> = Vec::new();
    for hint in hints {
        match hint {
            PlanHint::UseIndex { table, indexes } if table_ref.matches(table, db) => {
                let paths = used.get_or_insert_with(Vec::new);
                if indexes.is_empty() {
                    paths.push(AccessPath::TableScan);
                }
                for index in indexes {
                    check(index)?;
                    paths.push(AccessPath::Index(index.to_lowercase()));
                }
            }
            PlanHint::IgnoreIndex { table, indexes } if table_ref.matches(table, db) => {
                for index in indexes {
                    check(index)?;
                    ignored.push(index);
                }
            }
            _ => {}
        }
    }

    let mut paths = used.unwrap_or_else(|| {
        std::iter::once(AccessPath::TableScan)
            .chain(info.indexes.iter().map(|i| AccessPath::Index(i.name.clone())))
            .collect()
    });
    paths.retain(|p| !matches!(p, AccessPath::Index(name) if ignored.iter().any(|i| i.eq_ignore_ascii_case(name))));
    Ok(paths)
}

/// Whether predicate `p` constrains `table_ref`.
fn predicate_applies(p: &Predicate, stmt: &ParsedStatement, table_ref: &TableRef, info: &TableInfo) -> bool {
    match &p.qualifier {
        Some(q) => table_ref.alias.as_deref() == Some(q.as_str()) || table_ref.table.name == *q,
        None => {
            stmt.tables.len() == 1
                || info.stats(&p.column).is_some()
                || info.indexes.iter().any(|i| i.columns.iter().any(|c| *c == p.column))
        }
    }
}

/// Fraction of rows satisfying `column <op> value`.
pub fn selectivity(stats: Option<&ColumnStats>, op: CmpOp, value: Option<f64>) -> f64 {
    let (Some(stats), Some(v)) = (stats, value) else {
        return match op {
            CmpOp::Eq => PSEUDO_EQ_SELECTIVITY,
            CmpOp::Ne => 1.0 - PSEUDO_EQ_SELECTIVITY,
            _ => PSEUDO_RANGE_SELECTIVITY,
        };
    };

    let eq = if v >= stats.min && v <= stats.max {
        1.0 / stats.ndv.max(1) as f64
    } else {
        0.0
    };
    let width = stats.max - stats.min;
    let (above, below) = if width <= 0.0 {
        (f64::from(u8::from(v < stats.min)), f64::from(u8::from(v > stats.max)))
    } else {
        (
            ((stats.max - v) / width).clamp(0.0, 1.0),
            ((v - stats.min) / width).clamp(0.0, 1.0),
        )
    };

    let sel = match op {
        CmpOp::Eq => eq,
        CmpOp::Ne => 1.0 - eq,
        CmpOp::Gt => above,
        CmpOp::Ge => above + eq,
        CmpOp::Lt => below,
        CmpOp::Le => below + eq,
    };
    sel.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DefaultSqlParser, SqlParser};
    use crate::schema::InfoSchema;

    fn planner() -> StatsPlanner {
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
        StatsPlanner::new(Arc::new(schema))
    }

    fn plan(sql: &str, hints_sql: Option<&str>) -> Result<OptimizedPlan, BindError> {
        let stmt = DefaultSqlParser.parse(sql, "", "").unwrap();
        let hints = match hints_sql {
            Some(h) => DefaultSqlParser.parse(h, "", "").unwrap().hints,
            None => stmt.hints.clone(),
        };
        planner().optimize("test", &stmt, &hints)
    }

    #[test]
    fn test_selectivity_uniform() {
        let s = ColumnStats { min: 1.0, max: 5.0, ndv: 5 };
        assert!((selectivity(Some(&s), CmpOp::Ge, Some(4.0)) - 0.45).abs() < 1e-9);
        assert_eq!(selectivity(Some(&s), CmpOp::Ge, Some(1.0)), 1.0);
        assert_eq!(selectivity(Some(&s), CmpOp::Eq, Some(0.0)), 0.0);
        assert!((selectivity(Some(&s), CmpOp::Ne, Some(3.0)) - 0.8).abs() < 1e-9);
        assert_eq!(selectivity(None, CmpOp::Eq, Some(3.0)), PSEUDO_EQ_SELECTIVITY);
        assert_eq!(selectivity(Some(&s), CmpOp::Lt, None), PSEUDO_RANGE_SELECTIVITY);
    }

    #[test]
    fn test_index_choice_follows_literals() {
        let a = plan("select * from t where a >= 4 and b >= 1", None).unwrap();
        assert_eq!(a.index_names(), vec!["t:idx_a"]);
        assert!((a.cost - 3.375).abs() < 1e-9);

        let b = plan("select * from t where a >= 1 and b >= 4", None).unwrap();
        assert_eq!(b.index_names(), vec!["t:idx_b"]);
    }

    #[test]
    fn test_use_index_hint_constrains_path() {
        let p = plan(
            "select * from t where a >= 4 and b >= 1",
            Some("select * from t use index(idx_b) where a >= 4 and b >= 1"),
        )
        .unwrap();
        assert_eq!(p.index_names(), vec!["t:idx_b"]);
        assert!((p.cost - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_table_scan_hint_and_ignore() {
        let scan = plan("select /*+ USE_INDEX(t) */ * from t where a = 1", None).unwrap();
        assert_eq!(scan.accesses[0].path, AccessPath::TableScan);
        assert_eq!(scan.cost, 5.0);

        let ignored = plan("select * from t ignore index(idx_a) where a = 1", None).unwrap();
        assert_ne!(ignored.accesses[0].path, AccessPath::Index("idx_a".to_string()));
    }

    #[test]
    fn test_out_of_range_literal_prefers_index() {
        let p = plan("select * from t where a >= 4 and b >= 1 and c = 0", None).unwrap();
        assert_eq!(p.index_names(), vec!["t:idx_c"]);
        assert!((p.cost - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_objects_fail() {
        assert!(matches!(plan("select * from t1", None), Err(BindError::Optimizer(_))));
        assert!(matches!(
            plan("select * from t use index(idx_z) where a = 1", None),
            Err(BindError::Optimizer(_))
        ));
    }

    #[test]
    fn test_hints_roundtrip_through_sql() {
        let p = plan("select * from t where a >= 4", None).unwrap();
        let sql = crate::hint::with_hints("select * from t where a >= 4", &p.hints()).unwrap();
        assert_eq!(sql, "select /*+ USE_INDEX(@`sel_1` `test`.`t` `idx_a`)*/ * from t where a >= 4");
        let again = plan("select * from t where a >= 1", Some(&sql)).unwrap();
        assert!(again.same_access(&p));
    }
}
