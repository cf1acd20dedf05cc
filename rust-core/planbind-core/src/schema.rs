// SPDX-License-Identifier: PMPL-1.0-or-later
//! Schema catalog consulted by the planner and by binding pruning.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::hint::{PlanHint, TableName};
use crate::parser::ParsedStatement;

/// Uniform-distribution summary of a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    /// Number of distinct values.
    pub ndv: u64,
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// Indexed columns, leading column first.
    pub columns: Vec<String>,
}

/// Table metadata and statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Fully qualified name.
    pub name: TableName,
    pub row_count: u64,
    pub columns: HashMap<String, ColumnStats>,
    pub indexes: Vec<IndexInfo>,
}

impl TableInfo {
    pub fn new(schema: &str, name: &str, row_count: u64) -> Self {
        Self {
            name: TableName::new(Some(schema), name),
            row_count,
            columns: HashMap::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, name: &str, columns: &[&str]) -> Self {
        self.indexes.push(IndexInfo {
            name: name.to_lowercase(),
            columns: columns.iter().map(|c| c.to_lowercase()).collect(),
        });
        self
    }

    pub fn with_column_stats(mut self, column: &str, min: f64, max: f64, ndv: u64) -> Self {
        self.columns.insert(column.to_lowercase(), ColumnStats { min, max, ndv });
        self
    }

    pub fn index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn stats(&self, column: &str) -> Option<&ColumnStats> {
        self.columns.get(column)
    }
}

/// Read access to table and index metadata.
///
/// Names passed in are fully qualified.
pub trait SchemaCatalog: Send + Sync {
    fn table(&self, name: &TableName) -> Option<TableInfo>;

    fn table_exists(&self, name: &TableName) -> bool {
        self.table(name).is_some()
    }

    fn index_exists(&self, table: &TableName, index: &str) -> bool {
        self.table(table).is_some_and(|t| t.index(index).is_some())
    }
}

/// In-memory catalog; readers receive copies of table metadata.
#[derive(Debug, Default)]
pub struct InfoSchema {
    tables: RwLock<BTreeMap<TableName, TableInfo>>,
}

impl InfoSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table.
    pub fn add_table(&self, table: TableInfo) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.insert(table.name.clone(), table);
    }

    pub fn drop_table(&self, name: &TableName) -> bool {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.remove(name).is_some()
    }

    pub fn drop_index(&self, table: &TableName, index: &str) -> bool {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let Some(info) = tables.get_mut(table) else { return false };
        let before = info.indexes.len();
        info.indexes.retain(|i| !i.name.eq_ignore_ascii_case(index));
        info.indexes.len() != before
    }
}

impl SchemaCatalog for InfoSchema {
    fn table(&self, name: &TableName) -> Option<TableInfo> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.get(name).cloned()
    }
}

/// Check that every table and hinted index `stmt` references exists.
///
/// Returns the first missing object as `db.table` or `db.table.index`.
pub fn missing_reference(catalog: &dyn SchemaCatalog, stmt: &ParsedStatement, db: &str) -> Option<String> {
    for table_ref in &stmt.tables {
        let name = table_ref.table.resolve(db);
        if !catalog.table_exists(&name) {
            return Some(name.to_string());
        }
    }

    for hint in &stmt.hints {
        let (table, indexes) = match hint {
            PlanHint::UseIndex { table, indexes } | PlanHint::IgnoreIndex { table, indexes } => (table, indexes),
            PlanHint::Other { .. } => continue,
        };
        let Some(target) = stmt.tables.iter().find(|t| t.matches(table, db)) else {
            return Some(table.resolve(db).to_string());
        };
        let resolved = target.table.resolve(db);
        if let Some(index) = indexes.iter().find(|i| !catalog.index_exists(&resolved, i)) {
            return Some(format!("{resolved}.{index}"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DefaultSqlParser, SqlParser};

    fn catalog() -> InfoSchema {
        let schema = InfoSchema::new();
        schema.add_table(
            TableInfo::new("test", "t", 5)
                .with_index("idx_a", &["a"])
                .with_column_stats("a", 1.0, 5.0, 5),
        );
        schema
    }

    fn parse(sql: &str) -> ParsedStatement {
        DefaultSqlParser.parse(sql, "", "").unwrap()
    }

    #[test]
    fn test_catalog_lookup() {
        let schema = catalog();
        let t = TableName::new(Some("test"), "t");
        assert!(schema.table_exists(&t));
        assert!(schema.index_exists(&t, "IDX_A"));
        assert!(!schema.index_exists(&t, "idx_b"));
        assert_eq!(schema.table(&t).unwrap().stats("a").unwrap().ndv, 5);
    }

    #[test]
    fn test_drop_index_and_table() {
        let schema = catalog();
        let t = TableName::new(Some("test"), "t");
        assert!(schema.drop_index(&t, "idx_a"));
        assert!(!schema.drop_index(&t, "idx_a"));
        assert!(schema.drop_table(&t));
        assert!(!schema.table_exists(&t));
    }

    #[test]
    fn test_missing_reference() {
        let schema = catalog();
        assert_eq!(missing_reference(&schema, &parse("select * from t use index(idx_a)"), "test"), None);
        assert_eq!(
            missing_reference(&schema, &parse("select * from t use index(idx_b)"), "test"),
            Some("test.t.idx_b".to_string())
        );
        assert_eq!(
            missing_reference(&schema, &parse("select * from t1"), "test"),
            Some("test.t1".to_string())
        );
        assert_eq!(
            missing_reference(&schema, &parse("select /*+ USE_INDEX(x, idx_a) */ * from t x"), "test"),
            None
        );
    }
}
