// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PlanBind bind-info table.
//
// The persisted table behind the global plan-binding cache. The `BindTable`
// trait is the seam; caches never talk to a concrete backend.
//
// # Modules
//
// - [`row`] -- `BindRow`, the logical row shape, and its primary key.
// - [`table`] -- The async `BindTable` trait.
// - [`error`] -- The `StorageError` enum covering all backend failure modes.
// - [`memory`] -- An in-memory `BTreeMap`-based table for tests and
//   embedded use.
//
// # Example
//
// ```rust
// use chrono::Utc;
// use planbind_storage::{BindRow, BindTable, InMemoryBindTable};
//
// # tokio_test::block_on(async {
// let table = InMemoryBindTable::new();
// let now = Utc::now();
// table.upsert(&[BindRow {
//     original_sql: "select * from t".into(),
//     bind_sql: "select * from t use index(idx)".into(),
//     default_db: "test".into(),
//     status: "using".into(),
//     create_time: now,
//     update_time: now,
//     charset: "utf8mb4".into(),
//     collation: "utf8mb4_bin".into(),
// }]).await.unwrap();
// assert_eq!(table.load(None).await.unwrap().len(), 1);
// # });
// ```

pub mod error;
pub mod memory;
pub mod row;
pub mod table;

// Optional persistent backends, feature-gated.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;

pub use error::StorageError;
pub use memory::InMemoryBindTable;
pub use row::{BindRow, RowKey, STATUS_DELETED};
pub use table::BindTable;

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBindTable;
