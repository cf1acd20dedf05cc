// SPDX-License-Identifier: PMPL-1.0-or-later
//! Binding error types.

use planbind_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by administrative binding operations.
///
/// Compile-time matching never returns these for a bad binding; it skips the
/// binding and plans without it.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("bound SQL references tables {bound:?}, original references {original:?}")]
    TableMismatch {
        original: Vec<String>,
        bound: Vec<String>,
    },

    #[error("unknown binding status: {0}")]
    UnknownStatus(String),

    #[error("unknown binding scope: {0}")]
    UnknownScope(String),

    #[error("optimizer error: {0}")]
    Optimizer(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
