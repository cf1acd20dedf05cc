// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for the bind-info table.

use thiserror::Error;

/// Errors raised by a [`BindTable`](crate::BindTable) implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bind table I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be encoded or decoded.
    #[error("bind row serialization error: {0}")]
    Serialization(String),

    /// The table's pages or keys are not what a bind table writes.
    #[error("bind table corrupted: {0}")]
    CorruptedData(String),

    /// The table cannot be opened or a transaction cannot start.
    #[error("bind table unavailable: {0}")]
    BackendUnavailable(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
