// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for sq-core operations.

use thiserror::Error;

/// All possible errors that can occur in sq-core operations.
///
/// Everything that originates in SQLite, the filesystem or JSON
/// (de)serialization is a storage error: the caller must not assume the
/// write happened.
#[derive(Debug, Error)]
pub enum Error {
    #[error("operation not found: {0}")]
    OperationNotFound(String),

    #[error("invalid status transition: cannot go from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("operation {id} is {status} and cannot be cancelled\n  hint: only pending operations can be cancelled")]
    NotCancellable { id: String, status: String },

    #[error("stale update for operation {id}: it changed since it was read")]
    StaleUpdate { id: String },

    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    #[error("invalid operation kind: '{0}'\n  hint: valid kinds are: create, update, delete")]
    InvalidOpKind(String),

    #[error("invalid status: '{0}'\n  hint: valid statuses are: pending, processing, completed, failed, conflicted")]
    InvalidStatus(String),

    #[error("invalid error class: '{0}'")]
    InvalidErrorClass(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

impl Error {
    /// Returns true for failures of the durable store itself (SQLite, IO,
    /// serialization, corrupted rows) as opposed to rejected requests.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Io(_) | Error::Json(_) | Error::CorruptedData(_)
        )
    }
}

/// A specialized Result type for sq-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
