// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the sq-remote server.

use thiserror::Error;

/// Failures of the authoritative store itself.
///
/// Requests that are merely refused (validation, conflict, auth) are not
/// errors: they come back as a [`crate::authority::Verdict`].
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted ledger at line {line}: {message}")]
    CorruptedLedger { line: usize, message: String },
}

/// A specialized Result type for sq-remote operations.
pub type Result<T> = std::result::Result<T, AuthorityError>;
