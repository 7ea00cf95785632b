// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the sync engine.

use thiserror::Error;

/// Failures of the engine itself.
///
/// Remote failures are not errors here: they are classified and recorded on
/// the operation they belong to.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] sq_core::Error),

    #[error("remote call task failed: {0}")]
    Task(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// True when the durable store failed and nothing can be assumed written.
    pub fn is_storage(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_storage())
    }
}

/// A specialized Result type for sync engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
