// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// All possible errors that can occur in the syncq CLI.
///
/// Errors provide user-friendly messages with hints for common issues.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no remote configured\n  hint: add a [remote] section with url = \"ws://host:port\" to syncq.toml")]
    RemoteRequired,

    #[error("invalid payload: {0}\n  hint: payloads are JSON documents, e.g. '{{\"name\":\"PC2\"}}'")]
    InvalidPayload(String),

    #[error("another syncq worker is using {0}\n  hint: stop the running 'syncq run' first")]
    WorkerRunning(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Queue(#[from] sq_core::Error),

    #[error("{0}")]
    Sync(#[from] sq_engine::SyncError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for syncq operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
