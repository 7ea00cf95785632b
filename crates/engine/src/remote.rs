// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Boundary to the authoritative remote store.
//!
//! The engine only needs two calls: apply one mutation, and probe whether
//! the store is reachable. Everything else about the server is opaque.

use std::future::Future;
use std::pin::Pin;

use sq_core::protocol::{ApplyRequest, Rejection};
use sq_core::ErrorClass;

/// A boxed, sendable future borrowed from a remote store.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Confirmation that a mutation is applied remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Id assigned by the server for creates.
    pub server_id: Option<String>,
    /// Resource version after the mutation.
    pub version: u64,
    /// The idempotency key had already been applied.
    pub replayed: bool,
}

/// Why a remote call did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("rejected: {0}")]
    Validation(String),

    #[error("conflict at version {current_version}: {message}")]
    Conflict { current_version: u64, message: String },

    #[error("server error: {0}")]
    Server(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out")]
    Timeout,
}

impl RemoteError {
    /// How the engine treats this failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            RemoteError::Validation(_) => ErrorClass::Validation,
            RemoteError::Conflict { .. } => ErrorClass::Conflict,
            RemoteError::Server(_) => ErrorClass::Server,
            RemoteError::Auth(_) => ErrorClass::Auth,
            RemoteError::Network(_) | RemoteError::Timeout => ErrorClass::TransientNetwork,
        }
    }
}

impl From<Rejection> for RemoteError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Validation { message } => RemoteError::Validation(message),
            Rejection::Conflict {
                current_version,
                message,
            } => RemoteError::Conflict {
                current_version,
                message,
            },
            Rejection::Server { message } => RemoteError::Server(message),
            Rejection::Unauthorized { message } => RemoteError::Auth(message),
        }
    }
}

/// The authoritative store the engine replays operations against.
///
/// Implementations must be safe to call concurrently: the engine keeps up to
/// `concurrency` applies in flight.
pub trait RemoteStore: Send + Sync {
    /// Applies one mutation; the idempotency key in the request makes
    /// retries safe.
    fn apply(&self, request: ApplyRequest) -> BoxFuture<'_, Result<Applied, RemoteError>>;

    /// One genuine round trip to the store.
    fn probe(&self) -> BoxFuture<'_, Result<(), RemoteError>>;
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
