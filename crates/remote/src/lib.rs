// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sq-remote: Reference authoritative store for syncq clients.
//!
//! Holds resources in memory, rebuilt on start from an append-only ledger,
//! and applies client requests over WebSocket with idempotency-key
//! deduplication, version-based conflict detection and optional token auth.

pub mod authority;
pub mod error;
pub mod ledger;
pub mod server;
pub mod state;

pub use authority::{Accepted, Authority, Resource, Verdict, SERVER_ID_PREFIX};
pub use error::{AuthorityError, Result};
pub use ledger::{Ledger, LedgerEntry};
pub use state::{Faults, ServerState};
