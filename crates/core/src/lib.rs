// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sq-core: Shared library for the syncq offline operation queue
//!
//! This crate provides the operation model, the durable SQLite queue store,
//! the operation builder, status projection and the wire protocol used by
//! the sync engine, the syncq CLI and the sq-remote server.

pub mod backoff;
pub mod builder;
pub mod clock;
pub mod error;
pub mod op;
pub mod projector;
pub mod protocol;
pub mod store;

pub use backoff::BackoffPolicy;
pub use builder::{Intent, OperationBuilder, DEFAULT_MAX_RETRIES};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use op::{
    is_temporary_id, ErrorClass, LastError, OpKind, OpStatus, Operation, ResourceKey,
    TEMP_ID_PREFIX,
};
pub use projector::{project, QueueStatus, RecentError};
pub use protocol::{ApplyRequest, ClientMessage, Rejection, ServerMessage};
pub use store::{ChangeListener, OpPatch, QueueStore, StoreChange, StoreTx};
