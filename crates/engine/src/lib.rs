// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sq-engine: Replays the syncq operation queue against a remote store.
//!
//! [`SyncQueue`] is the entry point: it persists intents through the
//! [`sq_core::QueueStore`], watches reachability with a [`NetworkMonitor`]
//! and drains eligible operations through a [`SyncEngine`] whenever the
//! remote store is reachable. [`WsRemoteStore`] speaks the JSON WebSocket
//! protocol of `sq-remote`; anything else can plug in through
//! [`RemoteStore`].

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod monitor;
pub mod queue;
pub mod remote;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::{TransportFactory, WsRemoteStore};
pub use config::{EngineConfig, MonitorConfig, RemoteConfig};
pub use engine::{DrainReport, SyncEngine};
pub use error::{Result, SyncError};
pub use events::{EngineState, SyncEvent};
pub use monitor::{Debouncer, NetworkEvent, NetworkMonitor, NetworkState};
pub use queue::SyncQueue;
pub use remote::{Applied, BoxFuture, RemoteError, RemoteStore};
pub use transport::{Transport, TransportError, WebSocketTransport};
