// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Events published to observers of the queue.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sq_core::{LastError, QueueStatus, ResourceKey};

use crate::monitor::NetworkState;

/// What the drain loop is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum EngineState {
    Idle,
    Syncing,
    /// Nothing is due; the next retry becomes due at `until`.
    BackoffWait { until: DateTime<Utc> },
    /// Stopped after an authentication failure until resumed.
    Paused,
}

impl EngineState {
    pub fn name(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Syncing => "syncing",
            EngineState::BackoffWait { .. } => "backoff-wait",
            EngineState::Paused => "paused",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::BackoffWait { until } => write!(f, "backoff-wait until {}", until.to_rfc3339()),
            other => f.write_str(other.name()),
        }
    }
}

/// Notification about the queue, the engine or the network.
///
/// Every per-operation event is sent after its outcome is committed.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    OperationStarted {
        id: String,
        resource: ResourceKey,
    },
    OperationCompleted {
        id: String,
        server_id: Option<String>,
        replayed: bool,
    },
    /// A transient failure; the operation is pending again.
    OperationRetrying {
        id: String,
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    OperationFailed {
        id: String,
        error: LastError,
    },
    OperationConflicted {
        id: String,
        current_version: u64,
        message: String,
    },
    StateChanged(EngineState),
    NetworkChanged(NetworkState),
    QueueChanged(QueueStatus),
}

impl SyncEvent {
    /// Stable event name, e.g. `operation:completed` or `sync:idle`.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::OperationStarted { .. } => "operation:started",
            SyncEvent::OperationCompleted { .. } => "operation:completed",
            SyncEvent::OperationRetrying { .. } => "operation:retrying",
            SyncEvent::OperationFailed { .. } => "operation:failed",
            SyncEvent::OperationConflicted { .. } => "operation:conflicted",
            SyncEvent::StateChanged(state) => match state {
                EngineState::Idle => "sync:idle",
                EngineState::Syncing => "sync:syncing",
                EngineState::BackoffWait { .. } => "sync:backoff-wait",
                EngineState::Paused => "sync:paused",
            },
            SyncEvent::NetworkChanged(state) => match state {
                NetworkState::Online => "network:online",
                NetworkState::Offline => "network:offline",
                NetworkState::Degraded => "network:degraded",
            },
            SyncEvent::QueueChanged(_) => "queue:changed",
        }
    }

    /// Id of the operation the event is about, if any.
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            SyncEvent::OperationStarted { id, .. }
            | SyncEvent::OperationCompleted { id, .. }
            | SyncEvent::OperationRetrying { id, .. }
            | SyncEvent::OperationFailed { id, .. }
            | SyncEvent::OperationConflicted { id, .. } => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
