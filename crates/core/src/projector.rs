// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Queue status aggregated from the store.
//!
//! Status is never tracked incrementally: every snapshot is recomputed from
//! the queue itself, so it cannot drift from what is actually stored.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::op::{ErrorClass, OpStatus, Operation};
use crate::store::QueueStore;

/// Number of recent errors kept in a [`QueueStatus`] by default.
pub const DEFAULT_RECENT_ERRORS: usize = 5;

/// A failure shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentError {
    pub operation_id: String,
    pub resource: String,
    pub status: OpStatus,
    pub class: ErrorClass,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Snapshot of the queue for the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub conflicted: usize,
    /// All operations in the store, completed ones included.
    pub total: usize,
    /// Serialized payload bytes of operations not yet completed.
    pub payload_bytes: u64,
    pub recent_errors: Vec<RecentError>,
}

impl QueueStatus {
    /// Aggregates per-status counts and recent failures.
    pub fn from_parts(
        counts: &[(OpStatus, usize)],
        payload_bytes: u64,
        errored: &[Operation],
    ) -> Self {
        let mut status = QueueStatus {
            payload_bytes,
            ..QueueStatus::default()
        };
        for &(op_status, count) in counts {
            *status.count_mut(op_status) += count;
            status.total += count;
        }
        status.recent_errors = errored
            .iter()
            .filter_map(|op| {
                op.last_error.as_ref().map(|error| RecentError {
                    operation_id: op.id.clone(),
                    resource: op.resource().to_string(),
                    status: op.status,
                    class: error.class,
                    message: error.message.clone(),
                    at: op.updated_at,
                })
            })
            .collect();
        status
    }

    fn count_mut(&mut self, status: OpStatus) -> &mut usize {
        match status {
            OpStatus::Pending => &mut self.pending,
            OpStatus::Processing => &mut self.processing,
            OpStatus::Completed => &mut self.completed,
            OpStatus::Failed => &mut self.failed,
            OpStatus::Conflicted => &mut self.conflicted,
        }
    }

    pub fn count(&self, status: OpStatus) -> usize {
        match status {
            OpStatus::Pending => self.pending,
            OpStatus::Processing => self.processing,
            OpStatus::Completed => self.completed,
            OpStatus::Failed => self.failed,
            OpStatus::Conflicted => self.conflicted,
        }
    }

    /// Operations the server has not confirmed yet.
    pub fn outstanding(&self) -> usize {
        self.total - self.completed
    }

    /// True when operations need the user (failed or conflicted).
    pub fn needs_attention(&self) -> bool {
        self.failed + self.conflicted > 0
    }
}

/// Computes the current status of a queue.
pub fn project(store: &QueueStore, error_limit: usize) -> Result<QueueStatus> {
    let counts = store.status_counts()?;
    let payload_bytes = store.outstanding_payload_bytes()?;
    let errored = store.recent_errors(error_limit)?;
    Ok(QueueStatus::from_parts(&counts, payload_bytes, &errored))
}

#[cfg(test)]
#[path = "projector_tests.rs"]
mod tests;
