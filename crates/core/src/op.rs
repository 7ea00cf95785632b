// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Operations: durable records of one intended mutation.
//!
//! An [`Operation`] is created when the user edits something, possibly
//! offline, and lives in the queue store until the server confirms it. Its
//! status follows a small state machine:
//!
//! ```text
//! pending ──► processing ──► completed
//!    ▲            │
//!    ├────────────┤ (transient failure with retries left, auth pause, crash)
//!    │            ├──► failed ──(retryAllFailed)──► pending
//!    │            └──► conflicted
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Prefix of client-generated ids for resources not yet created server-side.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Returns true if the resource id was generated locally for a pending create.
pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// The mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" => Ok(OpKind::Create),
            "update" => Ok(OpKind::Update),
            "delete" => Ok(OpKind::Delete),
            _ => Err(Error::InvalidOpKind(s.to_string())),
        }
    }
}

/// Lifecycle status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Conflicted,
}

impl OpStatus {
    pub const ALL: [OpStatus; 5] = [
        OpStatus::Pending,
        OpStatus::Processing,
        OpStatus::Completed,
        OpStatus::Failed,
        OpStatus::Conflicted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Pending => "pending",
            OpStatus::Processing => "processing",
            OpStatus::Completed => "completed",
            OpStatus::Failed => "failed",
            OpStatus::Conflicted => "conflicted",
        }
    }

    /// Completed, failed and conflicted operations are never picked up by the
    /// engine on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OpStatus::Completed | OpStatus::Failed | OpStatus::Conflicted
        )
    }

    /// Returns the statuses reachable from this one.
    pub fn valid_targets(&self) -> &'static [OpStatus] {
        match self {
            OpStatus::Pending => &[OpStatus::Processing],
            OpStatus::Processing => &[
                OpStatus::Pending,
                OpStatus::Completed,
                OpStatus::Failed,
                OpStatus::Conflicted,
            ],
            OpStatus::Failed => &[OpStatus::Pending],
            OpStatus::Completed | OpStatus::Conflicted => &[],
        }
    }

    pub fn can_transition_to(&self, target: OpStatus) -> bool {
        self.valid_targets().contains(&target)
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OpStatus::Pending),
            "processing" => Ok(OpStatus::Processing),
            "completed" => Ok(OpStatus::Completed),
            "failed" => Ok(OpStatus::Failed),
            "conflicted" => Ok(OpStatus::Conflicted),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

/// Classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network error or timeout; retried with backoff.
    TransientNetwork,
    /// Server-side failure (5xx); retried with backoff.
    Server,
    /// The request can never succeed as sent.
    Validation,
    /// The resource changed since the operation's baseline.
    Conflict,
    /// Credentials were rejected; the whole engine pauses.
    Auth,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::TransientNetwork => "transient_network",
            ErrorClass::Server => "server",
            ErrorClass::Validation => "validation",
            ErrorClass::Conflict => "conflict",
            ErrorClass::Auth => "auth",
        }
    }

    /// True for classes the engine retries automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::TransientNetwork | ErrorClass::Server)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transient_network" => Ok(ErrorClass::TransientNetwork),
            "server" => Ok(ErrorClass::Server),
            "validation" => Ok(ErrorClass::Validation),
            "conflict" => Ok(ErrorClass::Conflict),
            "auth" => Ok(ErrorClass::Auth),
            _ => Err(Error::InvalidErrorClass(s.to_string())),
        }
    }
}

/// The last failure recorded against an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub class: ErrorClass,
    pub message: String,
}

impl LastError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        LastError {
            class,
            message: message.into(),
        }
    }
}

impl fmt::Display for LastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

/// Identifies the entity an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        ResourceKey {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A durable record of one intended mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    pub resource_kind: String,
    pub resource_id: String,
    pub kind: OpKind,
    pub payload: Value,
    /// Server version the edit was made against, if known.
    pub base_version: Option<u64>,
    pub idempotency_key: String,
    pub status: OpStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<LastError>,
    /// Id assigned by the server when a create completes.
    pub server_id: Option<String>,
    pub sequence_in_resource: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Operation {
    pub fn resource(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_kind, &self.resource_id)
    }

    /// Serialized payload size in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload.to_string().len()
    }

    /// True if the engine may pick this operation up at `now`, ignoring
    /// ordering against its siblings.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OpStatus::Pending && self.next_attempt_at <= now
    }

    /// True for a create whose target id was generated locally.
    pub fn creates_temporary_resource(&self) -> bool {
        self.kind == OpKind::Create && is_temporary_id(&self.resource_id)
    }
}

#[cfg(test)]
#[path = "op_tests.rs"]
mod tests;
