// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol between the sync engine and the remote store.
//!
//! One connection carries many in-flight requests:
//! - Client opens with `hello` (optional bearer token), server answers `welcome`
//! - Each `apply` carries a client-chosen `request_id`, echoed in the
//!   matching `applied` or `rejected` so responses may arrive out of order
//! - `ping`/`pong` double as the reachability probe

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::op::{OpKind, Operation};

/// One mutation to apply on the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub resource_kind: String,
    pub resource_id: String,
    pub kind: OpKind,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
    /// The server applies each key at most once.
    pub idempotency_key: String,
}

impl ApplyRequest {
    /// The request that replays a queued operation.
    pub fn from_operation(op: &Operation) -> Self {
        ApplyRequest {
            resource_kind: op.resource_kind.clone(),
            resource_id: op.resource_id.clone(),
            kind: op.kind,
            payload: op.payload.clone(),
            base_version: op.base_version,
            idempotency_key: op.idempotency_key.clone(),
        }
    }
}

/// Why the server refused a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    /// The request can never succeed as sent.
    Validation { message: String },

    /// The resource moved past the request's base version.
    Conflict {
        current_version: u64,
        message: String,
    },

    /// The server failed; retrying later may succeed.
    Server { message: String },

    /// Missing or invalid credentials.
    Unauthorized { message: String },
}

impl Rejection {
    pub fn validation(message: impl Into<String>) -> Self {
        Rejection::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(current_version: u64, message: impl Into<String>) -> Self {
        Rejection::Conflict {
            current_version,
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Rejection::Server {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Rejection::Unauthorized {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Rejection::Validation { message }
            | Rejection::Conflict { message, .. }
            | Rejection::Server { message }
            | Rejection::Unauthorized { message } => message,
        }
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on a connection.
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Apply one mutation.
    Apply {
        /// Client-chosen ID echoed in the response.
        request_id: u64,
        request: ApplyRequest,
    },

    /// Reachability probe.
    Ping {
        /// Client-chosen ID echoed in Pong.
        id: u64,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The hello was accepted.
    Welcome,

    /// The mutation is applied (now or, if `replayed`, earlier).
    Applied {
        request_id: u64,
        /// Set for creates: the id the server assigned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_id: Option<String>,
        /// Resource version after the mutation.
        version: u64,
        replayed: bool,
    },

    /// The mutation was refused.
    Rejected {
        request_id: u64,
        rejection: Rejection,
    },

    /// Pong response to client Ping.
    Pong {
        /// Echoed from the Ping message.
        id: u64,
    },

    /// Connection-level error (malformed message, failed hello).
    Error {
        /// Human-readable error description.
        message: String,
    },
}

impl ClientMessage {
    /// Creates a Hello message.
    pub fn hello(token: Option<String>) -> Self {
        ClientMessage::Hello { token }
    }

    /// Creates an Apply message.
    pub fn apply(request_id: u64, request: ApplyRequest) -> Self {
        ClientMessage::Apply {
            request_id,
            request,
        }
    }

    /// Creates a Ping message.
    pub fn ping(id: u64) -> Self {
        ClientMessage::Ping { id }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Creates an Applied message.
    pub fn applied(request_id: u64, server_id: Option<String>, version: u64, replayed: bool) -> Self {
        ServerMessage::Applied {
            request_id,
            server_id,
            version,
            replayed,
        }
    }

    /// Creates a Rejected message.
    pub fn rejected(request_id: u64, rejection: Rejection) -> Self {
        ServerMessage::Rejected {
            request_id,
            rejection,
        }
    }

    /// Creates a Pong message.
    pub fn pong(id: u64) -> Self {
        ServerMessage::Pong { id }
    }

    /// Creates an Error message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Request id this message answers, if it answers one.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::Applied { request_id, .. } | ServerMessage::Rejected { request_id, .. } => {
                Some(*request_id)
            }
            _ => None,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
