// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Turns user intents into queued operations.

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::op::{is_temporary_id, OpKind, OpStatus, Operation, TEMP_ID_PREFIX};
use crate::store::{QueueStore, StoreTx};

/// Retry budget for operations that do not set their own.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// A mutation the user asked for, before it becomes an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub kind: OpKind,
    pub resource_kind: String,
    /// `None` only for creates; a temporary id is generated.
    pub resource_id: Option<String>,
    pub payload: Value,
    pub base_version: Option<u64>,
    /// Derive the idempotency key from the content instead of the op id.
    pub content_key: bool,
    pub max_retries: Option<u32>,
}

impl Intent {
    pub fn new(kind: OpKind, resource_kind: impl Into<String>, resource_id: Option<String>, payload: Value) -> Self {
        Intent {
            kind,
            resource_kind: resource_kind.into(),
            resource_id,
            payload,
            base_version: None,
            content_key: false,
            max_retries: None,
        }
    }

    /// Create a resource that has no id yet.
    pub fn create(resource_kind: impl Into<String>, payload: Value) -> Self {
        Self::new(OpKind::Create, resource_kind, None, payload)
    }

    pub fn update(resource_kind: impl Into<String>, resource_id: impl Into<String>, payload: Value) -> Self {
        Self::new(OpKind::Update, resource_kind, Some(resource_id.into()), payload)
    }

    pub fn delete(resource_kind: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::new(OpKind::Delete, resource_kind, Some(resource_id.into()), Value::Null)
    }

    /// Sets the resource id (e.g. a temporary id chosen by the caller).
    pub fn with_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_base_version(mut self, version: u64) -> Self {
        self.base_version = Some(version);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Marks a create as content-idempotent: two identical creates share a
    /// key and the server applies only the first.
    pub fn content_idempotent(mut self) -> Self {
        self.content_key = true;
        self
    }

    /// Rejects malformed intents.
    pub fn validate(&self) -> Result<()> {
        if self.resource_kind.trim().is_empty() {
            return Err(Error::InvalidIntent("resource kind cannot be empty".into()));
        }
        match &self.resource_id {
            Some(id) if id.trim().is_empty() => {
                return Err(Error::InvalidIntent("resource id cannot be empty".into()));
            }
            None if self.kind != OpKind::Create => {
                return Err(Error::InvalidIntent(format!(
                    "{} requires a resource id",
                    self.kind
                )));
            }
            _ => {}
        }
        match self.kind {
            OpKind::Create | OpKind::Update if !self.payload.is_object() => {
                return Err(Error::InvalidIntent(format!(
                    "{} payload must be a JSON object",
                    self.kind
                )));
            }
            OpKind::Delete if !(self.payload.is_null() || self.payload.is_object()) => {
                return Err(Error::InvalidIntent(
                    "delete payload must be empty or a JSON object".into(),
                ));
            }
            _ => {}
        }
        if self.content_key && self.kind != OpKind::Create {
            return Err(Error::InvalidIntent(
                "only creates can be content-idempotent".into(),
            ));
        }
        Ok(())
    }
}

/// Generates a fresh temporary resource id.
pub fn temporary_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4())
}

/// Idempotency key derived from the operation id.
pub fn key_for_id(op_id: &str) -> String {
    hex::encode(Sha256::digest(format!("op:{op_id}").as_bytes()))
}

/// Idempotency key derived from what the operation does.
///
/// `Value` objects serialize with sorted keys, so logically equal payloads
/// hash the same.
pub fn key_for_content(kind: OpKind, resource_kind: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"content:");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(resource_kind.as_bytes());
    hasher.update(b"|");
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds operations from intents.
#[derive(Debug, Clone, Copy)]
pub struct OperationBuilder {
    max_retries: u32,
}

impl Default for OperationBuilder {
    fn default() -> Self {
        OperationBuilder {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl OperationBuilder {
    pub fn new(max_retries: u32) -> Self {
        OperationBuilder { max_retries }
    }

    /// Builds an operation inside a store transaction.
    ///
    /// The per-resource sequence counter is read and bumped in `tx`, so the
    /// append that follows in the same transaction cannot race another build.
    pub fn build(&self, tx: &StoreTx<'_>, intent: Intent) -> Result<Operation> {
        intent.validate()?;

        let resource_id = match intent.resource_id {
            Some(id) if is_temporary_id(&id) => tx
                .resolve_alias(&intent.resource_kind, &id)?
                .unwrap_or(id),
            Some(id) => id,
            None => temporary_id(),
        };

        let id = Uuid::now_v7().to_string();
        let idempotency_key = if intent.content_key {
            key_for_content(intent.kind, &intent.resource_kind, &intent.payload)
        } else {
            key_for_id(&id)
        };
        let sequence_in_resource = tx.next_sequence(&intent.resource_kind, &resource_id)?;
        let now = tx.now();

        Ok(Operation {
            id,
            resource_kind: intent.resource_kind,
            resource_id,
            kind: intent.kind,
            payload: intent.payload,
            base_version: intent.base_version,
            idempotency_key,
            status: OpStatus::Pending,
            retry_count: 0,
            max_retries: intent.max_retries.unwrap_or(self.max_retries),
            next_attempt_at: now,
            last_error: None,
            server_id: None,
            sequence_in_resource,
            created_at: now,
            updated_at: now,
        })
    }
}

impl QueueStore {
    /// Builds and appends an operation in one transaction.
    pub fn enqueue(&self, builder: &OperationBuilder, intent: Intent) -> Result<Operation> {
        self.transaction(|tx| {
            let op = builder.build(tx, intent)?;
            tx.append(&op)?;
            Ok(op)
        })
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
