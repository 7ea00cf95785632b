// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::Value;
use sq_core::{Intent, OpKind, OperationBuilder};
use tracing::debug;

use super::open_store;
use crate::cli::KindArg;
use crate::config::Config;
use crate::error::{Error, Result};

/// Arguments of `syncq enqueue`.
#[derive(Debug, Clone)]
pub struct EnqueueArgs {
    pub kind: KindArg,
    pub resource_kind: String,
    pub id: Option<String>,
    pub payload: Option<String>,
    pub base_version: Option<u64>,
    pub content_key: bool,
}

pub fn run(config: &Config, args: EnqueueArgs) -> Result<()> {
    let intent = build_intent(args)?;
    let store = open_store(config)?;
    let builder = OperationBuilder::new(config.engine.max_retries);
    let op = store.enqueue(&builder, intent)?;
    debug!(id = %op.id, sequence = op.sequence_in_resource, "enqueued");
    println!("Queued {} {}: {}", op.kind, op.resource(), op.id);
    Ok(())
}

/// Turn command-line arguments into an intent.
///
/// Creates and updates default to an empty object payload; deletes carry
/// no payload unless one is given.
pub fn build_intent(args: EnqueueArgs) -> Result<Intent> {
    let kind = OpKind::from(args.kind);
    let payload = match args.payload.as_deref() {
        Some(raw) => {
            serde_json::from_str::<Value>(raw).map_err(|e| Error::InvalidPayload(e.to_string()))?
        }
        None if kind == OpKind::Delete => Value::Null,
        None => Value::Object(Default::default()),
    };

    let mut intent = Intent::new(kind, args.resource_kind, args.id, payload);
    if let Some(version) = args.base_version {
        intent = intent.with_base_version(version);
    }
    if args.content_key {
        intent = intent.content_idempotent();
    }
    intent.validate()?;
    Ok(intent)
}

#[cfg(test)]
#[path = "enqueue_tests.rs"]
mod tests;
