// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative resource store.
//!
//! Holds every resource in memory and decides, for each request, whether it
//! applies. Accepted requests are written to the [`Ledger`] before the
//! in-memory state changes, so a restart rebuilds exactly what clients were
//! told.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};
use sq_core::protocol::{ApplyRequest, Rejection};
use sq_core::{is_temporary_id, OpKind, ResourceKey};
use tracing::debug;

use crate::error::Result;
use crate::ledger::{Ledger, LedgerEntry};

/// Prefix of ids assigned by the server.
pub const SERVER_ID_PREFIX: &str = "srv-";

/// A stored resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub version: u64,
    pub document: Value,
}

/// The outcome of an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub server_id: Option<String>,
    pub version: u64,
    /// True if this key was applied before and nothing changed now.
    pub replayed: bool,
}

/// What the authority decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Applied(Accepted),
    Rejected(Rejection),
}

/// In-memory resources backed by an append-only ledger.
pub struct Authority {
    resources: HashMap<ResourceKey, Resource>,
    /// Outcomes by idempotency key.
    outcomes: HashMap<String, Accepted>,
    next_server_id: u64,
    ledger: Ledger,
}

impl Authority {
    /// Opens the ledger at `path` and rebuilds state from it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (ledger, entries) = Ledger::open(path)?;
        let mut authority = Authority::with_ledger(ledger);
        for entry in &entries {
            authority.replay(entry);
        }
        debug!(
            entries = entries.len(),
            resources = authority.resources.len(),
            "ledger replayed"
        );
        Ok(authority)
    }

    /// Creates an authority that keeps nothing on disk.
    pub fn in_memory() -> Self {
        Authority::with_ledger(Ledger::in_memory())
    }

    fn with_ledger(ledger: Ledger) -> Self {
        Authority {
            resources: HashMap::new(),
            outcomes: HashMap::new(),
            next_server_id: 1,
            ledger,
        }
    }

    /// Sets the number the next assigned id starts from.
    ///
    /// Ignored if it would reuse an id already handed out.
    pub fn start_server_ids_at(&mut self, next: u64) {
        self.next_server_id = self.next_server_id.max(next);
    }

    pub fn get(&self, resource_kind: &str, resource_id: &str) -> Option<&Resource> {
        self.resources
            .get(&ResourceKey::new(resource_kind, resource_id))
    }

    /// Number of live resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Number of idempotency keys applied.
    pub fn applied_count(&self) -> usize {
        self.outcomes.len()
    }

    /// Decides and, if accepted, durably applies one request.
    pub fn apply(&mut self, request: &ApplyRequest) -> Result<Verdict> {
        if let Some(previous) = self.outcomes.get(&request.idempotency_key) {
            return Ok(Verdict::Applied(Accepted {
                replayed: true,
                ..previous.clone()
            }));
        }

        let entry = match self.decide(request) {
            Ok(entry) => entry,
            Err(rejection) => return Ok(Verdict::Rejected(rejection)),
        };

        self.ledger.append(&entry)?;
        self.replay(&entry);

        Ok(Verdict::Applied(Accepted {
            server_id: entry.server_id,
            version: entry.version,
            replayed: false,
        }))
    }

    /// Validates a request and computes the entry it would record.
    fn decide(&self, request: &ApplyRequest) -> std::result::Result<LedgerEntry, Rejection> {
        if request.resource_kind.trim().is_empty() {
            return Err(Rejection::validation("resource kind is required"));
        }

        let key = ResourceKey::new(&request.resource_kind, &request.resource_id);
        let current = self.resources.get(&key);

        match request.kind {
            OpKind::Create => {
                let Value::Object(_) = request.payload else {
                    return Err(Rejection::validation("create payload must be an object"));
                };
                let (resource_id, server_id) = if is_temporary_id(&request.resource_id) {
                    let id = format!("{SERVER_ID_PREFIX}{}", self.next_server_id);
                    (id.clone(), Some(id))
                } else {
                    if current.is_some() {
                        return Err(Rejection::validation(format!("{key} already exists")));
                    }
                    (request.resource_id.clone(), None)
                };
                Ok(LedgerEntry {
                    idempotency_key: request.idempotency_key.clone(),
                    resource_kind: request.resource_kind.clone(),
                    resource_id,
                    kind: OpKind::Create,
                    document: Some(request.payload.clone()),
                    version: 1,
                    server_id,
                })
            }
            OpKind::Update => {
                let Value::Object(ref changes) = request.payload else {
                    return Err(Rejection::validation("update payload must be an object"));
                };
                let current = current
                    .ok_or_else(|| Rejection::validation(format!("unknown resource {key}")))?;
                check_base_version(request, current)?;

                let mut document = match &current.document {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                for (field, value) in changes {
                    if value.is_null() {
                        document.remove(field);
                    } else {
                        document.insert(field.clone(), value.clone());
                    }
                }
                Ok(LedgerEntry {
                    idempotency_key: request.idempotency_key.clone(),
                    resource_kind: request.resource_kind.clone(),
                    resource_id: request.resource_id.clone(),
                    kind: OpKind::Update,
                    document: Some(Value::Object(document)),
                    version: current.version + 1,
                    server_id: None,
                })
            }
            OpKind::Delete => {
                let current = current
                    .ok_or_else(|| Rejection::validation(format!("unknown resource {key}")))?;
                check_base_version(request, current)?;
                Ok(LedgerEntry {
                    idempotency_key: request.idempotency_key.clone(),
                    resource_kind: request.resource_kind.clone(),
                    resource_id: request.resource_id.clone(),
                    kind: OpKind::Delete,
                    document: None,
                    version: current.version + 1,
                    server_id: None,
                })
            }
        }
    }

    /// Applies a recorded entry to the in-memory state.
    fn replay(&mut self, entry: &LedgerEntry) {
        let key = ResourceKey::new(&entry.resource_kind, &entry.resource_id);
        match &entry.document {
            Some(document) => {
                self.resources.insert(
                    key,
                    Resource {
                        version: entry.version,
                        document: document.clone(),
                    },
                );
            }
            None => {
                self.resources.remove(&key);
            }
        }

        if let Some(n) = entry
            .server_id
            .as_deref()
            .and_then(|id| id.strip_prefix(SERVER_ID_PREFIX))
            .and_then(|n| n.parse::<u64>().ok())
        {
            self.next_server_id = self.next_server_id.max(n + 1);
        }

        self.outcomes.insert(
            entry.idempotency_key.clone(),
            Accepted {
                server_id: entry.server_id.clone(),
                version: entry.version,
                replayed: false,
            },
        );
    }
}

fn check_base_version(request: &ApplyRequest, current: &Resource) -> std::result::Result<(), Rejection> {
    match request.base_version {
        Some(base) if base != current.version => Err(Rejection::conflict(
            current.version,
            format!(
                "{}/{} is at version {}, edit was based on {}",
                request.resource_kind, request.resource_id, current.version, base
            ),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "authority_tests.rs"]
mod tests;
