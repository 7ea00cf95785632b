// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test doubles.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sq_core::protocol::ApplyRequest;
use sq_remote::{Authority, Verdict};

use crate::remote::{Applied, BoxFuture, RemoteError, RemoteStore};

/// A scripted failure for the next apply.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fails before reaching the store.
    Network,
    /// Applies, then loses the acknowledgement.
    DropAck,
    Server,
    Auth,
    /// Never answers.
    Hang,
}

/// In-process remote backed by the reference authority.
pub struct FakeRemote {
    pub authority: tokio::sync::Mutex<Authority>,
    faults: Mutex<VecDeque<Fault>>,
    always: Mutex<Option<Fault>>,
    pub calls: AtomicUsize,
    pub keys: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeRemote {
            authority: tokio::sync::Mutex::new(Authority::in_memory()),
            faults: Mutex::new(VecDeque::new()),
            always: Mutex::new(None),
            calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_next(&self, fault: Fault) {
        self.faults.lock().unwrap().push_back(fault);
    }

    pub fn fail_always(&self, fault: Option<Fault>) {
        *self.always.lock().unwrap() = fault;
    }

    pub async fn seed(&self, kind: &str, id: &str, document: serde_json::Value) {
        let request = ApplyRequest {
            resource_kind: kind.into(),
            resource_id: id.into(),
            kind: sq_core::OpKind::Create,
            payload: document,
            base_version: None,
            idempotency_key: format!("seed-{kind}-{id}"),
        };
        self.authority.lock().await.apply(&request).unwrap();
    }

    pub async fn start_server_ids_at(&self, next: u64) {
        self.authority.lock().await.start_server_ids_at(next);
    }

    pub async fn document(&self, kind: &str, id: &str) -> Option<serde_json::Value> {
        self.authority
            .lock()
            .await
            .get(kind, id)
            .map(|r| r.document.clone())
    }

    pub async fn applied_count(&self) -> usize {
        self.authority.lock().await.applied_count()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_fault(&self) -> Option<Fault> {
        self.faults
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.always.lock().unwrap().clone())
    }
}

impl RemoteStore for FakeRemote {
    fn apply(&self, request: ApplyRequest) -> BoxFuture<'_, std::result::Result<Applied, RemoteError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.keys.lock().unwrap().push(request.idempotency_key.clone());
            let fault = self.next_fault();
            match &fault {
                Some(Fault::Network) => return Err(RemoteError::Network("connection refused".into())),
                Some(Fault::Server) => return Err(RemoteError::Server("503".into())),
                Some(Fault::Auth) => return Err(RemoteError::Auth("token expired".into())),
                Some(Fault::Hang) => std::future::pending::<()>().await,
                Some(Fault::DropAck) | None => {}
            }

            let verdict = self
                .authority
                .lock()
                .await
                .apply(&request)
                .map_err(|e| RemoteError::Server(e.to_string()))?;
            if matches!(fault, Some(Fault::DropAck)) {
                return Err(RemoteError::Network("connection reset".into()));
            }
            match verdict {
                Verdict::Applied(accepted) => Ok(Applied {
                    server_id: accepted.server_id,
                    version: accepted.version,
                    replayed: accepted.replayed,
                }),
                Verdict::Rejected(rejection) => Err(rejection.into()),
            }
        })
    }

    fn probe(&self) -> BoxFuture<'_, std::result::Result<(), RemoteError>> {
        Box::pin(async { Ok(()) })
    }
}
