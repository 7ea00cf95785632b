// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server state management.
//!
//! Wraps the authority for shared access across connections, plus the
//! access token and fault injection knobs.

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sq_core::protocol::ApplyRequest;
use tokio::sync::Mutex;

use crate::authority::{Authority, Resource, Verdict};
use crate::error::Result;

/// File name of the ledger inside the data directory.
pub const LEDGER_FILE: &str = "ledger.jsonl";

/// Fault injection for exercising client recovery paths.
///
/// Every knob is a countdown of requests to affect; zero means off.
#[derive(Debug, Default)]
pub struct Faults {
    /// Apply the request, then close the connection without answering.
    drop_responses: AtomicU32,
    /// Answer with a server rejection without applying.
    fail_requests: AtomicU32,
    /// Delay before handling each request, in milliseconds.
    delay_ms: AtomicU64,
}

impl Faults {
    pub fn drop_next_responses(&self, n: u32) {
        self.drop_responses.store(n, Ordering::Release);
    }

    pub fn fail_next_requests(&self, n: u32) {
        self.fail_requests.store(n, Ordering::Release);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::Release);
    }

    pub fn delay(&self) -> Option<Duration> {
        match self.delay_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub(crate) fn take_drop(&self) -> bool {
        take(&self.drop_responses)
    }

    pub(crate) fn take_failure(&self) -> bool {
        take(&self.fail_requests)
    }
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

/// Shared server state containing the authority.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    /// The authoritative store (protected by mutex for writes).
    authority: Mutex<Authority>,
    /// Bearer token clients must present, if any.
    token: Option<String>,
    faults: Faults,
}

impl ServerState {
    /// Opens the ledger in the given directory.
    pub fn open(data_dir: &Path, token: Option<String>) -> Result<Self> {
        let authority = Authority::open(data_dir.join(LEDGER_FILE))?;
        Ok(Self::new(authority, token))
    }

    pub fn new(authority: Authority, token: Option<String>) -> Self {
        ServerState {
            inner: Arc::new(ServerStateInner {
                authority: Mutex::new(authority),
                token,
                faults: Faults::default(),
            }),
        }
    }

    /// True if clients must authenticate before applying.
    pub fn requires_token(&self) -> bool {
        self.inner.token.is_some()
    }

    /// Checks a token presented in a hello.
    pub fn authorize(&self, token: Option<&str>) -> bool {
        match &self.inner.token {
            None => true,
            Some(expected) => token == Some(expected.as_str()),
        }
    }

    pub fn faults(&self) -> &Faults {
        &self.inner.faults
    }

    /// Applies a request.
    pub async fn apply(&self, request: &ApplyRequest) -> Result<Verdict> {
        let mut authority = self.inner.authority.lock().await;
        authority.apply(request)
    }

    /// Returns a copy of a stored resource.
    pub async fn resource(&self, resource_kind: &str, resource_id: &str) -> Option<Resource> {
        let authority = self.inner.authority.lock().await;
        authority.get(resource_kind, resource_id).cloned()
    }

    /// Number of idempotency keys applied.
    pub async fn applied_count(&self) -> usize {
        self.inner.authority.lock().await.applied_count()
    }

    /// Sets the number the next assigned id starts from.
    pub async fn start_server_ids_at(&self, next: u64) {
        self.inner.authority.lock().await.start_server_ids_at(next);
    }
}
