// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The drain loop.
//!
//! A drain repeatedly takes the eligible heads of the resource chains,
//! claims them with a compare-and-set to `processing`, replays them against
//! the remote store concurrently and records each outcome before telling
//! anyone about it. It stops when nothing is eligible, or when an
//! authentication failure pauses the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::SeedableRng;
use sq_core::protocol::ApplyRequest;
use sq_core::{ErrorClass, LastError, OpPatch, OpStatus, Operation, QueueStore};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::events::{EngineState, SyncEvent};
use crate::remote::{Applied, RemoteError, RemoteStore};

/// What one drain did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// The trigger was ignored: a drain was running or the engine is paused.
    pub skipped: bool,
    pub dispatched: usize,
    pub completed: usize,
    /// Transient failures rescheduled with backoff.
    pub retried: usize,
    pub failed: usize,
    pub conflicted: usize,
    /// Returned to pending by an authentication failure.
    pub deferred: usize,
}

impl DrainReport {
    fn skipped() -> Self {
        DrainReport {
            skipped: true,
            ..DrainReport::default()
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Completed => self.completed += 1,
            Outcome::Retrying => self.retried += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Conflicted => self.conflicted += 1,
            Outcome::Deferred => self.deferred += 1,
        }
    }
}

/// How one dispatched operation settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Retrying,
    Failed,
    Conflicted,
    Deferred,
}

/// Holds the syncing flag for the lifetime of one drain.
struct SyncingGuard<'a>(&'a AtomicBool);

impl<'a> SyncingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncingGuard(flag))
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Replays queued operations against the remote store.
pub struct SyncEngine {
    store: Arc<QueueStore>,
    remote: Arc<dyn RemoteStore>,
    config: EngineConfig,
    syncing: AtomicBool,
    paused: AtomicBool,
    state: watch::Sender<EngineState>,
    events: broadcast::Sender<SyncEvent>,
    rng: Mutex<StdRng>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<QueueStore>,
        remote: Arc<dyn RemoteStore>,
        config: EngineConfig,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Idle);
        SyncEngine {
            store,
            remote,
            config,
            syncing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            state,
            events,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a fixed seed for backoff jitter.
    pub fn with_seed(self, seed: u64) -> Self {
        SyncEngine {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Stop draining until [`SyncEngine::resume`].
    pub fn pause(&self, reason: &str) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            warn!(%reason, "sync paused");
        }
        self.set_state(EngineState::Paused);
    }

    /// Lift a pause. Returns false if the engine was not paused.
    pub fn resume(&self) -> bool {
        if !self.paused.swap(false, Ordering::AcqRel) {
            return false;
        }
        info!("sync resumed");
        if !self.is_syncing() {
            self.set_state(EngineState::Idle);
        }
        true
    }

    /// Drain every eligible operation.
    ///
    /// Returns immediately with a skipped report if a drain is already
    /// running or the engine is paused. Storage failures abort the drain
    /// once the calls in flight have settled.
    pub async fn drain(&self) -> Result<DrainReport> {
        if self.is_paused() {
            debug!("sync paused, ignoring trigger");
            return Ok(DrainReport::skipped());
        }
        let Some(_guard) = SyncingGuard::acquire(&self.syncing) else {
            debug!("sync already running, ignoring trigger");
            return Ok(DrainReport::skipped());
        };

        self.set_state(EngineState::Syncing);
        let mut report = DrainReport::default();
        let result = self.drain_passes(&mut report).await;
        self.set_state(self.settled_state());

        if report.dispatched > 0 {
            info!(
                dispatched = report.dispatched,
                completed = report.completed,
                retried = report.retried,
                failed = report.failed,
                conflicted = report.conflicted,
                "sync drained"
            );
        }
        result.map(|()| report)
    }

    async fn drain_passes(&self, report: &mut DrainReport) -> Result<()> {
        loop {
            if self.is_paused() {
                return Ok(());
            }

            let batch = self
                .store
                .eligible(self.store.now(), self.config.concurrency())?;
            let mut calls = JoinSet::new();
            for op in batch {
                let Some(op) = self.claim(&op)? else {
                    continue;
                };
                report.dispatched += 1;
                self.emit(SyncEvent::OperationStarted {
                    id: op.id.clone(),
                    resource: op.resource(),
                });

                let remote = Arc::clone(&self.remote);
                let deadline = self.config.call_timeout();
                calls.spawn(async move {
                    let request = ApplyRequest::from_operation(&op);
                    let result = match timeout(deadline, remote.apply(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(RemoteError::Timeout),
                    };
                    (op, result)
                });
            }
            if calls.is_empty() {
                return Ok(());
            }

            let mut first_error = None;
            while let Some(joined) = calls.join_next().await {
                let settled = match joined {
                    Ok((op, result)) => self.settle(&op, result),
                    Err(e) => Err(SyncError::Task(e.to_string())),
                };
                match settled {
                    Ok(outcome) => report.record(outcome),
                    Err(e) => {
                        error!(error = %e, "failed to record sync outcome");
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        }
    }

    /// Move an operation to `processing`. `None` if it changed since it
    /// was listed (cancelled, or claimed elsewhere).
    fn claim(&self, op: &Operation) -> Result<Option<Operation>> {
        let patch = OpPatch::against(op).status(OpStatus::Processing);
        match self.store.update(&op.id, &patch) {
            Ok(claimed) => Ok(Some(claimed)),
            Err(
                sq_core::Error::StaleUpdate { .. }
                | sq_core::Error::OperationNotFound(_)
                | sq_core::Error::InvalidTransition { .. },
            ) => {
                debug!(id = %op.id, "operation changed before dispatch, skipping");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record the result of one remote call, then announce it.
    fn settle(&self, op: &Operation, result: std::result::Result<Applied, RemoteError>) -> Result<Outcome> {
        let error = match result {
            Ok(applied) => return self.complete(op, applied),
            Err(error) => error,
        };
        let last_error = LastError::new(error.class(), error.to_string());

        match error.class() {
            ErrorClass::TransientNetwork | ErrorClass::Server => self.retry_or_fail(op, last_error),
            ErrorClass::Validation => {
                self.store.update(
                    &op.id,
                    &OpPatch::against(op)
                        .status(OpStatus::Failed)
                        .last_error(Some(last_error.clone())),
                )?;
                warn!(id = %op.id, error = %last_error, "operation rejected");
                self.emit(SyncEvent::OperationFailed {
                    id: op.id.clone(),
                    error: last_error,
                });
                Ok(Outcome::Failed)
            }
            ErrorClass::Conflict => {
                self.store.update(
                    &op.id,
                    &OpPatch::against(op)
                        .status(OpStatus::Conflicted)
                        .last_error(Some(last_error)),
                )?;
                let (current_version, message) = match error {
                    RemoteError::Conflict {
                        current_version,
                        message,
                    } => (current_version, message),
                    other => (0, other.to_string()),
                };
                warn!(id = %op.id, current_version, "operation conflicted");
                self.emit(SyncEvent::OperationConflicted {
                    id: op.id.clone(),
                    current_version,
                    message,
                });
                Ok(Outcome::Conflicted)
            }
            ErrorClass::Auth => {
                self.store.update(
                    &op.id,
                    &OpPatch::against(op)
                        .status(OpStatus::Pending)
                        .last_error(Some(last_error.clone())),
                )?;
                self.pause(&last_error.message);
                Ok(Outcome::Deferred)
            }
        }
    }

    fn complete(&self, op: &Operation, applied: Applied) -> Result<Outcome> {
        let remapped = self.store.transaction(|tx| {
            let mut patch = OpPatch::against(op)
                .status(OpStatus::Completed)
                .last_error(None);
            if let Some(server_id) = &applied.server_id {
                patch = patch.server_id(server_id.clone());
            }
            tx.update(&op.id, &patch)?;

            match &applied.server_id {
                Some(server_id) if op.creates_temporary_resource() => {
                    tx.remap_resource(&op.resource_kind, &op.resource_id, server_id)
                }
                _ => Ok(0),
            }
        })?;

        if let (Some(server_id), true) = (&applied.server_id, op.creates_temporary_resource()) {
            info!(
                temp_id = %op.resource_id,
                %server_id,
                remapped,
                "temporary id resolved"
            );
        }
        debug!(id = %op.id, version = applied.version, replayed = applied.replayed, "operation completed");
        self.emit(SyncEvent::OperationCompleted {
            id: op.id.clone(),
            server_id: applied.server_id,
            replayed: applied.replayed,
        });
        Ok(Outcome::Completed)
    }

    fn retry_or_fail(&self, op: &Operation, last_error: LastError) -> Result<Outcome> {
        let attempt = op.retry_count.saturating_add(1);

        if attempt >= op.max_retries {
            self.store.update(
                &op.id,
                &OpPatch::against(op)
                    .status(OpStatus::Failed)
                    .retry_count(attempt)
                    .last_error(Some(last_error.clone())),
            )?;
            warn!(id = %op.id, attempts = attempt, error = %last_error, "operation failed after retries");
            self.emit(SyncEvent::OperationFailed {
                id: op.id.clone(),
                error: last_error,
            });
            return Ok(Outcome::Failed);
        }

        let delay = self.config.backoff().delay(attempt, &mut *self.rng());
        let next_attempt_at =
            self.store.now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        let updated = self.store.update(
            &op.id,
            &OpPatch::against(op)
                .status(OpStatus::Pending)
                .retry_count(attempt)
                .next_attempt_at(next_attempt_at)
                .last_error(Some(last_error.clone())),
        )?;
        debug!(id = %op.id, attempt, delay_ms = delay.as_millis() as u64, error = %last_error, "operation will retry");
        self.emit(SyncEvent::OperationRetrying {
            id: op.id.clone(),
            attempt,
            next_attempt_at: updated.next_attempt_at,
        });
        Ok(Outcome::Retrying)
    }

    /// Where the engine rests after a drain.
    fn settled_state(&self) -> EngineState {
        if self.is_paused() {
            return EngineState::Paused;
        }
        match self.store.earliest_retry(self.store.now()) {
            Ok(Some(until)) => EngineState::BackoffWait { until },
            Ok(None) => EngineState::Idle,
            Err(e) => {
                warn!(error = %e, "failed to read retry schedule");
                EngineState::Idle
            }
        }
    }

    fn set_state(&self, next: EngineState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            debug!(state = %next, "engine state changed");
            self.emit(SyncEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
