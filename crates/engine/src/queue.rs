// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The public control surface.
//!
//! [`SyncQueue`] ties the store, the engine and the network monitor
//! together. Calls return as soon as the store has committed; replay to the
//! remote store happens in [`SyncQueue::run`], which reacts to network
//! transitions, the periodic timer, backoff wake-ups and explicit triggers.

use std::sync::{Arc, Weak};

use sq_core::projector::{project, DEFAULT_RECENT_ERRORS};
use sq_core::{ChangeListener, Intent, OpStatus, Operation, OperationBuilder, QueueStatus, QueueStore, StoreChange};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, MonitorConfig};
use crate::engine::{DrainReport, SyncEngine};
use crate::error::Result;
use crate::events::{EngineState, SyncEvent};
use crate::monitor::{NetworkMonitor, NetworkState};
use crate::remote::RemoteStore;

const EVENT_CAPACITY: usize = 256;

/// Recomputes the status snapshot after every committed store change.
struct StatusPublisher {
    store: Weak<QueueStore>,
    status: watch::Sender<QueueStatus>,
    events: broadcast::Sender<SyncEvent>,
}

impl ChangeListener for StatusPublisher {
    fn on_commit(&self, _changes: &[StoreChange]) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        match project(&store, DEFAULT_RECENT_ERRORS) {
            Ok(snapshot) => {
                self.status.send_replace(snapshot.clone());
                let _ = self.events.send(SyncEvent::QueueChanged(snapshot));
            }
            Err(e) => warn!(error = %e, "failed to recompute queue status"),
        }
    }
}

/// Offline-first operation queue with background replay.
pub struct SyncQueue {
    store: Arc<QueueStore>,
    builder: OperationBuilder,
    engine: Arc<SyncEngine>,
    monitor: Arc<NetworkMonitor>,
    config: EngineConfig,
    events: broadcast::Sender<SyncEvent>,
    status: watch::Receiver<QueueStatus>,
    trigger: Notify,
}

impl SyncQueue {
    /// Wire a queue over an open store.
    ///
    /// Operations a crash left in `processing` are returned to `pending`
    /// first; their retry replays the same idempotency key.
    pub fn new(
        store: Arc<QueueStore>,
        remote: Arc<dyn RemoteStore>,
        config: EngineConfig,
        monitor_config: MonitorConfig,
    ) -> Result<Self> {
        let recovered = store.recover_interrupted()?;
        if recovered > 0 {
            warn!(recovered, "requeued operations interrupted mid-flight");
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, status) = watch::channel(project(&store, DEFAULT_RECENT_ERRORS)?);
        store.add_listener(Arc::new(StatusPublisher {
            store: Arc::downgrade(&store),
            status: status_tx,
            events: events.clone(),
        }));

        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            config.clone(),
            events.clone(),
        ));
        let monitor = Arc::new(NetworkMonitor::new(remote, monitor_config));

        Ok(SyncQueue {
            store,
            builder: OperationBuilder::new(config.max_retries),
            engine,
            monitor,
            config,
            events,
            status,
            trigger: Notify::new(),
        })
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    /// Persist an intent and return the new operation id.
    ///
    /// Never waits on the network; pokes the worker when online.
    pub fn enqueue(&self, intent: Intent) -> Result<String> {
        let op = self.store.enqueue(&self.builder, intent)?;
        debug!(id = %op.id, resource = %op.resource(), kind = %op.kind, "enqueued");
        if self.monitor.is_online() {
            self.trigger.notify_one();
        }
        Ok(op.id)
    }

    /// Ask the worker to drain now, whatever the network state.
    ///
    /// No effect while paused until [`SyncQueue::resume`].
    pub fn force_sync(&self) {
        if self.engine.is_paused() {
            debug!("force sync while paused");
        }
        self.trigger.notify_one();
    }

    /// Drain in the caller's task and report what happened.
    pub async fn sync_now(&self) -> Result<DrainReport> {
        self.engine.drain().await
    }

    /// Return every failed operation to pending. A no-op without failures.
    pub fn retry_all_failed(&self) -> Result<usize> {
        let reset = self.store.reset_failed()?;
        if reset > 0 {
            info!(reset, "retrying failed operations");
            self.trigger.notify_one();
        }
        Ok(reset)
    }

    /// Remove completed operations older than the retention window.
    pub fn clear_completed(&self) -> Result<usize> {
        let cutoff = self.store.now() - self.config.retention();
        Ok(self.store.remove_completed_older_than(cutoff)?)
    }

    /// Remove every completed operation.
    pub fn clear_all_completed(&self) -> Result<usize> {
        Ok(self.store.remove_all_completed()?)
    }

    /// Drop a pending operation. Anything already dispatched or finished is
    /// not cancellable.
    pub fn cancel(&self, id: &str) -> Result<Operation> {
        let op = self.store.remove_pending(id)?;
        info!(id, resource = %op.resource(), "cancelled");
        Ok(op)
    }

    /// Operations not yet settled (pending or in flight), oldest first.
    pub fn pending_operations(&self) -> Result<Vec<Operation>> {
        let mut ops = self.store.list_by_status(OpStatus::Pending)?;
        ops.extend(self.store.list_by_status(OpStatus::Processing)?);
        ops.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(ops)
    }

    pub fn failed_operations(&self) -> Result<Vec<Operation>> {
        Ok(self.store.list_by_status(OpStatus::Failed)?)
    }

    pub fn conflicted_operations(&self) -> Result<Vec<Operation>> {
        Ok(self.store.list_by_status(OpStatus::Conflicted)?)
    }

    /// Payload bytes still waiting to reach the remote store.
    pub fn total_size(&self) -> Result<u64> {
        Ok(self.store.outstanding_payload_bytes()?)
    }

    /// Latest status snapshot.
    pub fn status(&self) -> QueueStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<QueueStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn network(&self) -> NetworkState {
        self.monitor.state()
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    /// Resume after re-authentication and drain.
    pub fn resume(&self) {
        if self.engine.resume() {
            self.trigger.notify_one();
        }
    }

    /// Run the worker until `cancel` fires.
    ///
    /// Stops early only when the store itself fails.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        // Subscribe before the first probe can publish
        let mut network = self.monitor.subscribe();
        let monitor_cancel = cancel.child_token();
        let monitor_task = tokio::spawn({
            let monitor = Arc::clone(&self.monitor);
            let cancel = monitor_cancel.clone();
            async move { monitor.run(cancel).await }
        });
        let mut ticker = self.config.sync_interval().map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        info!("sync worker started");

        let result = loop {
            let wake = self.retry_wakeup();
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),

                _ = self.trigger.notified() => {}

                event = network.recv() => match event {
                    Ok(event) => {
                        let _ = self.events.send(SyncEvent::NetworkChanged(event.to));
                        if !event.to.is_online() {
                            continue;
                        }
                    }
                    Err(RecvError::Lagged(_)) => {
                        if !self.monitor.is_online() {
                            continue;
                        }
                    }
                    Err(RecvError::Closed) => break Ok(()),
                },

                _ = tick(&mut ticker) => {
                    if !self.monitor.is_online() {
                        continue;
                    }
                }

                _ = sleep_until(wake) => {
                    if !self.monitor.is_online() {
                        continue;
                    }
                }
            }

            if let Err(e) = self.engine.drain().await {
                if e.is_storage() {
                    error!(error = %e, "queue store failed, stopping sync worker");
                    break Err(e);
                }
                warn!(error = %e, "sync pass failed");
            }
        };

        monitor_cancel.cancel();
        let _ = monitor_task.await;
        info!("sync worker stopped");
        result
    }

    /// When the engine's scheduled retry becomes due, on the runtime clock.
    fn retry_wakeup(&self) -> Option<Instant> {
        let EngineState::BackoffWait { until } = self.engine.state() else {
            return None;
        };
        let wait = (until - self.store.now()).to_std().unwrap_or_default();
        Some(Instant::now() + wait)
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
