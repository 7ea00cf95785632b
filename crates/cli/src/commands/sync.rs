// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Commands that talk to the remote store.

use std::sync::Arc;

use sq_engine::{DrainReport, EngineState, RemoteConfig, SyncEvent, SyncQueue, WsRemoteStore};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{open_store, WorkerLock};
use crate::config::Config;
use crate::error::Result;

/// Replay whatever is due once, then exit.
pub fn sync(config: &Config) -> Result<()> {
    let remote = config.remote()?.clone();
    let _lock = WorkerLock::acquire(&config.queue_path())?;
    let runtime = tokio::runtime::Runtime::new()?;
    let (report, state) = runtime.block_on(sync_async(config, remote))?;
    print!("{}", render_report(&report, state));
    Ok(())
}

async fn sync_async(config: &Config, remote: RemoteConfig) -> Result<(DrainReport, EngineState)> {
    let remote = Arc::new(WsRemoteStore::new(remote));
    let queue = SyncQueue::new(
        open_store(config)?,
        remote.clone(),
        config.engine.clone(),
        config.monitor.clone(),
    )?;
    let report = queue.sync_now().await;
    remote.disconnect().await;
    Ok((report?, queue.engine_state()))
}

/// Summary of one sync pass.
pub fn render_report(report: &DrainReport, state: EngineState) -> String {
    if report.skipped {
        return format!("Sync skipped ({})\n", state);
    }
    let mut out = format!(
        "Synced {} operation(s): {} completed, {} retrying, {} failed, {} conflicted\n",
        report.dispatched, report.completed, report.retried, report.failed, report.conflicted
    );
    if report.deferred > 0 || state == EngineState::Paused {
        out.push_str("Authentication rejected: check [remote] token\n");
    }
    out.push_str(&format!("State: {}\n", state));
    out
}

/// Run the sync worker until Ctrl-C.
pub fn run(config: &Config) -> Result<()> {
    let remote = config.remote()?.clone();
    let _lock = WorkerLock::acquire(&config.queue_path())?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_async(config, remote))
}

async fn run_async(config: &Config, remote_config: RemoteConfig) -> Result<()> {
    let url = remote_config.url.clone();
    let remote = Arc::new(WsRemoteStore::new(remote_config));
    let queue = SyncQueue::new(
        open_store(config)?,
        remote.clone(),
        config.engine.clone(),
        config.monitor.clone(),
    )?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let mut events = queue.subscribe();
    let logger = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => log_event(&event),
                        Err(RecvError::Lagged(missed)) => debug!(missed, "event log lagged"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        }
    });

    info!(
        queue = %config.queue_path().display(),
        remote = %url,
        pending = queue.status().outstanding(),
        "syncq worker running, press Ctrl-C to stop"
    );
    let result = queue.run(cancel.clone()).await;

    cancel.cancel();
    let _ = logger.await;
    remote.disconnect().await;
    Ok(result?)
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::OperationStarted { id, resource } => debug!(%id, %resource, "replaying"),
        SyncEvent::OperationCompleted {
            id,
            server_id,
            replayed,
        } => info!(%id, server_id = server_id.as_deref(), replayed, "synced"),
        SyncEvent::OperationRetrying {
            id,
            attempt,
            next_attempt_at,
        } => warn!(%id, attempt, next = %next_attempt_at.to_rfc3339(), "will retry"),
        SyncEvent::OperationFailed { id, error } => warn!(%id, %error, "failed"),
        SyncEvent::OperationConflicted {
            id,
            current_version,
            message,
        } => warn!(%id, current_version, %message, "conflict"),
        SyncEvent::StateChanged(EngineState::Paused) => {
            error!("authentication rejected, syncing paused: fix [remote] token and restart")
        }
        SyncEvent::StateChanged(state) => debug!(%state, "engine"),
        SyncEvent::NetworkChanged(state) => info!(%state, "network"),
        SyncEvent::QueueChanged(status) => debug!(
            pending = status.pending,
            failed = status.failed,
            conflicted = status.conflicted,
            "queue"
        ),
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
