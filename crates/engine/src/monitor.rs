// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reachability monitoring.
//!
//! Connectivity is judged by a genuine round trip to the remote store, not
//! by an OS flag. Observations pass through a [`Debouncer`] so a link that
//! flaps inside the debounce window publishes at most one transition.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tokio::time::{timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::remote::{RemoteError, RemoteStore};

/// Reachability of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    Offline,
    Online,
    /// Reachable, but slow or unhealthy.
    Degraded,
}

impl NetworkState {
    /// Degraded links still carry traffic.
    pub fn is_online(self) -> bool {
        matches!(self, NetworkState::Online | NetworkState::Degraded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NetworkState::Offline => "offline",
            NetworkState::Online => "online",
            NetworkState::Degraded => "degraded",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            NetworkState::Offline => 0,
            NetworkState::Online => 1,
            NetworkState::Degraded => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => NetworkState::Online,
            2 => NetworkState::Degraded,
            _ => NetworkState::Offline,
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published change of reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkEvent {
    pub from: NetworkState,
    pub to: NetworkState,
}

/// Holds back state changes until they persist for a window.
///
/// The first observation is published immediately; there is nothing to
/// debounce against yet.
#[derive(Debug)]
pub struct Debouncer {
    published: Option<NetworkState>,
    candidate: Option<(NetworkState, Instant)>,
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            published: None,
            candidate: None,
            window,
        }
    }

    pub fn published(&self) -> Option<NetworkState> {
        self.published
    }

    /// When the pending candidate becomes publishable, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.candidate.map(|(_, since)| since + self.window)
    }

    /// Feed one observation. Returns the state to publish, if any.
    pub fn observe(&mut self, state: NetworkState, now: Instant) -> Option<NetworkState> {
        if self.published.is_none() {
            self.published = Some(state);
            return Some(state);
        }
        if self.published == Some(state) {
            self.candidate = None;
            return None;
        }
        match self.candidate {
            Some((candidate, _)) if candidate == state => {}
            _ => self.candidate = Some((state, now)),
        }
        self.settle(now)
    }

    /// Publish the candidate if it has held for the whole window.
    pub fn settle(&mut self, now: Instant) -> Option<NetworkState> {
        let (state, since) = self.candidate?;
        if now.saturating_duration_since(since) < self.window {
            return None;
        }
        self.candidate = None;
        self.published = Some(state);
        Some(state)
    }
}

/// Probes the remote store and publishes debounced reachability.
pub struct NetworkMonitor {
    remote: Arc<dyn RemoteStore>,
    config: MonitorConfig,
    state: AtomicU8,
    debouncer: Mutex<Debouncer>,
    hint: Notify,
    events: broadcast::Sender<NetworkEvent>,
}

impl NetworkMonitor {
    pub fn new(remote: Arc<dyn RemoteStore>, config: MonitorConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        NetworkMonitor {
            remote,
            debouncer: Mutex::new(Debouncer::new(config.debounce())),
            config,
            state: AtomicU8::new(NetworkState::Offline.to_u8()),
            hint: Notify::new(),
            events,
        }
    }

    /// Last published state; `Offline` until the first probe.
    pub fn state(&self) -> NetworkState {
        NetworkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    /// An OS-level connectivity change. Only schedules an immediate probe.
    pub fn report_hint(&self, online: bool) {
        debug!(online, "connectivity hint");
        self.hint.notify_one();
    }

    /// Classify one round trip without publishing anything.
    pub async fn probe(&self) -> NetworkState {
        let started = Instant::now();
        let outcome = timeout(self.config.probe_timeout(), self.remote.probe()).await;
        let rtt = started.elapsed();

        match outcome {
            Err(_) => {
                debug!("probe timed out");
                NetworkState::Offline
            }
            // A credentials problem still proves the store answered
            Ok(Ok(())) | Ok(Err(RemoteError::Auth(_))) => {
                if rtt > self.config.degraded_rtt() {
                    NetworkState::Degraded
                } else {
                    NetworkState::Online
                }
            }
            Ok(Err(RemoteError::Server(message))) => {
                debug!(%message, "probe answered with a server error");
                NetworkState::Degraded
            }
            Ok(Err(e)) => {
                debug!(error = %e, "probe failed");
                NetworkState::Offline
            }
        }
    }

    /// Probe once and feed the result through the debouncer.
    pub async fn check(&self) -> Option<NetworkEvent> {
        let observed = self.probe().await;
        let publish = self.debouncer().observe(observed, Instant::now());
        publish.map(|to| self.publish(to))
    }

    fn settle(&self) -> Option<NetworkEvent> {
        let publish = self.debouncer().settle(Instant::now());
        publish.map(|to| self.publish(to))
    }

    fn publish(&self, to: NetworkState) -> NetworkEvent {
        let from = NetworkState::from_u8(self.state.swap(to.to_u8(), Ordering::AcqRel));
        let event = NetworkEvent { from, to };
        info!(%from, %to, "network state changed");
        let _ = self.events.send(event);
        event
    }

    fn debouncer(&self) -> MutexGuard<'_, Debouncer> {
        self.debouncer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Probe periodically until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let interval = self.config.probe_interval();
        let mut next_probe = Instant::now();

        loop {
            let wake = match self.debouncer().deadline() {
                Some(deadline) => deadline.min(next_probe),
                None => next_probe,
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.hint.notified() => next_probe = Instant::now(),
                _ = tokio::time::sleep_until(wake) => {}
            }

            if Instant::now() >= next_probe {
                self.check().await;
                next_probe = Instant::now() + interval;
            } else {
                self.settle();
            }
        }
        debug!("network monitor stopped");
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
