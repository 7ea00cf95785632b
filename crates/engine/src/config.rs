// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tunables for the engine, the network monitor and the remote connection.
//!
//! All three deserialize from TOML tables with every field optional, so a
//! host config only has to name what it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sq_core::backoff::BackoffPolicy;
use sq_core::builder::DEFAULT_MAX_RETRIES;

/// A century; keeps the retention window inside chrono's range.
const MAX_RETENTION_HOURS: u64 = 24 * 365 * 100;

/// Drain loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Remote calls in flight per pass, one per resource.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Attempts before an operation with transient failures is `failed`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Deadline for a single remote call in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Periodic drain while online, in seconds. 0 = disabled.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// How long completed operations are kept, in hours.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Uniform jitter as a fraction of the nominal delay (0.2 = ±20%).
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_retention_hours() -> u64 {
    24
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_backoff_cap_ms() -> u64 {
    60_000
}

fn default_backoff_jitter() -> f64 {
    0.2
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            call_timeout_ms: default_call_timeout_ms(),
            sync_interval_secs: default_sync_interval_secs(),
            retention_hours: default_retention_hours(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
            backoff_cap_ms: default_backoff_cap_ms(),
            backoff_jitter: default_backoff_jitter(),
        }
    }
}

impl EngineConfig {
    /// The retry delay policy these settings describe.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.backoff_base_ms),
            factor: self.backoff_factor,
            cap: Duration::from_millis(self.backoff_cap_ms),
            jitter: self.backoff_jitter.clamp(0.0, 1.0),
        }
    }

    /// Dispatch width, never below one.
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// `None` when the periodic drain is disabled.
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours.min(MAX_RETENTION_HOURS) as i64)
    }
}

/// Reachability probing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Time between probes in milliseconds.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    /// A probe that takes longer than this counts as a failure.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Round trips slower than this classify the link as degraded.
    #[serde(default = "default_degraded_rtt_ms")]
    pub degraded_rtt_ms: u64,
    /// A new state must hold this long before it is published.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_probe_interval_ms() -> u64 {
    5_000
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

fn default_degraded_rtt_ms() -> u64 {
    1_500
}

fn default_debounce_ms() -> u64 {
    2_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            degraded_rtt_ms: default_degraded_rtt_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn degraded_rtt(&self) -> Duration {
        Duration::from_millis(self.degraded_rtt_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Where the authoritative store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// WebSocket URL, `ws://` or `wss://`.
    pub url: String,
    /// Bearer token sent in the hello handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Max time to connect and complete the handshake, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        RemoteConfig {
            url: url.into(),
            token: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns an error message if the URL is not a WebSocket URL.
    pub fn validate_url(&self) -> Option<String> {
        if self.url.starts_with("ws://") || self.url.starts_with("wss://") {
            return None;
        }
        Some(format!(
            "invalid remote URL '{}': must be ws:// or wss://",
            self.url
        ))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
