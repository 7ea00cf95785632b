// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! CLI configuration.
//!
//! Configuration is read from `syncq.toml`:
//! - `queue_path`: where the queue database lives (relative paths resolve
//!   against the config file's directory)
//! - `[remote]`: the authoritative store to replay against
//! - `[engine]` and `[monitor]`: drain loop and reachability tuning

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use sq_engine::{EngineConfig, MonitorConfig, RemoteConfig};

use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "syncq.toml";
const APP_DIR_NAME: &str = "syncq";
const QUEUE_FILE_NAME: &str = "queue.db";

/// Contents of `syncq.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Queue database location. Defaults to the user data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_path: Option<PathBuf>,
    /// Remote store (optional; without it the queue only records work).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Directory the config was loaded from.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Config {
    /// Defaults with the queue stored at `path`.
    pub fn with_queue_path(path: impl Into<PathBuf>) -> Self {
        Config {
            queue_path: Some(path.into()),
            ..Config::default()
        }
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise `./syncq.toml`, then
    /// `<config dir>/syncq/syncq.toml` are tried, falling back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }
        for candidate in default_locations() {
            if candidate.is_file() {
                return Self::load_file(&candidate);
            }
        }
        Ok(Config::default())
    }

    /// Parse one config file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(remote) = &self.remote {
            if let Some(message) = remote.validate_url() {
                return Err(Error::Config(message));
            }
        }
        if !(0.0..=1.0).contains(&self.engine.backoff_jitter) {
            return Err(Error::Config(format!(
                "engine.backoff_jitter must be between 0 and 1, got {}",
                self.engine.backoff_jitter
            )));
        }
        if self.engine.backoff_factor < 1.0 {
            return Err(Error::Config(format!(
                "engine.backoff_factor must be at least 1, got {}",
                self.engine.backoff_factor
            )));
        }
        Ok(())
    }

    /// Where the queue database lives.
    pub fn queue_path(&self) -> PathBuf {
        match &self.queue_path {
            Some(path) if path.is_relative() => match &self.base_dir {
                Some(base) => base.join(path),
                None => path.clone(),
            },
            Some(path) => path.clone(),
            None => default_queue_path(),
        }
    }

    /// The configured remote, or [`Error::RemoteRequired`].
    pub fn remote(&self) -> Result<&RemoteConfig> {
        self.remote.as_ref().ok_or(Error::RemoteRequired)
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    locations
}

/// `$XDG_DATA_HOME/syncq/queue.db` or the platform equivalent.
pub fn default_queue_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/share").join(APP_DIR_NAME)))
        .unwrap_or_else(|| PathBuf::from(".syncq"))
        .join(QUEUE_FILE_NAME)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
