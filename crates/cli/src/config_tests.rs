// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tempfile::TempDir;
use yare::parameterized;

#[test]
fn empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert!(config.remote.is_none());
    assert_eq!(config.engine, EngineConfig::default());
    assert_eq!(config.monitor, MonitorConfig::default());
    assert_eq!(config.queue_path(), default_queue_path());
}

#[test]
fn full_config_parses() {
    let config = Config::parse(
        r#"
queue_path = "/var/lib/syncq/q.db"

[remote]
url = "ws://localhost:7890"
token = "secret"

[engine]
concurrency = 2
max_retries = 3
sync_interval_secs = 0

[monitor]
debounce_ms = 500
"#,
    )
    .unwrap();

    assert_eq!(config.queue_path(), PathBuf::from("/var/lib/syncq/q.db"));
    let remote = config.remote().unwrap();
    assert_eq!(remote.url, "ws://localhost:7890");
    assert_eq!(remote.token.as_deref(), Some("secret"));
    assert_eq!(config.engine.concurrency, 2);
    assert_eq!(config.engine.max_retries, 3);
    assert_eq!(config.engine.sync_interval(), None);
    assert_eq!(config.monitor.debounce_ms, 500);
    assert_eq!(
        config.monitor.probe_interval_ms,
        MonitorConfig::default().probe_interval_ms
    );
}

#[test]
fn relative_queue_path_resolves_against_config_dir() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "queue_path = \"data/queue.db\"\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.queue_path(), temp.path().join("data/queue.db"));
}

#[test]
fn explicit_path_must_exist() {
    let temp = TempDir::new().unwrap();
    let err = Config::load(Some(&temp.path().join("missing.toml"))).unwrap_err();
    assert!(matches!(err, Error::Config(msg) if msg.contains("failed to read")));
}

#[test]
fn missing_remote_is_reported() {
    let config = Config::parse("").unwrap();
    assert!(matches!(config.remote(), Err(Error::RemoteRequired)));
}

#[parameterized(
    http_url = { "[remote]\nurl = \"http://localhost\"" },
    bad_jitter = { "[engine]\nbackoff_jitter = 1.5" },
    shrinking_backoff = { "[engine]\nbackoff_factor = 0.5" },
    wrong_type = { "[engine]\nconcurrency = \"four\"" },
)]
fn invalid_config_rejected(content: &str) {
    assert!(matches!(Config::parse(content), Err(Error::Config(_))));
}

#[test]
fn default_queue_path_ends_in_app_dir() {
    let path = default_queue_path();
    assert!(path.ends_with("syncq/queue.db"));
}
