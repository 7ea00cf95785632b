// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `syncq sync` and `syncq run` without a reachable remote store.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use yare::parameterized;

fn syncq(temp: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("syncq");
    cmd.arg("--config")
        .arg(temp.path().join("syncq.toml"))
        .env("RUST_LOG", "warn");
    cmd
}

fn init_temp(extra: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("syncq.toml"),
        format!("queue_path = \"queue.db\"\n{}", extra),
    )
    .unwrap();
    temp
}

/// A remote section pointing at a port nothing listens on.
fn unreachable_remote() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("[remote]\nurl = \"ws://127.0.0.1:{}\"\nconnect_timeout_ms = 1000\n", port)
}

#[parameterized(
    sync = { "sync" },
    run = { "run" },
)]
fn requires_remote(command: &str) {
    let temp = init_temp("");
    syncq(&temp)
        .arg(command)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no remote configured"))
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn rejects_non_websocket_url() {
    let temp = init_temp("[remote]\nurl = \"http://localhost:7890\"\n");
    syncq(&temp)
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be ws:// or wss://"));
}

#[test]
fn sync_with_nothing_queued() {
    let temp = init_temp(&unreachable_remote());
    syncq(&temp)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Synced 0 operation(s)"))
        .stdout(predicate::str::contains("State: idle"));
}

#[test]
fn unreachable_remote_keeps_work_queued() {
    let temp = init_temp(&unreachable_remote());
    syncq(&temp)
        .args(["enqueue", "update", "device", "device-1", "--payload", r#"{"name":"PC2"}"#])
        .assert()
        .success();

    syncq(&temp)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 retrying"))
        .stdout(predicate::str::contains("State: backoff-wait until"));

    syncq(&temp)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("attempts 1/5"))
        .stdout(predicate::str::contains("transient_network"));

    syncq(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pending:    1"))
        .stdout(predicate::str::contains("device/device-1 [pending] transient_network"));
}
