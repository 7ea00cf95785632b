// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `syncq status`, `failed`, `conflicted` and global flags.

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

fn init_temp() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("syncq.toml"), "queue_path = \"queue.db\"\n").unwrap();
    temp
}

#[test]
fn status_of_empty_queue() {
    let temp = init_temp();
    syncq(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pending:    0"))
        .stdout(predicate::str::contains("Unsynced:   0 bytes"))
        .stdout(predicate::str::contains("Recent errors").not());
}

#[test]
fn status_json_counts_pending_work() {
    let temp = init_temp();
    for id in ["d1", "d2"] {
        syncq(&temp)
            .args(["enqueue", "update", "device", id, "--payload", r#"{"name":"PC2"}"#])
            .assert()
            .success();
    }

    let output = syncq(&temp).args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["pending"], 2);
    assert_eq!(status["completed"], 0);
    assert_eq!(status["total"], 2);
    assert!(status["payloadBytes"].as_u64().unwrap() > 0);
    assert_eq!(status["recentErrors"], serde_json::json!([]));
}

#[parameterized(
    failed = { "failed", "No failed operations\n" },
    conflicted = { "conflicted", "No conflicted operations\n" },
)]
fn empty_lists(command: &str, expected: &str) {
    let temp = init_temp();
    syncq(&temp).arg(command).assert().success().stdout(expected.to_string());
}

#[test]
fn missing_config_file_fails() {
    let temp = TempDir::new().unwrap();
    syncq(&temp)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config error: failed to read"));
}

#[test]
fn malformed_config_fails() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("syncq.toml"), "[engine]\nconcurrency = \"four\"\n").unwrap();
    syncq(&temp)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config"));
}

#[parameterized(
    long_version = { "--version" },
    short_v = { "-v" },
    silent_v = { "-V" },
)]
fn version_flag_outputs_version(flag: &str) {
    cargo_bin_cmd!("syncq")
        .arg(flag)
        .assert()
        .success()
        .stdout(predicate::str::contains("syncq"))
        .stdout(predicate::str::is_match(r"[0-9]+\.[0-9]+\.[0-9]+").unwrap());
}

#[test]
fn help_lists_commands() {
    let mut assert = cargo_bin_cmd!("syncq").arg("--help").assert().success();
    for command in [
        "enqueue", "status", "pending", "failed", "conflicted", "sync", "retry", "clear",
        "cancel", "run",
    ] {
        assert = assert.stdout(predicate::str::contains(command));
    }
}
