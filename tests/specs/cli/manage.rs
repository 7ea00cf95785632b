// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `syncq retry`, `clear` and `cancel`.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

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

/// Enqueue an update and return the new operation id.
fn enqueue(temp: &TempDir, id: &str) -> String {
    let output = syncq(temp)
        .args(["enqueue", "update", "device", id, "--payload", r#"{"name":"x"}"#])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.trim().rsplit(": ").next().unwrap().to_string()
}

#[test]
fn retry_without_failures_is_a_no_op() {
    let temp = init_temp();
    enqueue(&temp, "d1");
    syncq(&temp)
        .arg("retry")
        .assert()
        .success()
        .stdout("No failed operations\n");
    syncq(&temp)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("attempts 0/5"));
}

#[test]
fn clear_keeps_unsynced_work() {
    let temp = init_temp();
    enqueue(&temp, "d1");
    syncq(&temp)
        .arg("clear")
        .assert()
        .success()
        .stdout("Removed 0 completed operation(s)\n");
    syncq(&temp)
        .args(["clear", "--all"])
        .assert()
        .success()
        .stdout("Removed 0 completed operation(s)\n");
    syncq(&temp)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("update device/d1"));
}

#[test]
fn cancel_drops_pending_operation() {
    let temp = init_temp();
    let id = enqueue(&temp, "d1");
    let keep = enqueue(&temp, "d2");

    syncq(&temp)
        .args(["cancel", &id])
        .assert()
        .success()
        .stdout(format!("Cancelled update device/d1: {}\n", id));

    syncq(&temp)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains(keep.as_str()))
        .stdout(predicate::str::contains(id.as_str()).not());
}

#[test]
fn cancel_twice_fails() {
    let temp = init_temp();
    let id = enqueue(&temp, "d1");
    syncq(&temp).args(["cancel", &id]).assert().success();
    syncq(&temp)
        .args(["cancel", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains(format!("operation not found: {}", id)));
}
