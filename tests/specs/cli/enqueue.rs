// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `syncq enqueue` and `syncq pending`.

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
fn create_without_id_gets_temporary_id() {
    let temp = init_temp();
    syncq(&temp)
        .args(["enqueue", "create", "device", "--payload", r#"{"name":"PC1"}"#])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Queued create device/tmp-"));
    assert!(temp.path().join("queue.db").exists());
}

#[test]
fn update_is_recorded_offline() {
    let temp = init_temp();
    syncq(&temp)
        .args(["enqueue", "update", "device", "device-1", "-p", r#"{"name":"PC2"}"#])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Queued update device/device-1: "));

    syncq(&temp)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("update device/device-1"))
        .stdout(predicate::str::contains("[pending] attempts 0/5"));
}

#[test]
fn pending_keeps_enqueue_order() {
    let temp = init_temp();
    for name in ["PC1", "PC2", "PC3"] {
        syncq(&temp)
            .args(["enqueue", "update", "device", "d1", "--payload"])
            .arg(format!(r#"{{"name":"{}"}}"#, name))
            .assert()
            .success();
    }
    syncq(&temp)
        .args(["enqueue", "delete", "device", "d2"])
        .assert()
        .success();

    let output = syncq(&temp).arg("pending").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[..3].iter().all(|l| l.contains("update device/d1")));
    assert!(lines[3].contains("delete device/d2"));
}

#[test]
fn pending_on_empty_queue() {
    let temp = init_temp();
    syncq(&temp)
        .arg("pending")
        .assert()
        .success()
        .stdout("No pending operations\n");
}

#[parameterized(
    update_without_id = { &["enqueue", "update", "device"], "update requires a resource id" },
    delete_without_id = { &["enqueue", "delete", "device"], "delete requires a resource id" },
    array_payload = { &["enqueue", "create", "device", "--payload", "[1]"], "payload must be a JSON object" },
    malformed_payload = { &["enqueue", "create", "device", "--payload", "{name"], "invalid payload" },
    content_key_on_update = { &["enqueue", "update", "device", "d1", "--content-key"], "only creates can be content-idempotent" },
)]
fn malformed_intent_fails(args: &[&str], message: &str) {
    let temp = init_temp();
    syncq(&temp)
        .args(args)
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error: "))
        .stderr(predicate::str::contains(message));
}

#[test]
fn unknown_kind_is_a_usage_error() {
    let temp = init_temp();
    syncq(&temp)
        .args(["enqueue", "upsert", "device", "d1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'upsert'"));
}
