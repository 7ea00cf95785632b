// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

fn test_request() -> ApplyRequest {
    ApplyRequest {
        resource_kind: "device".into(),
        resource_id: "device-1".into(),
        kind: OpKind::Update,
        payload: json!({"name": "PC2"}),
        base_version: Some(3),
        idempotency_key: "abc".into(),
    }
}

#[test]
fn apply_message_format() {
    let msg = ClientMessage::apply(7, test_request());
    let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

    assert_eq!(json["type"], "apply");
    assert_eq!(json["request_id"], 7);
    assert_eq!(json["request"]["resourceKind"], "device");
    assert_eq!(json["request"]["kind"], "update");
    assert_eq!(json["request"]["baseVersion"], 3);
    assert_eq!(json["request"]["idempotencyKey"], "abc");
}

#[test]
fn hello_without_token_omits_field() {
    let json = ClientMessage::hello(None).to_json().unwrap();
    assert_eq!(json, r#"{"type":"hello"}"#);
    assert_eq!(ClientMessage::from_json(&json).unwrap(), ClientMessage::hello(None));
}

#[test]
fn ping_parses() {
    let msg = ClientMessage::from_json(r#"{"type":"ping","id":12345}"#).unwrap();
    assert_eq!(msg, ClientMessage::ping(12345));
}

#[parameterized(
    validation = { Rejection::validation("unknown resource"), "validation" },
    conflict = { Rejection::conflict(4, "stale"), "conflict" },
    server = { Rejection::server("disk"), "server" },
    unauthorized = { Rejection::unauthorized("bad token"), "unauthorized" },
)]
fn rejection_wire_kind(rejection: Rejection, kind: &str) {
    let msg = ServerMessage::rejected(9, rejection.clone());
    let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

    assert_eq!(json["type"], "rejected");
    assert_eq!(json["rejection"]["kind"], kind);
    assert_eq!(ServerMessage::from_json(&msg.to_json().unwrap()).unwrap(), msg);
    assert_eq!(msg.request_id(), Some(9));
}

#[test]
fn conflict_carries_current_version() {
    let json = r#"{"type":"rejected","request_id":1,"rejection":{"kind":"conflict","current_version":5,"message":"x"}}"#;
    match ServerMessage::from_json(json).unwrap() {
        ServerMessage::Rejected {
            rejection: Rejection::Conflict { current_version, .. },
            ..
        } => assert_eq!(current_version, 5),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn applied_without_server_id() {
    let msg = ServerMessage::from_json(r#"{"type":"applied","request_id":2,"version":1,"replayed":false}"#)
        .unwrap();
    assert_eq!(msg, ServerMessage::applied(2, None, 1, false));
    assert_eq!(ServerMessage::pong(1).request_id(), None);
}

#[test]
fn unknown_message_type_is_an_error() {
    assert!(ServerMessage::from_json(r#"{"type":"snapshot"}"#).is_err());
    assert!(ClientMessage::from_json("not json").is_err());
}

#[test]
fn request_from_operation_copies_replay_fields() {
    let now = chrono::Utc::now();
    let op = Operation {
        id: "op-1".into(),
        resource_kind: "device".into(),
        resource_id: "device-1".into(),
        kind: OpKind::Update,
        payload: json!({"name": "PC2"}),
        base_version: Some(3),
        idempotency_key: "abc".into(),
        status: crate::op::OpStatus::Processing,
        retry_count: 0,
        max_retries: 5,
        next_attempt_at: now,
        last_error: None,
        server_id: None,
        sequence_in_resource: 1,
        created_at: now,
        updated_at: now,
    };

    assert_eq!(ApplyRequest::from_operation(&op), test_request());
}
