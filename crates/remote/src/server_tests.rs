// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server tests over real WebSocket connections.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use sq_core::protocol::ApplyRequest;
use sq_core::OpKind;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::*;
use crate::authority::Authority;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A test server that runs on a random port and can be controlled.
struct TestServer {
    addr: SocketAddr,
    state: ServerState,
    cancel: CancellationToken,
}

impl TestServer {
    async fn start(token: Option<&str>) -> Self {
        let state = ServerState::new(Authority::in_memory(), token.map(String::from));

        // Bind to port 0 to get a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();

        tokio::spawn(serve(listener, state.clone(), cancel.clone()));

        TestServer {
            addr,
            state,
            cancel,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    async fn client(&self) -> Client {
        let (ws, _) = connect_async(&self.ws_url()).await.unwrap();
        let (sink, stream) = ws.split();
        Client { sink, stream }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Client {
    sink: SplitSink<Ws, Message>,
    stream: SplitStream<Ws>,
}

impl Client {
    async fn send(&mut self, msg: ClientMessage) {
        self.sink
            .send(Message::Text(msg.to_json().unwrap().into()))
            .await
            .unwrap();
    }

    /// Next server message, or None once the connection is gone.
    async fn recv(&mut self) -> Option<ServerMessage> {
        loop {
            match timeout(Duration::from_secs(5), self.stream.next())
                .await
                .expect("timed out waiting for server")
            {
                Some(Ok(Message::Text(text))) => return Some(ServerMessage::from_json(&text).unwrap()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn call(&mut self, msg: ClientMessage) -> ServerMessage {
        self.send(msg).await;
        self.recv().await.expect("connection closed")
    }
}

fn create(id: &str, key: &str) -> ApplyRequest {
    ApplyRequest {
        resource_kind: "device".into(),
        resource_id: id.into(),
        kind: OpKind::Create,
        payload: json!({"name": "PC"}),
        base_version: None,
        idempotency_key: key.into(),
    }
}

#[tokio::test]
async fn ping_pong() {
    let server = TestServer::start(None).await;
    let mut client = server.client().await;

    assert_eq!(client.call(ClientMessage::ping(12345)).await, ServerMessage::pong(12345));
}

#[tokio::test]
async fn hello_is_welcomed_without_token() {
    let server = TestServer::start(None).await;
    let mut client = server.client().await;

    assert_eq!(client.call(ClientMessage::hello(None)).await, ServerMessage::Welcome);
}

#[tokio::test]
async fn apply_answers_with_request_id() {
    let server = TestServer::start(None).await;
    server.state.start_server_ids_at(42).await;
    let mut client = server.client().await;

    let reply = client.call(ClientMessage::apply(7, create("tmp-1", "k1"))).await;

    assert_eq!(reply, ServerMessage::applied(7, Some("srv-42".into()), 1, false));
    assert!(server.state.resource("device", "srv-42").await.is_some());
}

#[tokio::test]
async fn replay_reports_original_outcome() {
    let server = TestServer::start(None).await;
    let mut client = server.client().await;

    client.call(ClientMessage::apply(1, create("tmp-1", "k1"))).await;
    let reply = client.call(ClientMessage::apply(2, create("tmp-1", "k1"))).await;

    assert_eq!(reply, ServerMessage::applied(2, Some("srv-1".into()), 1, true));
    assert_eq!(server.state.applied_count().await, 1);
}

#[tokio::test]
async fn token_is_required_when_configured() {
    let server = TestServer::start(Some("secret")).await;
    let mut client = server.client().await;

    match client.call(ClientMessage::apply(1, create("tmp-1", "k1"))).await {
        ServerMessage::Rejected {
            rejection: Rejection::Unauthorized { .. },
            ..
        } => {}
        other => panic!("unexpected reply: {other:?}"),
    }

    assert!(matches!(
        client.call(ClientMessage::hello(Some("wrong".into()))).await,
        ServerMessage::Error { .. }
    ));
    assert_eq!(
        client.call(ClientMessage::hello(Some("secret".into()))).await,
        ServerMessage::Welcome
    );
    assert!(matches!(
        client.call(ClientMessage::apply(2, create("tmp-1", "k1"))).await,
        ServerMessage::Applied { request_id: 2, .. }
    ));
}

#[tokio::test]
async fn ping_needs_no_token() {
    let server = TestServer::start(Some("secret")).await;
    let mut client = server.client().await;

    assert_eq!(client.call(ClientMessage::ping(1)).await, ServerMessage::pong(1));
}

#[tokio::test]
async fn malformed_message_gets_error() {
    let server = TestServer::start(None).await;
    let mut client = server.client().await;

    client
        .sink
        .send(Message::Text("{\"type\":\"bogus\"}".to_string().into()))
        .await
        .unwrap();

    assert!(matches!(client.recv().await, Some(ServerMessage::Error { .. })));
}

#[tokio::test]
async fn dropped_response_still_applies() {
    let server = TestServer::start(None).await;
    server.state.faults().drop_next_responses(1);
    let mut client = server.client().await;

    client.send(ClientMessage::apply(1, create("tmp-1", "k1"))).await;
    assert_eq!(client.recv().await, None);
    assert_eq!(server.state.applied_count().await, 1);

    let mut client = server.client().await;
    let reply = client.call(ClientMessage::apply(1, create("tmp-1", "k1"))).await;
    assert_eq!(reply, ServerMessage::applied(1, Some("srv-1".into()), 1, true));
}

#[tokio::test]
async fn injected_failures_do_not_apply() {
    let server = TestServer::start(None).await;
    server.state.faults().fail_next_requests(1);
    let mut client = server.client().await;

    match client.call(ClientMessage::apply(1, create("tmp-1", "k1"))).await {
        ServerMessage::Rejected {
            rejection: Rejection::Server { .. },
            ..
        } => {}
        other => panic!("unexpected reply: {other:?}"),
    }
    assert_eq!(server.state.applied_count().await, 0);

    assert!(matches!(
        client.call(ClientMessage::apply(2, create("tmp-1", "k1"))).await,
        ServerMessage::Applied { .. }
    ));
}

#[tokio::test]
async fn slow_apply_does_not_hold_up_pings() {
    let server = TestServer::start(None).await;
    server.state.faults().set_delay(Duration::from_millis(300));
    let mut client = server.client().await;

    client.send(ClientMessage::apply(1, create("tmp-1", "k1"))).await;
    client.send(ClientMessage::ping(2)).await;

    assert_eq!(client.recv().await, Some(ServerMessage::pong(2)));
    assert!(matches!(
        client.recv().await,
        Some(ServerMessage::Applied { request_id: 1, .. })
    ));
}

#[tokio::test]
async fn shutdown_closes_connections() {
    let server = TestServer::start(None).await;
    let mut client = server.client().await;
    client.call(ClientMessage::ping(1)).await;

    server.cancel.cancel();

    assert_eq!(client.recv().await, None);
}
