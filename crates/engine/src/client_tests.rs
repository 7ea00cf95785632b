// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use serde_json::json;
use sq_core::protocol::Rejection;
use sq_core::OpKind;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::*;
use crate::transport::{TransportError, TransportResult};

/// Client half of an in-memory connection.
struct ChannelTransport {
    to_server: UnboundedSender<ClientMessage>,
    from_server: UnboundedReceiver<ServerMessage>,
    connected: bool,
    refuse: bool,
}

/// Server half, driven by the test.
struct ServerEnd {
    rx: UnboundedReceiver<ClientMessage>,
    tx: UnboundedSender<ServerMessage>,
}

fn pair() -> (ChannelTransport, ServerEnd) {
    let (to_server, rx) = unbounded_channel();
    let (tx, from_server) = unbounded_channel();
    (
        ChannelTransport {
            to_server,
            from_server,
            connected: false,
            refuse: false,
        },
        ServerEnd { rx, tx },
    )
}

impl Transport for ChannelTransport {
    fn connect(&mut self, _url: &str) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if self.refuse {
                return Err(TransportError::ConnectionFailed("refused".into()));
            }
            self.connected = true;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.connected = false;
            Ok(())
        })
    }

    fn send(&mut self, msg: ClientMessage) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.to_server
                .send(msg)
                .map_err(|_| TransportError::ConnectionClosed)
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, TransportResult<Option<ServerMessage>>> {
        Box::pin(async move { Ok(self.from_server.recv().await) })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl ServerEnd {
    async fn next(&mut self) -> ClientMessage {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for client")
            .expect("client hung up")
    }

    fn reply(&self, msg: ServerMessage) {
        self.tx.send(msg).unwrap();
    }

    /// Accept the hello and return the token it carried.
    async fn welcome(&mut self) -> Option<String> {
        match self.next().await {
            ClientMessage::Hello { token } => {
                self.reply(ServerMessage::Welcome);
                token
            }
            other => panic!("expected hello, got {other:?}"),
        }
    }

    async fn next_apply(&mut self) -> (u64, ApplyRequest) {
        match self.next().await {
            ClientMessage::Apply {
                request_id,
                request,
            } => (request_id, request),
            other => panic!("expected apply, got {other:?}"),
        }
    }
}

/// Hands out pre-built transports in order; refuses once they run out.
fn factory(transports: Vec<ChannelTransport>, dials: Arc<AtomicUsize>) -> TransportFactory {
    let queue = Arc::new(Mutex::new(VecDeque::from(transports)));
    Arc::new(move || {
        dials.fetch_add(1, Ordering::SeqCst);
        match queue.lock().unwrap().pop_front() {
            Some(transport) => Box::new(transport) as Box<dyn Transport>,
            None => {
                let (mut refused, _) = pair();
                refused.refuse = true;
                Box::new(refused)
            }
        }
    })
}

fn client(transports: Vec<ChannelTransport>) -> (Arc<WsRemoteStore>, Arc<AtomicUsize>) {
    let dials = Arc::new(AtomicUsize::new(0));
    let config = RemoteConfig::new("ws://test").with_token("secret");
    let store = WsRemoteStore::with_transport_factory(config, factory(transports, dials.clone()));
    (Arc::new(store), dials)
}

fn update(id: &str) -> ApplyRequest {
    ApplyRequest {
        resource_kind: "device".into(),
        resource_id: id.into(),
        kind: OpKind::Update,
        payload: json!({"name": "PC2"}),
        base_version: None,
        idempotency_key: format!("key-{id}"),
    }
}

#[tokio::test]
async fn handshake_sends_token() {
    let (transport, mut server) = pair();
    let (store, _) = client(vec![transport]);

    let probe = tokio::spawn({
        let store = store.clone();
        async move { store.probe().await }
    });

    assert_eq!(server.welcome().await.as_deref(), Some("secret"));
    match server.next().await {
        ClientMessage::Ping { id } => server.reply(ServerMessage::pong(id)),
        other => panic!("expected ping, got {other:?}"),
    }

    assert_eq!(probe.await.unwrap(), Ok(()));
    assert!(store.is_connected().await);
}

#[tokio::test]
async fn answers_are_routed_by_request_id() {
    let (transport, mut server) = pair();
    let (store, dials) = client(vec![transport]);

    let first = tokio::spawn({
        let store = store.clone();
        async move { store.apply(update("device-1")).await }
    });
    server.welcome().await;
    let (first_id, first_req) = server.next_apply().await;

    let second = tokio::spawn({
        let store = store.clone();
        async move { store.apply(update("device-2")).await }
    });
    let (second_id, second_req) = server.next_apply().await;
    assert_eq!(first_req.resource_id, "device-1");
    assert_eq!(second_req.resource_id, "device-2");

    // Answer out of order
    server.reply(ServerMessage::applied(second_id, None, 7, false));
    server.reply(ServerMessage::applied(first_id, None, 3, true));

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!((first.version, first.replayed), (3, true));
    assert_eq!((second.version, second.replayed), (7, false));
    assert_eq!(dials.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejections_become_remote_errors() {
    let (transport, mut server) = pair();
    let (store, _) = client(vec![transport]);

    let call = tokio::spawn({
        let store = store.clone();
        async move { store.apply(update("device-1")).await }
    });
    server.welcome().await;
    let (id, _) = server.next_apply().await;
    server.reply(ServerMessage::rejected(id, Rejection::conflict(4, "version moved")));

    assert_eq!(
        call.await.unwrap(),
        Err(RemoteError::Conflict {
            current_version: 4,
            message: "version moved".into()
        })
    );
}

#[tokio::test]
async fn handshake_error_is_auth_failure() {
    let (transport, mut server) = pair();
    let (store, _) = client(vec![transport]);

    let call = tokio::spawn({
        let store = store.clone();
        async move { store.apply(update("device-1")).await }
    });
    server.next().await;
    server.reply(ServerMessage::error("unauthorized: invalid token"));

    assert!(matches!(call.await.unwrap(), Err(RemoteError::Auth(_))));
    assert!(!store.is_connected().await);
}

#[tokio::test]
async fn lost_connection_fails_waiters_and_redials() {
    let (first, mut server) = pair();
    let (second, mut server2) = pair();
    let (store, dials) = client(vec![first, second]);

    let call = tokio::spawn({
        let store = store.clone();
        async move { store.apply(update("device-1")).await }
    });
    server.welcome().await;
    server.next_apply().await;
    drop(server);

    assert!(matches!(call.await.unwrap(), Err(RemoteError::Network(_))));

    let call = tokio::spawn({
        let store = store.clone();
        async move { store.apply(update("device-1")).await }
    });
    server2.welcome().await;
    let (id, _) = server2.next_apply().await;
    server2.reply(ServerMessage::applied(id, None, 1, true));

    assert!(call.await.unwrap().unwrap().replayed);
    assert_eq!(dials.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let (store, _) = client(vec![]);

    assert!(matches!(store.probe().await, Err(RemoteError::Network(_))));
}

#[tokio::test]
async fn disconnect_closes_the_connection() {
    let (transport, mut server) = pair();
    let (store, _) = client(vec![transport]);

    let probe = tokio::spawn({
        let store = store.clone();
        async move { store.probe().await }
    });
    server.welcome().await;
    if let ClientMessage::Ping { id } = server.next().await {
        server.reply(ServerMessage::pong(id));
    }
    probe.await.unwrap().unwrap();

    store.disconnect().await;

    assert!(!store.is_connected().await);
    assert!(
        tokio::time::timeout(Duration::from_secs(5), server.rx.recv())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn abandoned_call_clears_waiter_and_redials() {
    let (first, mut server) = pair();
    let (second, mut server2) = pair();
    let (store, dials) = client(vec![first, second]);

    let probe = tokio::spawn({
        let store = store.clone();
        async move { store.probe().await }
    });
    server.welcome().await;
    if let ClientMessage::Ping { id } = server.next().await {
        server.reply(ServerMessage::pong(id));
    }
    probe.await.unwrap().unwrap();

    // The server stops answering; the caller's timeout abandons the call
    let outcome = tokio::time::timeout(Duration::from_millis(20), store.probe()).await;
    assert!(outcome.is_err());
    assert_eq!(store.waiting().await, 0);
    assert!(!store.is_connected().await);

    // The quiet connection is closed after the unanswered ping
    assert!(matches!(server.next().await, ClientMessage::Ping { .. }));
    assert!(
        tokio::time::timeout(Duration::from_secs(5), server.rx.recv())
            .await
            .unwrap()
            .is_none()
    );

    let probe = tokio::spawn({
        let store = store.clone();
        async move { store.probe().await }
    });
    server2.welcome().await;
    if let ClientMessage::Ping { id } = server2.next().await {
        server2.reply(ServerMessage::pong(id));
    }
    probe.await.unwrap().unwrap();

    assert_eq!(dials.load(Ordering::SeqCst), 2);
    assert_eq!(store.waiting().await, 0);
}
