// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket client for the remote store.
//!
//! One connection carries every call. Requests are tagged with a
//! `request_id`; a pump task owns the transport, writes queued requests and
//! routes each answer to the caller waiting on that id. When the connection
//! drops, every waiter fails with a network error and the next call dials
//! again. A caller that gives up before its answer arrives (a timeout drops
//! the call) takes the connection down with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use sq_core::protocol::{ApplyRequest, ClientMessage, ServerMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::remote::{Applied, BoxFuture, RemoteError, RemoteStore};
use crate::transport::{Transport, WebSocketTransport};

/// Builds a fresh, unconnected transport for each dial.
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

type Waiters = Arc<Mutex<HashMap<u64, oneshot::Sender<ServerMessage>>>>;

const OUTGOING_CAPACITY: usize = 64;

fn lock(waiters: &Waiters) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<ServerMessage>>> {
    waiters.lock().unwrap_or_else(|e| e.into_inner())
}

/// A live connection: the pump's inbox plus the table of waiting callers.
struct Connection {
    outgoing: mpsc::Sender<ClientMessage>,
    waiters: Waiters,
    cancel: CancellationToken,
}

impl Connection {
    fn is_alive(&self) -> bool {
        !self.outgoing.is_closed() && !self.cancel.is_cancelled()
    }
}

/// What a call needs from the live connection.
struct Handles {
    outgoing: mpsc::Sender<ClientMessage>,
    waiters: Waiters,
    cancel: CancellationToken,
}

impl Connection {
    fn handles(&self) -> Handles {
        Handles {
            outgoing: self.outgoing.clone(),
            waiters: Arc::clone(&self.waiters),
            cancel: self.cancel.clone(),
        }
    }
}

/// Removes a call's waiter when the call ends. A waiter still registered
/// at that point never got its answer, so the connection is cancelled and
/// the next call dials again.
struct PendingCall {
    id: u64,
    waiters: Waiters,
    cancel: CancellationToken,
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if lock(&self.waiters).remove(&self.id).is_some() && !self.cancel.is_cancelled() {
            debug!(id = self.id, "call abandoned before its answer, dropping connection");
            self.cancel.cancel();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// [`RemoteStore`] over the JSON WebSocket protocol.
pub struct WsRemoteStore {
    config: RemoteConfig,
    factory: TransportFactory,
    connection: tokio::sync::Mutex<Option<Connection>>,
    next_id: AtomicU64,
}

impl WsRemoteStore {
    pub fn new(config: RemoteConfig) -> Self {
        Self::with_transport_factory(
            config,
            Arc::new(|| Box::new(WebSocketTransport::new()) as Box<dyn Transport>),
        )
    }

    /// Create a client with a custom transport (for testing).
    pub fn with_transport_factory(config: RemoteConfig, factory: TransportFactory) -> Self {
        WsRemoteStore {
            config,
            factory,
            connection: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Whether a connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(Connection::is_alive)
    }

    /// Close the connection; in-flight calls fail with a network error.
    pub async fn disconnect(&self) {
        self.connection.lock().await.take();
    }

    async fn connection(&self) -> Result<Handles, RemoteError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref().filter(|c| c.is_alive()) {
            return Ok(conn.handles());
        }

        let conn = self.dial().await?;
        let handles = conn.handles();
        *guard = Some(conn);
        Ok(handles)
    }

    /// Number of calls still waiting for an answer.
    #[cfg(test)]
    pub(crate) async fn waiting(&self) -> usize {
        match self.connection.lock().await.as_ref() {
            Some(conn) => lock(&conn.waiters).len(),
            None => 0,
        }
    }

    /// Connect, complete the hello handshake and start the pump.
    async fn dial(&self) -> Result<Connection, RemoteError> {
        let deadline = self.config.connect_timeout();
        let mut transport = (self.factory)();

        timeout(deadline, transport.connect(&self.config.url))
            .await
            .map_err(|_| RemoteError::Timeout)??;
        transport
            .send(ClientMessage::hello(self.config.token.clone()))
            .await?;

        let reply = timeout(deadline, transport.recv())
            .await
            .map_err(|_| RemoteError::Timeout)??;
        match reply {
            Some(ServerMessage::Welcome) => {}
            Some(ServerMessage::Error { message }) => {
                let _ = transport.disconnect().await;
                return Err(RemoteError::Auth(message));
            }
            Some(other) => {
                let _ = transport.disconnect().await;
                return Err(RemoteError::Network(format!(
                    "unexpected handshake reply: {other:?}"
                )));
            }
            None => {
                return Err(RemoteError::Network(
                    "connection closed during handshake".to_string(),
                ))
            }
        }

        let (outgoing, inbox) = mpsc::channel(OUTGOING_CAPACITY);
        let waiters = Waiters::default();
        let cancel = CancellationToken::new();
        tokio::spawn(pump(transport, inbox, Arc::clone(&waiters), cancel.clone()));
        debug!(url = %self.config.url, "connected to remote store");

        Ok(Connection {
            outgoing,
            waiters,
            cancel,
        })
    }

    /// Send one request and wait for the answer carrying its id.
    async fn call(&self, build: impl FnOnce(u64) -> ClientMessage) -> Result<ServerMessage, RemoteError> {
        let Handles {
            outgoing,
            waiters,
            cancel,
        } = self.connection().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        lock(&waiters).insert(id, tx);
        let _pending = PendingCall {
            id,
            waiters,
            cancel,
        };
        if outgoing.send(build(id)).await.is_err() {
            return Err(RemoteError::Network("connection closed".to_string()));
        }

        rx.await
            .map_err(|_| RemoteError::Network("connection lost before response".to_string()))
    }
}

impl RemoteStore for WsRemoteStore {
    fn apply(&self, request: ApplyRequest) -> BoxFuture<'_, Result<Applied, RemoteError>> {
        Box::pin(async move {
            match self.call(|id| ClientMessage::apply(id, request)).await? {
                ServerMessage::Applied {
                    server_id,
                    version,
                    replayed,
                    ..
                } => Ok(Applied {
                    server_id,
                    version,
                    replayed,
                }),
                ServerMessage::Rejected { rejection, .. } => Err(rejection.into()),
                other => Err(RemoteError::Server(format!("unexpected response: {other:?}"))),
            }
        })
    }

    fn probe(&self) -> BoxFuture<'_, Result<(), RemoteError>> {
        Box::pin(async move {
            match self.call(ClientMessage::ping).await? {
                ServerMessage::Pong { .. } => Ok(()),
                other => Err(RemoteError::Server(format!("unexpected response: {other:?}"))),
            }
        })
    }
}

/// Owns the transport until the connection ends or is cancelled.
async fn pump(
    mut transport: Box<dyn Transport>,
    mut inbox: mpsc::Receiver<ClientMessage>,
    waiters: Waiters,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = inbox.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = transport.send(msg).await {
                        warn!(error = %e, "send to remote store failed");
                        break;
                    }
                }
                None => break,
            },

            incoming = transport.recv() => match incoming {
                Ok(Some(msg)) => route(&waiters, msg),
                Ok(None) => {
                    debug!("remote store closed the connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "receive from remote store failed");
                    break;
                }
            },
        }
    }

    // Refuse new requests before failing the waiting ones
    inbox.close();
    lock(&waiters).clear();
    let _ = transport.disconnect().await;
}

fn route(waiters: &Waiters, msg: ServerMessage) {
    let id = match &msg {
        ServerMessage::Applied { request_id, .. } | ServerMessage::Rejected { request_id, .. } => {
            *request_id
        }
        ServerMessage::Pong { id } => *id,
        ServerMessage::Error { message } => {
            warn!(%message, "remote store reported an error");
            return;
        }
        ServerMessage::Welcome => return,
    };

    match lock(waiters).remove(&id) {
        Some(tx) => {
            let _ = tx.send(msg);
        }
        None => debug!(id, "response for unknown request"),
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
