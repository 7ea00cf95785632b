// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Handles client connections, the hello handshake and request routing.
//! Requests on one connection are handled concurrently and answered as
//! they finish; clients match answers by `request_id`.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sq_core::protocol::{ClientMessage, Rejection, ServerMessage};

use crate::authority::Verdict;
use crate::state::ServerState;

/// Run the WebSocket server on the given address until cancelled.
pub async fn run(
    addr: SocketAddr,
    state: ServerState,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);
    serve(listener, state, cancel).await?;
    Ok(())
}

/// Accept connections on a bound listener until cancelled.
///
/// Cancelling also closes every open connection.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    loop {
        let (stream, peer_addr) = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };
        let state = state.clone();
        let cancel = cancel.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state, cancel).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// What to do after handling one client message.
enum Reply {
    Send(ServerMessage),
    /// Close the connection without answering.
    Drop,
}

/// Handle a single WebSocket connection.
///
/// The handshake is handled inline. Every other request runs as its own
/// task so a slow apply does not hold up pings or later requests; answers
/// go out as they finish.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: ServerState,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    info!("New WebSocket connection from: {}", peer_addr);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let mut authorized = !state.requires_token();
    let mut requests: JoinSet<Reply> = JoinSet::new();

    loop {
        let reply = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_sink.close().await;
                break;
            }

            Some(done) = requests.join_next(), if !requests.is_empty() => match done {
                Ok(reply) => reply,
                Err(e) => {
                    error!("Request task for {} failed: {}", peer_addr, e);
                    continue;
                }
            },

            // Handle incoming messages from client
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                        Ok(ClientMessage::Hello { token }) => hello(&state, token, &mut authorized),
                        Ok(request) => {
                            requests.spawn(handle_request(request, state.clone(), authorized));
                            continue;
                        }
                        Err(e) => Reply::Send(ServerMessage::error(e.to_string())),
                    },
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", peer_addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                        continue;
                    }
                    Some(Ok(_)) => {
                        // Ignore other message types (Binary, Pong, Frame)
                        continue;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", peer_addr, e);
                        break;
                    }
                    None => {
                        info!("Client {} stream ended", peer_addr);
                        break;
                    }
                }
            }
        };

        match reply {
            Reply::Send(response) => {
                let json = response.to_json()?;
                ws_sink.send(Message::Text(json.into())).await?;
            }
            Reply::Drop => {
                warn!("Dropping connection to {} without a response", peer_addr);
                break;
            }
        }
    }

    info!("Connection closed: {}", peer_addr);
    Ok(())
}

/// Check the handshake token and remember the outcome for the connection.
fn hello(state: &ServerState, token: Option<String>, authorized: &mut bool) -> Reply {
    if state.authorize(token.as_deref()) {
        *authorized = true;
        Reply::Send(ServerMessage::Welcome)
    } else {
        *authorized = false;
        warn!("Rejected hello with invalid token");
        Reply::Send(ServerMessage::error("unauthorized: invalid token"))
    }
}

/// Process one request and decide the reply.
async fn handle_request(msg: ClientMessage, state: ServerState, authorized: bool) -> Reply {
    debug!("Received message: {:?}", msg);

    match msg {
        // The connection loop answers handshakes itself
        ClientMessage::Hello { token } => hello(&state, token, &mut { authorized }),

        ClientMessage::Apply {
            request_id,
            request,
        } => {
            if !authorized {
                return Reply::Send(ServerMessage::rejected(
                    request_id,
                    Rejection::unauthorized("missing or invalid token"),
                ));
            }

            let faults = state.faults();
            if let Some(delay) = faults.delay() {
                tokio::time::sleep(delay).await;
            }
            if faults.take_failure() {
                return Reply::Send(ServerMessage::rejected(
                    request_id,
                    Rejection::server("injected failure"),
                ));
            }

            let verdict = match state.apply(&request).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    error!("Failed to apply request {}: {}", request_id, e);
                    return Reply::Send(ServerMessage::rejected(
                        request_id,
                        Rejection::server(e.to_string()),
                    ));
                }
            };

            if faults.take_drop() {
                return Reply::Drop;
            }

            match verdict {
                Verdict::Applied(accepted) => {
                    debug!(
                        "Applied {} {}/{} at version {} (replayed: {})",
                        request.kind,
                        request.resource_kind,
                        request.resource_id,
                        accepted.version,
                        accepted.replayed
                    );
                    Reply::Send(ServerMessage::applied(
                        request_id,
                        accepted.server_id,
                        accepted.version,
                        accepted.replayed,
                    ))
                }
                Verdict::Rejected(rejection) => {
                    debug!("Rejected request {}: {:?}", request_id, rejection);
                    Reply::Send(ServerMessage::rejected(request_id, rejection))
                }
            }
        }

        ClientMessage::Ping { id } => {
            debug!("Ping received: {}", id);
            Reply::Send(ServerMessage::pong(id))
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
