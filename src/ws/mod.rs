//! WebSocket connection adapter
//!
//! One task per accepted socket: it forwards decoded client frames to the
//! coordinator and writes whatever the coordinator queues for this
//! connection. Errors stay local; the coordinator only ever hears about them
//! as a disconnect.

pub mod host;
pub mod player;

pub use host::host_handler;
pub use player::{player_handler, ConnectQuery};

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::coordinator::Accepted;
use crate::protocol::{self, ServerMessage};
use crate::state::AppState;
use crate::types::Role;

/// Finish the handshake for an accepted participant.
fn upgrade(
    ws: WebSocketUpgrade,
    accepted: Accepted,
    role: Role,
    outbound: mpsc::Receiver<ServerMessage>,
    state: Arc<AppState>,
) -> Response {
    let coordinator = state.coordinator.clone();
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(
            "Failed to upgrade connection for {:?} {}: {}",
            role,
            accepted.participant,
            e
        );
        let _ = coordinator.disconnected(accepted.participant, accepted.connection);
    })
    .on_upgrade(move |socket| handle_socket(socket, accepted, role, outbound, state))
}

/// Why a connection loop ended.
#[derive(Debug, PartialEq)]
enum Closed {
    Shutdown,
    /// The registry dropped our outbound queue
    Evicted,
    ClientClosed,
    ProtocolError,
    TransportError,
    CoordinatorBusy,
}

/// Handle individual WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    accepted: Accepted,
    role: Role,
    mut outbound: mpsc::Receiver<ServerMessage>,
    state: Arc<AppState>,
) {
    let (mut sender, mut receiver) = socket.split();
    let shutdown = state.shutdown.child_token();
    let Accepted {
        participant,
        connection,
        ..
    } = accepted;

    tracing::info!("WebSocket connected: {:?} {}", role, participant);

    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break Closed::Shutdown,

            // Messages queued by the coordinator for this connection
            out_msg = outbound.recv() => {
                let Some(msg) = out_msg else {
                    break Closed::Evicted;
                };
                match protocol::encode(&msg) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break Closed::TransportError;
                        }
                    }
                    Err(e) => tracing::error!("Dropping outbound message: {}", e),
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message from {}: {}", participant, text);

                        match protocol::decode(&text) {
                            Ok(client_msg) => {
                                if let Err(e) =
                                    state.coordinator.inbound(participant, connection, client_msg)
                                {
                                    tracing::warn!("Dropping {}: {}", participant, e);
                                    break Closed::CoordinatorBusy;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Protocol error from {}: {}", participant, e);
                                let error = ServerMessage::error("PARSE_ERROR", e.to_string());
                                if let Ok(json) = protocol::encode(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                                break Closed::ProtocolError;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Closed::ClientClosed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error for {}: {}", participant, e);
                        break Closed::TransportError;
                    }
                }
            }
        }
    };

    let _ = sender.send(Message::Close(None)).await;

    if reason != Closed::Evicted {
        if let Err(e) = state.coordinator.disconnected(participant, connection) {
            // The registry notices on the next failed send
            tracing::warn!("Could not report disconnect of {}: {}", participant, e);
        }
    }

    tracing::info!(
        "WebSocket connection closed for {:?} {}: {:?}",
        role,
        participant,
        reason
    );
}
