//! WebSocket connection handling.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use groupdraw_core::Participant;
use groupdraw_core::relay::{ClientMessage, ServerMessage};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::room::{AppState, Envelope};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// The room a connection has joined.
struct Membership {
    room: String,
    participant: Participant,
    rx: broadcast::Receiver<Envelope>,
}

/// Per-connection state.
struct Connection {
    state: Arc<AppState>,
    sender: SplitSink<WebSocket, Message>,
    membership: Option<Membership>,
}

impl Connection {
    /// Send a message to the client. Returns `false` once the socket is gone.
    async fn send(&mut self, message: &ServerMessage) -> bool {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode message: {}", e);
                return true;
            }
        };
        self.sender.send(Message::Text(json.into())).await.is_ok()
    }

    async fn handle_text(&mut self, text: &str) -> bool {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Join { room, participant }) => self.join(room, participant).await,
            Ok(ClientMessage::Leave) => {
                self.leave();
                true
            }
            Ok(ClientMessage::Send { to, data }) => self.relay(to, data).await,
            Err(e) => {
                warn!("Invalid message: {}", e);
                let err = ServerMessage::Error {
                    message: format!("Invalid message: {}", e),
                };
                self.send(&err).await
            }
        }
    }

    async fn join(&mut self, room: String, participant: Participant) -> bool {
        // Leave current room if any
        self.leave();

        let (rx, participants) = self.state.join_room(&room, participant);
        info!("Participant {} joined room {}", participant, room);

        // Notify others
        self.state
            .broadcast(&room, Envelope::participants(participant, participants.clone()));
        self.membership = Some(Membership {
            room: room.clone(),
            participant,
            rx,
        });

        self.send(&ServerMessage::Joined { room, participants }).await
    }

    async fn relay(&mut self, to: Option<Vec<Participant>>, data: String) -> bool {
        let Some(membership) = &self.membership else {
            let err = ServerMessage::Error {
                message: "Not in a room".to_string(),
            };
            return self.send(&err).await;
        };

        let from = membership.participant;
        self.state.broadcast(
            &membership.room,
            Envelope {
                from: Some(from),
                to: to.map(|to| to.into_iter().collect()),
                message: ServerMessage::Message { from, data },
            },
        );
        true
    }

    fn leave(&mut self) {
        let Some(Membership {
            room, participant, ..
        }) = self.membership.take()
        else {
            return;
        };

        if let Some(remaining) = self.state.leave_room(&room, &participant) {
            self.state
                .broadcast(&room, Envelope::participants(participant, remaining));
        }
        info!("Participant {} left room {}", participant, room);
    }
}

/// Wait for the next envelope of the joined room, or forever if none.
async fn next_envelope(membership: &mut Option<Membership>) -> Result<Envelope, RecvError> {
    match membership {
        Some(membership) => membership.rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    debug!("New connection");

    let (sender, mut receiver) = socket.split();
    let mut conn = Connection {
        state,
        sender,
        membership: None,
    };

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !conn.handle_text(text.as_str()).await {
                        break;
                    }
                }
                Some(Ok(Message::Binary(_))) => warn!("Ignoring binary frame"),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // Ignore ping/pong
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
            },

            // Handle broadcast messages from room
            envelope = next_envelope(&mut conn.membership) => match envelope {
                Ok(envelope) => {
                    let Some(participant) = conn.membership.as_ref().map(|m| m.participant) else {
                        continue;
                    };
                    if envelope.is_for(&participant) && !conn.send(&envelope.message).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Messages were lost, so this peer is out of sync
                    warn!("Connection lagged by {} messages; closing", skipped);
                    break;
                }
                Err(RecvError::Closed) => {
                    warn!("Room channel closed; closing connection");
                    break;
                }
            },
        }
    }

    // Cleanup on disconnect
    conn.leave();
    debug!("Connection closed");
}
