//! Group sessions over a WebSocket relay.
//!
//! Each activation opens a connection to the relay and announces it as a new
//! session. A background task owns the socket: it writes queued client
//! messages and turns relay messages into [`SessionEvent`]s. When the socket
//! closes, the session reports `Invalidated`.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::{
    ActivationError, AnnouncedSession, BoxFuture, GroupSession, GroupSessionState, Recipients,
    SendError, SessionEvent, SessionSource,
};
use crate::membership::Participant;
use crate::relay::{ClientMessage, ServerMessage, decode_payload, encode_payload};

/// Default relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:3030/ws";
/// Default room name.
pub const DEFAULT_ROOM: &str = "groupdraw";

/// Where to find the relay and which room to share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub url: String,
    pub room: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAY_URL.to_string(),
            room: DEFAULT_ROOM.to_string(),
        }
    }
}

impl RelayConfig {
    pub fn new(url: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            room: room.into(),
        }
    }

    /// Read `GROUPDRAW_RELAY_URL` and `GROUPDRAW_ROOM`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("GROUPDRAW_RELAY_URL").unwrap_or(defaults.url),
            room: std::env::var("GROUPDRAW_ROOM").unwrap_or(defaults.room),
        }
    }

    /// Parse the URL, accepting only `ws` and `wss`.
    pub fn parsed_url(&self) -> Result<Url, ActivationError> {
        let url = Url::parse(&self.url)
            .map_err(|e| ActivationError::Unavailable(format!("Invalid URL: {}", e)))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ActivationError::Unavailable(format!(
                "Invalid WebSocket URL scheme: {}",
                url.scheme()
            )));
        }
        Ok(url)
    }
}

/// Commands sent to the connection task.
enum RelayCommand {
    Send(ClientMessage),
    Close,
}

/// Session source backed by a relay server.
pub struct RelaySource {
    config: RelayConfig,
    announce_tx: mpsc::UnboundedSender<AnnouncedSession>,
    announcements: mpsc::UnboundedReceiver<AnnouncedSession>,
}

impl RelaySource {
    pub fn new(config: RelayConfig) -> Self {
        let (announce_tx, announcements) = mpsc::unbounded_channel();
        Self {
            config,
            announce_tx,
            announcements,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// Open a relay connection and announce it as a new session.
async fn connect(
    config: RelayConfig,
    announce_tx: mpsc::UnboundedSender<AnnouncedSession>,
) -> Result<(), ActivationError> {
    let url = config.parsed_url()?;
    log::info!("Connecting to relay at {}", url);

    let (socket, response) = connect_async(url.as_str())
        .await
        .map_err(|e| ActivationError::Unavailable(format!("Connection failed: {}", e)))?;
    log::info!("Relay connected, status: {}", response.status());

    let local = Participant::new();
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (events_tx, events) = mpsc::unbounded_channel();
    let _ = events_tx.send(SessionEvent::StateChanged(GroupSessionState::Waiting));
    tokio::spawn(run_connection(socket, command_rx, events_tx));

    let session = Arc::new(RelaySession {
        local,
        room: config.room,
        commands,
    });
    announce_tx
        .send(AnnouncedSession { session, events })
        .map_err(|_| ActivationError::Unavailable("Session source closed".to_string()))
}

impl SessionSource for RelaySource {
    fn activate(&self) -> BoxFuture<'static, Result<(), ActivationError>> {
        Box::pin(connect(self.config.clone(), self.announce_tx.clone()))
    }

    fn next_session(&mut self) -> BoxFuture<'_, Option<AnnouncedSession>> {
        Box::pin(self.announcements.recv())
    }
}

/// A session carried by one relay connection.
pub struct RelaySession {
    local: Participant,
    room: String,
    commands: mpsc::UnboundedSender<RelayCommand>,
}

impl GroupSession for RelaySession {
    fn local_participant(&self) -> Participant {
        self.local
    }

    fn join(&self) {
        let join = ClientMessage::Join {
            room: self.room.clone(),
            participant: self.local,
        };
        if self.commands.send(RelayCommand::Send(join)).is_err() {
            log::warn!("Relay connection gone before join");
        }
    }

    fn send(&self, bytes: Vec<u8>, to: Recipients) -> BoxFuture<'_, Result<(), SendError>> {
        let to = match to {
            Recipients::All => None,
            Recipients::Only(set) => Some(set.into_iter().collect()),
        };
        let message = ClientMessage::Send {
            to,
            data: encode_payload(&bytes),
        };
        let result = self
            .commands
            .send(RelayCommand::Send(message))
            .map_err(|_| SendError::Closed);
        Box::pin(std::future::ready(result))
    }

    fn end(&self) {
        let _ = self.commands.send(RelayCommand::Send(ClientMessage::Leave));
        let _ = self.commands.send(RelayCommand::Close);
    }
}

/// Translate a relay message into session events.
fn session_events(message: ServerMessage) -> Vec<SessionEvent> {
    match message {
        ServerMessage::Joined { room, participants } => {
            log::info!("Joined room {} with {} participants", room, participants.len());
            vec![
                SessionEvent::StateChanged(GroupSessionState::Joined),
                SessionEvent::ParticipantsChanged(participants.into_iter().collect()),
            ]
        }
        ServerMessage::Participants { participants } => {
            vec![SessionEvent::ParticipantsChanged(participants.into_iter().collect())]
        }
        ServerMessage::Message { from, data } => match decode_payload(&data) {
            Ok(bytes) => vec![SessionEvent::Message { bytes, from }],
            Err(e) => {
                log::warn!("Dropping relay payload from {}: {}", from, e);
                Vec::new()
            }
        },
        ServerMessage::Error { message } => {
            log::warn!("Relay error: {}", message);
            Vec::new()
        }
    }
}

async fn run_connection(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut commands: mpsc::UnboundedReceiver<RelayCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(RelayCommand::Send(message)) => {
                    let json = match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(e) => {
                            log::error!("Failed to encode relay message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(json.into())).await {
                        log::error!("Relay send error: {}", e);
                        break;
                    }
                }
                Some(RelayCommand::Close) | None => {
                    log::info!("Relay close requested");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(message) => {
                            for event in session_events(message) {
                                if events.send(event).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => log::warn!("Failed to parse relay message: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    log::info!("Relay closed the connection");
                    break;
                }
                Some(Ok(_)) => {} // Ignore binary, ping, pong
                Some(Err(e)) => {
                    log::error!("Relay read error: {}", e);
                    break;
                }
            },
        }
    }

    let _ = events.send(SessionEvent::StateChanged(GroupSessionState::Invalidated));
    log::info!("Relay connection task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validation() {
        assert!(RelayConfig::new("ws://localhost:3030/ws", "r").parsed_url().is_ok());
        assert!(RelayConfig::new("wss://example.com/ws", "r").parsed_url().is_ok());
        assert!(matches!(
            RelayConfig::new("http://example.com", "r").parsed_url(),
            Err(ActivationError::Unavailable(_))
        ));
        assert!(RelayConfig::new("not a url", "r").parsed_url().is_err());
    }

    #[test]
    fn test_joined_becomes_ready_then_members() {
        let a = Participant::new();
        let events = session_events(ServerMessage::Joined {
            room: "r".to_string(),
            participants: vec![a],
        });

        match events.as_slice() {
            [
                SessionEvent::StateChanged(GroupSessionState::Joined),
                SessionEvent::ParticipantsChanged(set),
            ] => assert!(set.contains(&a)),
            other => panic!("Unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_bad_payload_is_dropped() {
        let events = session_events(ServerMessage::Message {
            from: Participant::new(),
            data: "***".to_string(),
        });
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_session_queues_frames() {
        let (commands, mut rx) = mpsc::unbounded_channel();
        let session = RelaySession {
            local: Participant::new(),
            room: "room".to_string(),
            commands,
        };

        session.join();
        session.send(b"x".to_vec(), Recipients::All).await.unwrap();
        session.end();

        assert!(matches!(rx.recv().await, Some(RelayCommand::Send(ClientMessage::Join { .. }))));
        assert!(matches!(
            rx.recv().await,
            Some(RelayCommand::Send(ClientMessage::Send { to: None, .. }))
        ));
        assert!(matches!(rx.recv().await, Some(RelayCommand::Send(ClientMessage::Leave))));
        assert!(matches!(rx.recv().await, Some(RelayCommand::Close)));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (commands, rx) = mpsc::unbounded_channel();
        drop(rx);
        let session = RelaySession {
            local: Participant::new(),
            room: "room".to_string(),
            commands,
        };

        let result = session.send(b"x".to_vec(), Recipients::All).await;
        assert!(matches!(result, Err(SendError::Closed)));
    }
}
