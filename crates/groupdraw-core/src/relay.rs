//! Wire protocol between peers and the relay server.
//!
//! JSON messages tagged by `"type"`:
//! ```json
//! { "type": "join", "room": "room-id", "participant": "<uuid>" }
//! { "type": "send", "to": ["<uuid>"], "data": "<base64 payload>" }
//! { "type": "message", "from": "<uuid>", "data": "<base64 payload>" }
//! ```
//! Payloads are encoded sync messages; the relay never looks inside them.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::membership::Participant;

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room as `participant`.
    Join { room: String, participant: Participant },
    /// Leave the current room.
    Leave,
    /// Relay a payload. No `to` means every other member.
    Send {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Vec<Participant>>,
        data: String,
    },
}

/// Messages received from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join confirmed, with the current members (sender included).
    Joined {
        room: String,
        participants: Vec<Participant>,
    },
    /// Room membership changed.
    Participants { participants: Vec<Participant> },
    /// Payload relayed from another member.
    Message { from: Participant, data: String },
    /// Error message
    Error { message: String },
}

/// Encode a binary payload for a relay message.
pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a binary payload from a relay message.
pub fn decode_payload(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}
