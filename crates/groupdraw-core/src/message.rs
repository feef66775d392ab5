//! Synchronization messages exchanged between peers, and their wire codec.
//!
//! Messages travel as JSON objects tagged by `"type"`:
//! ```json
//! { "type": "draw", "drawing": { "strokes": [ ... ] } }
//! { "type": "catchup", "drawing": { "strokes": [ ... ] } }
//! { "type": "erase" }
//! { "type": "clear" }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drawing::Drawing;
use crate::stroke::Stroke;

/// Kind tags understood by this codec.
const KNOWN_KINDS: [&str; 4] = ["draw", "catchup", "erase", "clear"];

/// A message sent between peers sharing a canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Incremental append: a drawing holding the sender's newest stroke.
    Draw { drawing: Drawing },
    /// The sender's full drawing, for peers that just joined.
    Catchup { drawing: Drawing },
    /// Remove the most recent stroke.
    Erase,
    /// Reset to an empty drawing.
    Clear,
}

impl SyncMessage {
    /// Build a `Draw` message carrying a single stroke.
    pub fn draw(stroke: Stroke) -> Self {
        SyncMessage::Draw {
            drawing: Drawing::from_strokes(vec![stroke]),
        }
    }

    /// Build a `Catchup` message from a full drawing.
    pub fn catchup(drawing: &Drawing) -> Self {
        SyncMessage::Catchup {
            drawing: drawing.snapshot(),
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Draw { .. } => "draw",
            SyncMessage::Catchup { .. } => "catchup",
            SyncMessage::Erase => "erase",
            SyncMessage::Clear => "clear",
        }
    }
}

/// Errors produced while decoding a message.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Message has no type tag")]
    MissingKind,
    #[error("Unknown message type: {0}")]
    UnknownKind(String),
}

/// A message could not be serialized.
#[derive(Debug, Error)]
#[error("Failed to encode message: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Serialize a message to bytes.
pub fn encode(message: &SyncMessage) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(message)?)
}

/// Deserialize a message from bytes.
pub fn decode(bytes: &[u8]) -> Result<SyncMessage, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;

    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(DecodeError::MissingKind)?;

    if !KNOWN_KINDS.contains(&kind) {
        return Err(DecodeError::UnknownKind(kind.to_string()));
    }

    Ok(serde_json::from_value(value)?)
}
