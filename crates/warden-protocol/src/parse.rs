//! Parsing inbound frames from moderator clients.
//!
//! Decoding is two-step: the generic envelope first, then the body for the
//! types the hub understands. Unknown types decode to `None` so newer
//! clients can talk to an older hub.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_core::ServerId;

/// Errors decoding or encoding protocol frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not a valid JSON envelope
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope type is known but its body has the wrong shape
    #[error("Invalid body for '{kind}': {reason}")]
    InvalidBody { kind: String, reason: String },
}

/// Generic JSON envelope `{type, body}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Body of an inbound `chat` frame.
///
/// The sender is never part of the payload; the hub injects the
/// authenticated user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub server_id: ServerId,
    pub message: String,
}

/// Messages the hub acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Ping,
    Chat(ChatRequest),
}

/// Decodes one text frame.
///
/// Returns `Ok(None)` for well-formed envelopes of a type the hub does not
/// handle.
pub fn parse_inbound(text: &str) -> Result<Option<InboundMessage>, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope.kind.as_str() {
        "ping" => Ok(Some(InboundMessage::Ping)),
        "chat" => {
            let request = serde_json::from_value::<ChatRequest>(envelope.body).map_err(|e| {
                ProtocolError::InvalidBody {
                    kind: envelope.kind.clone(),
                    reason: e.to_string(),
                }
            })?;
            Ok(Some(InboundMessage::Chat(request)))
        }
        _ => Ok(None),
    }
}
