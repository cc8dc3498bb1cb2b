//! Wire message definitions
//!
//! Defines the JSON messages exchanged between chat clients and the relay.
//! Every message carries a `type` discriminant; the relay tolerates unknown
//! discriminants but treats malformed payloads as decode errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Protocol-related errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The inbound payload was not a valid message. The offending message is
    /// dropped; the connection stays up.
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),

    /// An outbound message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ============================================================================
// Messages
// ============================================================================

/// Messages exchanged over a client connection, in both directions.
///
/// Clients send `handshake` once per connection to establish or resume an
/// identity, then `chat` messages to relay. The server sends `handshake`
/// back to confirm a newly assigned identity and forwards `chat` payloads
/// verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    /// Identity establishment. Both fields empty means "assign me a new
    /// identity"; both non-empty means "resume this identity".
    Handshake {
        /// Stable client identifier, or empty for a fresh one
        id: String,
        /// Display name, or empty for a generated one
        name: String,
    },

    /// A chat line to fan out to every other connected client.
    Chat {
        /// Sender's claimed stable identifier
        id: String,
        /// Sender's claimed display name
        name: String,
        /// Opaque chat text, relayed unmodified
        message: String,
    },

    /// Catch-all for discriminants this server does not know. Ignored.
    #[serde(other)]
    Unknown,
}

impl WireMessage {
    /// Create a handshake message
    pub fn handshake(id: impl Into<String>, name: impl Into<String>) -> Self {
        WireMessage::Handshake {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Create a chat message
    pub fn chat(
        id: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        WireMessage::Chat {
            id: id.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Parse a message from a JSON text frame
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        serde_json::from_str(json).map_err(ProtocolError::Decode)
    }

    /// Serialize the message to a JSON text frame
    pub fn to_json(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handshake() {
        let json = r#"{"type": "handshake", "id": "abc123", "name": "brave-red-fox"}"#;
        let msg = WireMessage::from_json(json).unwrap();
        assert_eq!(msg, WireMessage::handshake("abc123", "brave-red-fox"));
    }

    #[test]
    fn test_parse_empty_sentinel_handshake() {
        let json = r#"{"type": "handshake", "id": "", "name": ""}"#;
        let msg = WireMessage::from_json(json).unwrap();
        assert_eq!(msg, WireMessage::handshake("", ""));
    }

    #[test]
    fn test_parse_chat() {
        let json = r#"{"type": "chat", "id": "abc123", "name": "brave-red-fox", "message": "hi"}"#;
        let msg = WireMessage::from_json(json).unwrap();
        assert_eq!(msg, WireMessage::chat("abc123", "brave-red-fox", "hi"));
    }

    #[test]
    fn test_unknown_discriminant_is_tolerated() {
        let json = r#"{"type": "presence", "id": "abc123"}"#;
        let msg = WireMessage::from_json(json).unwrap();
        assert_eq!(msg, WireMessage::Unknown);
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let result = WireMessage::from_json("not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_missing_field_is_decode_error() {
        let json = r#"{"type": "chat", "id": "abc123"}"#;
        let result = WireMessage::from_json(json);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_handshake_serialization() {
        let msg = WireMessage::handshake("abc123", "brave-red-fox");
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"handshake\""));
        assert!(json.contains("\"id\":\"abc123\""));
        assert!(json.contains("\"name\":\"brave-red-fox\""));

        let parsed = WireMessage::from_json(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_chat_round_trip_preserves_payload() {
        let msg = WireMessage::chat("abc123", "brave-red-fox", "hello, world");
        let json = msg.to_json().unwrap();
        let parsed = WireMessage::from_json(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
