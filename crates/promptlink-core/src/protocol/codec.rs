//! JSON codec for PromptLink envelopes.
//!
//! Frames travel as WebSocket text messages, one JSON object per frame.  The
//! decoder distinguishes three failure modes so the router can log them
//! precisely, although all three are reported to the peer as
//! [`ErrorCode::MalformedEnvelope`](crate::protocol::messages::ErrorCode).

use thiserror::Error;

use crate::protocol::messages::{ClientMessage, ServerEnvelope, ServerMessage};

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The text is not JSON, or not a JSON object with a string `type`.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The `type` field names a message this side does not understand.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// A message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one inbound frame sent by a peer to the relay.
///
/// # Errors
///
/// - [`ProtocolError::Malformed`] if the text is not a JSON object with a
///   string `type`, or a known type carries fields of the wrong shape.
/// - [`ProtocolError::UnknownType`] if `type` is not a client message.
///
/// # Examples
///
/// ```rust
/// use promptlink_core::protocol::{decode_client_message, ClientMessage};
///
/// let msg = decode_client_message(r#"{"type":"ping","timestamp":7}"#).unwrap();
/// assert_eq!(msg, ClientMessage::Ping { timestamp: Some(7) });
/// ```
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let type_name = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing string field `type`".to_string()))?;

    if !ClientMessage::TYPE_NAMES.contains(&type_name) {
        return Err(ProtocolError::UnknownType(type_name.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Encodes a client message as a JSON text frame.
pub fn encode_client_message(msg: &ClientMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Encodes a server envelope as a JSON text frame.
pub fn encode_server_envelope(envelope: &ServerEnvelope) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes one frame received from the relay.
///
/// The decorative `success` / `message` / `timestamp` fields are ignored.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    match value.get("type").and_then(serde_json::Value::as_str) {
        Some(_) => {
            serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
        }
        None => Err(ProtocolError::Malformed(
            "missing string field `type`".to_string(),
        )),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SessionToken;
    use crate::protocol::messages::ErrorCode;

    #[test]
    fn test_decode_rejects_non_json() {
        let result = decode_client_message("not json at all");
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_json_without_type() {
        let result = decode_client_message(r#"{"code":"123456"}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_non_object_json() {
        let result = decode_client_message("[1,2,3]");
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_reports_unknown_type_by_name() {
        let result = decode_client_message(r#"{"type":"launch_rockets"}"#);
        assert_eq!(
            result,
            Err(ProtocolError::UnknownType("launch_rockets".to_string()))
        );
    }

    #[test]
    fn test_decode_known_type_with_wrong_field_shape_is_malformed() {
        // `code` must be a string.
        let result = decode_client_message(r#"{"type":"pair","code":482913}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_prompt_with_token() {
        let msg =
            decode_client_message(r#"{"type":"prompt","token":"abc","prompt":"hi"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Prompt {
                token: Some(SessionToken::from("abc")),
                prompt: Some("hi".to_string()),
            }
        );
    }

    #[test]
    fn test_encoded_client_message_is_accepted_by_decoder() {
        // Arrange
        let msg = ClientMessage::Pair {
            code: "482913".to_string(),
            device_info: None,
        };

        // Act
        let text = encode_client_message(&msg).unwrap();

        // Assert
        assert!(!text.contains("deviceInfo"), "None fields are omitted: {text}");
        assert_eq!(decode_client_message(&text).unwrap(), msg);
    }

    #[test]
    fn test_server_envelope_text_decodes_back_to_typed_message() {
        let envelope = ServerEnvelope::new(
            ServerMessage::PromptFailed {
                reason: ErrorCode::NoTargetRegistered,
            },
            42,
        );
        let text = encode_server_envelope(&envelope).unwrap();
        assert_eq!(decode_server_message(&text).unwrap(), envelope.body);
    }

    #[test]
    fn test_decode_server_message_without_type_is_malformed() {
        let result = decode_server_message(r#"{"success":true}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }
}
