//! Codec for encoding and decoding signaling messages.
//!
//! Messages are single JSON objects, one per transport frame. The codec
//! rejects anything that does not carry a known `event` tag.

use crate::events::{ClientCommand, ServerEvent};

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame is not valid JSON or does not match the vocabulary.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame serialization failed.
    #[error("Encode failed: {0}")]
    EncodeFailed(String),
}

/// Decode a client command from a transport frame.
///
/// # Errors
///
/// Returns an error if the frame is not a known command.
pub fn decode_command(frame: &str) -> Result<ClientCommand, CodecError> {
    serde_json::from_str(frame).map_err(|e| CodecError::InvalidFrame(e.to_string()))
}

/// Encode a server event into a transport frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_event(event: &ServerEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::EncodeFailed(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::CallState;
    use serde_json::json;

    #[test]
    fn test_decode_command() {
        let cmd = decode_command(r#"{"event":"end_call","call_id":"c1","reason":"normal"}"#)
            .expect("valid frame");
        assert!(matches!(cmd, ClientCommand::EndCall { .. }));
    }

    #[test]
    fn test_decode_rejects_unknown_event() {
        let result = decode_command(r#"{"event":"mute_all"}"#);
        assert!(matches!(result, Err(CodecError::InvalidFrame(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode_command("not json");
        assert!(matches!(result, Err(CodecError::InvalidFrame(_))));
    }

    #[test]
    fn test_encode_event() {
        let frame = encode_event(&ServerEvent::CallStateChanged {
            call_id: "c1".to_string(),
            state: CallState::Active,
            reason: None,
        })
        .expect("encodable");
        assert!(frame.contains("\"event\":\"call_state_changed\""));
        assert!(!frame.contains("reason"));
    }

    #[test]
    fn test_offer_survives_encode_decode() {
        let sdp = json!({"type": "offer", "sdp": "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n"});
        let frame = encode_event(&ServerEvent::Offer {
            call_id: "c1".to_string(),
            sdp: sdp.clone(),
        })
        .expect("encodable");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["sdp"], sdp);
    }
}
