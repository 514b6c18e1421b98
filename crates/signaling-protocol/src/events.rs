//! Boundary events exchanged with the transport layer.
//!
//! Tags follow the wire vocabulary: `initiate_call`, `call_ringing`,
//! `accept_call`, `decline_call`, `call_state_changed`, `offer`,
//! `answer`, `ice_candidate`, `end_call`.

use crate::types::{CallState, EndReason};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command sent by a client (or callee endpoint) toward the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Request a call against a staff participant.
    InitiateCall {
        caller_id: String,
        callee_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// Callee accepts a ringing invitation.
    AcceptCall { call_id: String },

    /// Callee declines a ringing invitation.
    DeclineCall { call_id: String },

    /// Caller's SDP offer. Payload is opaque to the core.
    Offer { call_id: String, sdp: Value },

    /// Callee's SDP answer. Payload is opaque to the core.
    Answer { call_id: String, sdp: Value },

    /// ICE candidate from either side. Payload is opaque to the core.
    IceCandidate { call_id: String, candidate: Value },

    /// End the call from any non-terminal state.
    EndCall {
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<EndReason>,
    },
}

/// An event emitted by the core toward a connected participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Invitation delivered to the callee.
    CallRinging {
        call_id: String,
        caller_name: String,
        /// Absolute unix timestamp (seconds) at which the invitation expires.
        deadline: i64,
    },

    /// Observability: the call moved to a new state.
    CallStateChanged {
        call_id: String,
        state: CallState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<EndReason>,
    },

    /// Relayed SDP offer (delivered to the callee).
    Offer { call_id: String, sdp: Value },

    /// Relayed SDP answer (delivered to the caller).
    Answer { call_id: String, sdp: Value },

    /// Relayed ICE candidate (delivered to the other endpoint).
    IceCandidate { call_id: String, candidate: Value },
}

impl ServerEvent {
    /// The call this event refers to.
    #[must_use]
    pub fn call_id(&self) -> &str {
        match self {
            ServerEvent::CallRinging { call_id, .. }
            | ServerEvent::CallStateChanged { call_id, .. }
            | ServerEvent::Offer { call_id, .. }
            | ServerEvent::Answer { call_id, .. }
            | ServerEvent::IceCandidate { call_id, .. } => call_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initiate_call_tag() {
        let cmd = ClientCommand::InitiateCall {
            caller_id: "client-1".to_string(),
            callee_id: "staff-1".to_string(),
            session_id: None,
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["event"], "initiate_call");
        assert_eq!(value["caller_id"], "client-1");
        // Absent session_id is omitted entirely, not serialized as null.
        assert!(value.get("session_id").is_none());
    }

    #[test]
    fn test_ice_candidate_payload_is_opaque() {
        let cmd = ClientCommand::IceCandidate {
            call_id: "call-1".to_string(),
            candidate: json!({"candidate": "candidate:0 1 UDP 2122252543 10.0.0.1 50000 typ host", "sdpMid": "0"}),
        };
        let text = serde_json::to_string(&cmd).unwrap();
        let back: ClientCommand = serde_json::from_str(&text).unwrap();
        assert_eq!(cmd, back);
    }

    #[test]
    fn test_call_state_changed_carries_reason() {
        let event = ServerEvent::CallStateChanged {
            call_id: "call-1".to_string(),
            state: CallState::Ended,
            reason: Some(EndReason::Timeout),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "call_state_changed");
        assert_eq!(value["state"], "ended");
        assert_eq!(value["reason"], "timeout");
    }

    #[test]
    fn test_call_ringing_deadline_is_absolute() {
        let event = ServerEvent::CallRinging {
            call_id: "call-1".to_string(),
            caller_name: "Alex".to_string(),
            deadline: 1_700_000_030,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["deadline"], 1_700_000_030);
    }

    #[test]
    fn test_server_event_call_id_accessor() {
        let event = ServerEvent::Answer {
            call_id: "call-9".to_string(),
            sdp: json!({"type": "answer"}),
        };
        assert_eq!(event.call_id(), "call-9");
    }

    #[test]
    fn test_decode_wire_command() {
        let text = r#"{"event":"accept_call","call_id":"call-7"}"#;
        let cmd: ClientCommand = serde_json::from_str(text).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::AcceptCall {
                call_id: "call-7".to_string()
            }
        );
    }
}
