//! Shared call-state types.
//!
//! These types appear on the wire (inside `call_state_changed` events)
//! and throughout the call controller's internal state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a connected participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Staff participant (receives invitations).
    Staff,
    /// Client participant (originates calls).
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Staff => write!(f, "staff"),
            Role::Client => write!(f, "client"),
        }
    }
}

/// Lifecycle state of a call.
///
/// Transitions: `ringing -> accepted -> connecting -> active -> ended`,
/// with `ringing -> ended` on decline/timeout and any-state `-> ended`
/// on disconnect or explicit end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Invitation delivered to the callee, deadline running.
    Ringing,
    /// Callee accepted; waiting for the first offer.
    Accepted,
    /// Offer relayed; waiting for the answer.
    Connecting,
    /// Offer and answer both relayed once.
    Active,
    /// Terminal state. The reason is carried separately.
    Ended,
}

impl CallState {
    /// Whether this state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended)
    }

    /// Whether signaling relay is permitted in this state.
    #[must_use]
    pub fn allows_relay(&self) -> bool {
        matches!(
            self,
            CallState::Accepted | CallState::Connecting | CallState::Active
        )
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Ringing => "ringing",
            CallState::Accepted => "accepted",
            CallState::Connecting => "connecting",
            CallState::Active => "active",
            CallState::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

/// Why a call reached `ended`.
///
/// Passive expiry and active decline are deliberately indistinguishable
/// except through this code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// Either party ended an established call.
    Normal,
    /// Callee declined while ringing.
    Declined,
    /// Ring deadline or post-accept inactivity deadline expired.
    Timeout,
    /// Caller or callee disconnected from the registry.
    PeerDisconnected,
    /// A relay send failed; the call was torn down rather than
    /// surfacing the failure to the uninvolved peer.
    RelayError,
    /// Coordinator drained the call during shutdown.
    Shutdown,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::Normal => "normal",
            EndReason::Declined => "declined",
            EndReason::Timeout => "timeout",
            EndReason::PeerDisconnected => "peer-disconnected",
            EndReason::RelayError => "relay-error",
            EndReason::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_call_state_terminality() {
        assert!(CallState::Ended.is_terminal());
        assert!(!CallState::Ringing.is_terminal());
        assert!(!CallState::Active.is_terminal());
    }

    #[test]
    fn test_call_state_relay_permission() {
        assert!(!CallState::Ringing.allows_relay());
        assert!(CallState::Accepted.allows_relay());
        assert!(CallState::Connecting.allows_relay());
        assert!(CallState::Active.allows_relay());
        assert!(!CallState::Ended.allows_relay());
    }

    #[test]
    fn test_end_reason_wire_names() {
        let json = serde_json::to_string(&EndReason::PeerDisconnected).unwrap();
        assert_eq!(json, "\"peer-disconnected\"");
        let json = serde_json::to_string(&EndReason::RelayError).unwrap();
        assert_eq!(json, "\"relay-error\"");
    }

    #[test]
    fn test_call_state_wire_names() {
        let json = serde_json::to_string(&CallState::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
        let state: CallState = serde_json::from_str("\"ringing\"").unwrap();
        assert_eq!(state, CallState::Ringing);
    }

    #[test]
    fn test_display_matches_wire_names() {
        assert_eq!(CallState::Accepted.to_string(), "accepted");
        assert_eq!(EndReason::PeerDisconnected.to_string(), "peer-disconnected");
        assert_eq!(Role::Staff.to_string(), "staff");
    }
}
