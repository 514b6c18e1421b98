//! Call Controller error types.
//!
//! Error types map to signaling `ErrorCode` values for client responses.
//! Internal details are logged server-side but not exposed to clients.

use signaling_protocol::CallState;
use thiserror::Error;

/// Call Controller error type.
///
/// Maps to signaling `ErrorCode` values:
/// - `MalformedFrame`: `BAD_REQUEST` (2)
/// - `NotAParticipant`: `FORBIDDEN` (3)
/// - `ParticipantNotFound`, `SessionNotFound`, `CallNotFound`: `NOT_FOUND` (4)
/// - `CalleeBusy`, `InvalidTransition`, `InvalidCallState`: `CONFLICT` (5)
/// - `Internal`: `INTERNAL_ERROR` (6)
/// - `Draining`, `AtCapacity`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum CallError {
    /// Participant is not registered.
    #[error("Participant not found")]
    ParticipantNotFound,

    /// Session does not exist or was closed.
    #[error("Session not found")]
    SessionNotFound,

    /// Call does not exist (never created, or retired after its
    /// retention window).
    #[error("Call not found")]
    CallNotFound,

    /// The requested transition is not valid from the current state.
    #[error("Invalid transition: {action} from {from}")]
    InvalidTransition {
        /// Operation that was attempted.
        action: &'static str,
        /// State the call was in.
        from: CallState,
    },

    /// The invitation deadline has passed.
    #[error("Invitation expired")]
    InvitationExpired,

    /// Callee already has a call in a non-terminal state.
    #[error("Callee is busy")]
    CalleeBusy,

    /// Caller already has a call in a non-terminal state.
    #[error("Caller already in a call")]
    CallerBusy,

    /// Callee is not registered or has no live connection.
    #[error("Callee unreachable")]
    CalleeUnreachable,

    /// Sender is neither caller nor callee of the call.
    #[error("Not a participant of this call")]
    NotAParticipant,

    /// Staff participant is unavailable for session creation.
    #[error("Staff unavailable")]
    StaffUnavailable,

    /// Relay is not permitted in the call's current state.
    #[error("Invalid call state for relay: {0}")]
    InvalidCallState(CallState),

    /// Controller is shutting down.
    #[error("Controller is draining")]
    Draining,

    /// Controller is at its concurrent-call capacity.
    #[error("Controller at capacity")]
    AtCapacity,

    /// Inbound frame could not be decoded.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallError {
    /// Returns the signaling `ErrorCode` value for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            CallError::Internal(_) => 6, // INTERNAL_ERROR
            CallError::MalformedFrame(_) => 2, // BAD_REQUEST
            CallError::NotAParticipant => 3, // FORBIDDEN
            CallError::ParticipantNotFound
            | CallError::SessionNotFound
            | CallError::CallNotFound => 4, // NOT_FOUND
            CallError::InvalidTransition { .. }
            | CallError::InvalidCallState(_)
            | CallError::InvitationExpired
            | CallError::CalleeBusy
            | CallError::CallerBusy
            | CallError::CalleeUnreachable
            | CallError::StaffUnavailable => 5, // CONFLICT
            CallError::Draining | CallError::AtCapacity => 7, // CAPACITY_EXCEEDED
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            CallError::Internal(_) => "An internal error occurred".to_string(),
            CallError::MalformedFrame(_) => "Malformed signaling frame".to_string(),
            CallError::Draining => "Server is shutting down, please retry".to_string(),
            CallError::AtCapacity => "Server is at capacity, please retry".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(CallError::Internal("boom".to_string()).error_code(), 6);
        assert_eq!(
            CallError::MalformedFrame("not json".to_string()).error_code(),
            2
        );
        assert_eq!(CallError::NotAParticipant.error_code(), 3);
        assert_eq!(CallError::ParticipantNotFound.error_code(), 4);
        assert_eq!(CallError::SessionNotFound.error_code(), 4);
        assert_eq!(CallError::CallNotFound.error_code(), 4);
        assert_eq!(CallError::CalleeBusy.error_code(), 5);
        assert_eq!(CallError::CallerBusy.error_code(), 5);
        assert_eq!(CallError::CalleeUnreachable.error_code(), 5);
        assert_eq!(CallError::InvitationExpired.error_code(), 5);
        assert_eq!(CallError::StaffUnavailable.error_code(), 5);
        assert_eq!(
            CallError::InvalidCallState(CallState::Ringing).error_code(),
            5
        );
        assert_eq!(
            CallError::InvalidTransition {
                action: "accept",
                from: CallState::Active
            }
            .error_code(),
            5
        );
        assert_eq!(CallError::Draining.error_code(), 7);
        assert_eq!(CallError::AtCapacity.error_code(), 7);
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = CallError::Internal("channel send failed at call-xyz".to_string());
        assert!(!err.client_message().contains("call-xyz"));
        assert_eq!(err.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                CallError::InvalidTransition {
                    action: "accept",
                    from: CallState::Ended
                }
            ),
            "Invalid transition: accept from ended"
        );
        assert_eq!(
            format!("{}", CallError::InvalidCallState(CallState::Ringing)),
            "Invalid call state for relay: ringing"
        );
    }
}
