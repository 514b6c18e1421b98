//! Signaling command routing.
//!
//! Sits between the transport layer and the coordinator: decodes wire
//! frames, pins the sender's identity onto each command, and dispatches
//! to the coordinator. Replies travel back synchronously on the same
//! connection; asynchronous events (`call_ringing`, relays, state
//! changes) reach participants through their registry outbound channel.
//!
//! The router never trusts identity fields inside a frame. A command
//! claiming a `caller_id` other than the connection's own participant
//! id is rejected with `NotAParticipant` before it reaches the
//! coordinator.

use crate::actors::CoordinatorHandle;
use crate::errors::CallError;
use signaling_protocol::{decode_command, CallState, ClientCommand, ServerEvent};
use tracing::debug;

/// Routes decoded client commands to the coordinator.
#[derive(Clone)]
pub struct SignalingRouter {
    coordinator: CoordinatorHandle,
}

impl SignalingRouter {
    /// Create a router over the given coordinator handle.
    #[must_use]
    pub fn new(coordinator: CoordinatorHandle) -> Self {
        Self { coordinator }
    }

    /// Decode and dispatch one transport frame from `participant_id`.
    ///
    /// Returns the synchronous reply event, if the command has one.
    ///
    /// # Errors
    ///
    /// `MalformedFrame` if the frame does not decode; otherwise
    /// whatever the dispatched operation returns.
    pub async fn handle_frame(
        &self,
        participant_id: &str,
        frame: &str,
    ) -> Result<Option<ServerEvent>, CallError> {
        let command =
            decode_command(frame).map_err(|e| CallError::MalformedFrame(e.to_string()))?;
        self.dispatch(participant_id, command).await
    }

    /// Dispatch one command on behalf of `participant_id`.
    ///
    /// # Errors
    ///
    /// Propagates the coordinator's result for the operation.
    pub async fn dispatch(
        &self,
        participant_id: &str,
        command: ClientCommand,
    ) -> Result<Option<ServerEvent>, CallError> {
        debug!(
            target: "cc.signaling",
            participant_id,
            command = command_name(&command),
            "Dispatching command"
        );

        match command {
            ClientCommand::InitiateCall {
                caller_id,
                callee_id,
                session_id,
            } => {
                if caller_id != participant_id {
                    return Err(CallError::NotAParticipant);
                }
                let result = self
                    .coordinator
                    .initiate_call(caller_id, callee_id, session_id)
                    .await?;
                // The synchronous reply carries the new call id; the
                // callee learns of the call via `call_ringing`.
                Ok(Some(ServerEvent::CallStateChanged {
                    call_id: result.call_id,
                    state: CallState::Ringing,
                    reason: None,
                }))
            }

            ClientCommand::AcceptCall { call_id } => {
                self.coordinator
                    .accept_call(call_id, participant_id.to_string())
                    .await?;
                Ok(None)
            }

            ClientCommand::DeclineCall { call_id } => {
                self.coordinator
                    .decline_call(call_id, participant_id.to_string())
                    .await?;
                Ok(None)
            }

            ClientCommand::Offer { call_id, sdp } => {
                self.coordinator
                    .relay_offer(call_id, participant_id.to_string(), sdp)
                    .await?;
                Ok(None)
            }

            ClientCommand::Answer { call_id, sdp } => {
                self.coordinator
                    .relay_answer(call_id, participant_id.to_string(), sdp)
                    .await?;
                Ok(None)
            }

            ClientCommand::IceCandidate { call_id, candidate } => {
                self.coordinator
                    .relay_ice(call_id, participant_id.to_string(), candidate)
                    .await?;
                Ok(None)
            }

            ClientCommand::EndCall { call_id, reason } => {
                self.coordinator
                    .end_call(call_id, participant_id.to_string(), reason)
                    .await?;
                Ok(None)
            }
        }
    }
}

/// Command tag for logging, matching the wire vocabulary.
fn command_name(command: &ClientCommand) -> &'static str {
    match command {
        ClientCommand::InitiateCall { .. } => "initiate_call",
        ClientCommand::AcceptCall { .. } => "accept_call",
        ClientCommand::DeclineCall { .. } => "decline_call",
        ClientCommand::Offer { .. } => "offer",
        ClientCommand::Answer { .. } => "answer",
        ClientCommand::IceCandidate { .. } => "ice_candidate",
        ClientCommand::EndCall { .. } => "end_call",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::{ActorMetrics, CoordinatorActor};
    use crate::config::Config;
    use crate::external::{AlwaysAvailable, LoggingHistorySink};
    use crate::registry::ParticipantRegistry;
    use crate::sessions::SessionStore;
    use signaling_protocol::Role;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        router: SignalingRouter,
        staff_rx: mpsc::Receiver<ServerEvent>,
    }

    async fn spawn_router() -> Harness {
        let config = Config::from_vars(&HashMap::from([(
            "CC_ID".to_string(),
            "cc-test-001".to_string(),
        )]))
        .unwrap();

        let registry = Arc::new(ParticipantRegistry::new());
        let (client_tx, _client_rx) = ParticipantRegistry::outbound_channel();
        let (staff_tx, staff_rx) = ParticipantRegistry::outbound_channel();
        registry
            .register("client-1", Role::Client, "Alex", client_tx)
            .await;
        registry
            .register("staff-1", Role::Staff, "Dana", staff_tx)
            .await;

        let sessions = Arc::new(SessionStore::new(
            Arc::clone(&registry),
            Arc::new(AlwaysAvailable),
        ));

        let (handle, _task) = CoordinatorActor::spawn(
            config,
            registry,
            sessions,
            Arc::new(LoggingHistorySink),
            CancellationToken::new(),
            ActorMetrics::new(),
        );

        Harness {
            router: SignalingRouter::new(handle),
            staff_rx,
        }
    }

    #[tokio::test]
    async fn test_initiate_frame_replies_with_ringing_state() {
        let mut h = spawn_router().await;

        let reply = h
            .router
            .handle_frame(
                "client-1",
                r#"{"event":"initiate_call","caller_id":"client-1","callee_id":"staff-1"}"#,
            )
            .await
            .unwrap();

        let call_id = match reply {
            Some(ServerEvent::CallStateChanged {
                call_id,
                state: CallState::Ringing,
                reason: None,
            }) => call_id,
            other => panic!("expected ringing reply, got {other:?}"),
        };

        match h.staff_rx.recv().await.unwrap() {
            ServerEvent::CallRinging { call_id: ringing, .. } => assert_eq!(ringing, call_id),
            other => panic!("expected call_ringing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spoofed_caller_id_rejected() {
        let h = spawn_router().await;

        let result = h
            .router
            .handle_frame(
                "client-1",
                r#"{"event":"initiate_call","caller_id":"client-99","callee_id":"staff-1"}"#,
            )
            .await;

        assert!(matches!(result, Err(CallError::NotAParticipant)));
    }

    #[tokio::test]
    async fn test_malformed_frame_rejected() {
        let h = spawn_router().await;

        let result = h.router.handle_frame("client-1", "not json").await;
        assert!(matches!(result, Err(CallError::MalformedFrame(_))));

        let result = h
            .router
            .handle_frame("client-1", r#"{"event":"mute_all"}"#)
            .await;
        assert!(matches!(result, Err(CallError::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn test_accept_uses_connection_identity() {
        let mut h = spawn_router().await;

        h.router
            .handle_frame(
                "client-1",
                r#"{"event":"initiate_call","caller_id":"client-1","callee_id":"staff-1"}"#,
            )
            .await
            .unwrap();

        let call_id = match h.staff_rx.recv().await.unwrap() {
            ServerEvent::CallRinging { call_id, .. } => call_id,
            other => panic!("expected call_ringing, got {other:?}"),
        };

        // The caller cannot accept its own invitation.
        let result = h
            .router
            .handle_frame(
                "client-1",
                &format!(r#"{{"event":"accept_call","call_id":"{call_id}"}}"#),
            )
            .await;
        assert!(matches!(
            result,
            Err(CallError::InvalidTransition { action: "accept", .. })
        ));

        let reply = h
            .router
            .handle_frame(
                "staff-1",
                &format!(r#"{{"event":"accept_call","call_id":"{call_id}"}}"#),
            )
            .await
            .unwrap();
        assert!(reply.is_none());
    }
}
