//! `CallActor` - per-call actor that owns one call's state machine.
//!
//! Each `CallActor`:
//! - Owns the state for one call: `ringing` through `ended`
//! - Enforces transition rules and the invitation deadline
//! - Relays offer/answer/ICE payloads between the two participants
//! - Buffers early ICE candidates until the prerequisite SDP has been
//!   relayed, then flushes them in submission order
//!
//! The actor's mailbox is the per-call serialization point: every
//! mutating operation on a call goes through it, so transition races
//! resolve in mailbox order. Deliveries to participants go through the
//! registry's non-awaiting send, so a slow endpoint cannot stall a
//! transition.

use crate::errors::CallError;
use crate::external::{CallHistorySink, CallRecord};
use crate::registry::{DeliveryError, ParticipantRegistry};

use super::messages::{CallMessage, CallSnapshot, CoordinatorMessage};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use chrono::{DateTime, Utc};
use serde_json::Value;
use signaling_protocol::{CallState, EndReason, ServerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for a call mailbox.
const CALL_CHANNEL_BUFFER: usize = 64;

/// Identity and timing parameters fixed at call creation.
#[derive(Debug, Clone)]
pub struct CallSetup {
    /// Call ID.
    pub call_id: String,
    /// Session the call belongs to, if any.
    pub session_id: Option<String>,
    /// Originating participant.
    pub caller_id: String,
    /// Invited participant.
    pub callee_id: String,
    /// Caller's display name, shown on the ringing event.
    pub caller_name: String,
    /// Deadline for the callee to accept.
    pub ring_deadline: Instant,
    /// Same deadline as a unix timestamp, for the wire.
    pub ring_deadline_unix: i64,
    /// Inactivity budget after accept: the call must reach `active`
    /// within this window or it is ended with `timeout`.
    pub connect_timeout: Duration,
}

/// Handle to a `CallActor`.
#[derive(Clone)]
pub struct CallActorHandle {
    sender: mpsc::Sender<CallMessage>,
    cancel_token: CancellationToken,
    call_id: String,
}

impl CallActorHandle {
    /// Get the call ID.
    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Callee accepts the ringing invitation.
    pub async fn accept(&self, by: String) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallMessage::Accept { by, respond_to: tx })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Callee declines the ringing invitation.
    pub async fn decline(&self, by: String) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallMessage::Decline { by, respond_to: tx })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// End the call.
    pub async fn end(&self, by: String, reason: EndReason) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallMessage::End {
                by,
                reason,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Forward a relay or disconnect message without waiting for the
    /// outcome. The response channel inside the message, if any, is
    /// answered by the actor directly.
    ///
    /// # Errors
    ///
    /// Returns the message back when the mailbox is full or closed.
    pub fn forward(&self, message: CallMessage) -> Result<(), CallMessage> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(m) | mpsc::error::TrySendError::Closed(m) => m,
        })
    }

    /// Get a point-in-time snapshot of the call.
    pub async fn snapshot(&self) -> Result<CallSnapshot, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallMessage::GetSnapshot { respond_to: tx })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the call actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `CallActor` implementation.
pub struct CallActor {
    /// Fixed identity and timing.
    setup: CallSetup,
    /// Message receiver.
    receiver: mpsc::Receiver<CallMessage>,
    /// Cancellation token (child of the coordinator's token).
    cancel_token: CancellationToken,
    /// Registry used to resolve connection handles fresh per delivery.
    registry: Arc<ParticipantRegistry>,
    /// Sink for the final call record.
    history: Arc<dyn CallHistorySink>,
    /// Channel back to the coordinator for terminal notifications.
    coordinator: mpsc::Sender<CoordinatorMessage>,
    /// Current state.
    state: CallState,
    /// Terminal reason, once ended.
    reason: Option<EndReason>,
    /// Creation timestamp.
    created_at: DateTime<Utc>,
    /// Accept timestamp.
    accepted_at: Option<DateTime<Utc>>,
    /// End timestamp.
    ended_at: Option<DateTime<Utc>>,
    /// Deadline for reaching `active` after accept.
    connect_deadline: Option<Instant>,
    /// Whether the offer has been relayed to the callee.
    offer_relayed: bool,
    /// Whether the answer has been relayed to the caller.
    answer_relayed: bool,
    /// ICE candidates waiting on the offer, in submission order.
    ice_for_callee: Vec<Value>,
    /// ICE candidates waiting on the answer, in submission order.
    ice_for_caller: Vec<Value>,
    /// Shared actor metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl CallActor {
    /// Spawn a new call actor in `ringing`.
    ///
    /// The ringing event is delivered to the callee from inside the
    /// actor task; a delivery failure tears the call down with
    /// `relay-error` before any message is processed.
    pub fn spawn(
        setup: CallSetup,
        registry: Arc<ParticipantRegistry>,
        history: Arc<dyn CallHistorySink>,
        coordinator: mpsc::Sender<CoordinatorMessage>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (CallActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CALL_CHANNEL_BUFFER);
        let call_id = setup.call_id.clone();

        let actor = Self {
            mailbox: MailboxMonitor::new(ActorType::Call, &call_id),
            setup,
            receiver,
            cancel_token: cancel_token.clone(),
            registry,
            history,
            coordinator,
            state: CallState::Ringing,
            reason: None,
            created_at: Utc::now(),
            accepted_at: None,
            ended_at: None,
            connect_deadline: None,
            offer_relayed: false,
            answer_relayed: false,
            ice_for_callee: Vec::new(),
            ice_for_caller: Vec::new(),
            metrics,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = CallActorHandle {
            sender,
            cancel_token,
            call_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "cc.actor.call", fields(call_id = %self.setup.call_id))]
    async fn run(mut self) {
        info!(
            target: "cc.actor.call",
            caller_id = %self.setup.caller_id,
            callee_id = %self.setup.callee_id,
            "CallActor started, ringing"
        );

        let ring = ServerEvent::CallRinging {
            call_id: self.setup.call_id.clone(),
            caller_name: self.setup.caller_name.clone(),
            deadline: self.setup.ring_deadline_unix,
        };
        if let Err(e) = self.registry.notify(&self.setup.callee_id, ring).await {
            warn!(
                target: "cc.actor.call",
                error = ?e,
                "Failed to deliver ringing event, ending call"
            );
            self.finish(EndReason::RelayError).await;
        }

        while !self.state.is_terminal() {
            let deadline = self.current_deadline();

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "cc.actor.call",
                        "CallActor received cancellation signal"
                    );
                    self.finish(EndReason::Shutdown).await;
                }

                () = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.handle_deadline_elapsed().await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "cc.actor.call",
                                "CallActor channel closed, exiting"
                            );
                            self.finish(EndReason::Shutdown).await;
                        }
                    }
                }
            }
        }

        info!(
            target: "cc.actor.call",
            reason = ?self.reason,
            messages_processed = self.mailbox.messages_processed(),
            "CallActor stopped"
        );
    }

    /// The deadline currently armed, if any: the ring deadline while
    /// ringing, the connect deadline between accept and active.
    fn current_deadline(&self) -> Option<Instant> {
        match self.state {
            CallState::Ringing => Some(self.setup.ring_deadline),
            CallState::Accepted | CallState::Connecting => self.connect_deadline,
            CallState::Active | CallState::Ended => None,
        }
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: CallMessage) {
        match message {
            CallMessage::Accept { by, respond_to } => {
                let result = self.handle_accept(&by).await;
                let _ = respond_to.send(result);
            }

            CallMessage::Decline { by, respond_to } => {
                let result = self.handle_decline(&by).await;
                let _ = respond_to.send(result);
            }

            CallMessage::End {
                by,
                reason,
                respond_to,
            } => {
                let result = self.handle_end(&by, reason).await;
                let _ = respond_to.send(result);
            }

            CallMessage::RelayOffer {
                from,
                sdp,
                respond_to,
            } => {
                let result = self.handle_relay_offer(&from, sdp).await;
                let _ = respond_to.send(result);
            }

            CallMessage::RelayAnswer {
                from,
                sdp,
                respond_to,
            } => {
                let result = self.handle_relay_answer(&from, sdp).await;
                let _ = respond_to.send(result);
            }

            CallMessage::RelayIce {
                from,
                candidate,
                respond_to,
            } => {
                let result = self.handle_relay_ice(&from, candidate).await;
                let _ = respond_to.send(result);
            }

            CallMessage::PeerDisconnected { participant_id } => {
                info!(
                    target: "cc.actor.call",
                    participant_id = %participant_id,
                    "Participant disconnected, ending call"
                );
                self.finish(EndReason::PeerDisconnected).await;
            }

            CallMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    /// Accept the invitation: `ringing` to `accepted`.
    async fn handle_accept(&mut self, by: &str) -> Result<(), CallError> {
        if self.state != CallState::Ringing {
            return Err(CallError::InvalidTransition {
                action: "accept",
                from: self.state,
            });
        }
        if by != self.setup.callee_id {
            return Err(CallError::InvalidTransition {
                action: "accept",
                from: self.state,
            });
        }
        if Instant::now() >= self.setup.ring_deadline {
            // The deadline passed but the timer has not fired yet.
            self.finish(EndReason::Timeout).await;
            return Err(CallError::InvitationExpired);
        }

        self.state = CallState::Accepted;
        self.accepted_at = Some(Utc::now());
        self.connect_deadline = Some(Instant::now() + self.setup.connect_timeout);

        info!(target: "cc.actor.call", "Call accepted");
        self.broadcast_state(None).await;
        Ok(())
    }

    /// Decline the invitation: `ringing` to `ended(declined)`.
    async fn handle_decline(&mut self, by: &str) -> Result<(), CallError> {
        if self.state != CallState::Ringing || by != self.setup.callee_id {
            return Err(CallError::InvalidTransition {
                action: "decline",
                from: self.state,
            });
        }

        self.finish(EndReason::Declined).await;
        Ok(())
    }

    /// Explicit end from either side. Valid from any non-terminal state.
    async fn handle_end(&mut self, by: &str, reason: EndReason) -> Result<(), CallError> {
        debug!(
            target: "cc.actor.call",
            by = %by,
            reason = %reason,
            "End requested"
        );
        self.finish(reason).await;
        Ok(())
    }

    /// Relay the caller's SDP offer to the callee.
    async fn handle_relay_offer(&mut self, from: &str, sdp: Value) -> Result<(), CallError> {
        if !self.state.allows_relay() {
            return Err(CallError::InvalidCallState(self.state));
        }
        if from != self.setup.caller_id {
            return Err(CallError::InvalidTransition {
                action: "offer",
                from: self.state,
            });
        }

        let event = ServerEvent::Offer {
            call_id: self.setup.call_id.clone(),
            sdp,
        };
        if let Err(e) = self.registry.notify(&self.setup.callee_id, event).await {
            return self.relay_failed("offer", e).await;
        }

        self.offer_relayed = true;
        self.advance_connection().await;

        if let Err(e) = self.flush_buffered_ice_to_callee().await {
            return self.relay_failed("ice flush", e).await;
        }
        Ok(())
    }

    /// Relay the callee's SDP answer to the caller.
    async fn handle_relay_answer(&mut self, from: &str, sdp: Value) -> Result<(), CallError> {
        if !self.state.allows_relay() {
            return Err(CallError::InvalidCallState(self.state));
        }
        if from != self.setup.callee_id {
            return Err(CallError::InvalidTransition {
                action: "answer",
                from: self.state,
            });
        }

        let event = ServerEvent::Answer {
            call_id: self.setup.call_id.clone(),
            sdp,
        };
        if let Err(e) = self.registry.notify(&self.setup.caller_id, event).await {
            return self.relay_failed("answer", e).await;
        }

        self.answer_relayed = true;
        self.advance_connection().await;

        if let Err(e) = self.flush_buffered_ice_to_caller().await {
            return self.relay_failed("ice flush", e).await;
        }
        Ok(())
    }

    /// Relay an ICE candidate to the other participant, buffering it
    /// when the prerequisite SDP has not been relayed yet.
    async fn handle_relay_ice(&mut self, from: &str, candidate: Value) -> Result<(), CallError> {
        if !self.state.allows_relay() {
            return Err(CallError::InvalidCallState(self.state));
        }

        let toward_callee = if from == self.setup.caller_id {
            true
        } else if from == self.setup.callee_id {
            false
        } else {
            return Err(CallError::NotAParticipant);
        };

        if toward_callee && !self.offer_relayed {
            self.ice_for_callee.push(candidate);
            return Ok(());
        }
        if !toward_callee && !self.answer_relayed {
            self.ice_for_caller.push(candidate);
            return Ok(());
        }

        let target = if toward_callee {
            self.setup.callee_id.clone()
        } else {
            self.setup.caller_id.clone()
        };
        let event = ServerEvent::IceCandidate {
            call_id: self.setup.call_id.clone(),
            candidate,
        };
        match self.registry.notify(&target, event).await {
            Ok(()) | Err(DeliveryError::Full) => Ok(()),
            Err(e) => self.relay_failed("ice", e).await,
        }
    }

    /// Advance `accepted` to `connecting` on the first offer, and to
    /// `active` once both SDP messages have been relayed.
    async fn advance_connection(&mut self) {
        let next = if self.offer_relayed && self.answer_relayed {
            CallState::Active
        } else if self.offer_relayed {
            CallState::Connecting
        } else {
            return;
        };

        if next == self.state || self.state.is_terminal() {
            return;
        }

        self.state = next;
        if next == CallState::Active {
            self.connect_deadline = None;
        }
        info!(target: "cc.actor.call", state = %next, "Call state advanced");
        self.broadcast_state(None).await;
    }

    /// Flush ICE candidates buffered for the callee, in order.
    async fn flush_buffered_ice_to_callee(&mut self) -> Result<(), DeliveryError> {
        for candidate in std::mem::take(&mut self.ice_for_callee) {
            let event = ServerEvent::IceCandidate {
                call_id: self.setup.call_id.clone(),
                candidate,
            };
            match self.registry.notify(&self.setup.callee_id, event).await {
                Ok(()) | Err(DeliveryError::Full) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Flush ICE candidates buffered for the caller, in order.
    async fn flush_buffered_ice_to_caller(&mut self) -> Result<(), DeliveryError> {
        for candidate in std::mem::take(&mut self.ice_for_caller) {
            let event = ServerEvent::IceCandidate {
                call_id: self.setup.call_id.clone(),
                candidate,
            };
            match self.registry.notify(&self.setup.caller_id, event).await {
                Ok(()) | Err(DeliveryError::Full) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Tear the call down after a failed delivery. The sender gets an
    /// error; the uninvolved peer only sees the `relay-error` terminal
    /// state.
    async fn relay_failed(
        &mut self,
        what: &'static str,
        error: DeliveryError,
    ) -> Result<(), CallError> {
        warn!(
            target: "cc.actor.call",
            what = what,
            error = ?error,
            "Relay delivery failed, ending call"
        );
        self.finish(EndReason::RelayError).await;
        Err(CallError::Internal(format!(
            "{what} delivery failed: {error:?}"
        )))
    }

    /// A ring or connect deadline elapsed.
    async fn handle_deadline_elapsed(&mut self) {
        match self.state {
            CallState::Ringing => {
                info!(target: "cc.actor.call", "Invitation deadline elapsed");
                self.finish(EndReason::Timeout).await;
            }
            CallState::Accepted | CallState::Connecting => {
                info!(target: "cc.actor.call", "Connect timeout elapsed before active");
                self.finish(EndReason::Timeout).await;
            }
            CallState::Active | CallState::Ended => {}
        }
    }

    /// Transition to `ended(reason)`. Idempotent.
    ///
    /// Notifies both participants, hands the record to the history
    /// sink, and tells the coordinator so busy entries and the pending
    /// invitation are released.
    async fn finish(&mut self, reason: EndReason) {
        if self.state.is_terminal() {
            return;
        }

        self.state = CallState::Ended;
        self.reason = Some(reason);
        self.ended_at = Some(Utc::now());

        self.broadcast_state(Some(reason)).await;

        let record = self.final_record(reason);
        // Best effort: sink failures are its own problem, teardown is
        // already committed.
        self.history.record_call_ended(&record);

        let terminated = CoordinatorMessage::CallTerminated {
            call_id: self.setup.call_id.clone(),
            reason,
            snapshot: self.snapshot(),
        };
        if let Err(e) = self.coordinator.try_send(terminated) {
            warn!(
                target: "cc.actor.call",
                error = %e,
                "Failed to notify coordinator of call end"
            );
        }

        info!(
            target: "cc.actor.call",
            reason = %reason,
            duration_seconds = record.duration_seconds,
            "Call ended"
        );
    }

    /// Send `call_state_changed` to both participants. Delivery
    /// failures here are logged and do not affect the transition.
    async fn broadcast_state(&self, reason: Option<EndReason>) {
        for participant_id in [&self.setup.caller_id, &self.setup.callee_id] {
            let event = ServerEvent::CallStateChanged {
                call_id: self.setup.call_id.clone(),
                state: self.state,
                reason,
            };
            if let Err(e) = self.registry.notify(participant_id, event).await {
                debug!(
                    target: "cc.actor.call",
                    participant_id = %participant_id,
                    error = ?e,
                    "State change not delivered"
                );
            }
        }
    }

    fn final_record(&self, reason: EndReason) -> CallRecord {
        let ended_at = self.ended_at.unwrap_or_else(Utc::now);
        let duration_seconds = self
            .accepted_at
            .map_or(0, |accepted| (ended_at - accepted).num_seconds());

        CallRecord {
            call_id: self.setup.call_id.clone(),
            session_id: self.setup.session_id.clone(),
            caller_id: self.setup.caller_id.clone(),
            callee_id: self.setup.callee_id.clone(),
            reason,
            created_at: self.created_at,
            accepted_at: self.accepted_at,
            ended_at,
            duration_seconds,
        }
    }

    fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            call_id: self.setup.call_id.clone(),
            session_id: self.setup.session_id.clone(),
            caller_id: self.setup.caller_id.clone(),
            callee_id: self.setup.callee_id.clone(),
            state: self.state,
            reason: self.reason,
            created_at: self.created_at,
            accepted_at: self.accepted_at,
            ended_at: self.ended_at,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }
}
