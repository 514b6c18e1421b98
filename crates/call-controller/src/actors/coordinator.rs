//! `CoordinatorActor` - singleton supervisor for the call system.
//!
//! The coordinator:
//! - Owns the call table and spawns one `CallActor` per call
//! - Enforces the one-active-call-per-participant busy rules
//! - Owns the invitation queue and the disconnect cascade
//! - Retains terminal calls for a retention window so late operations
//!   observe the terminal state instead of `CallNotFound`
//! - Sheds load when at capacity or draining
//!
//! Control operations (`accept`, `decline`, `end`) are awaited through
//! the call actor so busy-index bookkeeping moves in lockstep with the
//! transition. Relay operations are passed through without waiting; the
//! call actor answers the originating client directly.

use crate::config::Config;
use crate::errors::CallError;
use crate::external::CallHistorySink;
use crate::invitations::{InvitationQueue, PendingInvitation};
use crate::registry::ParticipantRegistry;
use crate::sessions::SessionStore;

use super::call::{CallActor, CallActorHandle, CallSetup};
use super::messages::{
    CallMessage, CallSnapshot, CoordinatorMessage, CoordinatorStatus, InitiateResult,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use chrono::{DateTime, Utc};
use serde_json::Value;
use signaling_protocol::{CallState, EndReason};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Channel buffer size for the coordinator mailbox.
const COORDINATOR_CHANNEL_BUFFER: usize = 500;

/// How long to wait for a call actor during shutdown drain.
const DRAIN_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the `CoordinatorActor`.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    cancel_token: CancellationToken,
}

impl CoordinatorHandle {
    /// Create a call and start it ringing.
    pub async fn initiate_call(
        &self,
        caller_id: String,
        callee_id: String,
        session_id: Option<String>,
    ) -> Result<InitiateResult, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CoordinatorMessage::InitiateCall {
                caller_id,
                callee_id,
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Accept a ringing call.
    pub async fn accept_call(&self, call_id: String, by: String) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CoordinatorMessage::AcceptCall {
                call_id,
                by,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Decline a ringing call.
    pub async fn decline_call(&self, call_id: String, by: String) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CoordinatorMessage::DeclineCall {
                call_id,
                by,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// End a call. Idempotent once the call is terminal.
    pub async fn end_call(
        &self,
        call_id: String,
        by: String,
        reason: Option<EndReason>,
    ) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CoordinatorMessage::EndCall {
                call_id,
                by,
                reason,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Relay an SDP offer toward the callee.
    pub async fn relay_offer(
        &self,
        call_id: String,
        from: String,
        sdp: Value,
    ) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CoordinatorMessage::RelayOffer {
                call_id,
                from,
                sdp,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Relay an SDP answer toward the caller.
    pub async fn relay_answer(
        &self,
        call_id: String,
        from: String,
        sdp: Value,
    ) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CoordinatorMessage::RelayAnswer {
                call_id,
                from,
                sdp,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Relay an ICE candidate toward the other participant.
    pub async fn relay_ice(
        &self,
        call_id: String,
        from: String,
        candidate: Value,
    ) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CoordinatorMessage::RelayIce {
                call_id,
                from,
                candidate,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cascade-cancel after a participant's transport dropped.
    pub async fn participant_disconnected(&self, participant_id: String) -> Result<(), CallError> {
        self.sender
            .send(CoordinatorMessage::ParticipantDisconnected { participant_id })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))
    }

    /// Pending invitations for a callee, oldest first.
    pub async fn list_invitations(
        &self,
        callee_id: String,
    ) -> Result<Vec<PendingInvitation>, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CoordinatorMessage::ListInvitations {
                callee_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))
    }

    /// Snapshot of one call, live or retained.
    pub async fn call_snapshot(&self, call_id: String) -> Result<CallSnapshot, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CoordinatorMessage::GetCallSnapshot {
                call_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Coordinator-level counters.
    pub async fn status(&self) -> Result<CoordinatorStatus, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CoordinatorMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the coordinator (starts the shutdown drain).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the coordinator is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Managed call state held by the coordinator.
struct ManagedCall {
    /// Handle to the call actor.
    handle: CallActorHandle,
    /// Join handle, consumed by health checks or the shutdown drain.
    task_handle: Option<JoinHandle<()>>,
    /// Originating participant.
    caller_id: String,
    /// Invited participant.
    callee_id: String,
    /// Session the call belongs to, if any.
    session_id: Option<String>,
    /// When the call was created.
    created_at: DateTime<Utc>,
    /// Terminal reason and when it was recorded; drives retention.
    terminal: Option<(EndReason, Instant)>,
    /// Final snapshot reported by the actor, served during retention.
    last_snapshot: Option<CallSnapshot>,
}

/// The `CoordinatorActor` implementation.
pub struct CoordinatorActor {
    /// Configuration.
    config: Config,
    /// Message receiver.
    receiver: mpsc::Receiver<CoordinatorMessage>,
    /// Sender clone handed to call actors for terminal notifications.
    self_sender: mpsc::Sender<CoordinatorMessage>,
    /// Root cancellation token for this subsystem.
    cancel_token: CancellationToken,
    /// Connected participants.
    registry: Arc<ParticipantRegistry>,
    /// Session store, consulted when an initiate names a session.
    sessions: Arc<SessionStore>,
    /// Sink for finished calls, handed to each call actor.
    history: Arc<dyn CallHistorySink>,
    /// Calls by ID, non-terminal and retained-terminal.
    calls: HashMap<String, ManagedCall>,
    /// Busy index: participant id to its non-terminal call id.
    busy: HashMap<String, String>,
    /// Outstanding invitations.
    invitations: InvitationQueue,
    /// Whether shutdown drain has started.
    is_draining: bool,
    /// Shared actor metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl CoordinatorActor {
    /// Spawn the coordinator.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: Config,
        registry: Arc<ParticipantRegistry>,
        sessions: Arc<SessionStore>,
        history: Arc<dyn CallHistorySink>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(COORDINATOR_CHANNEL_BUFFER);

        let actor = Self {
            mailbox: MailboxMonitor::new(ActorType::Coordinator, &config.cc_id),
            config,
            receiver,
            self_sender: sender.clone(),
            cancel_token: cancel_token.clone(),
            registry,
            sessions,
            history,
            calls: HashMap::new(),
            busy: HashMap::new(),
            invitations: InvitationQueue::new(),
            is_draining: false,
            metrics,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = CoordinatorHandle {
            sender,
            cancel_token,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "cc.actor.coordinator", fields(cc_id = %self.config.cc_id))]
    async fn run(mut self) {
        info!(
            target: "cc.actor.coordinator",
            cc_id = %self.config.cc_id,
            "CoordinatorActor started"
        );

        let mut sweep_interval =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_seconds));

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "cc.actor.coordinator",
                        "CoordinatorActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                _ = sweep_interval.tick() => {
                    self.sweep().await;
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
                                target: "cc.actor.coordinator",
                                "CoordinatorActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "cc.actor.coordinator",
            messages_processed = self.mailbox.messages_processed(),
            "CoordinatorActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::InitiateCall {
                caller_id,
                callee_id,
                session_id,
                respond_to,
            } => {
                let result = self
                    .handle_initiate(&caller_id, &callee_id, session_id)
                    .await;
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::AcceptCall {
                call_id,
                by,
                respond_to,
            } => {
                let result = self.handle_accept(&call_id, &by).await;
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::DeclineCall {
                call_id,
                by,
                respond_to,
            } => {
                let result = self.handle_decline(&call_id, &by).await;
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::EndCall {
                call_id,
                by,
                reason,
                respond_to,
            } => {
                let result = self.handle_end(&call_id, &by, reason).await;
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::RelayOffer {
                call_id,
                from,
                sdp,
                respond_to,
            } => match self.relay_target(&call_id, &from) {
                Ok(handle) => {
                    self.forward_relay(
                        &call_id,
                        &handle,
                        CallMessage::RelayOffer {
                            from,
                            sdp,
                            respond_to,
                        },
                    );
                }
                Err(e) => {
                    let _ = respond_to.send(Err(e));
                }
            },

            CoordinatorMessage::RelayAnswer {
                call_id,
                from,
                sdp,
                respond_to,
            } => match self.relay_target(&call_id, &from) {
                Ok(handle) => {
                    self.forward_relay(
                        &call_id,
                        &handle,
                        CallMessage::RelayAnswer {
                            from,
                            sdp,
                            respond_to,
                        },
                    );
                }
                Err(e) => {
                    let _ = respond_to.send(Err(e));
                }
            },

            CoordinatorMessage::RelayIce {
                call_id,
                from,
                candidate,
                respond_to,
            } => match self.relay_target(&call_id, &from) {
                Ok(handle) => {
                    self.forward_relay(
                        &call_id,
                        &handle,
                        CallMessage::RelayIce {
                            from,
                            candidate,
                            respond_to,
                        },
                    );
                }
                Err(e) => {
                    let _ = respond_to.send(Err(e));
                }
            },

            CoordinatorMessage::ParticipantDisconnected { participant_id } => {
                self.handle_participant_disconnected(&participant_id);
            }

            CoordinatorMessage::CallTerminated {
                call_id,
                reason,
                snapshot,
            } => {
                if let Some(entry) = self.calls.get_mut(&call_id) {
                    entry.last_snapshot = Some(snapshot);
                }
                self.finalize_call(&call_id, reason);
            }

            CoordinatorMessage::ListInvitations {
                callee_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.invitations.list_for_callee(&callee_id));
            }

            CoordinatorMessage::GetCallSnapshot {
                call_id,
                respond_to,
            } => {
                let result = self.handle_get_snapshot(&call_id).await;
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }
        }
    }

    /// Create a call, spawn its actor, and register invitation and
    /// busy entries.
    #[instrument(skip_all, fields(cc_id = %self.config.cc_id))]
    async fn handle_initiate(
        &mut self,
        caller_id: &str,
        callee_id: &str,
        session_id: Option<String>,
    ) -> Result<InitiateResult, CallError> {
        if self.is_draining {
            return Err(CallError::Draining);
        }
        if self.active_call_count() >= self.config.max_calls as usize {
            warn!(
                target: "cc.actor.coordinator",
                max_calls = self.config.max_calls,
                "Initiate rejected, at capacity"
            );
            return Err(CallError::AtCapacity);
        }

        let caller = self
            .registry
            .lookup(caller_id)
            .await
            .ok_or(CallError::ParticipantNotFound)?;
        if !self.registry.is_reachable(callee_id).await {
            return Err(CallError::CalleeUnreachable);
        }

        if self.busy.contains_key(caller_id) {
            return Err(CallError::CallerBusy);
        }
        if self.busy.contains_key(callee_id) {
            return Err(CallError::CalleeBusy);
        }

        if let Some(session_id) = &session_id {
            let session = self.sessions.get(session_id).await?;
            let pair_matches = (session.client_id == caller_id && session.staff_id == callee_id)
                || (session.client_id == callee_id && session.staff_id == caller_id);
            if !pair_matches {
                return Err(CallError::NotAParticipant);
            }
        }

        let call_id = uuid::Uuid::new_v4().to_string();
        let ring = Duration::from_secs(self.config.ring_timeout_seconds);
        let ring_deadline = Instant::now() + ring;
        let ring_deadline_unix = Utc::now().timestamp()
            + i64::try_from(self.config.ring_timeout_seconds).unwrap_or(i64::MAX);

        let setup = CallSetup {
            call_id: call_id.clone(),
            session_id: session_id.clone(),
            caller_id: caller_id.to_string(),
            callee_id: callee_id.to_string(),
            caller_name: caller.display_name.clone(),
            ring_deadline,
            ring_deadline_unix,
            connect_timeout: Duration::from_secs(self.config.connect_timeout_seconds),
        };

        let (handle, task_handle) = CallActor::spawn(
            setup,
            Arc::clone(&self.registry),
            Arc::clone(&self.history),
            self.self_sender.clone(),
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );

        self.calls.insert(
            call_id.clone(),
            ManagedCall {
                handle,
                task_handle: Some(task_handle),
                caller_id: caller_id.to_string(),
                callee_id: callee_id.to_string(),
                session_id,
                created_at: Utc::now(),
                terminal: None,
                last_snapshot: None,
            },
        );
        self.busy.insert(caller_id.to_string(), call_id.clone());
        self.busy.insert(callee_id.to_string(), call_id.clone());
        self.invitations.enqueue(PendingInvitation {
            call_id: call_id.clone(),
            caller_id: caller_id.to_string(),
            callee_id: callee_id.to_string(),
            caller_name: caller.display_name,
            deadline: ring_deadline,
            deadline_unix: ring_deadline_unix,
        });
        self.metrics.call_started();

        info!(
            target: "cc.actor.coordinator",
            call_id = %call_id,
            caller_id = %caller_id,
            callee_id = %callee_id,
            active_calls = self.active_call_count(),
            "Call initiated"
        );

        Ok(InitiateResult {
            call_id,
            deadline_unix: ring_deadline_unix,
        })
    }

    /// Route an accept through the call actor.
    async fn handle_accept(&mut self, call_id: &str, by: &str) -> Result<(), CallError> {
        let handle = match self.control_target(call_id, by) {
            Ok(handle) => handle,
            // Terminal within retention: the invitation is gone.
            Err(CallError::InvalidCallState(_)) => return Err(CallError::InvitationExpired),
            Err(e) => return Err(e),
        };

        match handle.accept(by.to_string()).await {
            Ok(()) => {
                self.invitations.dequeue(call_id);
                Ok(())
            }
            Err(CallError::InvitationExpired) => {
                self.finalize_call(call_id, EndReason::Timeout);
                Err(CallError::InvitationExpired)
            }
            Err(CallError::Internal(_)) if self.call_task_finished(call_id) => {
                // The actor finished between routing and delivery.
                Err(CallError::InvitationExpired)
            }
            Err(e) => Err(e),
        }
    }

    /// Route a decline through the call actor.
    async fn handle_decline(&mut self, call_id: &str, by: &str) -> Result<(), CallError> {
        let handle = match self.control_target(call_id, by) {
            Ok(handle) => handle,
            Err(CallError::InvalidCallState(_)) => return Err(CallError::InvitationExpired),
            Err(e) => return Err(e),
        };

        match handle.decline(by.to_string()).await {
            Ok(()) => {
                self.finalize_call(call_id, EndReason::Declined);
                Ok(())
            }
            Err(CallError::Internal(_)) if self.call_task_finished(call_id) => {
                Err(CallError::InvitationExpired)
            }
            Err(e) => Err(e),
        }
    }

    /// Route an end through the call actor. Ending a retained terminal
    /// call is a no-op.
    async fn handle_end(
        &mut self,
        call_id: &str,
        by: &str,
        reason: Option<EndReason>,
    ) -> Result<(), CallError> {
        let handle = match self.control_target(call_id, by) {
            Ok(handle) => handle,
            // First end won; repeat observes the idempotent no-op.
            Err(CallError::InvalidCallState(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let reason = reason.unwrap_or(EndReason::Normal);
        match handle.end(by.to_string(), reason).await {
            Ok(()) => {
                self.finalize_call(call_id, reason);
                Ok(())
            }
            Err(CallError::Internal(_)) if self.call_task_finished(call_id) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Resolve a control operation's call actor: the call must exist,
    /// be non-terminal, and the sender must be one of its participants.
    fn control_target(&self, call_id: &str, by: &str) -> Result<CallActorHandle, CallError> {
        let entry = self.calls.get(call_id).ok_or(CallError::CallNotFound)?;
        if by != entry.caller_id && by != entry.callee_id {
            return Err(CallError::NotAParticipant);
        }
        if entry.terminal.is_some() {
            return Err(CallError::InvalidCallState(CallState::Ended));
        }
        Ok(entry.handle.clone())
    }

    /// Resolve a relay operation's call actor.
    fn relay_target(&self, call_id: &str, from: &str) -> Result<CallActorHandle, CallError> {
        let entry = self.calls.get(call_id).ok_or(CallError::CallNotFound)?;
        if from != entry.caller_id && from != entry.callee_id {
            return Err(CallError::NotAParticipant);
        }
        if entry.terminal.is_some() {
            return Err(CallError::InvalidCallState(CallState::Ended));
        }
        Ok(entry.handle.clone())
    }

    /// Pass a relay message through to the call actor without waiting.
    fn forward_relay(&self, call_id: &str, handle: &CallActorHandle, message: CallMessage) {
        if handle.forward(message).is_err() {
            // Dropping the message drops its response channel; the
            // client surface maps the closed channel to an internal
            // error.
            warn!(
                target: "cc.actor.coordinator",
                call_id = %call_id,
                "Call mailbox unavailable, relay dropped"
            );
        }
    }

    /// Whether the call's actor task has already exited.
    fn call_task_finished(&self, call_id: &str) -> bool {
        self.calls
            .get(call_id)
            .is_some_and(|entry| match &entry.task_handle {
                Some(task) => task.is_finished(),
                None => true,
            })
    }

    /// Cascade-cancel every call and invitation touching a
    /// disconnected participant.
    fn handle_participant_disconnected(&mut self, participant_id: &str) {
        let mut affected = self.invitations.calls_touching(participant_id);
        if let Some(call_id) = self.busy.get(participant_id) {
            if !affected.contains(call_id) {
                affected.push(call_id.clone());
            }
        }

        if affected.is_empty() {
            return;
        }

        info!(
            target: "cc.actor.coordinator",
            participant_id = %participant_id,
            calls = affected.len(),
            "Participant disconnected, cancelling calls"
        );

        for call_id in affected {
            let handle = match self.calls.get(&call_id) {
                Some(entry) if entry.terminal.is_none() => entry.handle.clone(),
                _ => continue,
            };
            let _ = handle.forward(CallMessage::PeerDisconnected {
                participant_id: participant_id.to_string(),
            });
            self.finalize_call(&call_id, EndReason::PeerDisconnected);
        }
    }

    /// Snapshot of one call. Non-terminal calls are asked directly;
    /// retained terminal calls are served from the actor's final
    /// report.
    async fn handle_get_snapshot(&self, call_id: &str) -> Result<CallSnapshot, CallError> {
        let entry = self.calls.get(call_id).ok_or(CallError::CallNotFound)?;

        if let Some((reason, _)) = entry.terminal {
            if let Some(snapshot) = &entry.last_snapshot {
                return Ok(snapshot.clone());
            }
            // Terminal recorded before the actor's report arrived.
            return Ok(CallSnapshot {
                call_id: call_id.to_string(),
                session_id: entry.session_id.clone(),
                caller_id: entry.caller_id.clone(),
                callee_id: entry.callee_id.clone(),
                state: CallState::Ended,
                reason: Some(reason),
                created_at: entry.created_at,
                accepted_at: None,
                ended_at: None,
                mailbox_depth: 0,
            });
        }

        match entry.handle.snapshot().await {
            Ok(snapshot) => Ok(snapshot),
            Err(_) => entry
                .last_snapshot
                .clone()
                .ok_or(CallError::CallNotFound),
        }
    }

    /// Mark a call terminal and release its busy and invitation
    /// entries. Idempotent.
    fn finalize_call(&mut self, call_id: &str, reason: EndReason) {
        let (caller_id, callee_id) = match self.calls.get_mut(call_id) {
            Some(entry) => {
                if entry.terminal.is_some() {
                    return;
                }
                entry.terminal = Some((reason, Instant::now()));
                (entry.caller_id.clone(), entry.callee_id.clone())
            }
            None => return,
        };

        if self.busy.get(&caller_id).is_some_and(|c| c == call_id) {
            self.busy.remove(&caller_id);
        }
        if self.busy.get(&callee_id).is_some_and(|c| c == call_id) {
            self.busy.remove(&callee_id);
        }
        self.invitations.dequeue(call_id);
        self.metrics.call_ended(reason);

        info!(
            target: "cc.actor.coordinator",
            call_id = %call_id,
            reason = %reason,
            active_calls = self.active_call_count(),
            "Call finalized"
        );
    }

    /// Periodic housekeeping: reap finished actor tasks and retire
    /// terminal calls past their retention window.
    async fn sweep(&mut self) {
        self.check_call_health().await;

        let retention = Duration::from_secs(self.config.ended_retention_seconds);
        let now = Instant::now();
        let expired: Vec<String> = self
            .calls
            .iter()
            .filter(|(_, entry)| {
                entry
                    .terminal
                    .is_some_and(|(_, at)| now.duration_since(at) >= retention)
            })
            .map(|(call_id, _)| call_id.clone())
            .collect();

        for call_id in expired {
            debug!(
                target: "cc.actor.coordinator",
                call_id = %call_id,
                "Retired call past retention window"
            );
            self.calls.remove(&call_id);
        }
    }

    /// Reap finished call actor tasks, recording panics.
    async fn check_call_health(&mut self) {
        let finished: Vec<String> = self
            .calls
            .iter()
            .filter(|(_, entry)| {
                entry
                    .task_handle
                    .as_ref()
                    .is_some_and(JoinHandle::is_finished)
            })
            .map(|(call_id, _)| call_id.clone())
            .collect();

        for call_id in finished {
            let task = self
                .calls
                .get_mut(&call_id)
                .and_then(|entry| entry.task_handle.take());
            let Some(task) = task else { continue };

            match task.await {
                Ok(()) => {
                    debug!(
                        target: "cc.actor.coordinator",
                        call_id = %call_id,
                        "Call actor exited cleanly"
                    );
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        error!(
                            target: "cc.actor.coordinator",
                            call_id = %call_id,
                            error = ?join_error,
                            "Call actor panicked"
                        );
                        self.metrics.record_panic(ActorType::Call);
                    }
                }
            }

            // The actor's terminal notification is a try_send and can be
            // dropped under mailbox pressure. A reaped actor whose entry
            // is still non-terminal would otherwise pin both participants
            // busy forever, so finalize here with the actor's reported
            // reason when a final snapshot made it through.
            let unfinalized_reason = self.calls.get(&call_id).and_then(|entry| {
                if entry.terminal.is_some() {
                    return None;
                }
                Some(
                    entry
                        .last_snapshot
                        .as_ref()
                        .and_then(|snapshot| snapshot.reason)
                        .unwrap_or(EndReason::RelayError),
                )
            });
            if let Some(reason) = unfinalized_reason {
                warn!(
                    target: "cc.actor.coordinator",
                    call_id = %call_id,
                    reason = %reason,
                    "Call actor exited without a terminal notification"
                );
                self.finalize_call(&call_id, reason);
            }
        }
    }

    /// Calls in a non-terminal state.
    fn active_call_count(&self) -> usize {
        self.calls
            .values()
            .filter(|entry| entry.terminal.is_none())
            .count()
    }

    fn status(&self) -> CoordinatorStatus {
        let active_calls = self.active_call_count();
        CoordinatorStatus {
            active_calls,
            retained_calls: self.calls.len() - active_calls,
            pending_invitations: self.invitations.len(),
            is_draining: self.is_draining,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Drain on shutdown. The call actors see the cancellation through
    /// their child tokens and end with reason `shutdown`; this waits
    /// for each of them, bounded per task.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "cc.actor.coordinator",
            active_calls = self.active_call_count(),
            pending_invitations = self.invitations.len(),
            "Draining calls for shutdown"
        );

        self.is_draining = true;

        let call_ids: Vec<String> = self.calls.keys().cloned().collect();
        for call_id in call_ids {
            let task = self
                .calls
                .get_mut(&call_id)
                .and_then(|entry| entry.task_handle.take());
            if let Some(task) = task {
                match tokio::time::timeout(DRAIN_TASK_TIMEOUT, task).await {
                    Ok(Ok(())) => {
                        debug!(
                            target: "cc.actor.coordinator",
                            call_id = %call_id,
                            "Call actor drained cleanly"
                        );
                    }
                    Ok(Err(e)) => {
                        warn!(
                            target: "cc.actor.coordinator",
                            call_id = %call_id,
                            error = ?e,
                            "Call task panicked during shutdown"
                        );
                    }
                    Err(_) => {
                        warn!(
                            target: "cc.actor.coordinator",
                            call_id = %call_id,
                            "Call shutdown timed out"
                        );
                    }
                }
            }
            self.finalize_call(&call_id, EndReason::Shutdown);
        }

        info!(
            target: "cc.actor.coordinator",
            "Drain complete"
        );
    }
}
