//! Message types for the actor system.
//!
//! Defines the mailbox contracts between the `CoordinatorActor` and the
//! per-call `CallActor` instances, plus the result payloads handed back
//! through `respond_to` oneshot channels.

use crate::errors::CallError;
use crate::invitations::PendingInvitation;
use chrono::{DateTime, Utc};
use serde_json::Value;
use signaling_protocol::{CallState, EndReason};
use tokio::sync::oneshot;

/// Messages handled by a `CallActor`.
///
/// Control messages (`Accept`, `Decline`, `End`) carry a `respond_to`
/// the coordinator awaits so busy-index bookkeeping stays in step with
/// the transition. Relay messages carry the originating client's
/// response channel straight through; the coordinator never waits on
/// them.
#[derive(Debug)]
pub enum CallMessage {
    /// Callee accepts the ringing invitation.
    Accept {
        by: String,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Callee declines the ringing invitation.
    Decline {
        by: String,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Either side ends the call.
    End {
        by: String,
        reason: EndReason,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Relay an SDP offer from the caller to the callee.
    RelayOffer {
        from: String,
        sdp: Value,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Relay an SDP answer from the callee to the caller.
    RelayAnswer {
        from: String,
        sdp: Value,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Relay an ICE candidate to the other participant.
    RelayIce {
        from: String,
        candidate: Value,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// One of the two participants dropped its registry entry.
    PeerDisconnected { participant_id: String },

    /// Introspection: current call state and timestamps.
    GetSnapshot {
        respond_to: oneshot::Sender<CallSnapshot>,
    },
}

/// Messages handled by the `CoordinatorActor`.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// Create a call and start it ringing.
    InitiateCall {
        caller_id: String,
        callee_id: String,
        session_id: Option<String>,
        respond_to: oneshot::Sender<Result<InitiateResult, CallError>>,
    },

    /// Route an accept to the call's actor.
    AcceptCall {
        call_id: String,
        by: String,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Route a decline to the call's actor.
    DeclineCall {
        call_id: String,
        by: String,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Route an end to the call's actor. `reason` defaults to `normal`.
    EndCall {
        call_id: String,
        by: String,
        reason: Option<EndReason>,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Route an SDP offer relay.
    RelayOffer {
        call_id: String,
        from: String,
        sdp: Value,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Route an SDP answer relay.
    RelayAnswer {
        call_id: String,
        from: String,
        sdp: Value,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Route an ICE candidate relay.
    RelayIce {
        call_id: String,
        from: String,
        candidate: Value,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// A participant's transport dropped; cascade-cancel its calls and
    /// invitations.
    ParticipantDisconnected { participant_id: String },

    /// A call actor reached its terminal state. Sent by the actor
    /// itself; carries the final snapshot so it can be served during
    /// the retention window after the actor has exited.
    CallTerminated {
        call_id: String,
        reason: EndReason,
        snapshot: CallSnapshot,
    },

    /// Pending invitations where the participant is the callee.
    ListInvitations {
        callee_id: String,
        respond_to: oneshot::Sender<Vec<PendingInvitation>>,
    },

    /// Introspection: per-call snapshot.
    GetCallSnapshot {
        call_id: String,
        respond_to: oneshot::Sender<Result<CallSnapshot, CallError>>,
    },

    /// Introspection: coordinator-level counters.
    GetStatus {
        respond_to: oneshot::Sender<CoordinatorStatus>,
    },
}

/// Result of a successful `initiate`.
#[derive(Debug, Clone)]
pub struct InitiateResult {
    /// The new call's id.
    pub call_id: String,
    /// Invitation deadline as a unix timestamp.
    pub deadline_unix: i64,
}

/// Point-in-time view of one call.
#[derive(Debug, Clone)]
pub struct CallSnapshot {
    /// Call ID.
    pub call_id: String,
    /// Session the call belongs to, if any.
    pub session_id: Option<String>,
    /// Originating participant.
    pub caller_id: String,
    /// Invited participant.
    pub callee_id: String,
    /// Current state.
    pub state: CallState,
    /// End reason, once terminal.
    pub reason: Option<EndReason>,
    /// When the call was created.
    pub created_at: DateTime<Utc>,
    /// When the callee accepted, if it has.
    pub accepted_at: Option<DateTime<Utc>>,
    /// When the call ended, if it has.
    pub ended_at: Option<DateTime<Utc>>,
    /// Current mailbox depth of the call actor.
    pub mailbox_depth: usize,
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorStatus {
    /// Calls in a non-terminal state.
    pub active_calls: usize,
    /// Terminal calls still inside their retention window.
    pub retained_calls: usize,
    /// Outstanding invitations.
    pub pending_invitations: usize,
    /// Whether shutdown drain has started.
    pub is_draining: bool,
    /// Current mailbox depth of the coordinator.
    pub mailbox_depth: usize,
}
