//! Pending invitation tracking.
//!
//! The coordinator keeps one queue of outstanding invitations so that
//! a callee can list what is ringing for it, and so the disconnect
//! cascade can find every invitation touching a participant. Deadlines
//! are stored twice: a monotonic [`Instant`] for timer comparisons and
//! an absolute unix timestamp for the wire.

use std::collections::HashSet;
use tokio::time::Instant;

/// An invitation that is still ringing.
#[derive(Debug, Clone)]
pub struct PendingInvitation {
    /// Call the invitation belongs to.
    pub call_id: String,
    /// Participant who initiated the call.
    pub caller_id: String,
    /// Participant being invited.
    pub callee_id: String,
    /// Caller's display name, shown on the callee's ringing event.
    pub caller_name: String,
    /// Monotonic deadline; past this point accept fails.
    pub deadline: Instant,
    /// Same deadline as a unix timestamp, for client display.
    pub deadline_unix: i64,
}

/// Outstanding invitations, keyed by call id.
///
/// Insertion order per callee is preserved so "list my invitations"
/// returns oldest first.
#[derive(Debug, Default)]
pub struct InvitationQueue {
    // Vec keeps global insertion order; the map is a membership index.
    ordered: Vec<PendingInvitation>,
    by_call: HashSet<String>,
}

impl InvitationQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an invitation. A call has at most one invitation; a repeat
    /// enqueue for the same call id is ignored.
    pub fn enqueue(&mut self, invitation: PendingInvitation) {
        if !self.by_call.insert(invitation.call_id.clone()) {
            return;
        }
        self.ordered.push(invitation);
    }

    /// Remove and return the invitation for a call, if present.
    pub fn dequeue(&mut self, call_id: &str) -> Option<PendingInvitation> {
        if !self.by_call.remove(call_id) {
            return None;
        }
        let position = self
            .ordered
            .iter()
            .position(|invitation| invitation.call_id == call_id)?;
        Some(self.ordered.remove(position))
    }

    /// Invitations where the participant is the callee, oldest first.
    #[must_use]
    pub fn list_for_callee(&self, callee_id: &str) -> Vec<PendingInvitation> {
        self.ordered
            .iter()
            .filter(|invitation| invitation.callee_id == callee_id)
            .cloned()
            .collect()
    }

    /// Call ids of every invitation where the participant is caller or
    /// callee. Used by the disconnect cascade.
    #[must_use]
    pub fn calls_touching(&self, participant_id: &str) -> Vec<String> {
        self.ordered
            .iter()
            .filter(|invitation| {
                invitation.caller_id == participant_id || invitation.callee_id == participant_id
            })
            .map(|invitation| invitation.call_id.clone())
            .collect()
    }

    /// Number of outstanding invitations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether no invitations are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
