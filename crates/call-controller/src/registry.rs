//! Participant Registry - connected endpoints and their live handles.
//!
//! The registry is the single owner of "who is connected right now".
//! Each connected participant has one bounded outbound event channel;
//! its transport task drains the receiver and writes frames to the
//! client. Re-registering an existing id replaces the channel
//! (reconnection) while preserving identity, so in-flight calls keep
//! working across a reconnect: relays always resolve the handle fresh.
//!
//! Sends go through [`ParticipantRegistry::notify`] and never await; a
//! slow or broken endpoint must not stall a call transition.

use signaling_protocol::{Role, ServerEvent};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Buffer size for each participant's outbound event channel.
const OUTBOUND_CHANNEL_BUFFER: usize = 64;

/// A registered participant.
#[derive(Debug)]
struct Entry {
    role: Role,
    display_name: String,
    sender: mpsc::Sender<ServerEvent>,
}

/// Identity snapshot returned by [`ParticipantRegistry::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    /// Participant ID.
    pub participant_id: String,
    /// Staff or client.
    pub role: Role,
    /// Display name shown to the other endpoint.
    pub display_name: String,
}

/// Why an event could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Participant is not registered.
    Unreachable,
    /// The participant's transport task dropped its receiver.
    Closed,
    /// The outbound channel is full (backpressure).
    Full,
}

/// Registry of connected participants, keyed by participant id.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ParticipantRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an outbound event channel sized for one participant.
    ///
    /// The sender goes into [`register`](Self::register); the receiver
    /// belongs to the participant's transport task.
    #[must_use]
    pub fn outbound_channel() -> (mpsc::Sender<ServerEvent>, mpsc::Receiver<ServerEvent>) {
        mpsc::channel(OUTBOUND_CHANNEL_BUFFER)
    }

    /// Register a participant, or replace the connection handle of an
    /// already-registered one (reconnection). Identity fields from the
    /// original registration are preserved on reconnect.
    pub async fn register(
        &self,
        participant_id: &str,
        role: Role,
        display_name: &str,
        sender: mpsc::Sender<ServerEvent>,
    ) {
        let mut entries = self.entries.write().await;
        match entries.get_mut(participant_id) {
            Some(existing) => {
                debug!(
                    target: "cc.registry",
                    participant_id = %participant_id,
                    "Replacing connection handle on reconnect"
                );
                existing.sender = sender;
            }
            None => {
                debug!(
                    target: "cc.registry",
                    participant_id = %participant_id,
                    role = %role,
                    "Participant registered"
                );
                entries.insert(
                    participant_id.to_string(),
                    Entry {
                        role,
                        display_name: display_name.to_string(),
                        sender,
                    },
                );
            }
        }
    }

    /// Remove a participant. Returns its identity if it was registered.
    ///
    /// The disconnect cascade (ending calls, expiring invitations) is
    /// the coordinator's responsibility; callers must follow up with
    /// `CoordinatorHandle::participant_disconnected`.
    pub async fn unregister(&self, participant_id: &str) -> Option<ParticipantInfo> {
        let removed = self.entries.write().await.remove(participant_id);
        removed.map(|entry| {
            debug!(
                target: "cc.registry",
                participant_id = %participant_id,
                "Participant unregistered"
            );
            ParticipantInfo {
                participant_id: participant_id.to_string(),
                role: entry.role,
                display_name: entry.display_name,
            }
        })
    }

    /// Look up a participant's identity.
    pub async fn lookup(&self, participant_id: &str) -> Option<ParticipantInfo> {
        self.entries
            .read()
            .await
            .get(participant_id)
            .map(|entry| ParticipantInfo {
                participant_id: participant_id.to_string(),
                role: entry.role,
                display_name: entry.display_name.clone(),
            })
    }

    /// Whether the participant is registered with a live channel.
    pub async fn is_reachable(&self, participant_id: &str) -> bool {
        self.entries
            .read()
            .await
            .get(participant_id)
            .is_some_and(|entry| !entry.sender.is_closed())
    }

    /// Deliver an event to a participant's current connection handle.
    ///
    /// Fire-and-forget relative to the caller: the send never awaits.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] when the participant is missing or
    /// its channel is closed/full.
    pub async fn notify(
        &self,
        participant_id: &str,
        event: ServerEvent,
    ) -> Result<(), DeliveryError> {
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(participant_id) else {
            return Err(DeliveryError::Unreachable);
        };

        match entry.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed),
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    target: "cc.registry",
                    participant_id = %participant_id,
                    event = ?std::mem::discriminant(&event),
                    "Outbound channel full, event dropped"
                );
                Err(DeliveryError::Full)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use signaling_protocol::CallState;

    fn state_event(call_id: &str) -> ServerEvent {
        ServerEvent::CallStateChanged {
            call_id: call_id.to_string(),
            state: CallState::Ringing,
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ParticipantRegistry::new();
        let (tx, _rx) = ParticipantRegistry::outbound_channel();

        registry.register("staff-1", Role::Staff, "Dana", tx).await;

        let info = registry.lookup("staff-1").await.unwrap();
        assert_eq!(info.role, Role::Staff);
        assert_eq!(info.display_name, "Dana");
        assert!(registry.is_reachable("staff-1").await);
        assert!(registry.lookup("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_notify_delivers_event() {
        let registry = ParticipantRegistry::new();
        let (tx, mut rx) = ParticipantRegistry::outbound_channel();
        registry.register("client-1", Role::Client, "Alex", tx).await;

        registry
            .notify("client-1", state_event("call-1"))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.call_id(), "call-1");
    }

    #[tokio::test]
    async fn test_notify_unknown_participant() {
        let registry = ParticipantRegistry::new();
        let result = registry.notify("ghost", state_event("call-1")).await;
        assert_eq!(result, Err(DeliveryError::Unreachable));
    }

    #[tokio::test]
    async fn test_notify_closed_channel() {
        let registry = ParticipantRegistry::new();
        let (tx, rx) = ParticipantRegistry::outbound_channel();
        registry.register("client-1", Role::Client, "Alex", tx).await;
        drop(rx);

        let result = registry.notify("client-1", state_event("call-1")).await;
        assert_eq!(result, Err(DeliveryError::Closed));
        assert!(!registry.is_reachable("client-1").await);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_handle_preserves_identity() {
        let registry = ParticipantRegistry::new();
        let (tx1, rx1) = ParticipantRegistry::outbound_channel();
        registry
            .register("staff-1", Role::Staff, "Dana", tx1)
            .await;
        drop(rx1);

        // Reconnect with a fresh channel; identity fields stay as first
        // registered even if the transport resends different ones.
        let (tx2, mut rx2) = ParticipantRegistry::outbound_channel();
        registry
            .register("staff-1", Role::Staff, "Dana R.", tx2)
            .await;

        let info = registry.lookup("staff-1").await.unwrap();
        assert_eq!(info.display_name, "Dana");

        registry
            .notify("staff-1", state_event("call-2"))
            .await
            .unwrap();
        assert_eq!(rx2.recv().await.unwrap().call_id(), "call-2");
    }

    #[tokio::test]
    async fn test_unregister_returns_identity() {
        let registry = ParticipantRegistry::new();
        let (tx, _rx) = ParticipantRegistry::outbound_channel();
        registry.register("client-1", Role::Client, "Alex", tx).await;

        let removed = registry.unregister("client-1").await.unwrap();
        assert_eq!(removed.participant_id, "client-1");
        assert!(!registry.is_reachable("client-1").await);
        assert!(registry.unregister("client-1").await.is_none());
    }
}
