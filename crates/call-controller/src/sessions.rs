//! Session Store - (client, staff, purpose) tuples behind opaque ids.
//!
//! Sessions are independent of call state; a call may reference a
//! session, and a session references at most one concurrently active
//! call (enforced by the coordinator's busy rules, since both parties
//! of a session are busy-checked). Session ids are UUIDv4 and never
//! recycled within the process lifetime, so messages against a closed
//! session cannot be replayed onto a new one.

use crate::errors::CallError;
use crate::external::StaffAvailability;
use crate::registry::ParticipantRegistry;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A negotiated session between a client and a staff participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque session ID.
    pub session_id: String,
    /// Client participant.
    pub client_id: String,
    /// Staff participant.
    pub staff_id: String,
    /// Free-text purpose.
    pub purpose: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Store of active sessions, keyed by session id.
pub struct SessionStore {
    registry: Arc<ParticipantRegistry>,
    availability: Arc<dyn StaffAvailability>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Create a session store backed by the given registry and
    /// availability source.
    #[must_use]
    pub fn new(
        registry: Arc<ParticipantRegistry>,
        availability: Arc<dyn StaffAvailability>,
    ) -> Self {
        Self {
            registry,
            availability,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session.
    ///
    /// # Errors
    ///
    /// Fails with `StaffUnavailable` if the staff participant is not
    /// currently reachable or the availability source says no.
    pub async fn create(
        &self,
        client_id: &str,
        staff_id: &str,
        purpose: &str,
    ) -> Result<Session, CallError> {
        if !self.availability.is_staff_available(staff_id)
            || !self.registry.is_reachable(staff_id).await
        {
            return Err(CallError::StaffUnavailable);
        }

        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            staff_id: staff_id.to_string(),
            purpose: purpose.to_string(),
            created_at: Utc::now(),
        };

        info!(
            target: "cc.sessions",
            session_id = %session.session_id,
            client_id = %client_id,
            staff_id = %staff_id,
            "Session created"
        );

        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());

        Ok(session)
    }

    /// Fetch a session.
    ///
    /// # Errors
    ///
    /// Fails with `SessionNotFound` if the id is unknown or the session
    /// was closed.
    pub async fn get(&self, session_id: &str) -> Result<Session, CallError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or(CallError::SessionNotFound)
    }

    /// Close a session. Its id is never reused.
    ///
    /// # Errors
    ///
    /// Fails with `SessionNotFound` if the id is unknown.
    pub async fn close(&self, session_id: &str) -> Result<(), CallError> {
        match self.sessions.write().await.remove(session_id) {
            Some(_) => {
                debug!(
                    target: "cc.sessions",
                    session_id = %session_id,
                    "Session closed"
                );
                Ok(())
            }
            None => Err(CallError::SessionNotFound),
        }
    }

    /// Number of active sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are active.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
