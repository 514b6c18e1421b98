//! External collaborator seams.
//!
//! The core consumes two outside services, both specified only at the
//! boundary: a best-effort history sink that records finished calls,
//! and a staff-availability source consulted at session creation.
//!
//! Both traits are synchronous and object-safe so no call-path
//! operation gains a hidden suspension point; implementations that do
//! real I/O are expected to hand the work to their own task.

use chrono::{DateTime, Utc};
use signaling_protocol::EndReason;
use tracing::info;

/// A finished call, as handed to the history sink.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Call ID.
    pub call_id: String,
    /// Session the call belonged to, if any.
    pub session_id: Option<String>,
    /// Originating participant.
    pub caller_id: String,
    /// Invited participant.
    pub callee_id: String,
    /// Why the call ended.
    pub reason: EndReason,
    /// When the call was created.
    pub created_at: DateTime<Utc>,
    /// When the callee accepted, if it did.
    pub accepted_at: Option<DateTime<Utc>>,
    /// When the call ended.
    pub ended_at: DateTime<Utc>,
    /// Seconds between accept and end; zero if never accepted.
    pub duration_seconds: i64,
}

/// Sink for finished calls. Best effort: implementations log their own
/// failures and never propagate them - a history outage must not block
/// call teardown.
pub trait CallHistorySink: Send + Sync {
    /// Record a finished call.
    fn record_call_ended(&self, record: &CallRecord);
}

/// Source of staff availability, consulted by the session store.
pub trait StaffAvailability: Send + Sync {
    /// Whether the staff participant can take new sessions.
    fn is_staff_available(&self, staff_id: &str) -> bool;
}

/// Default history sink: logs the record and drops it.
#[derive(Debug, Default)]
pub struct LoggingHistorySink;

impl CallHistorySink for LoggingHistorySink {
    fn record_call_ended(&self, record: &CallRecord) {
        info!(
            target: "cc.history",
            call_id = %record.call_id,
            caller_id = %record.caller_id,
            callee_id = %record.callee_id,
            reason = %record.reason,
            duration_seconds = record.duration_seconds,
            "Call ended"
        );
    }
}

/// Default availability source: every staff member is available.
#[derive(Debug, Default)]
pub struct AlwaysAvailable;

impl StaffAvailability for AlwaysAvailable {
    fn is_staff_available(&self, _staff_id: &str) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_always_available() {
        assert!(AlwaysAvailable.is_staff_available("staff-1"));
    }

    #[test]
    fn test_logging_sink_accepts_record() {
        let now = Utc::now();
        LoggingHistorySink.record_call_ended(&CallRecord {
            call_id: "call-1".to_string(),
            session_id: None,
            caller_id: "client-1".to_string(),
            callee_id: "staff-1".to_string(),
            reason: EndReason::Normal,
            created_at: now,
            accepted_at: Some(now),
            ended_at: now,
            duration_seconds: 0,
        });
    }
}
