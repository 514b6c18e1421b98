//! Actor metrics and mailbox monitoring.
//!
//! Provides mailbox depth monitoring with per-actor-type thresholds:
//!
//! | Actor Type  | Normal | Warning | Critical |
//! |-------------|--------|---------|----------|
//! | Coordinator | < 100  | 100-500 | > 500    |
//! | Call        | < 50   | 50-200  | > 200    |
//!
//! Prometheus metrics are emitted with the `cc_` prefix.

use metrics::counter;
use signaling_protocol::EndReason;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for the coordinator actor.
pub const COORDINATOR_MAILBOX_NORMAL: usize = 100;
pub const COORDINATOR_MAILBOX_WARNING: usize = 500;

/// Mailbox depth thresholds for call actors.
pub const CALL_MAILBOX_NORMAL: usize = 50;
pub const CALL_MAILBOX_WARNING: usize = 200;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `CoordinatorActor` (singleton).
    Coordinator,
    /// `CallActor` (one per call).
    Call,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Coordinator => "coordinator",
            ActorType::Call => "call",
        }
    }

    /// Returns the warning threshold for this actor type.
    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Coordinator => COORDINATOR_MAILBOX_WARNING,
            ActorType::Call => CALL_MAILBOX_WARNING,
        }
    }

    /// Returns the normal threshold for this actor type.
    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Coordinator => COORDINATOR_MAILBOX_NORMAL,
            ActorType::Call => CALL_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Mailbox monitor for tracking queue depth and emitting metrics.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Actor type for labeling.
    actor_type: ActorType,
    /// Actor identifier (call_id, coordinator instance id).
    actor_id: String,
    /// Current mailbox depth.
    depth: AtomicUsize,
    /// Peak mailbox depth since last reset.
    peak_depth: AtomicUsize,
    /// Total messages processed.
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a new mailbox monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message being added to the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;

        let mut current_peak = self.peak_depth.load(Ordering::Relaxed);
        while new_depth > current_peak {
            match self.peak_depth.compare_exchange_weak(
                current_peak,
                new_depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current_peak = actual,
            }
        }

        let level = self.level_for_depth(new_depth);
        if level == MailboxLevel::Critical {
            warn!(
                target: "cc.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                threshold = self.actor_type.warning_threshold(),
                "Mailbox depth critical"
            );
        } else if level == MailboxLevel::Warning && new_depth == self.actor_type.normal_threshold()
        {
            // Log once when crossing the warning threshold
            debug!(
                target: "cc.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                "Mailbox depth elevated"
            );
        }
    }

    /// Record a message being removed from the mailbox (processed).
    pub fn record_dequeue(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Get the peak mailbox depth.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Get total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Get the current mailbox level.
    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    /// Reset peak depth counter.
    pub fn reset_peak(&self) {
        self.peak_depth
            .store(self.current_depth(), Ordering::Relaxed);
    }

    /// Determine mailbox level for a given depth.
    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated metrics for the actor system.
///
/// Shared between the coordinator (which updates values) and the health
/// surface (which reads them). All fields are atomic for lock-free
/// concurrent access.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Calls currently in a non-terminal state.
    pub active_calls: AtomicUsize,
    /// Total actor panics (indicates bugs).
    pub actor_panics: AtomicU64,
    /// Total messages processed across all actors.
    pub total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a call entering `ringing`.
    pub fn call_started(&self) {
        self.active_calls.fetch_add(1, Ordering::Relaxed);
        counter!("cc_calls_started_total").increment(1);
    }

    /// Record a call reaching a terminal state.
    pub fn call_ended(&self, reason: EndReason) {
        self.active_calls.fetch_sub(1, Ordering::Relaxed);
        counter!("cc_calls_ended_total", "reason" => reason.to_string()).increment(1);
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        counter!("cc_actor_panics_total", "actor_type" => actor_type.as_str()).increment(1);
        tracing::error!(
            target: "cc.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = self.actor_panics.load(Ordering::Relaxed),
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    /// Record a message being processed.
    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get current active call count.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.active_calls.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_type_as_str() {
        assert_eq!(ActorType::Coordinator.as_str(), "coordinator");
        assert_eq!(ActorType::Call.as_str(), "call");
    }

    #[test]
    fn test_actor_type_thresholds() {
        assert_eq!(ActorType::Coordinator.normal_threshold(), 100);
        assert_eq!(ActorType::Coordinator.warning_threshold(), 500);
        assert_eq!(ActorType::Call.normal_threshold(), 50);
        assert_eq!(ActorType::Call.warning_threshold(), 200);
    }

    #[test]
    fn test_mailbox_monitor_enqueue_dequeue() {
        let monitor = MailboxMonitor::new(ActorType::Call, "call-123");

        assert_eq!(monitor.current_depth(), 0);

        monitor.record_enqueue();
        assert_eq!(monitor.current_depth(), 1);
        assert_eq!(monitor.peak_depth(), 1);

        monitor.record_enqueue();
        monitor.record_enqueue();
        assert_eq!(monitor.current_depth(), 3);
        assert_eq!(monitor.peak_depth(), 3);

        monitor.record_dequeue();
        assert_eq!(monitor.current_depth(), 2);
        assert_eq!(monitor.peak_depth(), 3); // Peak stays at 3
        assert_eq!(monitor.messages_processed(), 1);
    }

    #[test]
    fn test_mailbox_monitor_levels() {
        let monitor = MailboxMonitor::new(ActorType::Call, "call-123");

        // Normal (< 50)
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);

        // Warning (50-200)
        for _ in 0..75 {
            monitor.record_enqueue();
        }
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);

        // Critical (> 200)
        for _ in 0..150 {
            monitor.record_enqueue();
        }
        assert_eq!(monitor.current_level(), MailboxLevel::Critical);
    }

    #[test]
    fn test_mailbox_monitor_reset_peak() {
        let monitor = MailboxMonitor::new(ActorType::Coordinator, "cc-test");

        for _ in 0..10 {
            monitor.record_enqueue();
        }
        assert_eq!(monitor.peak_depth(), 10);

        for _ in 0..5 {
            monitor.record_dequeue();
        }
        assert_eq!(monitor.peak_depth(), 10); // Still 10
        assert_eq!(monitor.current_depth(), 5);

        monitor.reset_peak();
        assert_eq!(monitor.peak_depth(), 5); // Reset to current
    }

    #[test]
    fn test_actor_metrics_call_counts() {
        let metrics = ActorMetrics::new();

        assert_eq!(metrics.call_count(), 0);

        metrics.call_started();
        metrics.call_started();
        assert_eq!(metrics.call_count(), 2);

        metrics.call_ended(EndReason::Normal);
        assert_eq!(metrics.call_count(), 1);
    }

    #[test]
    fn test_actor_metrics_panics() {
        let metrics = ActorMetrics::new();

        metrics.record_panic(ActorType::Call);
        assert_eq!(metrics.actor_panics.load(Ordering::Relaxed), 1);

        metrics.record_panic(ActorType::Coordinator);
        assert_eq!(metrics.actor_panics.load(Ordering::Relaxed), 2);
    }
}
