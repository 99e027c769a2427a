//! Actor metrics and mailbox monitoring.
//!
//! Mailbox thresholds scale with the configured capacity:
//!
//! | Level    | Depth                          |
//! |----------|--------------------------------|
//! | Normal   | <= 20% of capacity             |
//! | Warning  | 20% - 80% of capacity          |
//! | Critical | > 80% of capacity              |

use crate::observability::metrics;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Label for the `actor_type` metric dimension.
pub const ORCHESTRATOR_ACTOR_TYPE: &str = "orchestrator";

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// At or below the normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Tracks mailbox depth observed by the actor loop.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_id: String,
    normal_threshold: usize,
    warning_threshold: usize,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a monitor for a mailbox bounded at `capacity`.
    #[must_use]
    pub fn new(actor_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            actor_id: actor_id.into(),
            normal_threshold: capacity / 5,
            warning_threshold: capacity.saturating_mul(4) / 5,
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record the depth seen after taking one message off the queue.
    pub fn record_depth(&self, depth: usize) {
        let previous = self.depth.swap(depth, Ordering::Relaxed);
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
        metrics::set_actor_mailbox_depth(ORCHESTRATOR_ACTOR_TYPE, depth);

        let level = self.level_for_depth(depth);
        if level == MailboxLevel::Critical && self.level_for_depth(previous) != MailboxLevel::Critical
        {
            warn!(
                target: "call.actor.mailbox",
                actor_id = %self.actor_id,
                depth,
                threshold = self.warning_threshold,
                "Mailbox depth critical"
            );
        } else if level == MailboxLevel::Warning
            && self.level_for_depth(previous) == MailboxLevel::Normal
        {
            debug!(
                target: "call.actor.mailbox",
                actor_id = %self.actor_id,
                depth,
                "Mailbox depth elevated"
            );
        }
    }

    /// Record a message handled by the actor.
    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.warning_threshold {
            MailboxLevel::Critical
        } else if depth > self.normal_threshold {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Lock-free session counters shared between the actor and its handles.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    signaling_events: AtomicU64,
    events_dropped: AtomicU64,
    commands_accepted: AtomicU64,
    commands_rejected: AtomicU64,
    roster_flushes: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`SessionMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionMetricsSnapshot {
    pub signaling_events: u64,
    pub events_dropped: u64,
    pub commands_accepted: u64,
    pub commands_rejected: u64,
    pub roster_flushes: u64,
    pub reconnects: u64,
}

impl SessionMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_signaling_event(&self) {
        self.signaling_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a discarded event and emit `call_events_dropped_total`.
    pub fn record_event_dropped(&self, reason: &'static str) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::record_event_dropped(reason);
    }

    pub fn record_command(&self, accepted: bool) {
        if accepted {
            self.commands_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.commands_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_flush(&self) {
        self.roster_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            signaling_events: self.signaling_events.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            commands_accepted: self.commands_accepted.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            roster_flushes: self.roster_flushes.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}
