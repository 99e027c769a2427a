//! Metrics definitions for the call session.
//!
//! All metrics follow Prometheus naming conventions:
//! - `call_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Every label is bounded by an enum in this crate:
//! - `state`: 6 values (`CallState::as_str`)
//! - `command`: 7 values (`Command::as_str`)
//! - `result`: 4 values (ok plus the three error codes)
//! - `reason`: bounded drop reasons (`ended`, `stale`, `unknown_peer`, `unparsed`)
//! - `actor_type`: 1 value (orchestrator)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Install a Prometheus recorder and return its handle for rendering.
///
/// # Errors
///
/// Returns error if a global recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("call_flush_batch_size".to_string()),
            &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0],
        )
        .map_err(|e| format!("Failed to set flush batch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Roster
// ============================================================================

/// Record one roster flush and how many pending operations it consumed.
///
/// Metrics: `call_roster_flushes_total`, `call_flush_batch_size`
pub fn record_roster_flush(batch_size: usize) {
    counter!("call_roster_flushes_total").increment(1);
    #[allow(clippy::cast_precision_loss)]
    histogram!("call_flush_batch_size").record(batch_size as f64);
}

/// Metric: `call_roster_size`
pub fn set_roster_size(size: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("call_roster_size").set(size as f64);
}

// ============================================================================
// Render targets
// ============================================================================

/// Metric: `call_render_targets_active`
pub fn set_render_targets_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("call_render_targets_active").set(count as f64);
}

/// Record a render target the surface refused to create.
///
/// Metric: `call_render_acquire_failures_total`
///
/// Each failure leaves one peer audio-only.
pub fn record_render_acquire_failure() {
    counter!("call_render_acquire_failures_total").increment(1);
}

// ============================================================================
// Lifecycle and commands
// ============================================================================

/// Metric: `call_state_transitions_total`
/// Labels: `state` (the state entered)
pub fn record_state_transition(state: &'static str) {
    counter!("call_state_transitions_total", "state" => state).increment(1);
}

/// Metric: `call_commands_total`
/// Labels: `command`, `result` (`ok`, `not_permitted`, `not_available`, `internal`)
pub fn record_command(command: &'static str, result: &'static str) {
    counter!("call_commands_total", "command" => command, "result" => result).increment(1);
}

/// Record an inbound event or outbound notification that was discarded.
///
/// Metric: `call_events_dropped_total`
/// Labels: `reason`
pub fn record_event_dropped(reason: &'static str) {
    counter!("call_events_dropped_total", "reason" => reason).increment(1);
}

// ============================================================================
// Actor mailbox
// ============================================================================

/// Metric: `call_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &'static str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("call_actor_mailbox_depth", "actor_type" => actor_type).set(depth as f64);
}
