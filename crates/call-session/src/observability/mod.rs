//! Observability for the call session.
//!
//! # Privacy by Default
//!
//! Orchestrator handlers use `#[instrument(skip_all)]` and record only
//! identifiers and bounded enums. Display names, data-channel text and room
//! tokens are never logged.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `call_roster_flushes_total` | Counter | none | Debounced roster reconciliations |
//! | `call_flush_batch_size` | Histogram | none | Pending operations per flush |
//! | `call_roster_size` | Gauge | none | Displayed video legs |
//! | `call_render_targets_active` | Gauge | none | Live render targets |
//! | `call_render_acquire_failures_total` | Counter | none | Peers left audio-only |
//! | `call_state_transitions_total` | Counter | `state` | Lifecycle changes |
//! | `call_commands_total` | Counter | `command`, `result` | Local command outcomes |
//! | `call_events_dropped_total` | Counter | `reason` | Discarded events |
//! | `call_actor_mailbox_depth` | Gauge | `actor_type` | Backpressure |

pub mod metrics;

pub use self::metrics::{
    init_metrics_recorder, record_command, record_event_dropped, record_render_acquire_failure,
    record_roster_flush, record_state_transition, set_actor_mailbox_depth,
    set_render_targets_active, set_roster_size,
};
