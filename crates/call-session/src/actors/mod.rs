//! Actor implementation for a call session.
//!
//! ```text
//! CallOrchestrator (one per call)
//! ├── owns PeerRecords, ParticipantRoster, RenderTargetRegistry
//! ├── owns CallSessionStateMachine
//! └── owns batch + reconnect OneShotTimers (post TimerFired back to the mailbox)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single owner**: all session state lives in the actor task; handles only send messages
//! - **CancellationToken propagation**: the caller's token stops the actor and releases targets
//! - **Mailbox monitoring**: depth thresholds scale with `CALL_MAILBOX_CAPACITY`
//! - **Atomic snapshots**: the roster is published through `tokio::sync::watch` as `Arc`s
//!
//! # Modules
//!
//! - [`orchestrator`] - `CallOrchestrator` and its cloneable handle
//! - [`messages`] - Signaling events, commands and presentation types
//! - [`metrics`] - Mailbox monitoring and session counters

pub mod messages;
pub mod metrics;
pub mod orchestrator;

// Re-export primary types
pub use messages::*;
pub use metrics::{MailboxLevel, MailboxMonitor, SessionMetrics, SessionMetricsSnapshot};
pub use orchestrator::{CallOrchestrator, CallOrchestratorHandle};
