//! Call session error types.
//!
//! Commands report one of three outcomes besides success. Transient signaling
//! trouble, unknown peers and render-target shortages are not errors at all:
//! they are handled inside the orchestrator and only logged.

use crate::actors::messages::Capability;
use thiserror::Error;

/// Error returned by orchestrator commands and queries.
///
/// Maps to the outward result taxonomy:
/// - `NotPermitted`: `not_permitted`
/// - `NotAvailable`: `not_available`
/// - `Internal`: `internal`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The room permissions do not grant the capability the command needs.
    #[error("Not permitted: missing {} capability", .0.as_str())]
    NotPermitted(Capability),

    /// The command cannot apply in the current state (e.g. the call ended).
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// The orchestrator task is gone or dropped the reply.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallError {
    /// Returns the result code reported to the application.
    #[must_use]
    pub const fn result_code(&self) -> &'static str {
        match self {
            CallError::NotPermitted(_) => "not_permitted",
            CallError::NotAvailable(_) => "not_available",
            CallError::Internal(_) => "internal",
        }
    }
}
