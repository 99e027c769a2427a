//! Call session configuration.
//!
//! Loaded from environment variables. Unparseable values are rejected rather
//! than silently replaced by defaults.

use common::types::SessionId;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default roster debounce window in milliseconds.
pub const DEFAULT_BATCH_WINDOW_MS: u64 = 500;

/// Default time allowed for signaling to rejoin after a drop.
pub const DEFAULT_RECONNECT_TIMEOUT_SECONDS: u64 = 30;

/// Default number of tiles that fit on screen before the presentation layer
/// reports its real viewport.
pub const DEFAULT_VISIBLE_TILES: usize = 6;

/// Default orchestrator mailbox bound.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 500;

/// Default presentation event buffer.
pub const DEFAULT_EVENT_BUFFER: usize = 100;

/// Call session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Label for logs and metrics.
    pub session_id: SessionId,

    /// Debounce window for roster flushes (default: 500ms).
    pub batch_window: Duration,

    /// How long `Reconnecting` may last before the call ends (default: 30s).
    pub reconnect_timeout: Duration,

    /// Initial viewport size in tiles (default: 6).
    pub visible_tiles: usize,

    /// Orchestrator mailbox bound (default: 500).
    pub mailbox_capacity: usize,

    /// Presentation broadcast buffer (default: 100).
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_id: SessionId::generate(),
            batch_window: Duration::from_millis(DEFAULT_BATCH_WINDOW_MS),
            reconnect_timeout: Duration::from_secs(DEFAULT_RECONNECT_TIMEOUT_SECONDS),
            visible_tiles: DEFAULT_VISIBLE_TILES,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let session_id = vars
            .get("CALL_SESSION_ID")
            .map(|s| SessionId(s.clone()))
            .unwrap_or_else(SessionId::generate);

        let batch_window_ms: u64 =
            parse_positive(vars, "CALL_BATCH_WINDOW_MS", DEFAULT_BATCH_WINDOW_MS)?;
        let reconnect_timeout_seconds: u64 = parse_positive(
            vars,
            "CALL_RECONNECT_TIMEOUT_SECONDS",
            DEFAULT_RECONNECT_TIMEOUT_SECONDS,
        )?;
        let visible_tiles = parse_positive(vars, "CALL_VISIBLE_TILES", DEFAULT_VISIBLE_TILES)?;
        let mailbox_capacity =
            parse_positive(vars, "CALL_MAILBOX_CAPACITY", DEFAULT_MAILBOX_CAPACITY)?;
        let event_buffer = parse_positive(vars, "CALL_EVENT_BUFFER", DEFAULT_EVENT_BUFFER)?;

        Ok(Config {
            session_id,
            batch_window: Duration::from_millis(batch_window_ms),
            reconnect_timeout: Duration::from_secs(reconnect_timeout_seconds),
            visible_tiles,
            mailbox_capacity,
            event_buffer,
        })
    }
}

/// Parse a strictly positive number, falling back to `default` when unset.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };

    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw.clone(),
        }),
    }
}
