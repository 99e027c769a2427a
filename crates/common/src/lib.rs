//! Common utilities and types shared across call session components.

#![warn(clippy::pedantic)]

/// Module for identifier types (peers, legs, streams, render targets)
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
