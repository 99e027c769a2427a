//! Call Session Library
//!
//! Client-side orchestration of a real-time call:
//!
//! - Authoritative per-peer state fed by the signaling stack
//! - Batched, debounced reconciliation of the displayed participant roster
//! - Priority ordering (screen sharers, recent speakers, video, join order)
//! - Render target lifecycle for remote streams
//! - Call lifecycle state machine with reconnect and room-switch handling
//! - Local media commands checked against room capabilities
//!
//! # Architecture
//!
//! ```text
//! signaling stack ──events──▶ CallOrchestrator ──snapshots──▶ presentation layer
//!                                  │
//!                                  ├──▶ RenderSurface   (render targets)
//!                                  ├──▶ SignalingLink   (data channel, leave, switch)
//!                                  └──▶ LocalMedia      (capture inputs)
//! ```
//!
//! # Modules
//!
//! - [`actors`] - The orchestrator actor, its handle and message types
//! - [`roster`] - `ParticipantRoster` with pending insert/delete/update sets
//! - [`priority`] - Tier ranking of displayed peers
//! - [`state`] - `CallSessionStateMachine`
//! - [`config`] - Session configuration from environment
//! - [`errors`] - Error types with result codes
//! - [`replay`] - JSON-lines scenario replay used by the binary

#![warn(clippy::pedantic)]

pub mod actors;
pub mod collaborators;
pub mod config;
pub mod data_channel;
pub mod errors;
pub mod observability;
pub mod peer;
pub mod priority;
pub mod render;
pub mod replay;
pub mod roster;
pub mod state;
pub mod timer;
