//! # Call Test Utilities
//!
//! Shared test utilities for the call session orchestrator.
//!
//! This crate provides recording collaborators and fixtures for isolated
//! orchestrator testing without a real signaling stack or renderer.
//!
//! ## Modules
//!
//! - `mock_surface` - Recording render surface with acquisition-failure modes
//! - `mock_signaling` - Recording outbound signaling link
//! - `mock_media` - Recording local capture pipeline
//! - `fixtures` - Peer builders and a spawned-call harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use call_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let call = TestCall::builder().visible_tiles(4).spawn();
//!     let alice = TestPeer::video("alice");
//!
//!     call.handle.on_joined().await.unwrap();
//!     call.handle.on_peer_joined(alice.descriptor()).await.unwrap();
//!
//!     assert_eq!(call.surface.acquired_count(), 0);
//! }
//! ```
//!
//! ## Test Patterns
//!
//! ### Render Failures
//!
//! ```rust,ignore
//! let surface = MockRenderSurface::builder()
//!     .fail_acquisition_for("bob-video")
//!     .build();
//! let call = TestCall::builder().surface(surface).spawn();
//! ```

pub mod fixtures;
pub mod mock_media;
pub mod mock_signaling;
pub mod mock_surface;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_media::*;
pub use mock_signaling::*;
pub use mock_surface::*;
