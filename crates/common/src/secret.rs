//! Secret types for values that must never reach logs.
//!
//! Re-exports [`secrecy`] types. Room tokens handed to the signaling layer during
//! a room switch are credentials and travel as [`SecretString`], so any struct
//! deriving `Debug` that carries one (commands, replay-script steps) prints
//! `[REDACTED]` instead of the token.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct SwitchRoom {
//!     room_token: SecretString,
//! }
//!
//! let cmd = SwitchRoom { room_token: SecretString::from("tok-123") };
//! assert!(!format!("{cmd:?}").contains("tok-123"));
//! assert_eq!(cmd.room_token.expose_secret(), "tok-123");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
