//! Recording signaling link.
//!
//! Captures outbound data-channel text, leave requests and room switches so
//! tests can assert what the orchestrator told the signaling stack.

use call_session::collaborators::SignalingLink;
use common::secret::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct SignalingLog {
    data_channel: Vec<String>,
    leaves: Vec<bool>,
    room_switches: Vec<String>,
}

/// Mock outbound signaling.
#[derive(Debug, Default)]
pub struct RecordingSignaling {
    log: Mutex<SignalingLog>,
}

impl RecordingSignaling {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Data-channel messages in send order.
    #[must_use]
    pub fn data_channel_messages(&self) -> Vec<String> {
        self.log.lock().unwrap().data_channel.clone()
    }

    /// `for_all` flag of each leave call.
    #[must_use]
    pub fn leaves(&self) -> Vec<bool> {
        self.log.lock().unwrap().leaves.clone()
    }

    /// Exposed room tokens of each switch call.
    #[must_use]
    pub fn room_switches(&self) -> Vec<String> {
        self.log.lock().unwrap().room_switches.clone()
    }
}

impl SignalingLink for RecordingSignaling {
    fn send_data_channel(&self, text: &str) {
        self.log.lock().unwrap().data_channel.push(text.to_string());
    }

    fn leave(&self, for_all: bool) {
        self.log.lock().unwrap().leaves.push(for_all);
    }

    fn switch_room(&self, room_token: &SecretString) {
        self.log
            .lock()
            .unwrap()
            .room_switches
            .push(room_token.expose_secret().to_string());
    }
}
