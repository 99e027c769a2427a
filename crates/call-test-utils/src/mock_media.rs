//! Recording local capture pipeline.

use call_session::collaborators::LocalMedia;
use std::sync::{Arc, Mutex};

/// A call made on the local media pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCall {
    Audio(bool),
    Video(bool),
    ScreenShare(bool),
    StopCapture,
}

/// Mock local media that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingLocalMedia {
    calls: Mutex<Vec<MediaCall>>,
}

impl RecordingLocalMedia {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether capture was stopped at least once.
    #[must_use]
    pub fn capture_stopped(&self) -> bool {
        self.calls().contains(&MediaCall::StopCapture)
    }

    fn record(&self, call: MediaCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl LocalMedia for RecordingLocalMedia {
    fn set_audio_enabled(&self, enabled: bool) {
        self.record(MediaCall::Audio(enabled));
    }

    fn set_video_enabled(&self, enabled: bool) {
        self.record(MediaCall::Video(enabled));
    }

    fn set_screen_share(&self, enabled: bool) {
        self.record(MediaCall::ScreenShare(enabled));
    }

    fn stop_capture(&self) {
        self.record(MediaCall::StopCapture);
    }
}
