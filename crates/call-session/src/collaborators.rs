//! Outbound collaborator interfaces.
//!
//! The orchestrator never reaches for global state: the signaling stack, the
//! local capture pipeline and the render surface are injected at spawn time
//! as trait objects. Calls are synchronous and must not block; implementations
//! that do real I/O hand the work to their own tasks.

use crate::render::RenderSurface;
use common::secret::SecretString;
use std::sync::Arc;

/// Outbound half of the signaling stack.
pub trait SignalingLink: Send + Sync {
    /// Broadcast `text` on the data channel to every peer.
    fn send_data_channel(&self, text: &str);

    /// Leave the room, ending it for everyone when `for_all` is set.
    fn leave(&self, for_all: bool);

    /// Connect to another room.
    fn switch_room(&self, room_token: &SecretString);
}

/// Local capture pipeline.
pub trait LocalMedia: Send + Sync {
    fn set_audio_enabled(&self, enabled: bool);
    fn set_video_enabled(&self, enabled: bool);
    fn set_screen_share(&self, enabled: bool);

    /// Stop every capture input (camera, microphone, screen).
    fn stop_capture(&self);
}

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub surface: Arc<dyn RenderSurface>,
    pub signaling: Arc<dyn SignalingLink>,
    pub media: Arc<dyn LocalMedia>,
}
