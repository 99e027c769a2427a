//! Message types for the orchestrator actor.
//!
//! Signaling callbacks are fire-and-forget; commands and queries carry a
//! `tokio::sync::oneshot` sender for the reply.

use crate::errors::CallError;
use crate::peer::{IceConnectionState, LegKind, PeerDescriptor, PeerView};
use crate::roster::{PendingCounts, Viewport};
use crate::state::CallState;
use common::secret::SecretString;
use common::types::{PeerId, PeerIdentifier, SessionId, StreamHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Messages sent to the `CallOrchestrator`.
#[derive(Debug)]
pub enum OrchestratorMessage {
    /// An event reported by the signaling stack.
    Signaling(SignalingEvent),

    /// A local command from the application.
    Command {
        command: Command,
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// The presentation layer scrolled or resized.
    UpdateViewport(Viewport),

    /// Room permissions changed.
    UpdateCapabilities(Capabilities),

    /// Get current session state (for tests and diagnostics).
    GetState {
        respond_to: oneshot::Sender<SessionState>,
    },
}

/// Events from the signaling stack.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SignalingEvent {
    /// A remote leg joined. Its stream may arrive later.
    PeerJoined(PeerDescriptor),

    /// A remote leg left.
    PeerLeft { peer_identifier: PeerIdentifier },

    RemoteStreamAdded {
        peer_identifier: PeerIdentifier,
        leg_kind: LegKind,
        stream: StreamHandle,
    },

    RemoteStreamRemoved {
        peer_identifier: PeerIdentifier,
        leg_kind: LegKind,
        stream: StreamHandle,
    },

    IceStateChanged {
        peer_identifier: PeerIdentifier,
        state: IceConnectionState,
    },

    DataChannelMessage {
        peer_identifier: PeerIdentifier,
        text: String,
    },

    /// The local client joined the room.
    Joined,

    /// Connection lost; signaling is retrying.
    Reconnecting,

    /// Signaling is back after a reconnect or room switch.
    Rejoined,

    /// Signaling asks the call to move to another room.
    RoomSwitchRequested { room_token: SecretString },

    /// Unrecoverable signaling failure.
    Failed,
}

impl SignalingEvent {
    /// Event name for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SignalingEvent::PeerJoined(_) => "peer_joined",
            SignalingEvent::PeerLeft { .. } => "peer_left",
            SignalingEvent::RemoteStreamAdded { .. } => "remote_stream_added",
            SignalingEvent::RemoteStreamRemoved { .. } => "remote_stream_removed",
            SignalingEvent::IceStateChanged { .. } => "ice_state_changed",
            SignalingEvent::DataChannelMessage { .. } => "data_channel_message",
            SignalingEvent::Joined => "joined",
            SignalingEvent::Reconnecting => "reconnecting",
            SignalingEvent::Rejoined => "rejoined",
            SignalingEvent::RoomSwitchRequested { .. } => "room_switch_requested",
            SignalingEvent::Failed => "failed",
        }
    }
}

/// Local commands.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetAudioEnabled { enabled: bool },
    SetVideoEnabled { enabled: bool },
    SetHandRaised { raised: bool },
    SetScreenShare { enabled: bool },
    /// Present a remote screen share, or stop presenting with `None`.
    PresentScreenShare {
        #[serde(default)]
        peer_id: Option<PeerId>,
    },
    SwitchRoom { room_token: SecretString },
    HangUp {
        #[serde(default)]
        for_all: bool,
    },
}

impl Command {
    /// Command name for the `command` metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Command::SetAudioEnabled { .. } => "set_audio_enabled",
            Command::SetVideoEnabled { .. } => "set_video_enabled",
            Command::SetHandRaised { .. } => "set_hand_raised",
            Command::SetScreenShare { .. } => "set_screen_share",
            Command::PresentScreenShare { .. } => "present_screen_share",
            Command::SwitchRoom { .. } => "switch_room",
            Command::HangUp { .. } => "hang_up",
        }
    }

    /// Capability the command needs, if any. A plain hang-up is always allowed.
    #[must_use]
    pub const fn required_capability(&self) -> Option<Capability> {
        match self {
            Command::SetAudioEnabled { .. } => Some(Capability::PublishAudio),
            Command::SetVideoEnabled { .. } => Some(Capability::PublishVideo),
            Command::SetHandRaised { .. } => Some(Capability::RaiseHand),
            Command::SetScreenShare { .. } => Some(Capability::ScreenShare),
            Command::HangUp { for_all: true } => Some(Capability::EndForAll),
            Command::PresentScreenShare { .. }
            | Command::SwitchRoom { .. }
            | Command::HangUp { for_all: false } => None,
        }
    }
}

/// A single room permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    PublishAudio,
    PublishVideo,
    RaiseHand,
    ScreenShare,
    EndForAll,
}

impl Capability {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Capability::PublishAudio => "publish_audio",
            Capability::PublishVideo => "publish_video",
            Capability::RaiseHand => "raise_hand",
            Capability::ScreenShare => "screen_share",
            Capability::EndForAll => "end_for_all",
        }
    }
}

/// Room permissions, supplied by the application.
///
/// Missing fields in serialized form default to granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub publish_audio: bool,
    pub publish_video: bool,
    pub raise_hand: bool,
    pub screen_share: bool,
    pub end_for_all: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

impl Capabilities {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            publish_audio: true,
            publish_video: true,
            raise_hand: true,
            screen_share: true,
            end_for_all: true,
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self {
            publish_audio: false,
            publish_video: false,
            raise_hand: false,
            screen_share: false,
            end_for_all: false,
        }
    }

    #[must_use]
    pub const fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::PublishAudio => self.publish_audio,
            Capability::PublishVideo => self.publish_video,
            Capability::RaiseHand => self.raise_hand,
            Capability::ScreenShare => self.screen_share,
            Capability::EndForAll => self.end_for_all,
        }
    }
}

/// State of the local capture inputs as last commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LocalMediaState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub hand_raised: bool,
    pub screen_sharing: bool,
}

/// Immutable roster snapshot handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterSnapshot {
    /// Increments on every publish.
    pub version: u64,
    /// Video legs in display order.
    pub peers: Vec<PeerView>,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum PresentationEvent {
    /// A new snapshot replaced the previous one.
    RosterSnapshotChanged(Arc<RosterSnapshot>),
    /// One row changed in place; the snapshot was republished with it.
    PeerRefreshed { index: usize, peer: PeerView },
    CallStateChanged(CallState),
    /// The presented screen share changed (`None` when nothing is presented).
    ScreenSharePresented(Option<PeerId>),
}

/// Current session state (for tests and diagnostics).
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub call_state: CallState,
    pub roster: RosterSnapshot,
    pub pending: PendingCounts,
    /// Known legs, displayed or not, across both leg kinds.
    pub known_peers: usize,
    pub render_targets_active: usize,
    pub presented_share: Option<PeerId>,
    /// Participants with an active screen-share stream, sorted.
    pub screen_sharers: Vec<PeerId>,
    pub local_media: LocalMediaState,
    pub capabilities: Capabilities,
    pub viewport: Viewport,
    pub recent_speakers: Vec<PeerIdentifier>,
    pub batch_timer_armed: bool,
    pub reconnect_timer_armed: bool,
    pub mailbox_depth: usize,
}
