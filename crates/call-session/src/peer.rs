//! Remote peer records and the view models handed to the presentation layer.
//!
//! A [`PeerRecord`] describes one media leg of one remote participant. The
//! orchestrator keeps the authoritative copy of every record; the roster keeps
//! its own displayed copy and receives changes as whole [`PeerState`] values so
//! that a stored pending update is never a partial mutation.

use common::types::{PeerId, PeerIdentifier, RenderTargetHandle};
use serde::{Deserialize, Serialize};

/// Which media relationship a leg carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegKind {
    /// Camera and microphone.
    Video,
    /// Screen share.
    Screen,
}

impl LegKind {
    /// Returns the leg kind as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LegKind::Video => "video",
            LegKind::Screen => "screen",
        }
    }
}

/// ICE-level connection state of one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Description of a newly joined leg as reported by signaling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Handle of this leg.
    pub peer_identifier: PeerIdentifier,
    /// Participant the leg belongs to.
    pub peer_id: PeerId,
    /// Camera or screen.
    pub leg_kind: LegKind,
    /// Display name, if signaling already knows it.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Mutable part of a peer record.
///
/// Updates carry a complete `PeerState`, so last-write-wins never loses a field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerState {
    pub display_name: String,
    pub remote_audio_disabled: bool,
    pub remote_video_disabled: bool,
    pub is_speaking: bool,
    pub hand_raised: bool,
    pub connection_state: IceConnectionState,
    pub has_remote_stream: bool,
}

/// One remote media leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    peer_identifier: PeerIdentifier,
    peer_id: PeerId,
    leg_kind: LegKind,
    added_at: i64,
    state: PeerState,
}

impl PeerRecord {
    /// Create a record for a freshly joined leg.
    ///
    /// `added_at` is fixed for the lifetime of the record.
    #[must_use]
    pub fn new(descriptor: PeerDescriptor, added_at: i64) -> Self {
        let display_name = descriptor
            .display_name
            .unwrap_or_else(|| descriptor.peer_id.to_string());
        Self {
            peer_identifier: descriptor.peer_identifier,
            peer_id: descriptor.peer_id,
            leg_kind: descriptor.leg_kind,
            added_at,
            state: PeerState {
                display_name,
                ..PeerState::default()
            },
        }
    }

    #[must_use]
    pub fn peer_identifier(&self) -> &PeerIdentifier {
        &self.peer_identifier
    }

    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    #[must_use]
    pub fn leg_kind(&self) -> LegKind {
        self.leg_kind
    }

    /// Insertion timestamp, used as the ordering tie-break.
    #[must_use]
    pub fn added_at(&self) -> i64 {
        self.added_at
    }

    #[must_use]
    pub fn state(&self) -> &PeerState {
        &self.state
    }

    /// Mutable access to the state; identity fields stay fixed.
    pub fn state_mut(&mut self) -> &mut PeerState {
        &mut self.state
    }

    /// Replace the mutable state with `update`.
    pub fn apply(&mut self, update: &PeerState) {
        self.state.clone_from(update);
    }

    /// Whether the peer currently sends video the user can see.
    #[must_use]
    pub fn shows_video(&self) -> bool {
        self.state.has_remote_stream && !self.state.remote_video_disabled
    }

    /// Build the presentation view model for this record.
    #[must_use]
    pub fn to_view(
        &self,
        is_screen_sharing: bool,
        render_target: Option<RenderTargetHandle>,
    ) -> PeerView {
        PeerView {
            peer_identifier: self.peer_identifier.clone(),
            peer_id: self.peer_id.clone(),
            display_name: self.state.display_name.clone(),
            audio_disabled: self.state.remote_audio_disabled,
            video_disabled: self.state.remote_video_disabled,
            is_speaking: self.state.is_speaking,
            hand_raised: self.state.hand_raised,
            connection_state: self.state.connection_state,
            has_remote_stream: self.state.has_remote_stream,
            is_screen_sharing,
            render_target,
        }
    }
}

/// Immutable per-row view model consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerView {
    pub peer_identifier: PeerIdentifier,
    pub peer_id: PeerId,
    pub display_name: String,
    pub audio_disabled: bool,
    pub video_disabled: bool,
    pub is_speaking: bool,
    pub hand_raised: bool,
    pub connection_state: IceConnectionState,
    pub has_remote_stream: bool,
    pub is_screen_sharing: bool,
    pub render_target: Option<RenderTargetHandle>,
}
