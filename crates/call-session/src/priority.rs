//! Display priority of roster peers.
//!
//! Peers are bucketed into tiers, lower sorts first:
//!
//! | Tier | Peer                                         | Tie-break                 |
//! |------|----------------------------------------------|---------------------------|
//! | 0    | video leg whose participant shares a screen  | `added_at`                |
//! | 1    | in the recent-speakers list                  | index in that list        |
//! | 2    | remote stream with video enabled             | `added_at`                |
//! | 3    | remote stream with video disabled            | `added_at`                |
//! | 4    | no stream yet                                | `added_at`                |
//!
//! Ranking only matters when the roster is longer than the viewport; when
//! everyone fits on screen the roster keeps insertion order.

use crate::peer::{LegKind, PeerRecord};
use common::types::{PeerId, PeerIdentifier};
use std::collections::{HashSet, VecDeque};

/// Coarse priority bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tier {
    ScreenSharing = 0,
    RecentSpeaker = 1,
    Video = 2,
    AudioOnly = 3,
    NoStream = 4,
}

/// Total-order sort key: tier first, then tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PriorityKey {
    pub tier: u8,
    pub tiebreak: i64,
}

/// Most-recently-promoted-first list of speakers.
#[derive(Debug, Clone, Default)]
pub struct RecentSpeakers {
    order: VecDeque<PeerIdentifier>,
}

impl RecentSpeakers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `peer` to the head of the list, inserting it if absent.
    pub fn promote(&mut self, peer: &PeerIdentifier) {
        self.remove(peer);
        self.order.push_front(peer.clone());
    }

    /// Drop `peer` from the list. Returns whether it was present.
    pub fn remove(&mut self, peer: &PeerIdentifier) -> bool {
        match self.order.iter().position(|p| p == peer) {
            Some(index) => {
                self.order.remove(index);
                true
            }
            None => false,
        }
    }

    /// Position of `peer`, 0 being the most recent promotion.
    #[must_use]
    pub fn position(&self, peer: &PeerIdentifier) -> Option<usize> {
        self.order.iter().position(|p| p == peer)
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<PeerIdentifier> {
        self.order.iter().cloned().collect()
    }
}

/// Inputs to ranking that live outside the peer record itself.
#[derive(Debug, Clone, Copy)]
pub struct RankingContext<'a> {
    /// Participants with an active screen-share leg.
    pub screen_sharers: &'a HashSet<PeerId>,
    pub recent_speakers: &'a RecentSpeakers,
}

/// Compute the display priority of `peer`.
#[must_use]
pub fn priority_key(peer: &PeerRecord, ctx: &RankingContext<'_>) -> PriorityKey {
    let (tier, tiebreak) = if peer.leg_kind() == LegKind::Video
        && ctx.screen_sharers.contains(peer.peer_id())
    {
        (Tier::ScreenSharing, peer.added_at())
    } else if let Some(index) = ctx.recent_speakers.position(peer.peer_identifier()) {
        (
            Tier::RecentSpeaker,
            i64::try_from(index).unwrap_or(i64::MAX),
        )
    } else if peer.state().has_remote_stream && !peer.state().remote_video_disabled {
        (Tier::Video, peer.added_at())
    } else if peer.state().has_remote_stream {
        (Tier::AudioOnly, peer.added_at())
    } else {
        (Tier::NoStream, peer.added_at())
    };

    PriorityKey {
        tier: tier as u8,
        tiebreak,
    }
}

/// Stable-sort `peers` by priority.
pub fn rank(peers: &mut [PeerRecord], ctx: &RankingContext<'_>) {
    peers.sort_by_cached_key(|peer| priority_key(peer, ctx));
}
