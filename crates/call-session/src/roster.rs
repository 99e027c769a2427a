//! Ordered participant roster with batched reconciliation.
//!
//! The roster is an arena-and-index structure: an ordered `Vec` of video-leg
//! records plus an identifier-to-position map. Churn is collected in three
//! pending sets and applied by a single [`ParticipantRoster::flush`]:
//!
//! 1. deletions (render targets released here)
//! 2. insertions, in event order
//! 3. stored updates replayed against now-present peers
//! 4. re-rank when the roster is longer than the viewport
//!
//! The roster never arms timers itself; every mutation returns an outcome that
//! tells the orchestrator whether a flush must be scheduled.
//!
//! Invariants:
//! - an identifier is in at most one of {roster, pending inserts}
//! - removing a pending insert cancels it instead of queuing a deletion
//! - no identifier appears twice in the roster after any flush

use crate::peer::{PeerRecord, PeerState};
use crate::priority::{rank, RankingContext};
use crate::render::RenderTargetRegistry;
use common::types::PeerIdentifier;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Portion of the roster the presentation layer currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Index of the first visible tile.
    pub first: usize,
    /// Number of tiles that fit on screen.
    pub count: usize,
}

impl Viewport {
    /// Viewport starting at the top of the roster.
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self { first: 0, count }
    }

    /// Whether roster position `index` is on screen.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index >= self.first && index < self.first.saturating_add(self.count)
    }
}

/// Result of [`ParticipantRoster::add_peer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Roster was empty; the peer is visible now.
    Applied,
    /// Queued for the next flush.
    Queued,
    /// Queued while the displayed record of the same identifier is still
    /// pending deletion. The flush removes the old row before appending the
    /// new one; the caller must release the old leg's render target now.
    QueuedBehindDeletion,
    /// Already present or already pending.
    Duplicate,
}

/// Result of [`ParticipantRoster::remove_peer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The peer was only a pending insert; nothing will change.
    CancelledInsert,
    /// Queued for deletion at the next flush.
    Queued,
    /// Not known to the roster, or already queued for deletion.
    Ignored,
}

/// Result of [`ParticipantRoster::update_peer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Applied to the displayed row at this position.
    Refreshed(usize),
    /// Stored until the pending insert is reconciled.
    Deferred,
    /// Unknown to the roster.
    Ignored,
}

/// Sizes of the pending sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PendingCounts {
    pub inserts: usize,
    pub deletions: usize,
    pub updates: usize,
}

impl PendingCounts {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts == 0 && self.deletions == 0 && self.updates == 0
    }
}

/// What a flush did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub removed: Vec<PeerIdentifier>,
    pub inserted: usize,
    pub updated: usize,
    pub reordered: bool,
}

impl FlushReport {
    /// Whether the visible roster differs from before the flush.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.removed.is_empty() || self.inserted > 0 || self.updated > 0 || self.reordered
    }

    /// Number of pending operations the flush consumed.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.removed.len() + self.inserted + self.updated
    }
}

/// The ordered set of video-leg peers eligible for display.
#[derive(Debug, Default)]
pub struct ParticipantRoster {
    peers: Vec<PeerRecord>,
    index: HashMap<PeerIdentifier, usize>,
    pending_inserts: Vec<PeerRecord>,
    pending_deletions: HashSet<PeerIdentifier>,
    pending_updates: HashMap<PeerIdentifier, PeerState>,
}

impl ParticipantRoster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Displayed records in roster order.
    #[must_use]
    pub fn records(&self) -> &[PeerRecord] {
        &self.peers
    }

    /// Position of `peer` in the displayed roster.
    #[must_use]
    pub fn position(&self, peer: &PeerIdentifier) -> Option<usize> {
        self.index.get(peer).copied()
    }

    #[must_use]
    pub fn contains(&self, peer: &PeerIdentifier) -> bool {
        self.index.contains_key(peer)
    }

    #[must_use]
    pub fn is_pending_insert(&self, peer: &PeerIdentifier) -> bool {
        self.pending_inserts
            .iter()
            .any(|p| p.peer_identifier() == peer)
    }

    /// Whether `peer` is displayed inside `viewport`.
    #[must_use]
    pub fn is_visible(&self, peer: &PeerIdentifier, viewport: &Viewport) -> bool {
        self.position(peer)
            .is_some_and(|index| viewport.contains(index))
    }

    #[must_use]
    pub fn pending_counts(&self) -> PendingCounts {
        PendingCounts {
            inserts: self.pending_inserts.len(),
            deletions: self.pending_deletions.len(),
            updates: self.pending_updates.len(),
        }
    }

    /// Whether any pending operation references `peer`.
    #[must_use]
    pub fn has_pending(&self, peer: &PeerIdentifier) -> bool {
        self.is_pending_insert(peer)
            || self.pending_deletions.contains(peer)
            || self.pending_updates.contains_key(peer)
    }

    /// Add a peer. The first peer of an empty roster is applied immediately.
    pub fn add_peer(&mut self, record: PeerRecord) -> AddOutcome {
        let id = record.peer_identifier().clone();

        if self.is_pending_insert(&id) {
            debug!(target: "call.roster", peer_identifier = %id, "Duplicate pending insert ignored");
            return AddOutcome::Duplicate;
        }

        if self.contains(&id) {
            if self.pending_deletions.contains(&id) {
                self.pending_inserts.push(record);
                return AddOutcome::QueuedBehindDeletion;
            }
            debug!(target: "call.roster", peer_identifier = %id, "Peer already in roster");
            return AddOutcome::Duplicate;
        }

        if self.peers.is_empty() && self.pending_inserts.is_empty() {
            let mut record = record;
            if let Some(update) = self.pending_updates.remove(&id) {
                record.apply(&update);
            }
            self.index.insert(id, 0);
            self.peers.push(record);
            return AddOutcome::Applied;
        }

        self.pending_inserts.push(record);
        AddOutcome::Queued
    }

    /// Remove a peer, cancelling a still-pending insert if there is one.
    pub fn remove_peer(&mut self, peer: &PeerIdentifier) -> RemoveOutcome {
        if let Some(pos) = self
            .pending_inserts
            .iter()
            .position(|p| p.peer_identifier() == peer)
        {
            self.pending_inserts.remove(pos);
            self.pending_updates.remove(peer);
            return RemoveOutcome::CancelledInsert;
        }

        if self.contains(peer) && self.pending_deletions.insert(peer.clone()) {
            self.pending_updates.remove(peer);
            return RemoveOutcome::Queued;
        }

        RemoveOutcome::Ignored
    }

    /// Update a peer's state: immediately when displayed, deferred when pending.
    pub fn update_peer(&mut self, peer: &PeerIdentifier, state: &PeerState) -> UpdateOutcome {
        // A rejoined leg is pending while its old row is still displayed.
        if self.is_pending_insert(peer) {
            self.pending_updates.insert(peer.clone(), state.clone());
            return UpdateOutcome::Deferred;
        }

        if let Some(index) = self.position(peer) {
            if let Some(record) = self.peers.get_mut(index) {
                record.apply(state);
                // The row now holds the newest state; an older stored one must not win later.
                self.pending_updates.remove(peer);
                return UpdateOutcome::Refreshed(index);
            }
        }

        UpdateOutcome::Ignored
    }

    /// Apply every pending operation as one transaction.
    ///
    /// `visible_count` is the viewport size; ranking only runs when the roster
    /// is longer than that.
    pub fn flush(
        &mut self,
        registry: &mut RenderTargetRegistry,
        ranking: &RankingContext<'_>,
        visible_count: usize,
    ) -> FlushReport {
        let mut report = FlushReport::default();

        if !self.pending_deletions.is_empty() {
            let deletions = std::mem::take(&mut self.pending_deletions);
            self.peers.retain(|record| {
                if deletions.contains(record.peer_identifier()) {
                    report.removed.push(record.peer_identifier().clone());
                    false
                } else {
                    true
                }
            });
            for id in &report.removed {
                // A rejoined identifier's old target was released when it
                // rejoined; the mapping now belongs to the new leg.
                if !self.is_pending_insert(id) {
                    registry.release(id);
                }
            }
        }

        report.inserted = self.pending_inserts.len();
        self.peers.append(&mut self.pending_inserts);
        self.rebuild_index();

        for (id, state) in std::mem::take(&mut self.pending_updates) {
            match self.index.get(&id).and_then(|i| self.peers.get_mut(*i)) {
                Some(record) => {
                    record.apply(&state);
                    report.updated += 1;
                }
                None => {
                    debug!(target: "call.roster", peer_identifier = %id, "Dropping update for absent peer");
                }
            }
        }

        if self.peers.len() > visible_count {
            let before: Vec<PeerIdentifier> = self
                .peers
                .iter()
                .map(|p| p.peer_identifier().clone())
                .collect();
            rank(&mut self.peers, ranking);
            report.reordered = self
                .peers
                .iter()
                .map(PeerRecord::peer_identifier)
                .ne(before.iter());
            if report.reordered {
                self.rebuild_index();
            }
        }

        debug!(
            target: "call.roster",
            removed = report.removed.len(),
            inserted = report.inserted,
            updated = report.updated,
            reordered = report.reordered,
            roster_size = self.peers.len(),
            "Roster flushed"
        );

        report
    }

    /// Drop the roster and every pending operation without applying anything.
    ///
    /// Returns the identifiers that were displayed.
    pub fn clear(&mut self) -> Vec<PeerIdentifier> {
        self.pending_inserts.clear();
        self.pending_deletions.clear();
        self.pending_updates.clear();
        self.index.clear();
        self.peers
            .drain(..)
            .map(|p| p.peer_identifier().clone())
            .collect()
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, record) in self.peers.iter().enumerate() {
            self.index.insert(record.peer_identifier().clone(), i);
        }
    }
}
