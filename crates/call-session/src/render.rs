//! Render target ownership.
//!
//! The [`RenderTargetRegistry`] is the only component that creates or releases
//! render targets. Everything else refers to a target by its
//! [`RenderTargetHandle`]. Release is keyed by peer and removes the mapping
//! before calling the surface, so a peer removal racing a stream-removed
//! event can never release the same handle twice.

use crate::observability::metrics;
use common::types::{PeerIdentifier, RenderTargetHandle, StreamHandle};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Render target acquisition failure. Always recoverable: the peer stays in the
/// roster without video.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// No decoder/surface capacity left.
    #[error("render resources exhausted")]
    Exhausted,

    /// The surface refused for another reason.
    #[error("render surface error: {0}")]
    Surface(String),
}

/// Render-surface collaborator (owned by the presentation layer).
pub trait RenderSurface: Send + Sync {
    /// Create a surface for `peer`.
    fn acquire_render_target(
        &self,
        peer: &PeerIdentifier,
    ) -> Result<RenderTargetHandle, RenderError>;

    /// Destroy a surface previously returned by `acquire_render_target`.
    fn release_render_target(&self, handle: RenderTargetHandle);

    /// Route decoded frames of `stream` to `handle`.
    fn assign_stream(&self, handle: RenderTargetHandle, stream: StreamHandle);

    /// Show `handle` on the screen-share display surface.
    fn attach_presentation(&self, handle: RenderTargetHandle);

    /// Remove `handle` from the screen-share display surface.
    fn detach_presentation(&self, handle: RenderTargetHandle);
}

/// Maps peer legs to the render target receiving their video.
pub struct RenderTargetRegistry {
    surface: Arc<dyn RenderSurface>,
    targets: HashMap<PeerIdentifier, RenderTargetHandle>,
}

impl RenderTargetRegistry {
    #[must_use]
    pub fn new(surface: Arc<dyn RenderSurface>) -> Self {
        Self {
            surface,
            targets: HashMap::new(),
        }
    }

    /// Current target of `peer`, if any.
    #[must_use]
    pub fn get(&self, peer: &PeerIdentifier) -> Option<RenderTargetHandle> {
        self.targets.get(peer).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Route `stream` to the target of `peer`, creating the target on first use.
    ///
    /// Returns `None` when acquisition fails; the caller keeps the peer as
    /// audio-only.
    pub fn assign_stream(
        &mut self,
        peer: &PeerIdentifier,
        stream: StreamHandle,
    ) -> Option<RenderTargetHandle> {
        let handle = match self.targets.get(peer) {
            Some(handle) => *handle,
            None => match self.surface.acquire_render_target(peer) {
                Ok(handle) => {
                    debug!(
                        target: "call.render",
                        peer_identifier = %peer,
                        handle = %handle,
                        "Render target acquired"
                    );
                    self.targets.insert(peer.clone(), handle);
                    metrics::set_render_targets_active(self.targets.len());
                    handle
                }
                Err(e) => {
                    warn!(
                        target: "call.render",
                        peer_identifier = %peer,
                        error = %e,
                        "Render target acquisition failed, falling back to audio-only"
                    );
                    metrics::record_render_acquire_failure();
                    return None;
                }
            },
        };

        self.surface.assign_stream(handle, stream);
        Some(handle)
    }

    /// Release the target of `peer`. Returns whether anything was released.
    pub fn release(&mut self, peer: &PeerIdentifier) -> bool {
        match self.targets.remove(peer) {
            Some(handle) => {
                self.surface.release_render_target(handle);
                metrics::set_render_targets_active(self.targets.len());
                debug!(
                    target: "call.render",
                    peer_identifier = %peer,
                    handle = %handle,
                    "Render target released"
                );
                true
            }
            None => false,
        }
    }

    /// Release every target. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let released = self.targets.len();
        for (_, handle) in self.targets.drain() {
            self.surface.release_render_target(handle);
        }
        metrics::set_render_targets_active(0);
        released
    }

    /// Attach the target of `peer` to the screen-share display surface.
    pub fn attach_presentation(&self, peer: &PeerIdentifier) -> Option<RenderTargetHandle> {
        let handle = self.get(peer)?;
        self.surface.attach_presentation(handle);
        Some(handle)
    }

    /// Detach the target of `peer` from the screen-share display surface.
    pub fn detach_presentation(&self, peer: &PeerIdentifier) -> Option<RenderTargetHandle> {
        let handle = self.get(peer)?;
        self.surface.detach_presentation(handle);
        Some(handle)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingSurface {
        next: Mutex<u64>,
        released: Mutex<Vec<RenderTargetHandle>>,
        assigned: Mutex<Vec<(RenderTargetHandle, StreamHandle)>>,
        fail: bool,
    }

    impl RenderSurface for CountingSurface {
        fn acquire_render_target(
            &self,
            _peer: &PeerIdentifier,
        ) -> Result<RenderTargetHandle, RenderError> {
            if self.fail {
                return Err(RenderError::Exhausted);
            }
            let mut next = self.next.lock().unwrap();
            *next += 1;
            Ok(RenderTargetHandle(*next))
        }

        fn release_render_target(&self, handle: RenderTargetHandle) {
            self.released.lock().unwrap().push(handle);
        }

        fn assign_stream(&self, handle: RenderTargetHandle, stream: StreamHandle) {
            self.assigned.lock().unwrap().push((handle, stream));
        }

        fn attach_presentation(&self, _handle: RenderTargetHandle) {}

        fn detach_presentation(&self, _handle: RenderTargetHandle) {}
    }

    #[test]
    fn test_target_created_lazily_and_reused() {
        let surface = Arc::new(CountingSurface::default());
        let mut registry = RenderTargetRegistry::new(surface.clone());
        let peer = PeerIdentifier::from("alice-video");

        assert!(registry.get(&peer).is_none());

        let first = registry.assign_stream(&peer, StreamHandle(1)).unwrap();
        let second = registry.assign_stream(&peer, StreamHandle(2)).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(surface.assigned.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_release_is_exactly_once() {
        let surface = Arc::new(CountingSurface::default());
        let mut registry = RenderTargetRegistry::new(surface.clone());
        let peer = PeerIdentifier::from("alice-video");

        registry.assign_stream(&peer, StreamHandle(1));

        assert!(registry.release(&peer));
        assert!(!registry.release(&peer));
        assert_eq!(surface.released.lock().unwrap().len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_acquire_failure_leaves_no_entry() {
        let surface = Arc::new(CountingSurface {
            fail: true,
            ..CountingSurface::default()
        });
        let mut registry = RenderTargetRegistry::new(surface.clone());
        let peer = PeerIdentifier::from("bob-video");

        assert!(registry.assign_stream(&peer, StreamHandle(1)).is_none());
        assert!(registry.is_empty());
        assert!(surface.assigned.lock().unwrap().is_empty());
    }

    #[test]
    fn test_release_all() {
        let surface = Arc::new(CountingSurface::default());
        let mut registry = RenderTargetRegistry::new(surface.clone());

        registry.assign_stream(&PeerIdentifier::from("a"), StreamHandle(1));
        registry.assign_stream(&PeerIdentifier::from("b"), StreamHandle(2));

        assert_eq!(registry.release_all(), 2);
        assert_eq!(registry.release_all(), 0);
        assert_eq!(surface.released.lock().unwrap().len(), 2);
    }
}
