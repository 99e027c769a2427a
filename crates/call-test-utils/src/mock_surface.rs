//! Mock render surface for orchestrator testing.
//!
//! Records every acquisition, release, stream assignment and presentation
//! call. Can be configured to:
//! - Fail acquisition for specific peers
//! - Run out of targets after a fixed number of acquisitions
//!
//! # Example
//!
//! ```rust,ignore
//! use call_test_utils::MockRenderSurface;
//!
//! let surface = MockRenderSurface::builder()
//!     .capacity(2)
//!     .build();
//! ```

use call_session::render::{RenderError, RenderSurface};
use common::types::{PeerIdentifier, RenderTargetHandle, StreamHandle};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A presentation-surface call, in the order it was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationCall {
    Attach(RenderTargetHandle),
    Detach(RenderTargetHandle),
}

#[derive(Debug, Default)]
struct SurfaceLog {
    next_handle: u64,
    acquired: Vec<(PeerIdentifier, RenderTargetHandle)>,
    released: Vec<RenderTargetHandle>,
    assigned: Vec<(RenderTargetHandle, StreamHandle)>,
    presentation: Vec<PresentationCall>,
}

/// Recording render surface.
#[derive(Debug)]
pub struct MockRenderSurface {
    fail_for: HashSet<PeerIdentifier>,
    capacity: Option<usize>,
    log: Mutex<SurfaceLog>,
}

impl Default for MockRenderSurface {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockRenderSurface {
    /// Create a new `MockRenderSurface` builder.
    #[must_use]
    pub fn builder() -> MockRenderSurfaceBuilder {
        MockRenderSurfaceBuilder::default()
    }

    /// Shared instance ready to hand to `Collaborators`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Handle acquired for `peer`, most recent first.
    #[must_use]
    pub fn handle_for(&self, peer: &str) -> Option<RenderTargetHandle> {
        let log = self.log.lock().unwrap();
        log.acquired
            .iter()
            .rev()
            .find(|(p, _)| p.as_str() == peer)
            .map(|(_, h)| *h)
    }

    /// Total successful acquisitions.
    #[must_use]
    pub fn acquired_count(&self) -> usize {
        self.log.lock().unwrap().acquired.len()
    }

    /// Whether `peer` ever got a target.
    #[must_use]
    pub fn was_acquired(&self, peer: &str) -> bool {
        self.handle_for(peer).is_some()
    }

    /// How many times `handle` was released.
    #[must_use]
    pub fn release_count(&self, handle: RenderTargetHandle) -> usize {
        self.log
            .lock()
            .unwrap()
            .released
            .iter()
            .filter(|h| **h == handle)
            .count()
    }

    #[must_use]
    pub fn released(&self) -> Vec<RenderTargetHandle> {
        self.log.lock().unwrap().released.clone()
    }

    /// Targets acquired and not yet released.
    #[must_use]
    pub fn live_count(&self) -> usize {
        let log = self.log.lock().unwrap();
        log.acquired
            .iter()
            .filter(|(_, h)| !log.released.contains(h))
            .count()
    }

    #[must_use]
    pub fn assigned(&self) -> Vec<(RenderTargetHandle, StreamHandle)> {
        self.log.lock().unwrap().assigned.clone()
    }

    #[must_use]
    pub fn presentation_log(&self) -> Vec<PresentationCall> {
        self.log.lock().unwrap().presentation.clone()
    }

    /// Targets currently attached to the presentation surface.
    #[must_use]
    pub fn attached(&self) -> Vec<RenderTargetHandle> {
        let mut attached = Vec::new();
        for call in &self.log.lock().unwrap().presentation {
            match call {
                PresentationCall::Attach(h) => attached.push(*h),
                PresentationCall::Detach(h) => attached.retain(|a| a != h),
            }
        }
        attached
    }

    /// Largest number of simultaneously attached targets seen.
    #[must_use]
    pub fn max_attached(&self) -> usize {
        let mut attached: Vec<RenderTargetHandle> = Vec::new();
        let mut max = 0;
        for call in &self.log.lock().unwrap().presentation {
            match call {
                PresentationCall::Attach(h) => attached.push(*h),
                PresentationCall::Detach(h) => attached.retain(|a| a != h),
            }
            max = max.max(attached.len());
        }
        max
    }
}

impl RenderSurface for MockRenderSurface {
    fn acquire_render_target(
        &self,
        peer: &PeerIdentifier,
    ) -> Result<RenderTargetHandle, RenderError> {
        if self.fail_for.contains(peer) {
            return Err(RenderError::Surface(format!("no target for {peer}")));
        }

        let mut log = self.log.lock().unwrap();
        if let Some(capacity) = self.capacity {
            let live = log
                .acquired
                .iter()
                .filter(|(_, h)| !log.released.contains(h))
                .count();
            if live >= capacity {
                return Err(RenderError::Exhausted);
            }
        }

        log.next_handle += 1;
        let handle = RenderTargetHandle(log.next_handle);
        log.acquired.push((peer.clone(), handle));
        Ok(handle)
    }

    fn release_render_target(&self, handle: RenderTargetHandle) {
        self.log.lock().unwrap().released.push(handle);
    }

    fn assign_stream(&self, handle: RenderTargetHandle, stream: StreamHandle) {
        self.log.lock().unwrap().assigned.push((handle, stream));
    }

    fn attach_presentation(&self, handle: RenderTargetHandle) {
        self.log
            .lock()
            .unwrap()
            .presentation
            .push(PresentationCall::Attach(handle));
    }

    fn detach_presentation(&self, handle: RenderTargetHandle) {
        self.log
            .lock()
            .unwrap()
            .presentation
            .push(PresentationCall::Detach(handle));
    }
}

/// Builder for `MockRenderSurface`.
#[derive(Debug, Default)]
pub struct MockRenderSurfaceBuilder {
    fail_for: HashSet<PeerIdentifier>,
    capacity: Option<usize>,
}

impl MockRenderSurfaceBuilder {
    /// Fail every acquisition for `peer`.
    #[must_use]
    pub fn fail_acquisition_for(mut self, peer: &str) -> Self {
        self.fail_for.insert(PeerIdentifier::new(peer));
        self
    }

    /// Refuse acquisitions once `capacity` targets are live.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Build the `MockRenderSurface`.
    #[must_use]
    pub fn build(self) -> MockRenderSurface {
        MockRenderSurface {
            fail_for: self.fail_for,
            capacity: self.capacity,
            log: Mutex::new(SurfaceLog::default()),
        }
    }
}

