//! Pre-configured test data fixtures for orchestrator testing.
//!
//! Provides builders for:
//! - Peers (video and screen legs) and their descriptors
//! - A spawned orchestrator wired to recording collaborators

use crate::{MockRenderSurface, RecordingLocalMedia, RecordingSignaling};
use call_session::actors::{
    CallOrchestrator, CallOrchestratorHandle, Capabilities, SessionState,
};
use call_session::collaborators::Collaborators;
use call_session::config::Config;
use call_session::peer::{LegKind, PeerDescriptor};
use common::types::{PeerId, PeerIdentifier, SessionId, StreamHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Test peer fixture.
#[derive(Debug, Clone)]
pub struct TestPeer {
    /// Participant ID shared by all legs of the participant.
    pub peer_id: String,
    /// Leg identifier.
    pub identifier: String,
    pub leg_kind: LegKind,
    pub display_name: Option<String>,
}

impl TestPeer {
    /// Camera leg of `name`, identified as `{name}-video`.
    #[must_use]
    pub fn video(name: impl Into<String>) -> Self {
        let peer_id = name.into();
        Self {
            identifier: format!("{peer_id}-video"),
            peer_id,
            leg_kind: LegKind::Video,
            display_name: None,
        }
    }

    /// Screen-share leg of `name`, identified as `{name}-screen`.
    #[must_use]
    pub fn screen(name: impl Into<String>) -> Self {
        let peer_id = name.into();
        Self {
            identifier: format!("{peer_id}-screen"),
            peer_id,
            leg_kind: LegKind::Screen,
            display_name: None,
        }
    }

    /// Camera leg with a random participant ID.
    #[must_use]
    pub fn random() -> Self {
        Self::video(format!("peer-{}", Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Override the leg identifier (e.g. a rejoin under a fresh leg).
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    #[must_use]
    pub fn identifier(&self) -> PeerIdentifier {
        PeerIdentifier::new(self.identifier.clone())
    }

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        PeerId::new(self.peer_id.clone())
    }

    #[must_use]
    pub fn descriptor(&self) -> PeerDescriptor {
        PeerDescriptor {
            peer_identifier: self.identifier(),
            peer_id: self.peer_id(),
            leg_kind: self.leg_kind,
            display_name: self.display_name.clone(),
        }
    }
}

/// A spawned orchestrator and its recording collaborators.
pub struct TestCall {
    pub handle: CallOrchestratorHandle,
    pub surface: Arc<MockRenderSurface>,
    pub signaling: Arc<RecordingSignaling>,
    pub media: Arc<RecordingLocalMedia>,
    pub cancel_token: CancellationToken,
    pub task: JoinHandle<()>,
    batch_window: Duration,
}

impl TestCall {
    /// Create a new `TestCall` builder.
    #[must_use]
    pub fn builder() -> TestCallBuilder {
        TestCallBuilder::default()
    }

    /// Spawn with defaults.
    #[must_use]
    pub fn spawn() -> Self {
        Self::builder().spawn()
    }

    /// Sleep past the batch window so an armed flush runs.
    ///
    /// Intended for `start_paused` tests where the sleep auto-advances.
    pub async fn settle(&self) {
        tokio::time::sleep(self.batch_window + Duration::from_millis(10)).await;
    }

    pub async fn join(&self, peer: &TestPeer) {
        self.handle.on_peer_joined(peer.descriptor()).await.unwrap();
    }

    pub async fn leave(&self, peer: &TestPeer) {
        self.handle.on_peer_left(peer.identifier()).await.unwrap();
    }

    pub async fn stream_added(&self, peer: &TestPeer, stream: u64) {
        self.handle
            .on_remote_stream_added(peer.identifier(), peer.leg_kind, StreamHandle(stream))
            .await
            .unwrap();
    }

    pub async fn stream_removed(&self, peer: &TestPeer, stream: u64) {
        self.handle
            .on_remote_stream_removed(peer.identifier(), peer.leg_kind, StreamHandle(stream))
            .await
            .unwrap();
    }

    pub async fn data_channel(&self, peer: &TestPeer, text: &str) {
        self.handle
            .on_data_channel_message(peer.identifier(), text)
            .await
            .unwrap();
    }

    pub async fn state(&self) -> SessionState {
        self.handle.get_state().await.unwrap()
    }

    /// Leg identifiers of the published roster, in display order.
    pub async fn roster_ids(&self) -> Vec<String> {
        self.state()
            .await
            .roster
            .peers
            .iter()
            .map(|p| p.peer_identifier.as_str().to_string())
            .collect()
    }
}

/// Builder for `TestCall`.
pub struct TestCallBuilder {
    config: Config,
    capabilities: Capabilities,
    surface: Option<MockRenderSurface>,
}

impl Default for TestCallBuilder {
    fn default() -> Self {
        Self {
            config: Config {
                session_id: SessionId("call-test".to_string()),
                ..Config::default()
            },
            capabilities: Capabilities::all(),
            surface: None,
        }
    }
}

impl TestCallBuilder {
    #[must_use]
    pub fn visible_tiles(mut self, tiles: usize) -> Self {
        self.config.visible_tiles = tiles;
        self
    }

    #[must_use]
    pub fn batch_window(mut self, window: Duration) -> Self {
        self.config.batch_window = window;
        self
    }

    #[must_use]
    pub fn reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.config.reconnect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn surface(mut self, surface: MockRenderSurface) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Spawn the orchestrator. Must run inside a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> TestCall {
        let surface = Arc::new(self.surface.unwrap_or_default());
        let signaling = RecordingSignaling::shared();
        let media = RecordingLocalMedia::shared();
        let cancel_token = CancellationToken::new();
        let batch_window = self.config.batch_window;

        let collaborators = Collaborators {
            surface: surface.clone(),
            signaling: signaling.clone(),
            media: media.clone(),
        };
        let (handle, task) = CallOrchestrator::spawn(
            self.config,
            collaborators,
            self.capabilities,
            cancel_token.clone(),
        );

        TestCall {
            handle,
            surface,
            signaling,
            media,
            cancel_token,
            task,
            batch_window,
        }
    }
}
