//! `CallOrchestrator` - per-call actor that owns all session state.
//!
//! The orchestrator:
//! - Receives signaling events and keeps the authoritative `PeerRecord` of
//!   every remote leg
//! - Feeds video legs into the batched `ParticipantRoster` and flushes it from
//!   a one-shot debounce timer
//! - Tracks screen-share legs in a side table keyed by participant
//! - Drives the `CallSessionStateMachine` and publishes immutable snapshots
//! - Executes local commands, checked against the room capabilities
//!
//! # Abandoning a room
//!
//! `Reconnecting`, `SwitchingRoom` and `Ended` all discard the roster and its
//! pending sets without applying them, cancel the batch timer and release
//! every render target. Peers seen before the drop never reappear unless
//! signaling reports them again.

use super::messages::{
    Capabilities, Command, LocalMediaState, OrchestratorMessage, PresentationEvent,
    RosterSnapshot, SessionState, SignalingEvent,
};
use super::metrics::{MailboxMonitor, SessionMetrics};
use crate::collaborators::{Collaborators, LocalMedia, SignalingLink};
use crate::config::Config;
use crate::data_channel::DataChannelMessage;
use crate::errors::CallError;
use crate::observability::metrics;
use crate::peer::{IceConnectionState, LegKind, PeerDescriptor, PeerRecord, PeerState, PeerView};
use crate::priority::{RankingContext, RecentSpeakers};
use crate::render::RenderTargetRegistry;
use crate::roster::{AddOutcome, ParticipantRoster, RemoveOutcome, UpdateOutcome, Viewport};
use crate::state::{CallSessionStateMachine, CallState, EndReason, Transition};
use crate::timer::{OneShotTimer, TimerFired, TimerKind};

use common::secret::SecretString;
use common::types::{PeerId, PeerIdentifier, SessionId, StreamHandle};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Timer wake-ups are rare; two timers can be in flight at most.
const TIMER_CHANNEL_BUFFER: usize = 8;

/// Handle to a `CallOrchestrator`.
#[derive(Clone)]
pub struct CallOrchestratorHandle {
    sender: mpsc::Sender<OrchestratorMessage>,
    cancel_token: CancellationToken,
    session_id: SessionId,
    roster: watch::Receiver<Arc<RosterSnapshot>>,
    call_state: watch::Receiver<CallState>,
    events: broadcast::Sender<PresentationEvent>,
    metrics: Arc<SessionMetrics>,
}

impl CallOrchestratorHandle {
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    async fn send(&self, message: OrchestratorMessage) -> Result<(), CallError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))
    }

    /// Deliver a signaling event.
    pub async fn signal(&self, event: SignalingEvent) -> Result<(), CallError> {
        self.send(OrchestratorMessage::Signaling(event)).await
    }

    pub async fn on_peer_joined(&self, peer: PeerDescriptor) -> Result<(), CallError> {
        self.signal(SignalingEvent::PeerJoined(peer)).await
    }

    pub async fn on_peer_left(&self, peer_identifier: PeerIdentifier) -> Result<(), CallError> {
        self.signal(SignalingEvent::PeerLeft { peer_identifier })
            .await
    }

    pub async fn on_remote_stream_added(
        &self,
        peer_identifier: PeerIdentifier,
        leg_kind: LegKind,
        stream: StreamHandle,
    ) -> Result<(), CallError> {
        self.signal(SignalingEvent::RemoteStreamAdded {
            peer_identifier,
            leg_kind,
            stream,
        })
        .await
    }

    pub async fn on_remote_stream_removed(
        &self,
        peer_identifier: PeerIdentifier,
        leg_kind: LegKind,
        stream: StreamHandle,
    ) -> Result<(), CallError> {
        self.signal(SignalingEvent::RemoteStreamRemoved {
            peer_identifier,
            leg_kind,
            stream,
        })
        .await
    }

    pub async fn on_ice_state_changed(
        &self,
        peer_identifier: PeerIdentifier,
        state: IceConnectionState,
    ) -> Result<(), CallError> {
        self.signal(SignalingEvent::IceStateChanged {
            peer_identifier,
            state,
        })
        .await
    }

    pub async fn on_data_channel_message(
        &self,
        peer_identifier: PeerIdentifier,
        text: impl Into<String>,
    ) -> Result<(), CallError> {
        self.signal(SignalingEvent::DataChannelMessage {
            peer_identifier,
            text: text.into(),
        })
        .await
    }

    pub async fn on_joined(&self) -> Result<(), CallError> {
        self.signal(SignalingEvent::Joined).await
    }

    pub async fn on_reconnecting(&self) -> Result<(), CallError> {
        self.signal(SignalingEvent::Reconnecting).await
    }

    pub async fn on_rejoined(&self) -> Result<(), CallError> {
        self.signal(SignalingEvent::Rejoined).await
    }

    pub async fn on_room_switch_requested(&self, room_token: SecretString) -> Result<(), CallError> {
        self.signal(SignalingEvent::RoomSwitchRequested { room_token })
            .await
    }

    pub async fn on_signaling_failed(&self) -> Result<(), CallError> {
        self.signal(SignalingEvent::Failed).await
    }

    /// Execute a local command and wait for its result.
    pub async fn execute(&self, command: Command) -> Result<(), CallError> {
        let (tx, rx) = oneshot::channel();
        self.send(OrchestratorMessage::Command {
            command,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<(), CallError> {
        self.execute(Command::SetAudioEnabled { enabled }).await
    }

    pub async fn set_video_enabled(&self, enabled: bool) -> Result<(), CallError> {
        self.execute(Command::SetVideoEnabled { enabled }).await
    }

    pub async fn set_hand_raised(&self, raised: bool) -> Result<(), CallError> {
        self.execute(Command::SetHandRaised { raised }).await
    }

    pub async fn set_screen_share(&self, enabled: bool) -> Result<(), CallError> {
        self.execute(Command::SetScreenShare { enabled }).await
    }

    /// Present `peer_id`'s screen share, or stop presenting with `None`.
    pub async fn present_screen_share(&self, peer_id: Option<PeerId>) -> Result<(), CallError> {
        self.execute(Command::PresentScreenShare { peer_id }).await
    }

    pub async fn switch_room(&self, room_token: SecretString) -> Result<(), CallError> {
        self.execute(Command::SwitchRoom { room_token }).await
    }

    pub async fn hang_up(&self, for_all: bool) -> Result<(), CallError> {
        self.execute(Command::HangUp { for_all }).await
    }

    /// Report what the presentation layer currently shows.
    pub async fn update_viewport(&self, viewport: Viewport) -> Result<(), CallError> {
        self.send(OrchestratorMessage::UpdateViewport(viewport))
            .await
    }

    pub async fn update_capabilities(&self, capabilities: Capabilities) -> Result<(), CallError> {
        self.send(OrchestratorMessage::UpdateCapabilities(capabilities))
            .await
    }

    /// Get current session state.
    pub async fn get_state(&self) -> Result<SessionState, CallError> {
        let (tx, rx) = oneshot::channel();
        self.send(OrchestratorMessage::GetState { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))
    }

    /// Latest published roster snapshot.
    #[must_use]
    pub fn roster_snapshot(&self) -> Arc<RosterSnapshot> {
        self.roster.borrow().clone()
    }

    /// Watch roster snapshots. Each value is replaced atomically.
    #[must_use]
    pub fn watch_roster(&self) -> watch::Receiver<Arc<RosterSnapshot>> {
        self.roster.clone()
    }

    /// Latest published call state.
    #[must_use]
    pub fn call_state(&self) -> CallState {
        *self.call_state.borrow()
    }

    #[must_use]
    pub fn watch_call_state(&self) -> watch::Receiver<CallState> {
        self.call_state.clone()
    }

    /// Subscribe to presentation events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PresentationEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<SessionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Cancel the orchestrator.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `CallOrchestrator` implementation.
pub struct CallOrchestrator {
    session_id: SessionId,
    batch_window: Duration,
    reconnect_timeout: Duration,
    receiver: mpsc::Receiver<OrchestratorMessage>,
    timer_tx: mpsc::Sender<TimerFired>,
    timer_rx: mpsc::Receiver<TimerFired>,
    cancel_token: CancellationToken,
    signaling: Arc<dyn SignalingLink>,
    media: Arc<dyn LocalMedia>,
    capabilities: Capabilities,
    state_machine: CallSessionStateMachine,
    /// Authoritative records of every known leg, both kinds.
    peers: HashMap<PeerIdentifier, PeerRecord>,
    /// Screen leg of each participant that has one.
    screen_legs: HashMap<PeerId, PeerIdentifier>,
    /// Participants whose screen leg currently has a stream.
    screen_sharers: HashSet<PeerId>,
    presented_share: Option<PeerId>,
    recent_speakers: RecentSpeakers,
    roster: ParticipantRoster,
    registry: RenderTargetRegistry,
    viewport: Viewport,
    batch_timer: OneShotTimer,
    reconnect_timer: OneShotTimer,
    /// Logical clock for `PeerRecord::added_at`.
    next_added_at: i64,
    local_media: LocalMediaState,
    snapshot_version: u64,
    roster_tx: watch::Sender<Arc<RosterSnapshot>>,
    state_tx: watch::Sender<CallState>,
    events: broadcast::Sender<PresentationEvent>,
    metrics: Arc<SessionMetrics>,
    mailbox: MailboxMonitor,
}

impl CallOrchestrator {
    /// Spawn a new orchestrator for one call.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: Config,
        collaborators: Collaborators,
        capabilities: Capabilities,
        cancel_token: CancellationToken,
    ) -> (CallOrchestratorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.mailbox_capacity.max(1));
        let (timer_tx, timer_rx) = mpsc::channel(TIMER_CHANNEL_BUFFER);
        let (roster_tx, roster_rx) = watch::channel(Arc::new(RosterSnapshot::default()));
        let (state_tx, state_rx) = watch::channel(CallState::Joining);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let metrics = SessionMetrics::new();

        let actor = Self {
            session_id: config.session_id.clone(),
            batch_window: config.batch_window,
            reconnect_timeout: config.reconnect_timeout,
            receiver,
            timer_tx,
            timer_rx,
            cancel_token: cancel_token.clone(),
            signaling: collaborators.signaling,
            media: collaborators.media,
            capabilities,
            state_machine: CallSessionStateMachine::new(),
            peers: HashMap::new(),
            screen_legs: HashMap::new(),
            screen_sharers: HashSet::new(),
            presented_share: None,
            recent_speakers: RecentSpeakers::new(),
            roster: ParticipantRoster::new(),
            registry: RenderTargetRegistry::new(collaborators.surface),
            viewport: Viewport::new(config.visible_tiles),
            batch_timer: OneShotTimer::new(TimerKind::Batch),
            reconnect_timer: OneShotTimer::new(TimerKind::Reconnect),
            next_added_at: 0,
            local_media: LocalMediaState::default(),
            snapshot_version: 0,
            roster_tx,
            state_tx,
            events: events.clone(),
            metrics: Arc::clone(&metrics),
            mailbox: MailboxMonitor::new(config.session_id.0.clone(), config.mailbox_capacity),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = CallOrchestratorHandle {
            sender,
            cancel_token,
            session_id: config.session_id,
            roster: roster_rx,
            call_state: state_rx,
            events,
            metrics,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "call.actor.orchestrator", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        info!(
            target: "call.actor.orchestrator",
            session_id = %self.session_id,
            "CallOrchestrator started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "call.actor.orchestrator",
                        session_id = %self.session_id,
                        "CallOrchestrator received cancellation signal"
                    );
                    break;
                }

                Some(fired) = self.timer_rx.recv() => {
                    self.handle_timer(fired);
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_depth(self.receiver.len());
                            self.handle_message(message);
                            self.mailbox.record_processed();
                        }
                        None => {
                            info!(
                                target: "call.actor.orchestrator",
                                session_id = %self.session_id,
                                "CallOrchestrator channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown();
    }

    fn handle_message(&mut self, message: OrchestratorMessage) {
        match message {
            OrchestratorMessage::Signaling(event) => self.handle_signaling(event),

            OrchestratorMessage::Command {
                command,
                respond_to,
            } => {
                let result = self.handle_command(command);
                let _ = respond_to.send(result);
            }

            OrchestratorMessage::UpdateViewport(viewport) => self.handle_viewport(viewport),

            OrchestratorMessage::UpdateCapabilities(capabilities) => {
                debug!(
                    target: "call.actor.orchestrator",
                    capabilities = ?capabilities,
                    "Capabilities updated"
                );
                self.capabilities = capabilities;
            }

            OrchestratorMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.get_state());
            }
        }
    }

    // ------------------------------------------------------------------------
    // Signaling
    // ------------------------------------------------------------------------

    fn handle_signaling(&mut self, event: SignalingEvent) {
        self.metrics.record_signaling_event();

        if self.state_machine.is_ended() {
            debug!(
                target: "call.actor.orchestrator",
                event = event.as_str(),
                "Ignoring signaling event after call ended"
            );
            self.metrics.record_event_dropped("ended");
            return;
        }

        let peer_scoped = matches!(
            event,
            SignalingEvent::PeerJoined(_)
                | SignalingEvent::PeerLeft { .. }
                | SignalingEvent::RemoteStreamAdded { .. }
                | SignalingEvent::RemoteStreamRemoved { .. }
                | SignalingEvent::IceStateChanged { .. }
                | SignalingEvent::DataChannelMessage { .. }
        );
        if peer_scoped
            && matches!(
                self.state_machine.state(),
                CallState::Reconnecting | CallState::SwitchingRoom
            )
        {
            debug!(
                target: "call.actor.orchestrator",
                event = event.as_str(),
                state = self.state_machine.state().as_str(),
                "Ignoring peer event from abandoned room"
            );
            self.metrics.record_event_dropped("stale");
            return;
        }

        match event {
            SignalingEvent::PeerJoined(descriptor) => self.on_peer_joined(descriptor),
            SignalingEvent::PeerLeft { peer_identifier } => {
                self.remove_peer(&peer_identifier, "peer_left");
            }
            SignalingEvent::RemoteStreamAdded {
                peer_identifier,
                leg_kind,
                stream,
            } => self.on_remote_stream_added(&peer_identifier, leg_kind, stream),
            SignalingEvent::RemoteStreamRemoved {
                peer_identifier,
                leg_kind,
                stream: _,
            } => self.on_remote_stream_removed(&peer_identifier, leg_kind),
            SignalingEvent::IceStateChanged {
                peer_identifier,
                state,
            } => self.on_ice_state_changed(&peer_identifier, state),
            SignalingEvent::DataChannelMessage {
                peer_identifier,
                text,
            } => self.on_data_channel_message(&peer_identifier, &text),
            SignalingEvent::Joined => self.on_joined(),
            SignalingEvent::Reconnecting => self.on_reconnecting(),
            SignalingEvent::Rejoined => self.on_rejoined(),
            SignalingEvent::RoomSwitchRequested { room_token } => self.switch_room(&room_token),
            SignalingEvent::Failed => {
                warn!(
                    target: "call.actor.orchestrator",
                    session_id = %self.session_id,
                    "Signaling failed"
                );
                self.end_call(EndReason::SignalingFailure);
            }
        }
    }

    fn on_peer_joined(&mut self, descriptor: PeerDescriptor) {
        let id = descriptor.peer_identifier.clone();
        if self.peers.contains_key(&id) {
            debug!(
                target: "call.actor.orchestrator",
                peer_identifier = %id,
                "Duplicate peer join ignored"
            );
            return;
        }

        let leg_taken = match descriptor.leg_kind {
            LegKind::Screen => self.screen_legs.contains_key(&descriptor.peer_id),
            LegKind::Video => self.peers.values().any(|p| {
                p.leg_kind() == LegKind::Video && p.peer_id() == &descriptor.peer_id
            }),
        };
        if leg_taken {
            debug!(
                target: "call.actor.orchestrator",
                peer_identifier = %id,
                peer_id = %descriptor.peer_id,
                leg_kind = descriptor.leg_kind.as_str(),
                "Participant already has a leg of this kind, join ignored"
            );
            return;
        }

        self.next_added_at += 1;
        let record = PeerRecord::new(descriptor, self.next_added_at);

        debug!(
            target: "call.actor.orchestrator",
            peer_identifier = %id,
            peer_id = %record.peer_id(),
            leg_kind = record.leg_kind().as_str(),
            "Peer joined"
        );

        match record.leg_kind() {
            LegKind::Screen => {
                self.screen_legs
                    .insert(record.peer_id().clone(), id.clone());
                self.peers.insert(id, record);
            }
            LegKind::Video => {
                let outcome = self.roster.add_peer(record.clone());
                self.peers.insert(id.clone(), record);
                match outcome {
                    AddOutcome::Applied => {
                        self.publish_snapshot();
                        self.refresh_call_state();
                    }
                    AddOutcome::Queued => self.arm_batch_timer(),
                    AddOutcome::QueuedBehindDeletion => {
                        // The departed leg's target must not carry over to the new one.
                        if self.registry.release(&id) {
                            debug!(
                                target: "call.actor.orchestrator",
                                peer_identifier = %id,
                                "Released departed leg's render target on rejoin"
                            );
                        }
                        self.arm_batch_timer();
                    }
                    AddOutcome::Duplicate => {}
                }
            }
        }
    }

    /// Forget a leg. Shared by explicit leave and ICE closure.
    fn remove_peer(&mut self, id: &PeerIdentifier, event: &'static str) {
        let Some(record) = self.peers.remove(id) else {
            self.drop_unknown(id, event);
            return;
        };

        self.recent_speakers.remove(id);

        match record.leg_kind() {
            LegKind::Video => match self.roster.remove_peer(id) {
                RemoveOutcome::Queued => self.arm_batch_timer(),
                RemoveOutcome::CancelledInsert | RemoveOutcome::Ignored => {
                    // Never displayed, so no flush will release its target.
                    self.registry.release(id);
                }
            },
            LegKind::Screen => {
                let peer_id = record.peer_id().clone();
                self.end_screen_share(&peer_id);
                self.screen_legs.remove(&peer_id);
                self.registry.release(id);
            }
        }

        debug!(
            target: "call.actor.orchestrator",
            peer_identifier = %id,
            leg_kind = record.leg_kind().as_str(),
            event,
            "Peer removed"
        );
    }

    fn on_remote_stream_added(
        &mut self,
        id: &PeerIdentifier,
        leg_kind: LegKind,
        stream: StreamHandle,
    ) {
        let Some((peer_id, state)) = self.mutate_peer(id, leg_kind, "remote_stream_added", |s| {
            s.has_remote_stream = true;
        }) else {
            return;
        };

        let handle = self.registry.assign_stream(id, stream);
        debug!(
            target: "call.actor.orchestrator",
            peer_identifier = %id,
            leg_kind = leg_kind.as_str(),
            audio_only = handle.is_none(),
            "Remote stream added"
        );

        match leg_kind {
            LegKind::Video => self.update_roster_row(id, &state),
            LegKind::Screen => {
                if self.screen_sharers.insert(peer_id.clone()) {
                    self.sharer_changed(&peer_id);
                }
            }
        }
    }

    fn on_remote_stream_removed(&mut self, id: &PeerIdentifier, leg_kind: LegKind) {
        let Some((peer_id, state)) =
            self.mutate_peer(id, leg_kind, "remote_stream_removed", |s| {
                s.has_remote_stream = false;
            })
        else {
            return;
        };

        match leg_kind {
            LegKind::Video => self.update_roster_row(id, &state),
            LegKind::Screen => self.end_screen_share(&peer_id),
        }
    }

    fn on_ice_state_changed(&mut self, id: &PeerIdentifier, state: IceConnectionState) {
        if state == IceConnectionState::Closed {
            debug!(
                target: "call.actor.orchestrator",
                peer_identifier = %id,
                "ICE closed, treating as leave"
            );
            self.remove_peer(id, "ice_state_changed");
            return;
        }

        let Some(leg_kind) = self.peers.get(id).map(PeerRecord::leg_kind) else {
            self.drop_unknown(id, "ice_state_changed");
            return;
        };
        if let Some((_, peer_state)) = self.mutate_peer(id, leg_kind, "ice_state_changed", |s| {
            s.connection_state = state;
        }) {
            if leg_kind == LegKind::Video {
                self.update_roster_row(id, &peer_state);
            }
        }
    }

    fn on_data_channel_message(&mut self, id: &PeerIdentifier, text: &str) {
        let Some(message) = DataChannelMessage::parse(text) else {
            debug!(
                target: "call.actor.orchestrator",
                peer_identifier = %id,
                "Ignoring unrecognised data-channel message"
            );
            self.metrics.record_event_dropped("unparsed");
            return;
        };

        let Some(leg_kind) = self.peers.get(id).map(PeerRecord::leg_kind) else {
            self.drop_unknown(id, "data_channel_message");
            return;
        };

        let Some((_, state)) = self.mutate_peer(id, leg_kind, "data_channel_message", |s| {
            match &message {
                DataChannelMessage::AudioOn => s.remote_audio_disabled = false,
                DataChannelMessage::AudioOff => s.remote_audio_disabled = true,
                DataChannelMessage::VideoOn => s.remote_video_disabled = false,
                DataChannelMessage::VideoOff => s.remote_video_disabled = true,
                DataChannelMessage::Speaking => s.is_speaking = true,
                DataChannelMessage::StoppedSpeaking => s.is_speaking = false,
                DataChannelMessage::RaiseHand => s.hand_raised = true,
                DataChannelMessage::LowerHand => s.hand_raised = false,
                DataChannelMessage::NickChanged { name } => s.display_name.clone_from(name),
            }
        }) else {
            return;
        };

        if leg_kind != LegKind::Video {
            return;
        }

        if message == DataChannelMessage::Speaking && !self.roster.is_visible(id, &self.viewport) {
            self.recent_speakers.promote(id);
            debug!(
                target: "call.actor.orchestrator",
                peer_identifier = %id,
                "Off-screen speaker promoted"
            );
            self.request_reorder();
        }

        self.update_roster_row(id, &state);
    }

    fn on_joined(&mut self) {
        match self.state_machine.joined() {
            Some(transition) => {
                self.on_transition(transition);
                self.refresh_call_state();
            }
            None => debug!(
                target: "call.actor.orchestrator",
                state = self.state_machine.state().as_str(),
                "Join signal ignored in current state"
            ),
        }
    }

    fn on_reconnecting(&mut self) {
        let Some(transition) = self.state_machine.reconnecting() else {
            debug!(
                target: "call.actor.orchestrator",
                "Already reconnecting"
            );
            return;
        };

        self.metrics.record_reconnect();
        let discarded = self.abandon_room();
        self.publish_snapshot();
        self.reconnect_timer
            .arm(self.reconnect_timeout, &self.timer_tx);

        info!(
            target: "call.actor.orchestrator",
            session_id = %self.session_id,
            discarded,
            "Signaling reconnecting, roster discarded"
        );
        self.on_transition(transition);
    }

    fn on_rejoined(&mut self) {
        let Some(transition) = self.state_machine.rejoined() else {
            debug!(
                target: "call.actor.orchestrator",
                state = self.state_machine.state().as_str(),
                "Rejoin signal ignored in current state"
            );
            return;
        };

        self.reconnect_timer.cancel();
        self.on_transition(transition);
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) -> Result<(), CallError> {
        let name = command.as_str();
        let result = self.execute_command(command);

        let code = match &result {
            Ok(()) => "ok",
            Err(e) => e.result_code(),
        };
        metrics::record_command(name, code);
        self.metrics.record_command(result.is_ok());

        if let Err(e) = &result {
            warn!(
                target: "call.actor.orchestrator",
                command = name,
                result = code,
                error = %e,
                "Command rejected"
            );
        }
        result
    }

    fn execute_command(&mut self, command: Command) -> Result<(), CallError> {
        if self.state_machine.is_ended() {
            return Err(CallError::NotAvailable("call has ended".to_string()));
        }

        if let Some(capability) = command.required_capability() {
            if !self.capabilities.allows(capability) {
                return Err(CallError::NotPermitted(capability));
            }
        }

        match command {
            Command::SetAudioEnabled { enabled } => {
                self.media.set_audio_enabled(enabled);
                self.local_media.audio_enabled = enabled;
                self.broadcast(&if enabled {
                    DataChannelMessage::AudioOn
                } else {
                    DataChannelMessage::AudioOff
                });
            }
            Command::SetVideoEnabled { enabled } => {
                self.media.set_video_enabled(enabled);
                self.local_media.video_enabled = enabled;
                self.broadcast(&if enabled {
                    DataChannelMessage::VideoOn
                } else {
                    DataChannelMessage::VideoOff
                });
            }
            Command::SetHandRaised { raised } => {
                self.local_media.hand_raised = raised;
                self.broadcast(&if raised {
                    DataChannelMessage::RaiseHand
                } else {
                    DataChannelMessage::LowerHand
                });
            }
            Command::SetScreenShare { enabled } => {
                self.media.set_screen_share(enabled);
                self.local_media.screen_sharing = enabled;
            }
            Command::PresentScreenShare { peer_id } => {
                return self.present_screen_share(peer_id);
            }
            Command::SwitchRoom { room_token } => self.switch_room(&room_token),
            Command::HangUp { for_all } => {
                self.signaling.leave(for_all);
                self.end_call(if for_all {
                    EndReason::EndedForAll
                } else {
                    EndReason::HungUp
                });
            }
        }
        Ok(())
    }

    fn present_screen_share(&mut self, peer_id: Option<PeerId>) -> Result<(), CallError> {
        let Some(peer_id) = peer_id else {
            self.stop_presenting();
            return Ok(());
        };

        if self.presented_share.as_ref() == Some(&peer_id) {
            return Ok(());
        }

        let leg = self
            .screen_legs
            .get(&peer_id)
            .filter(|_| self.screen_sharers.contains(&peer_id))
            .cloned()
            .ok_or_else(|| CallError::NotAvailable("no active screen share".to_string()))?;
        if self.registry.get(&leg).is_none() {
            return Err(CallError::NotAvailable(
                "screen share has no render target".to_string(),
            ));
        }

        // Old target leaves the display surface before the new one arrives.
        self.detach_presented();
        self.registry.attach_presentation(&leg);
        self.presented_share = Some(peer_id.clone());

        info!(
            target: "call.actor.orchestrator",
            peer_id = %peer_id,
            "Presenting screen share"
        );
        let _ = self
            .events
            .send(PresentationEvent::ScreenSharePresented(Some(peer_id)));
        Ok(())
    }

    fn switch_room(&mut self, room_token: &SecretString) {
        let Some(transition) = self.state_machine.switching_room() else {
            debug!(
                target: "call.actor.orchestrator",
                "Room switch already in progress"
            );
            return;
        };

        self.reconnect_timer.cancel();
        let discarded = self.abandon_room();
        self.publish_snapshot();
        self.media.stop_capture();
        self.local_media = LocalMediaState::default();
        self.signaling.switch_room(room_token);

        info!(
            target: "call.actor.orchestrator",
            session_id = %self.session_id,
            discarded,
            "Switching room"
        );
        self.on_transition(transition);
    }

    fn end_call(&mut self, reason: EndReason) {
        let Some(transition) = self.state_machine.end(reason) else {
            return;
        };

        self.reconnect_timer.cancel();
        self.abandon_room();
        self.publish_snapshot();
        self.media.stop_capture();
        self.local_media = LocalMediaState::default();

        info!(
            target: "call.actor.orchestrator",
            session_id = %self.session_id,
            reason = reason.as_str(),
            "Call ended"
        );
        self.on_transition(transition);
    }

    fn broadcast(&self, message: &DataChannelMessage) {
        match message.encode() {
            Ok(text) => self.signaling.send_data_channel(&text),
            Err(e) => warn!(
                target: "call.actor.orchestrator",
                kind = message.kind(),
                error = %e,
                "Failed to encode data-channel message"
            ),
        }
    }

    // ------------------------------------------------------------------------
    // Timers and presentation
    // ------------------------------------------------------------------------

    fn handle_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::Batch => {
                if self.batch_timer.accept(fired) {
                    self.flush_roster();
                }
            }
            TimerKind::Reconnect => {
                if self.reconnect_timer.accept(fired)
                    && self.state_machine.state() == CallState::Reconnecting
                {
                    warn!(
                        target: "call.actor.orchestrator",
                        session_id = %self.session_id,
                        timeout_seconds = self.reconnect_timeout.as_secs(),
                        "Reconnect timed out"
                    );
                    self.end_call(EndReason::ReconnectTimedOut);
                }
            }
        }
    }

    fn handle_viewport(&mut self, viewport: Viewport) {
        if viewport == self.viewport {
            return;
        }
        debug!(
            target: "call.actor.orchestrator",
            first = viewport.first,
            count = viewport.count,
            "Viewport updated"
        );
        self.viewport = viewport;
        self.request_reorder();
    }

    fn arm_batch_timer(&mut self) {
        self.batch_timer.arm(self.batch_window, &self.timer_tx);
    }

    /// Schedule a re-rank at the next flush when the roster can scroll.
    fn request_reorder(&mut self) {
        if self.roster.len() > self.viewport.count {
            self.arm_batch_timer();
        }
    }

    fn flush_roster(&mut self) {
        let ranking = RankingContext {
            screen_sharers: &self.screen_sharers,
            recent_speakers: &self.recent_speakers,
        };
        let report = self
            .roster
            .flush(&mut self.registry, &ranking, self.viewport.count);

        metrics::record_roster_flush(report.batch_size());
        self.metrics.record_flush();

        if report.changed() {
            self.publish_snapshot();
        }
        self.refresh_call_state();
    }

    /// Discard everything tied to the current room. Returns how many displayed
    /// peers were dropped.
    fn abandon_room(&mut self) -> usize {
        self.batch_timer.cancel();
        self.stop_presenting();
        let discarded = self.roster.clear().len();
        self.registry.release_all();
        self.peers.clear();
        self.screen_legs.clear();
        self.screen_sharers.clear();
        self.recent_speakers.clear();
        discarded
    }

    fn refresh_call_state(&mut self) {
        if let Some(transition) = self.state_machine.roster_changed(self.roster.is_empty()) {
            self.on_transition(transition);
        }
    }

    fn on_transition(&mut self, transition: Transition) {
        info!(
            target: "call.state",
            session_id = %self.session_id,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            "Call state changed"
        );
        metrics::record_state_transition(transition.to.as_str());
        self.state_tx.send_replace(transition.to);
        let _ = self
            .events
            .send(PresentationEvent::CallStateChanged(transition.to));
    }

    fn view_of(&self, record: &PeerRecord) -> PeerView {
        record.to_view(
            self.screen_sharers.contains(record.peer_id()),
            self.registry.get(record.peer_identifier()),
        )
    }

    fn publish_snapshot(&mut self) {
        self.snapshot_version += 1;
        let snapshot = Arc::new(RosterSnapshot {
            version: self.snapshot_version,
            peers: self
                .roster
                .records()
                .iter()
                .map(|record| self.view_of(record))
                .collect(),
        });

        metrics::set_roster_size(snapshot.peers.len());
        self.roster_tx.send_replace(Arc::clone(&snapshot));
        let _ = self
            .events
            .send(PresentationEvent::RosterSnapshotChanged(snapshot));
    }

    /// Republish after an in-place row change and announce the row.
    fn publish_row(&mut self, index: usize) {
        self.publish_snapshot();
        let view = self
            .roster
            .records()
            .get(index)
            .map(|record| self.view_of(record));
        if let Some(peer) = view {
            let _ = self
                .events
                .send(PresentationEvent::PeerRefreshed { index, peer });
        }
    }

    fn update_roster_row(&mut self, id: &PeerIdentifier, state: &PeerState) {
        match self.roster.update_peer(id, state) {
            UpdateOutcome::Refreshed(index) => self.publish_row(index),
            UpdateOutcome::Deferred => debug!(
                target: "call.actor.orchestrator",
                peer_identifier = %id,
                "Update stored until peer is displayed"
            ),
            UpdateOutcome::Ignored => debug!(
                target: "call.actor.orchestrator",
                peer_identifier = %id,
                "Roster does not know peer, update not applied"
            ),
        }
    }

    /// A participant started or stopped sharing: their video row changes tier.
    fn sharer_changed(&mut self, peer_id: &PeerId) {
        let index = self
            .roster
            .records()
            .iter()
            .position(|record| record.peer_id() == peer_id);
        if let Some(index) = index {
            self.publish_row(index);
        }
        self.request_reorder();
    }

    fn end_screen_share(&mut self, peer_id: &PeerId) {
        if self.presented_share.as_ref() == Some(peer_id) {
            self.stop_presenting();
        }
        if self.screen_sharers.remove(peer_id) {
            self.sharer_changed(peer_id);
        }
    }

    /// Take the presented share off the display surface without announcing it.
    fn detach_presented(&mut self) -> Option<PeerId> {
        let peer_id = self.presented_share.take()?;
        if let Some(leg) = self.screen_legs.get(&peer_id) {
            self.registry.detach_presentation(leg);
        }
        Some(peer_id)
    }

    fn stop_presenting(&mut self) {
        if let Some(peer_id) = self.detach_presented() {
            debug!(
                target: "call.actor.orchestrator",
                peer_id = %peer_id,
                "Screen share no longer presented"
            );
            let _ = self
                .events
                .send(PresentationEvent::ScreenSharePresented(None));
        }
    }

    /// Apply `change` to the record of `id`, returning its participant and new
    /// state. Unknown peers and leg-kind mismatches are logged and dropped.
    fn mutate_peer(
        &mut self,
        id: &PeerIdentifier,
        leg_kind: LegKind,
        event: &'static str,
        change: impl FnOnce(&mut PeerState),
    ) -> Option<(PeerId, PeerState)> {
        let Some(record) = self.peers.get_mut(id) else {
            self.drop_unknown(id, event);
            return None;
        };
        if record.leg_kind() != leg_kind {
            debug!(
                target: "call.actor.orchestrator",
                peer_identifier = %id,
                expected = record.leg_kind().as_str(),
                got = leg_kind.as_str(),
                event,
                "Leg kind mismatch, event ignored"
            );
            self.metrics.record_event_dropped("stale");
            return None;
        }

        change(record.state_mut());
        Some((record.peer_id().clone(), record.state().clone()))
    }

    fn drop_unknown(&self, id: &PeerIdentifier, event: &'static str) {
        debug!(
            target: "call.actor.orchestrator",
            peer_identifier = %id,
            event,
            "Ignoring event for unknown peer"
        );
        self.metrics.record_event_dropped("unknown_peer");
    }

    fn get_state(&self) -> SessionState {
        let mut screen_sharers: Vec<PeerId> = self.screen_sharers.iter().cloned().collect();
        screen_sharers.sort();

        SessionState {
            session_id: self.session_id.clone(),
            call_state: self.state_machine.state(),
            roster: RosterSnapshot::clone(&self.roster_tx.borrow()),
            pending: self.roster.pending_counts(),
            known_peers: self.peers.len(),
            render_targets_active: self.registry.len(),
            presented_share: self.presented_share.clone(),
            screen_sharers,
            local_media: self.local_media,
            capabilities: self.capabilities,
            viewport: self.viewport,
            recent_speakers: self.recent_speakers.to_vec(),
            batch_timer_armed: self.batch_timer.is_armed(),
            reconnect_timer_armed: self.reconnect_timer.is_armed(),
            mailbox_depth: self.receiver.len(),
        }
    }

    /// Release external resources when the task stops.
    fn shutdown(&mut self) {
        self.batch_timer.cancel();
        self.reconnect_timer.cancel();
        self.detach_presented();
        let released = self.registry.release_all();

        info!(
            target: "call.actor.orchestrator",
            session_id = %self.session_id,
            released,
            messages_processed = self.mailbox.messages_processed(),
            "CallOrchestrator stopped"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::render::{RenderError, RenderSurface};
    use common::types::RenderTargetHandle;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Minimal collaborator that logs every outbound call.
    #[derive(Default)]
    struct Recorder {
        next_handle: AtomicU64,
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn log(&self, entry: String) {
            self.calls.lock().unwrap().push(entry);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RenderSurface for Recorder {
        fn acquire_render_target(
            &self,
            _peer: &PeerIdentifier,
        ) -> Result<RenderTargetHandle, RenderError> {
            Ok(RenderTargetHandle(
                self.next_handle.fetch_add(1, Ordering::Relaxed) + 1,
            ))
        }
        fn release_render_target(&self, handle: RenderTargetHandle) {
            self.log(format!("release:{}", handle.0));
        }
        fn assign_stream(&self, _handle: RenderTargetHandle, _stream: StreamHandle) {}
        fn attach_presentation(&self, handle: RenderTargetHandle) {
            self.log(format!("attach:{}", handle.0));
        }
        fn detach_presentation(&self, handle: RenderTargetHandle) {
            self.log(format!("detach:{}", handle.0));
        }
    }

    impl SignalingLink for Recorder {
        fn send_data_channel(&self, text: &str) {
            self.log(format!("data:{text}"));
        }
        fn leave(&self, for_all: bool) {
            self.log(format!("leave:{for_all}"));
        }
        fn switch_room(&self, _room_token: &SecretString) {
            self.log("switch_room".to_string());
        }
    }

    impl LocalMedia for Recorder {
        fn set_audio_enabled(&self, enabled: bool) {
            self.log(format!("audio:{enabled}"));
        }
        fn set_video_enabled(&self, enabled: bool) {
            self.log(format!("video:{enabled}"));
        }
        fn set_screen_share(&self, enabled: bool) {
            self.log(format!("screen:{enabled}"));
        }
        fn stop_capture(&self) {
            self.log("stop_capture".to_string());
        }
    }

    fn spawn_with(capabilities: Capabilities) -> (CallOrchestratorHandle, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let collaborators = Collaborators {
            surface: recorder.clone(),
            signaling: recorder.clone(),
            media: recorder.clone(),
        };
        let config = Config {
            session_id: SessionId("call-unit".to_string()),
            ..Config::default()
        };
        let (handle, _task) = CallOrchestrator::spawn(
            config,
            collaborators,
            capabilities,
            CancellationToken::new(),
        );
        (handle, recorder)
    }

    fn video(name: &str) -> PeerDescriptor {
        PeerDescriptor {
            peer_identifier: PeerIdentifier::new(format!("{name}-cam")),
            peer_id: PeerId::from(name),
            leg_kind: LegKind::Video,
            display_name: None,
        }
    }

    fn cam(name: &str) -> PeerIdentifier {
        PeerIdentifier::new(format!("{name}-cam"))
    }

    #[tokio::test]
    async fn test_orchestrator_spawn_and_cancel() {
        let (handle, _recorder) = spawn_with(Capabilities::all());

        assert_eq!(handle.session_id().0, "call-unit");
        assert_eq!(handle.call_state(), CallState::Joining);
        assert!(!handle.is_cancelled());

        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_first_peer_visible_and_call_goes_live() {
        let (handle, _recorder) = spawn_with(Capabilities::all());

        handle.on_joined().await.unwrap();
        handle.on_peer_joined(video("alice")).await.unwrap();

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.call_state, CallState::InCall);
        assert_eq!(state.roster.peers.len(), 1);
        assert!(!state.batch_timer_armed);
        assert_eq!(handle.roster_snapshot().peers.len(), 1);
        assert_eq!(handle.call_state(), CallState::InCall);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_trickle_does_not_postpone_flush() {
        let (handle, _recorder) = spawn_with(Capabilities::all());
        handle.on_joined().await.unwrap();
        handle.on_peer_joined(video("alice")).await.unwrap();

        handle.on_peer_joined(video("bob")).await.unwrap();
        tokio::time::advance(Duration::from_millis(300)).await;
        handle.on_peer_joined(video("carol")).await.unwrap();

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.roster.peers.len(), 1);
        assert_eq!(state.pending.inserts, 2);

        tokio::time::advance(Duration::from_millis(250)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.roster.peers.len(), 3);
        assert!(state.pending.is_empty());
        assert_eq!(handle.metrics().snapshot().roster_flushes, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_command_requires_capability() {
        let caps = Capabilities {
            publish_audio: false,
            ..Capabilities::all()
        };
        let (handle, recorder) = spawn_with(caps);

        let result = handle.set_audio_enabled(true).await;
        assert_eq!(
            result,
            Err(CallError::NotPermitted(crate::actors::Capability::PublishAudio))
        );
        assert!(recorder.calls().is_empty());

        handle.set_video_enabled(true).await.unwrap();
        assert_eq!(
            recorder.calls(),
            vec!["video:true".to_string(), r#"data:{"type":"videoOn"}"#.to_string()]
        );

        handle.cancel();
    }

    #[tokio::test]
    async fn test_hang_up_then_commands_not_available() {
        let (handle, recorder) = spawn_with(Capabilities::all());
        handle.on_joined().await.unwrap();

        handle.hang_up(false).await.unwrap();
        assert_eq!(
            handle.call_state(),
            CallState::Ended {
                reason: EndReason::HungUp
            }
        );
        assert!(recorder.calls().contains(&"leave:false".to_string()));

        let before = recorder.calls().len();
        assert!(matches!(
            handle.hang_up(true).await,
            Err(CallError::NotAvailable(_))
        ));
        assert!(matches!(
            handle.set_hand_raised(true).await,
            Err(CallError::NotAvailable(_))
        ));
        assert_eq!(recorder.calls().len(), before);

        // Late signaling is dropped.
        handle.on_peer_joined(video("late")).await.unwrap();
        let state = handle.get_state().await.unwrap();
        assert!(state.roster.peers.is_empty());
        assert_eq!(state.known_peers, 0);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_data_channel_updates_row() {
        let (handle, recorder) = spawn_with(Capabilities::all());
        handle.on_joined().await.unwrap();
        handle.on_peer_joined(video("alice")).await.unwrap();
        let mut events = handle.subscribe();

        handle
            .on_data_channel_message(cam("alice"), "audioOff")
            .await
            .unwrap();
        handle
            .on_data_channel_message(
                cam("alice"),
                r#"{"type":"nickChanged","payload":{"name":"Alice"}}"#,
            )
            .await
            .unwrap();
        handle
            .on_data_channel_message(cam("alice"), "moonwalk")
            .await
            .unwrap();

        let state = handle.get_state().await.unwrap();
        let alice = state.roster.peers.first().unwrap();
        assert!(alice.audio_disabled);
        assert_eq!(alice.display_name, "Alice");
        assert_eq!(handle.metrics().snapshot().events_dropped, 1);

        let mut refreshed = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, PresentationEvent::PeerRefreshed { index: 0, .. }) {
                refreshed += 1;
            }
        }
        assert_eq!(refreshed, 2);
        assert!(recorder.calls().is_empty());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_cancel_releases_render_targets() {
        let (handle, recorder) = spawn_with(Capabilities::all());
        handle.on_peer_joined(video("alice")).await.unwrap();
        handle
            .on_remote_stream_added(cam("alice"), LegKind::Video, StreamHandle(1))
            .await
            .unwrap();
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.render_targets_active, 1);

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(recorder.calls(), vec!["release:1".to_string()]);
    }
}
