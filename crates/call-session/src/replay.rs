//! JSON-lines scenario replay.
//!
//! Each non-empty line of a script is one step:
//!
//! ```text
//! {"signal": {"event": "joined"}}
//! {"signal": {"event": "peer_joined", "peer_identifier": "a-cam", "peer_id": "a", "leg_kind": "video"}}
//! {"sleep_ms": 600}
//! {"command": {"command": "set_audio_enabled", "enabled": true}}
//! {"viewport": {"first": 0, "count": 4}}
//! ```
//!
//! Lines starting with `#` are comments. Collaborators used for replay only
//! log what the orchestrator asks of them.

use crate::actors::{
    Capabilities, CallOrchestratorHandle, Command, PresentationEvent, SignalingEvent,
};
use crate::collaborators::{Collaborators, LocalMedia, SignalingLink};
use crate::errors::CallError;
use crate::render::{RenderError, RenderSurface};
use crate::roster::Viewport;
use common::secret::SecretString;
use common::types::{PeerIdentifier, RenderTargetHandle, StreamHandle};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One line of a replay script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStep {
    Signal(SignalingEvent),
    Command(Command),
    SleepMs(u64),
    Viewport(Viewport),
    Capabilities(Capabilities),
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Script line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Call(#[from] CallError),
}

/// Result of one replayed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub command: &'static str,
    pub result: &'static str,
}

/// Summary of a replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub steps: usize,
    pub commands: Vec<CommandOutcome>,
}

/// Parse a JSON-lines script.
///
/// # Errors
///
/// Returns `ReplayError::Parse` with the 1-based line number of the first
/// malformed step.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, ReplayError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| ReplayError::Parse {
                line: i + 1,
                source,
            })
        })
        .collect()
}

/// Feed `steps` to the orchestrator in order.
///
/// Rejected commands are recorded in the report and do not stop the run.
///
/// # Errors
///
/// Returns `ReplayError::Call` when the orchestrator is no longer reachable.
pub async fn run_script(
    handle: &CallOrchestratorHandle,
    steps: Vec<ScriptStep>,
) -> Result<ReplayReport, ReplayError> {
    let mut report = ReplayReport::default();

    for step in steps {
        report.steps += 1;
        match step {
            ScriptStep::Signal(event) => {
                debug!(target: "call.replay", event = event.as_str(), "Replaying signaling event");
                handle.signal(event).await?;
            }
            ScriptStep::Command(command) => {
                let name = command.as_str();
                let result = match handle.execute(command).await {
                    Ok(()) => "ok",
                    Err(CallError::Internal(e)) => return Err(CallError::Internal(e).into()),
                    Err(e) => {
                        warn!(target: "call.replay", command = name, error = %e, "Command rejected");
                        e.result_code()
                    }
                };
                report.commands.push(CommandOutcome {
                    command: name,
                    result,
                });
            }
            ScriptStep::SleepMs(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            ScriptStep::Viewport(viewport) => handle.update_viewport(viewport).await?,
            ScriptStep::Capabilities(capabilities) => {
                handle.update_capabilities(capabilities).await?;
            }
        }
    }

    info!(
        target: "call.replay",
        steps = report.steps,
        commands = report.commands.len(),
        "Script finished"
    );
    Ok(report)
}

/// Log every presentation event until `cancel_token` fires.
pub fn spawn_event_logger(
    handle: &CallOrchestratorHandle,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "call.replay", skipped, "Event logger lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}

fn log_event(event: &PresentationEvent) {
    match event {
        PresentationEvent::RosterSnapshotChanged(snapshot) => {
            let peers: Vec<&str> = snapshot
                .peers
                .iter()
                .map(|p| p.peer_identifier.as_str())
                .collect();
            info!(
                target: "call.replay",
                version = snapshot.version,
                peers = ?peers,
                "Roster snapshot"
            );
        }
        PresentationEvent::PeerRefreshed { index, peer } => {
            debug!(
                target: "call.replay",
                index,
                peer_identifier = %peer.peer_identifier,
                "Row refreshed"
            );
        }
        PresentationEvent::CallStateChanged(state) => {
            info!(target: "call.replay", state = state.as_str(), "Call state");
        }
        PresentationEvent::ScreenSharePresented(peer_id) => {
            info!(target: "call.replay", peer_id = ?peer_id, "Presented screen share");
        }
    }
}

/// Collaborators that log each call and always succeed.
#[derive(Debug, Default)]
pub struct LoggingCollaborators {
    next_handle: AtomicU64,
}

impl LoggingCollaborators {
    #[must_use]
    pub fn collaborators() -> Collaborators {
        let this = Arc::new(Self::default());
        Collaborators {
            surface: this.clone(),
            signaling: this.clone(),
            media: this,
        }
    }
}

impl RenderSurface for LoggingCollaborators {
    fn acquire_render_target(
        &self,
        peer: &PeerIdentifier,
    ) -> Result<RenderTargetHandle, RenderError> {
        let handle = RenderTargetHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        debug!(target: "call.replay", peer_identifier = %peer, handle = %handle, "acquire_render_target");
        Ok(handle)
    }

    fn release_render_target(&self, handle: RenderTargetHandle) {
        debug!(target: "call.replay", handle = %handle, "release_render_target");
    }

    fn assign_stream(&self, handle: RenderTargetHandle, stream: StreamHandle) {
        debug!(target: "call.replay", handle = %handle, stream = %stream, "assign_stream");
    }

    fn attach_presentation(&self, handle: RenderTargetHandle) {
        debug!(target: "call.replay", handle = %handle, "attach_presentation");
    }

    fn detach_presentation(&self, handle: RenderTargetHandle) {
        debug!(target: "call.replay", handle = %handle, "detach_presentation");
    }
}

impl SignalingLink for LoggingCollaborators {
    fn send_data_channel(&self, text: &str) {
        debug!(target: "call.replay", text, "send_data_channel");
    }

    fn leave(&self, for_all: bool) {
        info!(target: "call.replay", for_all, "leave");
    }

    fn switch_room(&self, _room_token: &SecretString) {
        info!(target: "call.replay", "switch_room");
    }
}

impl LocalMedia for LoggingCollaborators {
    fn set_audio_enabled(&self, enabled: bool) {
        debug!(target: "call.replay", enabled, "set_audio_enabled");
    }

    fn set_video_enabled(&self, enabled: bool) {
        debug!(target: "call.replay", enabled, "set_video_enabled");
    }

    fn set_screen_share(&self, enabled: bool) {
        debug!(target: "call.replay", enabled, "set_screen_share");
    }

    fn stop_capture(&self) {
        debug!(target: "call.replay", "stop_capture");
    }
}
