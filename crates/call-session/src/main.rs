//! Call Session replay runner
//!
//! Drives one `CallOrchestrator` from a JSON-lines script and prints the
//! final session state as JSON.
//!
//! ```text
//! call-session --script scenario.jsonl
//! ```
//!
//! # Startup Flow
//!
//! 1. Initialize tracing (`RUST_LOG`, `CALL_LOG_FORMAT=json` for JSON output)
//! 2. Load configuration from environment
//! 3. Initialize Prometheus metrics recorder
//! 4. Spawn the orchestrator with logging collaborators
//! 5. Replay the script, then print state and rendered metrics

#![warn(clippy::pedantic)]

use anyhow::{bail, Context};
use call_session::actors::{CallOrchestrator, Capabilities};
use call_session::config::Config;
use call_session::observability::init_metrics_recorder;
use call_session::replay::{parse_script, run_script, spawn_event_logger, LoggingCollaborators};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let script_path = script_path_from_args(std::env::args().skip(1))?;

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        session_id = %config.session_id,
        batch_window_ms = config.batch_window.as_millis(),
        reconnect_timeout_seconds = config.reconnect_timeout.as_secs(),
        visible_tiles = config.visible_tiles,
        mailbox_capacity = config.mailbox_capacity,
        "Configuration loaded successfully"
    );

    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        anyhow::Error::msg(e)
    })?;

    let text = tokio::fs::read_to_string(&script_path)
        .await
        .with_context(|| format!("Failed to read script {}", script_path.display()))?;
    let steps = parse_script(&text)?;
    info!(path = %script_path.display(), steps = steps.len(), "Script loaded");

    let shutdown_token = CancellationToken::new();
    let (handle, task) = CallOrchestrator::spawn(
        config,
        LoggingCollaborators::collaborators(),
        Capabilities::all(),
        shutdown_token.child_token(),
    );
    let logger = spawn_event_logger(&handle, shutdown_token.child_token());

    let report = run_script(&handle, steps).await?;
    let state = handle.get_state().await?;

    println!("{}", serde_json::to_string_pretty(&state)?);
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("{}", prometheus_handle.render());

    shutdown_token.cancel();
    task.await.context("Orchestrator task failed")?;
    logger.await.context("Event logger task failed")?;

    info!("Call session replay complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "call_session=debug".into());
    let json = std::env::var("CALL_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn script_path_from_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<PathBuf> {
    match (args.next().as_deref(), args.next()) {
        (Some("--script"), Some(path)) => Ok(PathBuf::from(path)),
        _ => bail!("usage: call-session --script <file.jsonl>"),
    }
}
