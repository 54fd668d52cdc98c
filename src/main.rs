#![forbid(unsafe_code)]

//! `session-conductor` — session task execution daemon.
//!
//! Bootstraps configuration, wires the task registry, queue store,
//! watcher hub, and execution engine together, and serves the IPC
//! observer surface until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use session_conductor::backend::process::ProcessBackend;
use session_conductor::config::GlobalConfig;
use session_conductor::hub::WatcherHub;
use session_conductor::ipc::{server, Services};
use session_conductor::orchestrator::{ExecutionEngine, QueueStore, TaskRegistry};
use session_conductor::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "session-conductor", about = "Session task execution daemon", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("session-conductor bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config_text = std::fs::read_to_string(&args.config)
        .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
    let config = GlobalConfig::from_toml_str(&config_text)?;
    info!("configuration loaded");

    // ── Build shared services ───────────────────────────
    let registry = Arc::new(TaskRegistry::new());
    let queue = Arc::new(QueueStore::new());
    let hub = Arc::new(WatcherHub::new());
    let backend = Arc::new(ProcessBackend::new(config.backend.clone()));
    let engine = Arc::new(ExecutionEngine::new(
        Arc::clone(&registry),
        Arc::clone(&queue),
        Arc::clone(&hub),
        backend,
    ));

    let services = Arc::new(Services {
        registry,
        queue,
        hub,
        engine,
    });

    // ── Start IPC server ────────────────────────────────
    let ct = CancellationToken::new();
    let ipc_handle = server::spawn_ipc_server(services, config.ipc_name.clone(), ct.clone())?;

    // ── Wait for shutdown signal ────────────────────────
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::Io(format!("failed to listen for ctrl-c: {err}")))?;
    info!("shutdown signal received");

    ct.cancel();
    let _ = ipc_handle.await;
    info!("session-conductor stopped");
    Ok(())
}

/// Initialise the tracing subscriber with the requested output format.
fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|err| AppError::Config(format!("failed to initialise tracing: {err}")))
}
