//! Process-spawning backend adapter.
//!
//! Runs each prompt by spawning the configured host CLI and parsing its
//! stdout as NDJSON backend events. The child is launched with
//! `kill_on_drop(true)` and `env_clear()` plus a safe variable allowlist
//! so server-side secrets never leak into the agent's environment.
//!
//! # Wire format
//!
//! One JSON object per stdout line, discriminated by `type`:
//!
//! | `type`        | Maps to                        |
//! |---------------|--------------------------------|
//! | `content`     | [`BackendEvent::Content`]      |
//! | `tool_call`   | [`BackendEvent::ToolCall`]     |
//! | `tool_result` | [`BackendEvent::ToolResult`]   |
//! | `completed`   | [`BackendEvent::Completed`]    |
//! | `failed`      | [`BackendEvent::Failed`]       |
//!
//! Malformed or unrecognised lines are logged and skipped; they do not
//! terminate the run.

use std::future::Future;
use std::pin::Pin;

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::codec::EventCodec;
use crate::backend::{AgentBackend, BackendEvent, EventStream};
use crate::config::BackendConfig;
use crate::models::queue::PromptOptions;
use crate::{AppError, Result};

/// Environment variables inherited by the spawned backend process.
///
/// Every other variable is stripped via `env_clear()` before launch.
const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Capacity of the per-run event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Inbound NDJSON message from the backend process.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    /// Content delta.
    Content {
        /// Fragment text.
        text: String,
    },
    /// Tool invocation.
    ToolCall {
        /// Tool name.
        name: String,
        /// Tool input payload.
        #[serde(default)]
        input: Value,
    },
    /// Tool result.
    ToolResult {
        /// Tool name.
        name: String,
        /// Tool output payload.
        #[serde(default)]
        output: Value,
    },
    /// Success marker.
    Completed {
        /// Optional run summary.
        #[serde(default)]
        summary: Option<String>,
    },
    /// Error marker.
    Failed {
        /// User-facing failure message.
        message: String,
    },
}

impl From<WireEvent> for BackendEvent {
    fn from(wire: WireEvent) -> Self {
        match wire {
            WireEvent::Content { text } => Self::Content { text },
            WireEvent::ToolCall { name, input } => Self::ToolCall { name, input },
            WireEvent::ToolResult { name, output } => Self::ToolResult { name, output },
            WireEvent::Completed { summary } => Self::Completed { summary },
            WireEvent::Failed { message } => Self::Failed { message },
        }
    }
}

/// [`AgentBackend`] implementation that spawns the configured host CLI
/// once per run.
#[derive(Debug)]
pub struct ProcessBackend {
    config: BackendConfig,
}

impl ProcessBackend {
    /// Construct a backend from its configuration.
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    /// Spawn the host CLI for one run and hand it the prompt on stdin.
    async fn spawn_run(
        &self,
        session_id: &str,
        prompt: &str,
        options: &PromptOptions,
    ) -> Result<tokio::process::Child> {
        let mut cmd = Command::new(&self.config.host_cli);

        for arg in &self.config.host_cli_args {
            cmd.arg(arg);
        }

        // Strip inherited environment, then inject only the safe allowlist.
        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }

        cmd.env("CONDUCTOR_SESSION_ID", session_id);
        if let Some(ref model) = options.model {
            cmd.env("CONDUCTOR_MODEL", model);
        }
        if let Some(ref mode) = options.permission_mode {
            cmd.env("CONDUCTOR_PERMISSION_MODE", mode);
        }

        cmd.current_dir(&self.config.workspace_root)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Backend(format!("failed to spawn backend: {err}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Backend("failed to capture backend stdin".into()))?;

        // The prompt travels as a single NDJSON line on stdin; closing the
        // handle afterwards signals the backend that no steering follows.
        let prompt_line = serde_json::to_string(&serde_json::json!({ "prompt": prompt }))
            .map_err(|err| AppError::Backend(format!("failed to encode prompt: {err}")))?;
        stdin
            .write_all(format!("{prompt_line}\n").as_bytes())
            .await
            .map_err(|err| AppError::Backend(format!("failed to send prompt: {err}")))?;
        drop(stdin);

        Ok(child)
    }
}

impl AgentBackend for ProcessBackend {
    fn start_run(
        &self,
        session_id: &str,
        prompt: &str,
        options: &PromptOptions,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream>> + Send + '_>> {
        let session_id = session_id.to_owned();
        let prompt = prompt.to_owned();
        let options = options.clone();

        Box::pin(async move {
            let mut child = self.spawn_run(&session_id, &prompt, &options).await?;

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| AppError::Backend("failed to capture backend stdout".into()))?;

            let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let startup_timeout = self.config.startup_timeout();

            tokio::spawn(async move {
                // Keep the child handle alive inside the reader task so
                // kill_on_drop fires when the run ends or is cancelled.
                let _child = child;
                let mut framed = FramedRead::new(stdout, EventCodec::new());
                let mut first_line = true;

                loop {
                    let item = tokio::select! {
                        biased;

                        () = cancel.cancelled() => {
                            debug!(session_id, "backend reader: cancellation received, stopping");
                            return;
                        }

                        item = next_line(&mut framed, first_line, startup_timeout) => item,
                    };
                    first_line = false;

                    match item {
                        LineOutcome::Eof => {
                            // Channel close without a terminal marker is the
                            // engine's fault signal; nothing more to send.
                            debug!(session_id, "backend reader: EOF");
                            return;
                        }
                        LineOutcome::StartupTimeout => {
                            let fault = AppError::Backend(format!(
                                "startup timeout: no output within {startup_timeout:?}"
                            ));
                            let _ = event_tx.send(Err(fault)).await;
                            return;
                        }
                        LineOutcome::Framing(msg) => {
                            // Oversized line; skip it and keep reading.
                            warn!(session_id, error = msg.as_str(), "backend reader: framing error, skipping");
                        }
                        LineOutcome::Fault(err) => {
                            warn!(session_id, error = %err, "backend reader: stream fault, stopping");
                            let _ = event_tx.send(Err(err)).await;
                            return;
                        }
                        LineOutcome::Line(line) => {
                            match serde_json::from_str::<WireEvent>(&line) {
                                Ok(wire) => {
                                    let event = BackendEvent::from(wire);
                                    let terminal = matches!(
                                        event,
                                        BackendEvent::Completed { .. } | BackendEvent::Failed { .. }
                                    );
                                    if event_tx.send(Ok(event)).await.is_err() {
                                        debug!(session_id, "backend reader: receiver dropped, stopping");
                                        return;
                                    }
                                    if terminal {
                                        debug!(session_id, "backend reader: terminal marker forwarded");
                                        return;
                                    }
                                }
                                Err(err) => {
                                    warn!(
                                        session_id,
                                        error = %err,
                                        raw_line = %line,
                                        "backend reader: unparseable line, skipping"
                                    );
                                }
                            }
                        }
                    }
                }
            });

            Ok(event_rx)
        })
    }
}

/// Outcome of reading one line from the backend's stdout.
enum LineOutcome {
    /// Complete line received.
    Line(String),
    /// Stream closed.
    Eof,
    /// No first line within the startup window.
    StartupTimeout,
    /// Recoverable framing error (line too long).
    Framing(String),
    /// Unrecoverable I/O fault.
    Fault(AppError),
}

/// Read the next framed line, applying the startup timeout to the first one.
async fn next_line<R>(
    framed: &mut FramedRead<R, EventCodec>,
    first_line: bool,
    startup_timeout: std::time::Duration,
) -> LineOutcome
where
    R: tokio::io::AsyncRead + Unpin,
{
    let item = if first_line {
        match tokio::time::timeout(startup_timeout, framed.next()).await {
            Ok(item) => item,
            Err(_elapsed) => return LineOutcome::StartupTimeout,
        }
    } else {
        framed.next().await
    };

    match item {
        None => LineOutcome::Eof,
        Some(Ok(line)) => LineOutcome::Line(line),
        Some(Err(AppError::Backend(msg))) => LineOutcome::Framing(msg),
        Some(Err(err)) => LineOutcome::Fault(err),
    }
}
