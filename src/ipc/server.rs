//! Local IPC server for observer connections and `session-conductor-ctl`.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Each connection speaks line-delimited
//! JSON in both directions: commands inbound, command responses and
//! pushed session events outbound. A connection is one watcher-hub
//! connection; closing it detaches it from whatever session it watched.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "watch", "session_id": "s1"}
//! {"command": "prompt", "session_id": "s1", "prompt": "fix the tests"}
//! {"command": "cancel", "session_id": "s1"}
//! {"command": "queue_list", "session_id": "s1"}
//! {"command": "queue_delete", "session_id": "s1", "item_id": "…"}
//! {"command": "queue_clear", "session_id": "s1"}
//! {"command": "status", "session_id": "s1"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { … } }
//! {"ok": false, "error": "queue full: …"}
//! ```
//!
//! Pushed events are [`SessionEvent`] objects tagged with `"event"`.

use std::sync::Arc;

use futures_util::StreamExt;
use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::backend::codec::EventCodec;
use crate::hub::ConnectionId;
use crate::ipc::Services;
use crate::models::event::SessionEvent;
use crate::models::queue::PromptOptions;
use crate::orchestrator::reaper;
use crate::{AppError, Result};

/// Inbound IPC request.
#[derive(Debug, Deserialize)]
struct IpcRequest {
    /// Command verb.
    command: String,
    /// Target session (required by every command).
    session_id: Option<String>,
    /// Prompt text (for `prompt`).
    prompt: Option<String>,
    /// Execution options (for `prompt`).
    #[serde(default)]
    options: PromptOptions,
    /// Queued item identifier (for `queue_delete`).
    item_id: Option<String>,
}

/// Outbound IPC response.
#[derive(Debug, Serialize)]
struct IpcResponse {
    /// Whether the command succeeded.
    ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns [`AppError::Ipc`] if the listener cannot be created.
pub fn spawn_ipc_server(
    services: Arc<Services>,
    ipc_name: String,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener_name = ipc_name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{ipc_name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %ipc_name, "IPC server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", name = %ipc_name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let services = Arc::clone(&services);
                                tokio::spawn(handle_connection(stream, services));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Handle a single IPC client connection.
///
/// The connection is registered with the watcher hub on arrival so that
/// pushed events and command responses interleave on the same stream,
/// and deregistered (implicitly unwatching) when it closes.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    services: Arc<Services>,
) {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let connection = services.hub.register(event_tx);

    let span = info_span!("ipc_conn", connection_id = %connection);
    async move {
        let (reader, mut writer) = stream.split();
        let mut framed = FramedRead::new(reader, EventCodec::new());

        loop {
            tokio::select! {
                maybe_event = event_rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    let Ok(mut line) = serde_json::to_string(&event) else { continue };
                    line.push('\n');
                    if let Err(err) = writer.write_all(line.as_bytes()).await {
                        warn!(%err, "failed to push event");
                        break;
                    }
                }

                item = framed.next() => {
                    match item {
                        None => break, // EOF
                        Some(Err(err)) => {
                            warn!(%err, "ipc read error");
                            break;
                        }
                        Some(Ok(line)) => {
                            let trimmed = line.trim();
                            if trimmed.is_empty() {
                                continue;
                            }

                            let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                                Ok(request) => dispatch_command(&request, &services, connection),
                                Err(err) => IpcResponse::error(format!("invalid json: {err}")),
                            };

                            let mut response_line = serde_json::to_string(&response)
                                .unwrap_or_else(|_| {
                                    r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                                });
                            response_line.push('\n');

                            if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                                warn!(%err, "failed to write ipc response");
                                break;
                            }
                        }
                    }
                }
            }
        }

        services.hub.deregister(connection);
        info!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Route an IPC command to the appropriate handler.
fn dispatch_command(
    request: &IpcRequest,
    services: &Arc<Services>,
    connection: ConnectionId,
) -> IpcResponse {
    let span = info_span!("ipc_command", command = %request.command);
    let _guard = span.enter();

    let Some(ref session_id) = request.session_id else {
        return IpcResponse::error("missing required 'session_id' field");
    };

    match request.command.as_str() {
        "watch" => handle_watch(session_id, services, connection),
        "unwatch" => {
            services.hub.unwatch(session_id, connection);
            IpcResponse::success(serde_json::json!({ "session_id": session_id }))
        }
        "prompt" => handle_prompt(request, session_id, services, connection),
        "cancel" => {
            if services.engine.cancel(session_id) {
                IpcResponse::success(serde_json::json!({ "session_id": session_id, "cancelled": true }))
            } else {
                IpcResponse::error(format!("no running task for session {session_id}"))
            }
        }
        "queue_list" => {
            let queue = services.queue.list(session_id);
            let size = queue.len();
            IpcResponse::success(serde_json::json!({ "queue": queue, "size": size }))
        }
        "queue_delete" => handle_queue_delete(request, session_id, services),
        "queue_clear" => {
            services.queue.clear(session_id);
            broadcast_queue(services, session_id);
            IpcResponse::success(serde_json::json!({ "session_id": session_id, "size": 0 }))
        }
        "status" => handle_status(session_id, services),
        other => IpcResponse::error(format!("unknown command: {other}")),
    }
}

/// Attach the connection to a session and return a state snapshot.
///
/// Watching counts as session access, so the stale-task reaper runs here
/// — after attaching, so the new watcher also receives the corrective
/// broadcast when a repair happens.
fn handle_watch(
    session_id: &str,
    services: &Arc<Services>,
    connection: ConnectionId,
) -> IpcResponse {
    services.hub.watch(session_id, connection);
    let _ = reaper::repair_if_stale(&services.registry, &services.hub, session_id);

    let record = services.registry.get_or_create(session_id);
    let queue = services.queue.list(session_id);
    IpcResponse::success(serde_json::json!({
        "session_id": session_id,
        "status": record.status,
        "queue": queue,
        "size": queue.len(),
    }))
}

/// Submit a prompt on behalf of this connection.
fn handle_prompt(
    request: &IpcRequest,
    session_id: &str,
    services: &Arc<Services>,
    connection: ConnectionId,
) -> IpcResponse {
    let Some(ref prompt) = request.prompt else {
        return IpcResponse::error("missing required 'prompt' field");
    };

    match services
        .engine
        .submit(session_id, prompt, request.options.clone(), Some(connection))
    {
        Ok(()) => IpcResponse::success(serde_json::json!({ "session_id": session_id })),
        Err(err) => IpcResponse::error(err.to_string()),
    }
}

/// Delete one queued prompt and broadcast the updated backlog.
fn handle_queue_delete(
    request: &IpcRequest,
    session_id: &str,
    services: &Arc<Services>,
) -> IpcResponse {
    let Some(ref item_id) = request.item_id else {
        return IpcResponse::error("missing required 'item_id' field");
    };

    if services.queue.delete(session_id, item_id) {
        broadcast_queue(services, session_id);
        IpcResponse::success(serde_json::json!({ "session_id": session_id, "item_id": item_id }))
    } else {
        let err = AppError::NotFound(format!("no queued item {item_id} for session {session_id}"));
        IpcResponse::error(err.to_string())
    }
}

/// Report the session's task state; also counts as session access for
/// the stale-task reaper.
fn handle_status(session_id: &str, services: &Arc<Services>) -> IpcResponse {
    let _ = reaper::repair_if_stale(&services.registry, &services.hub, session_id);

    let record = services.registry.get_or_create(session_id);
    IpcResponse::success(serde_json::json!({
        "session_id": session_id,
        "status": record.status,
        "started_at": record.started_at,
        "last_event_at": record.last_event_at,
        "queue_size": services.queue.len(session_id),
    }))
}

/// Broadcast a `queue_updated` snapshot for queue management commands.
fn broadcast_queue(services: &Arc<Services>, session_id: &str) {
    let queue = services.queue.list(session_id);
    let size = queue.len();
    services.hub.broadcast(
        session_id,
        &SessionEvent::QueueUpdated {
            session_id: session_id.to_owned(),
            queue,
            size,
        },
        None,
    );
}
