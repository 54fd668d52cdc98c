//! Abstract AI backend consumed by the execution engine.
//!
//! The engine treats a run purely as a typed event stream with five
//! shapes: content deltas, tool invocations, tool results, a definitive
//! success marker, and a definitive error marker. Faults thrown by the
//! stream itself arrive as `Err` items (or as an unexpected channel
//! close) and are handled identically to the error marker.

pub mod codec;
pub mod process;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::queue::PromptOptions;
use crate::Result;

/// One typed event produced by a backend run.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
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
        input: Value,
    },
    /// Tool result.
    ToolResult {
        /// Tool name.
        name: String,
        /// Tool output payload.
        output: Value,
    },
    /// Definitive success marker carrying summary metadata.
    Completed {
        /// Optional run summary supplied by the backend.
        summary: Option<String>,
    },
    /// Definitive error marker with a user-facing message.
    Failed {
        /// Backend-authored failure message, safe to show observers.
        message: String,
    },
}

/// Per-run event stream handed to the execution engine.
///
/// `Err` items are stream faults; the channel closing before a terminal
/// marker is also a fault.
pub type EventStream = mpsc::Receiver<Result<BackendEvent>>;

/// Abstract streaming event source for one run of a prompt.
///
/// Implementations own the backend connection for the duration of the
/// run. The cancellation token is signalled when the user cancels; the
/// implementation should stop producing and release its resources, though
/// the engine does not depend on it doing so promptly.
pub trait AgentBackend: Send + Sync {
    /// Start one run and return its event stream.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`](crate::AppError::Backend) when the run
    /// cannot be started at all (e.g. process spawn failure). Failures after
    /// a successful start arrive through the stream instead.
    fn start_run(
        &self,
        session_id: &str,
        prompt: &str,
        options: &PromptOptions,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream>> + Send + '_>>;
}
