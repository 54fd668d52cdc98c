//! Wire events pushed to session watchers.
//!
//! Every event carries the `session_id` it belongs to; watchers receive
//! them as NDJSON lines over the IPC surface. The `event` tag plus
//! snake_case payloads form the observer-facing contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::queue::QueuedPrompt;
use crate::models::task::TaskStatus;

/// Event broadcast to watchers of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Task status transition (emitted on every transition).
    TaskStatus {
        /// Session whose task transitioned.
        session_id: String,
        /// New status.
        status: TaskStatus,
    },
    /// Streamed content delta from the backend, verbatim.
    Content {
        /// Session the content belongs to.
        session_id: String,
        /// Content fragment text.
        text: String,
    },
    /// Tool invocation observed in the backend stream.
    ToolCall {
        /// Session the invocation belongs to.
        session_id: String,
        /// Tool name.
        name: String,
        /// Tool input payload, verbatim.
        input: Value,
    },
    /// Tool result observed in the backend stream.
    ToolResult {
        /// Session the result belongs to.
        session_id: String,
        /// Tool name.
        name: String,
        /// Tool output payload, verbatim.
        output: Value,
    },
    /// Queue contents changed (enqueue, dequeue, delete, or clear).
    QueueUpdated {
        /// Session whose queue changed.
        session_id: String,
        /// Ordered snapshot of the remaining backlog.
        queue: Vec<QueuedPrompt>,
        /// Backlog length after the change.
        size: usize,
    },
    /// Watcher count for the session crossed the 1 ↔ ≥2 boundary.
    SessionShared {
        /// Session whose watcher count changed.
        session_id: String,
        /// Whether the session now has more than one watcher.
        is_shared: bool,
    },
    /// Sanitized run failure notice; never carries internal fault detail.
    Error {
        /// Session whose run failed.
        session_id: String,
        /// User-facing failure message.
        message: String,
    },
}

impl SessionEvent {
    /// The session this event is addressed to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::TaskStatus { session_id, .. }
            | Self::Content { session_id, .. }
            | Self::ToolCall { session_id, .. }
            | Self::ToolResult { session_id, .. }
            | Self::QueueUpdated { session_id, .. }
            | Self::SessionShared { session_id, .. }
            | Self::Error { session_id, .. } => session_id,
        }
    }
}
