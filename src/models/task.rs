//! Per-session task record and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Lifecycle status for a session's task slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// No run in flight; the session will execute the next prompt directly.
    Idle,
    /// A run is currently consuming the backend stream.
    Running,
    /// The last run observed the backend's success marker.
    Completed,
    /// The last run ended in a structured error marker or a stream fault.
    Error,
    /// The last run was cancelled by the user; the queue is paused.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (no run in flight).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}

/// Execution-state record for one session.
///
/// One logical slot per session: created lazily on first access and never
/// deleted, only transitioned. The cancellation handle is present exactly
/// while the status is [`TaskStatus::Running`].
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// Session this record belongs to.
    pub session_id: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Cooperative cancellation handle for the in-flight run.
    pub cancel: Option<CancellationToken>,
    /// Timestamp of the transition into `Running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent streamed event.
    pub last_event_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Construct a fresh idle record for `session_id`.
    #[must_use]
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            status: TaskStatus::Idle,
            cancel: None,
            started_at: None,
            last_event_at: None,
        }
    }
}
