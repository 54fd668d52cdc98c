//! Queued prompt payloads awaiting an idle session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque execution options forwarded verbatim to the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PromptOptions {
    /// Model selector, if the submitter pinned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Permission mode selector, if the submitter pinned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
}

/// One pending prompt in a session's backlog.
///
/// Created on enqueue (id and timestamp assigned there), destroyed on
/// dequeue, explicit delete, or explicit clear.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QueuedPrompt {
    /// Unique identifier assigned at enqueue time.
    pub id: String,
    /// Prompt text; guaranteed non-empty after trimming.
    pub prompt: String,
    /// Execution options captured at submission.
    pub options: PromptOptions,
    /// Enqueue timestamp; queue order is strict FIFO by this time.
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedPrompt {
    /// Construct a new queued prompt with a generated id and current timestamp.
    #[must_use]
    pub fn new(prompt: String, options: PromptOptions) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt,
            options,
            enqueued_at: Utc::now(),
        }
    }
}
