//! Per-session FIFO backlog of pending prompts.
//!
//! Ordering is strict arrival order; there is no priority or reordering.
//! Validation happens before any item is created: empty prompts and
//! enqueues past the per-session cap are rejected synchronously.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::debug;

use crate::models::queue::{PromptOptions, QueuedPrompt};
use crate::{AppError, Result};

/// Maximum number of queued prompts per session.
pub const MAX_QUEUED_PROMPTS: usize = 50;

/// Process-wide store of per-session prompt backlogs.
#[derive(Debug, Default)]
pub struct QueueStore {
    queues: Mutex<HashMap<String, VecDeque<QueuedPrompt>>>,
}

impl QueueStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a prompt to the session's backlog.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] when `prompt` is empty or whitespace-only.
    /// - [`AppError::QueueFull`] when the backlog already holds
    ///   [`MAX_QUEUED_PROMPTS`] items.
    ///
    /// Both rejections happen before the item is created.
    pub fn enqueue(
        &self,
        session_id: &str,
        prompt: &str,
        options: PromptOptions,
    ) -> Result<QueuedPrompt> {
        if prompt.trim().is_empty() {
            return Err(AppError::Validation("prompt must not be empty".into()));
        }

        let Ok(mut queues) = self.queues.lock() else {
            return Err(AppError::Io("queue store lock poisoned".into()));
        };
        let queue = queues.entry(session_id.to_owned()).or_default();

        if queue.len() >= MAX_QUEUED_PROMPTS {
            return Err(AppError::QueueFull(format!(
                "session {session_id} already holds {MAX_QUEUED_PROMPTS} queued prompts"
            )));
        }

        let item = QueuedPrompt::new(prompt.to_owned(), options);
        queue.push_back(item.clone());
        debug!(session_id, item_id = %item.id, size = queue.len(), "prompt enqueued");
        Ok(item)
    }

    /// Pop and return the oldest queued prompt, or `None` when empty.
    ///
    /// This is the only way items leave the queue through normal
    /// processing.
    #[must_use]
    pub fn dequeue(&self, session_id: &str) -> Option<QueuedPrompt> {
        let Ok(mut queues) = self.queues.lock() else {
            return None;
        };
        let item = queues.get_mut(session_id).and_then(VecDeque::pop_front);
        if let Some(ref item) = item {
            debug!(session_id, item_id = %item.id, "prompt dequeued");
        }
        item
    }

    /// Put an already-dequeued item back at the head of the backlog.
    ///
    /// Used when the engine dequeues an item but loses the start race to a
    /// direct submission; the item keeps its original id and timestamp and
    /// stays first in line.
    pub fn requeue_front(&self, session_id: &str, item: QueuedPrompt) {
        if let Ok(mut queues) = self.queues.lock() {
            queues
                .entry(session_id.to_owned())
                .or_default()
                .push_front(item);
        }
    }

    /// Delete a specific queued prompt by id. Returns whether it existed.
    #[must_use]
    pub fn delete(&self, session_id: &str, item_id: &str) -> bool {
        let Ok(mut queues) = self.queues.lock() else {
            return false;
        };
        let Some(queue) = queues.get_mut(session_id) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|item| item.id != item_id);
        let removed = queue.len() < before;
        if removed {
            debug!(session_id, item_id, "queued prompt deleted");
        }
        removed
    }

    /// Drop every queued prompt for the session.
    pub fn clear(&self, session_id: &str) {
        if let Ok(mut queues) = self.queues.lock() {
            queues.remove(session_id);
            debug!(session_id, "queue cleared");
        }
    }

    /// Ordered read-only snapshot of the session's backlog.
    #[must_use]
    pub fn list(&self, session_id: &str) -> Vec<QueuedPrompt> {
        self.queues.lock().map_or_else(
            |_| Vec::new(),
            |queues| {
                queues
                    .get(session_id)
                    .map(|queue| queue.iter().cloned().collect())
                    .unwrap_or_default()
            },
        )
    }

    /// Current backlog length for the session.
    #[must_use]
    pub fn len(&self, session_id: &str) -> usize {
        self.queues
            .lock()
            .map_or(0, |queues| queues.get(session_id).map_or(0, VecDeque::len))
    }

    /// Whether the session's backlog is empty.
    #[must_use]
    pub fn is_empty(&self, session_id: &str) -> bool {
        self.len(session_id) == 0
    }
}
