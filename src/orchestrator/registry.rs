//! Task registry: per-session execution state and cancellation handles.
//!
//! One lazily created, never-deleted [`TaskRecord`] per session. All
//! status mutation funnels through this registry, and the single-flight
//! invariant is enforced by [`TaskRegistry::begin_run`], which checks and
//! transitions under one lock so two submitters cannot interleave
//! between the check and the transition.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::task::{TaskRecord, TaskStatus};

/// Elapsed running time after which a task is considered stale: 30 minutes.
pub const STALE_AFTER_MINUTES: i64 = 30;

/// Process-wide registry of per-session task records.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskRecord>>,
}

impl TaskRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of the session's task record, creating an idle
    /// record if none exists. Never fails.
    #[must_use]
    pub fn get_or_create(&self, session_id: &str) -> TaskRecord {
        let Ok(mut tasks) = self.tasks.lock() else {
            return TaskRecord::new(session_id.to_owned());
        };
        tasks
            .entry(session_id.to_owned())
            .or_insert_with(|| TaskRecord::new(session_id.to_owned()))
            .clone()
    }

    /// Transition the session's task to `status`.
    ///
    /// For [`TaskStatus::Running`] the cancellation `handle` is stored and
    /// `started_at` is stamped; for every other status the stored handle is
    /// cleared. This is the only mutator of task status.
    pub fn transition(&self, session_id: &str, status: TaskStatus, handle: Option<CancellationToken>) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        let record = tasks
            .entry(session_id.to_owned())
            .or_insert_with(|| TaskRecord::new(session_id.to_owned()));

        record.status = status;
        if status == TaskStatus::Running {
            record.cancel = handle;
            record.started_at = Some(Utc::now());
        } else {
            record.cancel = None;
        }
        debug!(session_id, ?status, "task transition");
    }

    /// Atomically start a run: returns `false` without mutating anything
    /// when the session already has a running task, otherwise transitions
    /// to [`TaskStatus::Running`] with `handle` stored.
    #[must_use]
    pub fn begin_run(&self, session_id: &str, handle: CancellationToken) -> bool {
        let Ok(mut tasks) = self.tasks.lock() else {
            return false;
        };
        let record = tasks
            .entry(session_id.to_owned())
            .or_insert_with(|| TaskRecord::new(session_id.to_owned()));

        if record.status == TaskStatus::Running {
            return false;
        }

        record.status = TaskStatus::Running;
        record.cancel = Some(handle);
        record.started_at = Some(Utc::now());
        debug!(session_id, "run started");
        true
    }

    /// Whether the session currently has a running task.
    #[must_use]
    pub fn is_running(&self, session_id: &str) -> bool {
        self.tasks.lock().map_or(false, |tasks| {
            tasks
                .get(session_id)
                .is_some_and(|record| record.status == TaskStatus::Running)
        })
    }

    /// Cancel the session's running task.
    ///
    /// Invokes the stored cancellation handle and transitions to
    /// [`TaskStatus::Cancelled`]. Returns `false` when nothing was running.
    #[must_use]
    pub fn cancel(&self, session_id: &str) -> bool {
        let Ok(mut tasks) = self.tasks.lock() else {
            return false;
        };
        let Some(record) = tasks.get_mut(session_id) else {
            return false;
        };
        if record.status != TaskStatus::Running {
            return false;
        }

        if let Some(handle) = record.cancel.take() {
            handle.cancel();
        }
        record.status = TaskStatus::Cancelled;
        debug!(session_id, "run cancelled");
        true
    }

    /// Stamp `last_event_at` on the session's record.
    pub fn touch(&self, session_id: &str) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(record) = tasks.get_mut(session_id) {
                record.last_event_at = Some(Utc::now());
            }
        }
    }

    /// Check for staleness and repair to `Idle` in one step.
    ///
    /// Returns `true` when the record was stale and has been reset, so the
    /// caller emits exactly one corrective broadcast even when two
    /// observers access the session at the same moment.
    #[must_use]
    pub fn repair_stale(&self, session_id: &str, now: DateTime<Utc>) -> bool {
        let Ok(mut tasks) = self.tasks.lock() else {
            return false;
        };
        let Some(record) = tasks.get_mut(session_id) else {
            return false;
        };
        if !Self::is_stale(record, now) {
            return false;
        }

        record.status = TaskStatus::Idle;
        record.cancel = None;
        debug!(session_id, "stale task repaired to idle");
        true
    }

    /// Whether a task record looks abandoned.
    ///
    /// True when the status is `Running` and either the cancellation handle
    /// is absent (a restart artifact: in-memory handles are wiped while the
    /// stale status stays visible to reconnecting observers) or the run has
    /// been in flight longer than [`STALE_AFTER_MINUTES`].
    #[must_use]
    pub fn is_stale(record: &TaskRecord, now: DateTime<Utc>) -> bool {
        if record.status != TaskStatus::Running {
            return false;
        }
        if record.cancel.is_none() {
            return true;
        }
        match record.started_at {
            Some(started_at) => now - started_at > Duration::minutes(STALE_AFTER_MINUTES),
            None => true,
        }
    }
}
