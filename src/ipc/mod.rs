//! Local IPC surface through which observers attach to sessions.

pub mod server;

use std::sync::Arc;

use crate::hub::WatcherHub;
use crate::orchestrator::engine::ExecutionEngine;
use crate::orchestrator::queue_store::QueueStore;
use crate::orchestrator::registry::TaskRegistry;

/// Process-wide services shared by every IPC connection.
pub struct Services {
    /// Per-session task state.
    pub registry: Arc<TaskRegistry>,
    /// Per-session prompt backlogs.
    pub queue: Arc<QueueStore>,
    /// Watcher registry and event fan-out.
    pub hub: Arc<WatcherHub>,
    /// Single-flight prompt execution.
    pub engine: Arc<ExecutionEngine>,
}
