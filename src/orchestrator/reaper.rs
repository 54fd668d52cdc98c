//! Stale-task repair, invoked opportunistically on session access.
//!
//! A task can be left `running` forever when the process instance that
//! owned its run is lost (crash, restart) before a terminal transition.
//! Rather than running a background timer, the repair happens lazily
//! whenever any observer (re)selects the session: if the record is stale
//! it is forced back to `idle` and a single corrective `task_status`
//! broadcast goes out before control returns to the caller.
//!
//! This is the only path that moves a task out of `running` without
//! going through the execution engine.

use chrono::Utc;
use tracing::info;

use crate::hub::WatcherHub;
use crate::models::event::SessionEvent;
use crate::models::task::TaskStatus;
use crate::orchestrator::registry::TaskRegistry;

/// Repair the session's task if it looks abandoned.
///
/// Returns `true` when a repair happened (and the corrective broadcast
/// was sent).
#[must_use]
pub fn repair_if_stale(registry: &TaskRegistry, hub: &WatcherHub, session_id: &str) -> bool {
    if !registry.repair_stale(session_id, Utc::now()) {
        return false;
    }

    info!(session_id, "repaired stale running task");
    hub.broadcast(
        session_id,
        &SessionEvent::TaskStatus {
            session_id: session_id.to_owned(),
            status: TaskStatus::Idle,
        },
        None,
    );
    true
}
