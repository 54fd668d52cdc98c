//! Watcher hub: tracks which observer connections are attached to which
//! session and delivers targeted and fan-out notifications.
//!
//! Connections register once (receiving a [`ConnectionId`] and handing
//! over the sending half of their event channel) and may watch at most
//! one session at a time; watching a new session implicitly unwatches the
//! previous one. Delivery is non-blocking: events to closed or absent
//! connections are dropped silently, which also covers the `None` origin
//! of queue-driven runs.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::models::event::SessionEvent;

/// Opaque identifier for one observer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Interior state guarded by one mutex.
///
/// The lock is never held across an await point; all delivery goes
/// through unbounded senders, which never block.
#[derive(Debug, Default)]
struct HubState {
    /// Sending half of each registered connection's event channel.
    senders: HashMap<ConnectionId, mpsc::UnboundedSender<SessionEvent>>,
    /// Watchers per session, in attach order.
    watchers: HashMap<String, Vec<ConnectionId>>,
    /// Which session each connection currently watches.
    watching: HashMap<ConnectionId, String>,
}

/// Process-wide watcher registry and event fan-out.
#[derive(Debug, Default)]
pub struct WatcherHub {
    state: Mutex<HubState>,
}

impl WatcherHub {
    /// Construct an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, taking ownership of its event sender.
    #[must_use]
    pub fn register(&self, sender: mpsc::UnboundedSender<SessionEvent>) -> ConnectionId {
        let id = ConnectionId::new();
        if let Ok(mut state) = self.state.lock() {
            state.senders.insert(id, sender);
        }
        debug!(connection_id = %id, "connection registered");
        id
    }

    /// Deregister a terminated connection, unwatching whatever it watched.
    pub fn deregister(&self, connection: ConnectionId) {
        if let Ok(mut state) = self.state.lock() {
            Self::detach(&mut state, connection);
            state.senders.remove(&connection);
        }
        debug!(connection_id = %connection, "connection deregistered");
    }

    /// Attach `connection` to `session_id`, implicitly unwatching any
    /// previously watched session.
    ///
    /// When the session gains a second watcher, every watcher is notified
    /// that the session is now shared.
    pub fn watch(&self, session_id: &str, connection: ConnectionId) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        if state.watching.get(&connection).map(String::as_str) == Some(session_id) {
            return;
        }

        Self::detach(&mut state, connection);

        state.watching.insert(connection, session_id.to_owned());
        let watchers = state.watchers.entry(session_id.to_owned()).or_default();
        watchers.push(connection);
        let count = watchers.len();

        debug!(connection_id = %connection, session_id, count, "watcher attached");

        if count == 2 {
            Self::notify_shared(&state, session_id, true);
        }
    }

    /// Detach `connection` from `session_id` if it is currently watching it.
    pub fn unwatch(&self, session_id: &str, connection: ConnectionId) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.watching.get(&connection).map(String::as_str) == Some(session_id) {
            Self::detach(&mut state, connection);
        }
    }

    /// Detach `connection` from whatever session it watches.
    pub fn unwatch_all(&self, connection: ConnectionId) {
        if let Ok(mut state) = self.state.lock() {
            Self::detach(&mut state, connection);
        }
    }

    /// Deliver `event` to exactly one connection.
    ///
    /// Silently a no-op when `target` is `None`, unknown, or closed —
    /// queue-driven runs broadcast with no origin and must not fail here.
    pub fn send(&self, target: Option<ConnectionId>, event: &SessionEvent) {
        let Some(connection) = target else {
            return;
        };
        if let Ok(state) = self.state.lock() {
            if let Some(sender) = state.senders.get(&connection) {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Deliver `event` to every watcher of `session_id`, except `exclude`.
    pub fn broadcast(&self, session_id: &str, event: &SessionEvent, exclude: Option<ConnectionId>) {
        let Ok(state) = self.state.lock() else {
            return;
        };
        let Some(watchers) = state.watchers.get(session_id) else {
            return;
        };
        for connection in watchers {
            if Some(*connection) == exclude {
                continue;
            }
            if let Some(sender) = state.senders.get(connection) {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Number of watchers currently attached to `session_id`.
    #[must_use]
    pub fn watcher_count(&self, session_id: &str) -> usize {
        self.state
            .lock()
            .map_or(0, |state| state.watchers.get(session_id).map_or(0, Vec::len))
    }

    /// Remove `connection` from its watched session, emitting the
    /// no-longer-shared notification when exactly one watcher remains.
    fn detach(state: &mut HubState, connection: ConnectionId) {
        let Some(session_id) = state.watching.remove(&connection) else {
            return;
        };

        let remaining = if let Some(watchers) = state.watchers.get_mut(&session_id) {
            watchers.retain(|c| *c != connection);
            watchers.len()
        } else {
            0
        };

        if remaining == 0 {
            state.watchers.remove(&session_id);
        } else if remaining == 1 {
            Self::notify_shared(state, &session_id, false);
        }

        debug!(connection_id = %connection, session_id, remaining, "watcher detached");
    }

    /// Send a `session_shared` notification to every watcher of `session_id`.
    fn notify_shared(state: &HubState, session_id: &str, is_shared: bool) {
        let Some(watchers) = state.watchers.get(session_id) else {
            return;
        };
        let event = SessionEvent::SessionShared {
            session_id: session_id.to_owned(),
            is_shared,
        };
        for connection in watchers {
            if let Some(sender) = state.senders.get(connection) {
                let _ = sender.send(event.clone());
            }
        }
    }
}
