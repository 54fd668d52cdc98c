//! Shared fixtures for integration tests: a scripted in-process backend
//! and a wired-up engine harness.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use session_conductor::backend::{AgentBackend, BackendEvent, EventStream};
use session_conductor::hub::{ConnectionId, WatcherHub};
use session_conductor::models::event::SessionEvent;
use session_conductor::models::queue::PromptOptions;
use session_conductor::models::task::TaskStatus;
use session_conductor::orchestrator::{ExecutionEngine, QueueStore, TaskRegistry};
use session_conductor::{AppError, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

/// One step of a scripted backend run.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit one event into the stream.
    Emit(BackendEvent),
    /// Emit a stream fault and end the run.
    Fault(String),
    /// Pause before the next step.
    Sleep(Duration),
    /// Block until the run's cancellation token fires, then end.
    HoldUntilCancelled,
}

/// Shorthand for a run that just succeeds.
pub fn completes() -> Vec<ScriptStep> {
    vec![ScriptStep::Emit(BackendEvent::Completed { summary: None })]
}

/// Shorthand for a run that stays busy for `ms` before succeeding.
pub fn completes_after_ms(ms: u64) -> Vec<ScriptStep> {
    vec![
        ScriptStep::Sleep(Duration::from_millis(ms)),
        ScriptStep::Emit(BackendEvent::Completed { summary: None }),
    ]
}

/// In-process backend that replays pre-loaded scripts, one per run.
///
/// Runs with no script loaded complete immediately. Each run's script
/// plays out on a spawned task, so the engine consumes a live stream
/// exactly as it would from a real backend process.
#[derive(Default)]
pub struct StubBackend {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    started: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubBackend {
    /// Queue the script for the next unclaimed run.
    pub fn push_script(&self, steps: Vec<ScriptStep>) {
        self.scripts.lock().unwrap().push_back(steps);
    }

    /// Number of runs started so far.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Prompts in run-start order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl AgentBackend for StubBackend {
    fn start_run(
        &self,
        _session_id: &str,
        prompt: &str,
        _options: &PromptOptions,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream>> + Send + '_>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_owned());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(completes);

        Box::pin(async move {
            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(async move {
                for step in script {
                    match step {
                        ScriptStep::Emit(event) => {
                            if tx.send(Ok(event)).await.is_err() {
                                return;
                            }
                        }
                        ScriptStep::Fault(message) => {
                            let _ = tx.send(Err(AppError::Backend(message))).await;
                            return;
                        }
                        ScriptStep::Sleep(duration) => tokio::time::sleep(duration).await,
                        ScriptStep::HoldUntilCancelled => {
                            cancel.cancelled().await;
                            return;
                        }
                    }
                }
            });
            Ok(rx)
        })
    }
}

/// Fully wired engine over a [`StubBackend`].
pub struct Harness {
    pub registry: Arc<TaskRegistry>,
    pub queue: Arc<QueueStore>,
    pub hub: Arc<WatcherHub>,
    pub engine: Arc<ExecutionEngine>,
    pub backend: Arc<StubBackend>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let backend = Arc::new(StubBackend::default());
        let registry = Arc::new(TaskRegistry::new());
        let queue = Arc::new(QueueStore::new());
        let hub = Arc::new(WatcherHub::new());
        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::clone(&hub),
            backend.clone() as Arc<dyn AgentBackend>,
        ));
        Self {
            registry,
            queue,
            hub,
            engine,
            backend,
        }
    }

    /// Attach a fresh watcher connection to `session`.
    pub fn watch(&self, session: &str) -> (ConnectionId, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.hub.register(tx);
        self.hub.watch(session, id);
        (id, rx)
    }

    /// Submit a prompt with default options and no originating connection.
    pub fn submit(&self, session: &str, prompt: &str) -> Result<()> {
        self.engine
            .submit(session, prompt, PromptOptions::default(), None)
    }

    /// Current status snapshot for `session`.
    pub fn status(&self, session: &str) -> TaskStatus {
        self.registry.get_or_create(session).status
    }

    /// Poll until `session` reaches `status`, panicking after two seconds.
    pub async fn wait_for_status(&self, session: &str, status: TaskStatus) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if self.status(session) == status {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {status:?}, currently {:?}",
                self.status(session)
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until `predicate` holds, panicking after two seconds.
    pub async fn wait_until(&self, what: &str, predicate: impl Fn(&Self) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if predicate(self) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting until {what}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Receive the next pushed event, panicking after two seconds.
pub async fn next_event(rx: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Receive events until one carries the given task status; returns every
/// event received, including the matching one.
pub async fn collect_until_status(
    rx: &mut UnboundedReceiver<SessionEvent>,
    status: TaskStatus,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = matches!(event, SessionEvent::TaskStatus { status: s, .. } if s == status);
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Drain whatever is currently buffered on the watcher channel.
pub fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
