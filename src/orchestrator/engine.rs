//! Execution engine: orchestrates one run of a prompt against the
//! backend and drains the session's backlog afterwards.
//!
//! A submitted prompt either starts immediately (session idle) or joins
//! the backlog (session busy). Each run consumes the backend's event
//! stream, fanning every event out to all watchers of the session, and
//! reaches exactly one terminal status:
//!
//! - `completed` — at the moment the success marker is observed, before
//!   the stream is drained;
//! - `error` — structured error marker, stream fault, or the stream
//!   closing without a marker (all treated identically);
//! - `cancelled` — cooperative cancellation observed mid-stream.
//!
//! Completed and errored runs trigger the next queued prompt; cancelled
//! runs pause the queue until a new run is started explicitly. Backlog
//! draining is an explicit loop, never recursion, so a long backlog
//! cannot grow the call stack.
//!
//! The engine never returns run results to a caller — everything
//! observable is pushed through the watcher hub.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::backend::{AgentBackend, BackendEvent};
use crate::hub::{ConnectionId, WatcherHub};
use crate::models::event::SessionEvent;
use crate::models::queue::PromptOptions;
use crate::models::task::TaskStatus;
use crate::orchestrator::queue_store::QueueStore;
use crate::orchestrator::registry::TaskRegistry;
use crate::Result;

/// Sanitized message broadcast for stream faults; the real error is
/// logged server-side only.
const FAULT_MESSAGE: &str = "agent backend failure";

/// Terminal decision for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    /// Success marker observed; backlog processing continues.
    Completed,
    /// Error marker or fault; backlog processing continues.
    Errored,
    /// User cancellation; backlog processing pauses.
    Cancelled,
}

/// Orchestrates single-flight prompt execution per session.
pub struct ExecutionEngine {
    registry: Arc<TaskRegistry>,
    queue: Arc<QueueStore>,
    hub: Arc<WatcherHub>,
    backend: Arc<dyn AgentBackend>,
}

impl ExecutionEngine {
    /// Wire the engine to its collaborating services.
    #[must_use]
    pub fn new(
        registry: Arc<TaskRegistry>,
        queue: Arc<QueueStore>,
        hub: Arc<WatcherHub>,
        backend: Arc<dyn AgentBackend>,
    ) -> Self {
        Self {
            registry,
            queue,
            hub,
            backend,
        }
    }

    /// Submit a prompt for the session.
    ///
    /// If the session is idle the run starts immediately in a background
    /// task and this returns right away; if a run is in flight the prompt
    /// is enqueued and a `queue_updated` broadcast is sent. The decision
    /// between the two is atomic with respect to concurrent submissions.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`](crate::AppError::Validation) — empty or
    ///   whitespace-only prompt.
    /// - [`AppError::QueueFull`](crate::AppError::QueueFull) — backlog at
    ///   capacity.
    ///
    /// Both are returned to the submitter only, before any state mutation.
    pub fn submit(
        self: &Arc<Self>,
        session_id: &str,
        prompt: &str,
        options: PromptOptions,
        origin: Option<ConnectionId>,
    ) -> Result<()> {
        if prompt.trim().is_empty() {
            return Err(crate::AppError::Validation("prompt must not be empty".into()));
        }

        let cancel = CancellationToken::new();
        if !self.registry.begin_run(session_id, cancel.clone()) {
            // Busy: join the backlog instead of running.
            self.queue.enqueue(session_id, prompt, options)?;
            self.broadcast_queue(session_id);
            return Ok(());
        }

        let engine = Arc::clone(self);
        let session = session_id.to_owned();
        let prompt = prompt.to_owned();
        let span = info_span!("session_run", session_id = %session, origin = origin.map(|o| o.to_string()));
        tokio::spawn(
            async move {
                engine.drive(&session, prompt, options, cancel).await;
            }
            .instrument(span),
        );
        Ok(())
    }

    /// Run the submitted prompt, then drain the backlog.
    ///
    /// Each iteration executes one run whose `Running` transition has
    /// already been claimed via [`TaskRegistry::begin_run`].
    async fn drive(
        &self,
        session_id: &str,
        prompt: String,
        options: PromptOptions,
        cancel: CancellationToken,
    ) {
        let mut next = Some((prompt, options, cancel));

        while let Some((prompt, options, cancel)) = next.take() {
            let outcome = self.run_once(session_id, &prompt, &options, cancel).await;

            if outcome == RunOutcome::Cancelled {
                // Cancellation expresses intent to stop; the backlog stays
                // intact and paused until a new run is started explicitly.
                info!(session_id, "run cancelled; queue paused");
                break;
            }

            let Some(item) = self.queue.dequeue(session_id) else {
                break;
            };
            self.broadcast_queue(session_id);

            let cancel = CancellationToken::new();
            if !self.registry.begin_run(session_id, cancel.clone()) {
                // A direct submission claimed the session between our
                // terminal transition and this dequeue; its own drain will
                // pick the item up again.
                warn!(session_id, item_id = %item.id, "lost start race after dequeue; requeueing");
                self.queue.requeue_front(session_id, item);
                self.broadcast_queue(session_id);
                break;
            }

            // Queue-driven runs have no originating connection.
            next = Some((item.prompt, item.options, cancel));
        }
    }

    /// Execute one run to its terminal status.
    ///
    /// The caller has already transitioned the task to `Running`; this
    /// broadcasts that status, consumes the stream, and applies exactly
    /// one terminal transition. The `finalized` one-shot below is what
    /// keeps the early success-marker path and the post-loop fallback
    /// from both deciding the run's end.
    async fn run_once(
        &self,
        session_id: &str,
        prompt: &str,
        options: &PromptOptions,
        cancel: CancellationToken,
    ) -> RunOutcome {
        // Every watcher sees the status, not only the origin: queue-driven
        // runs have no origin, and late-joining watchers need output too.
        self.broadcast_status(session_id, TaskStatus::Running);

        let mut stream = match self
            .backend
            .start_run(session_id, prompt, options, cancel.clone())
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                warn!(session_id, error = %err, "backend start failed");
                return self.finalize_error(session_id, FAULT_MESSAGE);
            }
        };

        let mut finalized: Option<RunOutcome> = None;

        loop {
            let item = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    // `TaskRegistry::cancel` already transitioned the task
                    // and cleared the handle; only the broadcast remains.
                    self.broadcast_status(session_id, TaskStatus::Cancelled);
                    finalized = Some(RunOutcome::Cancelled);
                    break;
                }

                item = stream.recv() => item,
            };

            match item {
                None => {
                    // Stream closed without a terminal marker: a fault.
                    warn!(session_id, "backend stream ended without terminal marker");
                    break;
                }
                Some(Err(err)) => {
                    warn!(session_id, error = %err, "backend stream fault");
                    break;
                }
                Some(Ok(event)) => {
                    self.registry.touch(session_id);
                    match event {
                        BackendEvent::Content { text } => {
                            self.hub.broadcast(
                                session_id,
                                &SessionEvent::Content {
                                    session_id: session_id.to_owned(),
                                    text,
                                },
                                None,
                            );
                        }
                        BackendEvent::ToolCall { name, input } => {
                            self.hub.broadcast(
                                session_id,
                                &SessionEvent::ToolCall {
                                    session_id: session_id.to_owned(),
                                    name,
                                    input,
                                },
                                None,
                            );
                        }
                        BackendEvent::ToolResult { name, output } => {
                            self.hub.broadcast(
                                session_id,
                                &SessionEvent::ToolResult {
                                    session_id: session_id.to_owned(),
                                    name,
                                    output,
                                },
                                None,
                            );
                        }
                        BackendEvent::Completed { summary } => {
                            // Transition now, not at stream closure: the
                            // backend may hold the stream open long after
                            // the final answer, and observers would see a
                            // task stuck in progress.
                            info!(session_id, ?summary, "run completed");
                            self.registry.transition(session_id, TaskStatus::Completed, None);
                            self.broadcast_status(session_id, TaskStatus::Completed);
                            finalized = Some(RunOutcome::Completed);
                            break;
                        }
                        BackendEvent::Failed { message } => {
                            info!(session_id, message, "run failed");
                            finalized = Some(self.finalize_error(session_id, &message));
                            break;
                        }
                    }
                }
            }
        }

        // Post-loop fallback: only fires when no terminal decision was
        // made above, so a run can never finalize twice.
        finalized.unwrap_or_else(|| self.finalize_error(session_id, FAULT_MESSAGE))
    }

    /// Apply the `error` terminal transition and broadcast the sanitized
    /// failure message.
    fn finalize_error(&self, session_id: &str, message: &str) -> RunOutcome {
        self.registry.transition(session_id, TaskStatus::Error, None);
        self.broadcast_status(session_id, TaskStatus::Error);
        self.hub.broadcast(
            session_id,
            &SessionEvent::Error {
                session_id: session_id.to_owned(),
                message: message.to_owned(),
            },
            None,
        );
        RunOutcome::Errored
    }

    /// Broadcast a `task_status` event to every watcher of the session.
    fn broadcast_status(&self, session_id: &str, status: TaskStatus) {
        self.hub.broadcast(
            session_id,
            &SessionEvent::TaskStatus {
                session_id: session_id.to_owned(),
                status,
            },
            None,
        );
    }

    /// Broadcast a `queue_updated` event with the current backlog snapshot.
    fn broadcast_queue(&self, session_id: &str) {
        let queue = self.queue.list(session_id);
        let size = queue.len();
        self.hub.broadcast(
            session_id,
            &SessionEvent::QueueUpdated {
                session_id: session_id.to_owned(),
                queue,
                size,
            },
            None,
        );
    }

    /// Cancel the session's running task.
    ///
    /// Returns `false` when nothing was running. The `cancelled` status
    /// broadcast is emitted by the consumption loop when it observes the
    /// token.
    #[must_use]
    pub fn cancel(&self, session_id: &str) -> bool {
        self.registry.cancel(session_id)
    }
}
