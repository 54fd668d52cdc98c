//! Domain models shared across the execution core.

pub mod event;
pub mod queue;
pub mod task;

pub use event::SessionEvent;
pub use queue::{PromptOptions, QueuedPrompt};
pub use task::{TaskRecord, TaskStatus};
