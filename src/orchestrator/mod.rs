//! Session task orchestration: registry, queue, execution engine, and
//! stale-task repair.

pub mod engine;
pub mod queue_store;
pub mod reaper;
pub mod registry;

pub use engine::ExecutionEngine;
pub use queue_store::QueueStore;
pub use registry::TaskRegistry;
