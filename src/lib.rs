#![forbid(unsafe_code)]

//! Session task execution core.
//!
//! Accepts prompts addressed to logical conversation sessions, guarantees
//! at most one run executes per session at a time, queues prompts that
//! arrive while a session is busy, and fans streamed execution events out
//! to every watcher of the session.

pub mod backend;
pub mod config;
pub mod errors;
pub mod hub;
pub mod ipc;
pub mod models;
pub mod orchestrator;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
