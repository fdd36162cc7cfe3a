//! Structured cancellation for pipeline units.
//!
//! This module provides:
//! - Supervisor for spawning, killing and joining the tasks of one unit
//! - Re-export of the cancellation token used throughout the crate

mod supervisor;

pub use supervisor::{Failure, Supervisor, TaskResult};
pub use tokio_util::sync::CancellationToken;
