//! Testing utilities for stageline pipelines.
//!
//! This module provides:
//! - A progress monitor that records status transitions
//! - Channel fixtures for feeding steps, stages and pipelines

mod fixtures;
mod mocks;

pub use fixtures::{feed, pending};
pub use mocks::RecordingMonitor;
