//! # Stageline
//!
//! A composable concurrent pipeline engine.
//!
//! Stageline builds multi-stage, multi-worker stream processors out of small
//! units:
//!
//! - **Steps**: a worker pool over one function, with competing-consumer or
//!   broadcast distribution and optional output buffering
//! - **Stages**: steps chained serially or run side by side and merged
//! - **Pipelines**: stages chained serially, with status and progress streams
//! - **Supervision**: hierarchical cancellation and first-error aggregation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stageline::prelude::*;
//!
//! async fn double(_ctx: Context, input: Receiver<u32>, output: Sender<u32>) -> anyhow::Result<()> {
//!     while let Some(n) = input.recv().await {
//!         output.send(n * 2).await?;
//!     }
//!     Ok(())
//! }
//!
//! let stage = Stage::serial("math", vec![Step::worker("double", 4, double)]);
//! let pipeline = Pipeline::new("numbers", vec![stage]);
//!
//! let (tx, rx) = channel(UNBUFFERED);
//! let out = pipeline.process(&CancellationToken::new(), rx).await;
//! // feed `tx`, close it, then drain `out`
//! pipeline.wait().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod channel;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod multiplexer;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod steps;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, Failure, Supervisor, TaskResult};
    pub use crate::channel::{channel, Receiver, Sender, UNBUFFERED};
    pub use crate::config::PipelineConfig;
    pub use crate::context::{Context, ProgressMonitor};
    pub use crate::core::{Payload, State, Status};
    pub use crate::errors::{PipelineError, Result, SendError};
    pub use crate::events::{listen, LoggingStatusListener, StatusListener};
    pub use crate::multiplexer::Multiplexer;
    pub use crate::pipeline::Pipeline;
    pub use crate::stages::Stage;
    pub use crate::steps::{step_fn, Step, StepFn, MAX_BUFFER_SIZE, MAX_WORKER_COUNT};
}
