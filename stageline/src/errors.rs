//! Error types for the stageline engine.
//!
//! Worker functions report failures as [`anyhow::Error`]; the engine wraps
//! them into [`PipelineError`] so the first error of a unit can be handed to
//! every caller that joins it.

use std::sync::Arc;
use thiserror::Error;

/// Convenience alias for results produced by the engine.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// The main error type for stageline operations.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// A worker function returned an error.
    #[error("step '{step}' failed: {error}")]
    Worker {
        /// Name of the step whose worker failed.
        step: String,
        /// The error returned by the worker function.
        error: Arc<anyhow::Error>,
    },

    /// A worker stopped because its output had no reader left.
    ///
    /// This follows from a failure further downstream, so it ranks below
    /// every other error when a unit picks the error to report.
    #[error("step '{step}' stopped: output channel closed")]
    Disconnected {
        /// Name of the step whose worker stopped.
        step: String,
    },

    /// A supervised task panicked.
    #[error("task in '{unit}' panicked: {message}")]
    Panicked {
        /// Name of the unit that owned the task.
        unit: String,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// A value was sent on a channel that had already been closed.
    #[error("channel closed")]
    ChannelClosed,

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Creates a worker error for the named step.
    #[must_use]
    pub fn worker(step: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Worker {
            step: step.into(),
            error: Arc::new(source),
        }
    }

    /// Creates a panic error from a `catch_unwind` payload.
    #[must_use]
    pub fn panicked(unit: impl Into<String>, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };
        Self::Panicked {
            unit: unit.into(),
            message,
        }
    }

    /// Returns the worker's own error, if this is a worker failure.
    #[must_use]
    pub fn worker_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Worker { error, .. } => Some(&**error),
            _ => None,
        }
    }

    /// Creates the error of a worker whose output lost its reader.
    #[must_use]
    pub fn disconnected(step: impl Into<String>) -> Self {
        Self::Disconnected { step: step.into() }
    }

    /// Returns true for errors caused by a closed channel rather than by
    /// the failing code itself.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::ChannelClosed)
    }

    /// Returns the name of the step that produced a worker error.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Worker { step, .. } | Self::Disconnected { step } => Some(step),
            _ => None,
        }
    }
}

/// Error returned when sending on a closed [`Sender`](crate::channel::Sender).
///
/// The rejected value is handed back to the caller.
#[derive(Clone, PartialEq, Eq, Error)]
#[error("sending on a closed channel")]
pub struct SendError<T>(pub T);

impl<T> std::fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendError").finish_non_exhaustive()
    }
}

impl<T> SendError<T> {
    /// Returns the value that could not be sent.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<SendError<T>> for PipelineError {
    fn from(_: SendError<T>) -> Self {
        Self::ChannelClosed
    }
}
