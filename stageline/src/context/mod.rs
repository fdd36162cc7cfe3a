//! Execution context handed to every step, stage and worker.
//!
//! A [`Context`] carries the cancellation token of the unit that created it
//! and a non-owning handle to the enclosing pipeline, used to report work
//! units and status transitions. Without a pipeline those calls do nothing.

#[cfg(test)]
mod context_tests;

use crate::cancellation::CancellationToken;
use crate::core::Status;
use async_trait::async_trait;
use std::sync::{Arc, Weak};

/// Receiver of progress and status reports coming from inside a pipeline.
#[async_trait]
pub trait ProgressMonitor: Send + Sync {
    /// Sets the number of work units expected.
    fn total(&self, value: usize);

    /// Records one completed work unit.
    async fn inc(&self);

    /// Reports a lifecycle transition of the named unit.
    async fn update_status(&self, name: &str, status: Status);
}

/// Cancellation scope plus pipeline back-reference.
#[derive(Clone, Default)]
pub struct Context {
    token: CancellationToken,
    monitor: Option<Weak<dyn ProgressMonitor>>,
}

impl Context {
    /// Creates a context bound to `token` with no pipeline attached.
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            monitor: None,
        }
    }

    /// Creates a context that is never cancelled from outside.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Creates a context reporting to `monitor`.
    #[must_use]
    pub fn with_monitor(token: CancellationToken, monitor: &Arc<dyn ProgressMonitor>) -> Self {
        Self {
            token,
            monitor: Some(Arc::downgrade(monitor)),
        }
    }

    /// Returns a context with the same pipeline but another cancellation scope.
    #[must_use]
    pub fn scoped(&self, token: CancellationToken) -> Self {
        Self {
            token,
            monitor: self.monitor.clone(),
        }
    }

    /// Returns the cancellation token of this scope.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns true once this scope has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until this scope is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns true if a live pipeline is attached.
    #[must_use]
    pub fn has_pipeline(&self) -> bool {
        self.monitor().is_some()
    }

    /// Sets the number of work units the pipeline should expect.
    pub fn total(&self, value: usize) {
        if let Some(monitor) = self.monitor() {
            monitor.total(value);
        }
    }

    /// Records one completed work unit and notifies progress listeners.
    pub async fn inc(&self) {
        if let Some(monitor) = self.monitor() {
            monitor.inc().await;
        }
    }

    pub(crate) async fn update_status(&self, name: &str, status: Status) {
        if let Some(monitor) = self.monitor() {
            monitor.update_status(name, status).await;
        }
    }

    fn monitor(&self) -> Option<Arc<dyn ProgressMonitor>> {
        self.monitor.as_ref()?.upgrade()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("has_pipeline", &self.has_pipeline())
            .finish()
    }
}
