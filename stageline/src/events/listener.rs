//! Status listener implementations.

use super::StatusListener;
use crate::core::State;
use async_trait::async_trait;
use tracing::{debug, info, Level};

/// A listener that discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStatusListener;

#[async_trait]
impl StatusListener for NoOpStatusListener {
    async fn on_state(&self, _state: &State) {}

    async fn on_progress(&self, _progress: f32) {}
}

/// A listener that logs updates using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingStatusListener {
    level: Level,
}

impl Default for LoggingStatusListener {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingStatusListener {
    /// Creates a logging listener with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging listener.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging listener.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

#[async_trait]
impl StatusListener for LoggingStatusListener {
    async fn on_state(&self, state: &State) {
        let data = serde_json::to_string(state).unwrap_or_default();
        if self.level == Level::DEBUG {
            debug!(unit = %state.name, status = %state.status, state = %data, "{state}");
        } else {
            info!(unit = %state.name, status = %state.status, state = %data, "{state}");
        }
    }

    async fn on_progress(&self, progress: f32) {
        if self.level == Level::DEBUG {
            debug!(progress, "Alt progress");
        } else {
            info!(progress, "Alt progress");
        }
    }
}

/// A listener that keeps every update, for tests and inspection.
#[derive(Debug, Default)]
pub struct CollectingStatusListener {
    states: parking_lot::RwLock<Vec<State>>,
    progress: parking_lot::RwLock<Vec<f32>>,
}

impl CollectingStatusListener {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every collected state, in arrival order.
    #[must_use]
    pub fn states(&self) -> Vec<State> {
        self.states.read().clone()
    }

    /// Returns every collected progress value, in arrival order.
    #[must_use]
    pub fn progress(&self) -> Vec<f32> {
        self.progress.read().clone()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty() && self.progress.read().is_empty()
    }
}

#[async_trait]
impl StatusListener for CollectingStatusListener {
    async fn on_state(&self, state: &State) {
        self.states.write().push(state.clone());
    }

    async fn on_progress(&self, progress: f32) {
        self.progress.write().push(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Status;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_noop_listener() {
        let listener = NoOpStatusListener;
        listener.on_state(&State::new("p", Status::PipelineStarted, 0.0, 0.0)).await;
        listener.on_progress(0.5).await;
    }

    #[tokio::test]
    async fn test_logging_listener() {
        let listener = LoggingStatusListener::default();
        listener.on_state(&State::new("p", Status::StageStarted, 0.5, 0.0)).await;
        LoggingStatusListener::debug().on_progress(1.0).await;
    }

    #[tokio::test]
    async fn test_collecting_listener() {
        let listener = CollectingStatusListener::new();
        assert!(listener.is_empty());

        let state = State::new("step", Status::StepFinished, 1.0, 0.25);
        listener.on_state(&state).await;
        listener.on_progress(0.25).await;

        assert_eq!(listener.states(), vec![state]);
        assert_eq!(listener.progress(), vec![0.25]);
    }
}
