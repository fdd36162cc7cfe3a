//! Pipeline configuration.
//!
//! Controls how status and progress updates are delivered to listeners.

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivery settings for a pipeline's status and progress streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of the status and alt-progress channels.
    pub status_buffer: usize,
    /// How long an update waits for room before it is dropped, in milliseconds.
    pub status_timeout_ms: u64,
    /// Minimum alt-progress advance between two emitted updates.
    pub progress_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            status_buffer: 100,
            status_timeout_ms: 50,
            progress_threshold: 0.01,
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status channel capacity.
    #[must_use]
    pub fn with_status_buffer(mut self, status_buffer: usize) -> Self {
        self.status_buffer = status_buffer;
        self
    }

    /// Sets the delivery timeout.
    #[must_use]
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the alt-progress throttle.
    #[must_use]
    pub fn with_progress_threshold(mut self, threshold: f32) -> Self {
        self.progress_threshold = threshold;
        self
    }

    /// Returns the delivery timeout.
    #[must_use]
    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    /// Checks that the settings can drive a pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.status_buffer == 0 {
            return Err(PipelineError::InvalidConfig(
                "status_buffer must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.progress_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "progress_threshold must be in [0, 1), got {}",
                self.progress_threshold
            )));
        }
        Ok(())
    }
}
