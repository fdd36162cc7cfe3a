//! Status codes and state events emitted by a pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A lifecycle transition of a pipeline, stage or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The pipeline has started processing.
    PipelineStarted,
    /// Every stage of the pipeline has finished.
    PipelineFinished,
    /// A stage is about to start.
    StageStarted,
    /// Every step of a stage has finished.
    StageFinished,
    /// A step is about to start.
    StepStarted,
    /// Every worker of a step has returned.
    StepFinished,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PipelineStarted => write!(f, "pipeline started"),
            Self::PipelineFinished => write!(f, "pipeline finished"),
            Self::StageStarted => write!(f, "stage started"),
            Self::StageFinished => write!(f, "stage finished"),
            Self::StepStarted => write!(f, "step started"),
            Self::StepFinished => write!(f, "step finished"),
        }
    }
}

impl Status {
    /// Returns true for the `*Started` variants.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(
            self,
            Self::PipelineStarted | Self::StageStarted | Self::StepStarted
        )
    }

    /// Returns true for the `*Finished` variants.
    #[must_use]
    pub fn is_finish(&self) -> bool {
        !self.is_start()
    }
}

/// A status event together with the progress measured when it was emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Name of the pipeline, stage or step reporting the status.
    pub name: String,
    /// The transition being reported.
    pub status: Status,
    /// Fraction of steps that have finished.
    pub progress: f32,
    /// Fraction of declared work units completed.
    pub alt_progress: f32,
}

impl State {
    /// Creates a new state event.
    #[must_use]
    pub fn new(name: impl Into<String>, status: Status, progress: f32, alt_progress: f32) -> Self {
        Self {
            name: name.into(),
            status,
            progress,
            alt_progress,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({:.0}%, alt {:.0}%)",
            self.name,
            self.status,
            self.progress * 100.0,
            self.alt_progress * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_display() {
        assert_eq!(Status::PipelineStarted.to_string(), "pipeline started");
        assert_eq!(Status::PipelineFinished.to_string(), "pipeline finished");
        assert_eq!(Status::StageStarted.to_string(), "stage started");
        assert_eq!(Status::StageFinished.to_string(), "stage finished");
        assert_eq!(Status::StepStarted.to_string(), "step started");
        assert_eq!(Status::StepFinished.to_string(), "step finished");
    }

    #[test]
    fn test_status_start_and_finish() {
        assert!(Status::StepStarted.is_start());
        assert!(Status::StageFinished.is_finish());
        assert!(!Status::PipelineFinished.is_start());
    }

    #[test]
    fn test_state_serialize() {
        let state = State::new("csv", Status::StepFinished, 0.5, 1.0);
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["status"], "step_finished");
        assert_eq!(json["name"], "csv");

        let back: State = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_state_display() {
        let state = State::new("loader", Status::StageStarted, 0.25, 0.0);
        assert_eq!(state.to_string(), "loader: stage started (25%, alt 0%)");
    }
}
