//! Status listeners for observability.
//!
//! A pipeline publishes lifecycle states and alt progress on two
//! best-effort streams. [`listen`] drains both into a [`StatusListener`]
//! until the pipeline closes them.

mod listener;

pub use listener::{CollectingStatusListener, LoggingStatusListener, NoOpStatusListener};

use crate::core::{Payload, State};
use crate::pipeline::Pipeline;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Receives the updates a pipeline publishes.
#[async_trait]
pub trait StatusListener: Send + Sync {
    /// Handles a lifecycle state.
    async fn on_state(&self, state: &State);

    /// Handles an alt-progress fraction.
    async fn on_progress(&self, progress: f32);
}

/// Spawns a task feeding `pipeline`'s streams into `listener`.
///
/// The task ends once both streams are closed, which happens when the
/// pipeline finishes.
pub fn listen<T: Payload>(
    pipeline: &Pipeline<T>,
    listener: Arc<dyn StatusListener>,
) -> JoinHandle<()> {
    let states = pipeline.state();
    let progress = pipeline.alt_progress();

    tokio::spawn(async move {
        let mut states_open = true;
        let mut progress_open = true;
        while states_open || progress_open {
            tokio::select! {
                state = states.recv(), if states_open => match state {
                    Some(state) => listener.on_state(&state).await,
                    None => states_open = false,
                },
                value = progress.recv(), if progress_open => match value {
                    Some(value) => listener.on_progress(value).await,
                    None => progress_open = false,
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::context::Context;
    use crate::core::Status;
    use crate::stages::Stage;
    use crate::steps::Step;
    use crate::channel::{Receiver, Sender};
    use crate::testing::feed;
    use pretty_assertions::assert_eq;
    use tokio_test::assert_ok;

    async fn echo(ctx: Context, input: Receiver<u8>, output: Sender<u8>) -> anyhow::Result<()> {
        while let Some(value) = input.recv().await {
            output.send(value).await?;
            ctx.inc().await;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_listen_drains_until_pipeline_finishes() {
        let stage = Stage::serial("s", vec![Step::new("echo", echo)]);
        let pipeline = Pipeline::new("echo", vec![stage]);
        pipeline.total(2);
        let collector = Arc::new(CollectingStatusListener::new());
        let handle = listen(&pipeline, collector.clone());

        let out = pipeline.process(&CancellationToken::new(), feed(vec![1, 2])).await;
        assert_eq!(out.collect().await, vec![1, 2]);
        assert_ok!(pipeline.wait().await);
        assert_ok!(handle.await);

        let statuses: Vec<Status> = collector.states().iter().map(|s| s.status).collect();
        assert_eq!(statuses.first(), Some(&Status::PipelineStarted));
        assert_eq!(statuses.last(), Some(&Status::PipelineFinished));
        assert_eq!(collector.progress(), vec![0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_logging_listener_follows_pipeline() {
        let stage = Stage::serial("s", vec![Step::new("echo", echo)]);
        let pipeline = Pipeline::new("echo", vec![stage]);
        let handle = listen(&pipeline, Arc::new(LoggingStatusListener::debug()));

        let out = pipeline.process(&CancellationToken::new(), feed(vec![1])).await;
        let _ = out.collect().await;
        assert_ok!(pipeline.wait().await);
        assert_ok!(handle.await);
    }
}
