//! Pipelines: ordered chains of stages with status and progress tracking.
//!
//! A pipeline runs its stages serially, feeding each stage the previous
//! stage's output. It reports lifecycle transitions on a status stream and
//! caller-driven unit progress on an alt-progress stream. Both streams are
//! best effort: an update that cannot be queued within the configured
//! timeout is dropped rather than stalling the data path.


use crate::cancellation::{CancellationToken, Failure, Supervisor, TaskResult};
use crate::channel::{channel, Receiver, Sender};
use crate::config::PipelineConfig;
use crate::context::{Context, ProgressMonitor};
use crate::core::{Payload, State, Status};
use crate::errors::Result;
use crate::stages::Stage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A named chain of stages.
///
/// Clones share the same stages, streams and supervisor.
pub struct Pipeline<T> {
    inner: Arc<PipelineInner<T>>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct PipelineInner<T> {
    name: String,
    config: PipelineConfig,
    stages: RwLock<Vec<Stage<T>>>,
    supervisor: Supervisor,
    state_tx: Sender<State>,
    state_rx: Receiver<State>,
    alt_tx: Sender<f32>,
    alt_rx: Receiver<f32>,
    unit_total: AtomicUsize,
    unit_count: AtomicUsize,
    // Last alt progress handed to the stream.
    last_alt: tokio::sync::Mutex<f32>,
    // Serializes status emission so delivered progress never goes backwards.
    status_lock: tokio::sync::Mutex<()>,
    times: Mutex<RunTimes>,
}

#[derive(Default)]
struct RunTimes {
    started: Option<(Instant, DateTime<Utc>)>,
    finished: Option<(Instant, DateTime<Utc>)>,
}

/// Returns `count / total`, or zero when nothing is expected.
#[allow(clippy::cast_precision_loss)]
fn fraction(count: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        count as f32 / total as f32
    }
}

impl<T: Payload> Pipeline<T> {
    /// Creates a pipeline with the default configuration.
    pub fn new(name: impl Into<String>, stages: impl IntoIterator<Item = Stage<T>>) -> Self {
        Self::build(name.into(), stages.into_iter().collect(), PipelineConfig::default())
    }

    /// Creates a pipeline with a custom configuration.
    pub fn with_config(
        name: impl Into<String>,
        stages: impl IntoIterator<Item = Stage<T>>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(name.into(), stages.into_iter().collect(), config))
    }

    fn build(name: String, stages: Vec<Stage<T>>, config: PipelineConfig) -> Self {
        let (state_tx, state_rx) = channel(config.status_buffer);
        let (alt_tx, alt_rx) = channel(config.status_buffer);
        Self {
            inner: Arc::new(PipelineInner {
                supervisor: Supervisor::new(name.clone()),
                name,
                config,
                stages: RwLock::new(stages),
                state_tx,
                state_rx,
                alt_tx,
                alt_rx,
                unit_total: AtomicUsize::new(0),
                unit_count: AtomicUsize::new(0),
                last_alt: tokio::sync::Mutex::new(0.0),
                status_lock: tokio::sync::Mutex::new(()),
                times: Mutex::new(RunTimes::default()),
            }),
        }
    }

    /// Appends a stage. Has no effect on a run already in progress.
    pub fn add_stage(&self, stage: Stage<T>) {
        self.inner.stages.write().push(stage);
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the configuration in use.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Returns a snapshot of the stages in declaration order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage<T>> {
        self.inner.stages.read().clone()
    }

    /// Returns the status stream.
    ///
    /// The stream closes after the pipeline-finished update.
    #[must_use]
    pub fn state(&self) -> Receiver<State> {
        self.inner.state_rx.clone()
    }

    /// Returns the alt-progress stream.
    ///
    /// The stream closes when the pipeline finishes.
    #[must_use]
    pub fn alt_progress(&self) -> Receiver<f32> {
        self.inner.alt_rx.clone()
    }

    /// Returns `(finished steps, total steps, fraction)` across all stages.
    #[must_use]
    pub fn current_progress(&self) -> (usize, usize, f32) {
        self.inner.current_progress()
    }

    /// Returns `(completed units, expected units, fraction)`.
    #[must_use]
    pub fn current_alt_progress(&self) -> (usize, usize, f32) {
        self.inner.current_alt_progress()
    }

    /// Sets the number of work units the run should expect.
    pub fn total(&self, value: usize) {
        ProgressMonitor::total(self.inner.as_ref(), value);
    }

    /// Records one completed work unit.
    pub async fn inc(&self) {
        ProgressMonitor::inc(self.inner.as_ref()).await;
    }

    /// Returns how long the run took, or has taken so far.
    ///
    /// Zero if the pipeline has not started.
    #[must_use]
    pub fn elapsed_time(&self) -> Duration {
        let times = self.inner.times.lock();
        match (times.started, times.finished) {
            (Some((start, _)), Some((end, _))) => end.duration_since(start),
            (Some((start, _)), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Returns when the run started.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.times.lock().started.map(|(_, at)| at)
    }

    /// Returns when the run finished.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.inner.times.lock().finished.map(|(_, at)| at)
    }

    /// Starts every stage and returns the output of the last one.
    ///
    /// Cancelling `token` kills the whole pipeline. The output closes once
    /// every stage has finished; call [`Pipeline::wait`] afterwards for the
    /// first error.
    pub async fn process(&self, token: &CancellationToken, input: Receiver<T>) -> Receiver<T> {
        let inner = &self.inner;
        inner.update_status(&inner.name, Status::PipelineStarted).await;

        inner.supervisor.link(token);
        let monitor: Arc<dyn ProgressMonitor> = inner.clone();
        let ctx = Context::with_monitor(inner.supervisor.dying(), &monitor);

        let stages = self.stages();
        info!(pipeline = %inner.name, stages = stages.len(), "Starting pipeline");

        let mut output = input;
        for stage in &stages {
            inner.update_status(stage.name(), Status::StageStarted).await;
            output = stage.process(&ctx, output).await;
        }

        self.track_stages(stages);
        output
    }

    fn track_stages(&self, stages: Vec<Stage<T>>) {
        let inner = self.inner.clone();

        self.inner.supervisor.spawn(move |_dying| async move {
            let inner = &inner;
            join_all(stages.iter().map(|stage| async move {
                stage.dead().await;
                inner.update_status(stage.name(), Status::StageFinished).await;
            }))
            .await;

            let failures = stages.iter().filter_map(|stage| stage.supervisor().failure());
            if let Some(failure) = Failure::earliest(failures) {
                inner.supervisor.adopt(failure);
            }

            inner.update_status(&inner.name, Status::PipelineFinished).await;
            inner.state_tx.close();
            inner.alt_tx.close();

            match inner.supervisor.error() {
                None => info!(pipeline = %inner.name, "Pipeline finished"),
                Some(err) => info!(pipeline = %inner.name, error = %err, "Pipeline failed"),
            }
            Ok(())
        });
        self.inner.supervisor.seal();
    }
}

impl<T> Pipeline<T> {
    /// Returns the supervisor of this pipeline.
    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.inner.supervisor
    }

    /// Requests every stage to stop.
    pub fn kill(&self, reason: Option<&str>) {
        self.inner.supervisor.kill(reason);
    }

    /// Waits for every stage and returns the earliest error.
    ///
    /// A step that only failed because its output closed yields to any
    /// other error.
    pub async fn wait(&self) -> TaskResult {
        self.inner.supervisor.wait().await
    }

    /// Waits until every stage has finished.
    pub async fn dead(&self) {
        self.inner.supervisor.dead().await;
    }

    /// Returns true once the run has finished.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.inner.supervisor.is_dead()
    }

    /// Returns true until the run has finished.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.supervisor.is_alive()
    }
}

impl<T> PipelineInner<T> {
    fn current_progress(&self) -> (usize, usize, f32) {
        let stages = self.stages.read();
        let (finished, total) = stages.iter().fold((0, 0), |(finished, total), stage| {
            let (done, count) = stage.step_progress();
            (finished + done, total + count)
        });
        (finished, total, fraction(finished, total))
    }

    fn current_alt_progress(&self) -> (usize, usize, f32) {
        let count = self.unit_count.load(Ordering::SeqCst);
        let total = self.unit_total.load(Ordering::SeqCst);
        (count, total, fraction(count, total))
    }

    fn record_time(&self, status: Status) {
        let now = (Instant::now(), Utc::now());
        let mut times = self.times.lock();
        match status {
            Status::PipelineStarted => {
                times.started = Some(now);
                times.finished = None;
            }
            Status::PipelineFinished => times.finished = Some(now),
            _ => {}
        }
    }

    /// Queues `value`, giving up after the configured timeout.
    async fn deliver<V>(&self, tx: &Sender<V>, value: V) -> bool {
        matches!(
            tokio::time::timeout(self.config.status_timeout(), tx.send(value)).await,
            Ok(Ok(()))
        )
    }
}

#[async_trait]
impl<T: Payload> ProgressMonitor for PipelineInner<T> {
    fn total(&self, value: usize) {
        self.unit_total.store(value, Ordering::SeqCst);
    }

    async fn inc(&self) {
        // Held across the send so emitted values never go backwards.
        let mut last = self.last_alt.lock().await;
        self.unit_count.fetch_add(1, Ordering::SeqCst);
        let (count, total, progress) = self.current_alt_progress();

        if progress - *last > self.config.progress_threshold || count == total {
            if self.deliver(&self.alt_tx, progress).await {
                *last = progress;
            } else {
                debug!(pipeline = %self.name, progress, "Dropped alt progress update");
            }
        }
    }

    async fn update_status(&self, name: &str, status: Status) {
        let _emitting = self.status_lock.lock().await;
        self.record_time(status);
        let (_, _, progress) = self.current_progress();
        let (_, _, alt_progress) = self.current_alt_progress();
        let state = State::new(name, status, progress, alt_progress);

        debug!(pipeline = %self.name, unit = %name, %status, progress, "Status update");
        if !self.deliver(&self.state_tx, state).await {
            debug!(pipeline = %self.name, unit = %name, %status, "Dropped status update");
        }
    }
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("stages", &self.inner.stages.read().len())
            .field("supervisor", &self.inner.supervisor)
            .finish_non_exhaustive()
    }
}
