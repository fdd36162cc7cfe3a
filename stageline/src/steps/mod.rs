//! Steps: worker pools wrapped around a single user function.
//!
//! A step is the smallest execution unit of a pipeline. Its workers either
//! compete for the values of one shared input, or, in broadcast mode, each
//! receive a full copy of the input stream.

use crate::cancellation::{Supervisor, TaskResult};
use crate::channel::{channel, Receiver, Sender, UNBUFFERED};
use crate::context::Context;
use crate::core::Payload;
use crate::errors::{PipelineError, SendError};
use crate::multiplexer::Multiplexer;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Upper bound for the number of workers of one step.
pub const MAX_WORKER_COUNT: usize = 20;

/// Capacity of the output channel of a buffered step.
pub const MAX_BUFFER_SIZE: usize = 10;

/// A boxed worker function.
///
/// Workers read from the input until it closes or the context is cancelled,
/// writing any number of values to the output.
pub type StepFn<T> = Arc<
    dyn Fn(Context, Receiver<T>, Sender<T>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// Boxes a worker function into a [`StepFn`].
pub fn step_fn<T, F, Fut>(func: F) -> StepFn<T>
where
    T: Payload,
    F: Fn(Context, Receiver<T>, Sender<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, input, output| func(ctx, input, output).boxed())
}

/// Wraps a worker's error, telling closed-output failures apart.
fn worker_error<T: Payload>(step: String, err: anyhow::Error) -> PipelineError {
    let closed = err.downcast_ref::<SendError<T>>().is_some()
        || err
            .downcast_ref::<PipelineError>()
            .is_some_and(PipelineError::is_disconnected);
    if closed {
        PipelineError::disconnected(step)
    } else {
        PipelineError::worker(step, err)
    }
}

/// A named worker pool over one function.
///
/// Clones share the same supervisor, so a clone kept by the caller observes
/// the step after it has been handed to a stage.
pub struct Step<T> {
    name: String,
    workers: usize,
    buffered: bool,
    broadcast: bool,
    func: StepFn<T>,
    supervisor: Supervisor,
}

impl<T> Clone for Step<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            workers: self.workers,
            buffered: self.buffered,
            broadcast: self.broadcast,
            func: self.func.clone(),
            supervisor: self.supervisor.clone(),
        }
    }
}

impl<T: Payload> Step<T> {
    /// Creates a single-worker step.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Context, Receiver<T>, Sender<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_fn(name, step_fn(func))
    }

    /// Creates a step whose `workers` compete for input values.
    pub fn worker<F, Fut>(name: impl Into<String>, workers: usize, func: F) -> Self
    where
        F: Fn(Context, Receiver<T>, Sender<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(name, func).with_workers(workers)
    }

    /// Creates a single-worker step with a buffered output.
    pub fn buffered<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Context, Receiver<T>, Sender<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(name, func).with_buffered(true)
    }

    /// Creates a step whose `workers` each process the whole input.
    pub fn fan_out<F, Fut>(name: impl Into<String>, workers: usize, func: F) -> Self
    where
        F: Fn(Context, Receiver<T>, Sender<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(name, func)
            .with_workers(workers)
            .with_broadcast(true)
    }

    /// Creates a single-worker step from an already boxed function.
    pub fn from_fn(name: impl Into<String>, func: StepFn<T>) -> Self {
        let name = name.into();
        Self {
            supervisor: Supervisor::new(name.clone()),
            name,
            workers: 1,
            buffered: false,
            broadcast: false,
            func,
        }
    }

    /// Sets the worker count, clamped to `1..=MAX_WORKER_COUNT`.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, MAX_WORKER_COUNT);
        self
    }

    /// Sets whether the output channel is buffered.
    #[must_use]
    pub fn with_buffered(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    /// Sets whether every worker receives the whole input.
    #[must_use]
    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Returns true if the output channel is buffered.
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Returns true if workers receive a copy of every input value.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    /// Returns the capacity of the output channel.
    #[must_use]
    pub fn capacity(&self) -> usize {
        if self.buffered {
            MAX_BUFFER_SIZE
        } else {
            UNBUFFERED
        }
    }

    /// Starts the workers and returns the output channel.
    ///
    /// The step closes the output once every worker has returned. Killing
    /// the context's scope kills the step; killing the step leaves the
    /// parent untouched.
    pub fn process(&self, ctx: &Context, input: Receiver<T>) -> Receiver<T> {
        self.supervisor.link(ctx.token());
        let ctx = ctx.scoped(self.supervisor.dying());
        let (tx, rx) = channel(self.capacity());

        debug!(
            step = %self.name,
            workers = self.workers,
            buffered = self.buffered,
            broadcast = self.broadcast,
            "Starting step"
        );

        let mut mux = self.broadcast.then(|| {
            Multiplexer::broadcast(format!("{}/broadcast", self.name), input.clone(), self.workers)
        });
        let inputs = match mux.as_mut() {
            Some(mux) => mux.take_outputs(),
            None => vec![input; self.workers],
        };

        let handles: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                let func = self.func.clone();
                let ctx = ctx.clone();
                let output = tx.clone();
                let name = self.name.clone();
                self.supervisor.spawn(move |_dying| async move {
                    func(ctx, input, output)
                        .await
                        .map_err(|err| worker_error::<T>(name, err))
                })
            })
            .collect();

        let name = self.name.clone();
        self.supervisor.spawn(move |_dying| async move {
            join_all(handles).await;
            if let Some(mux) = mux {
                mux.close().await;
            }
            tx.close();
            debug!(step = %name, "Step output closed");
            Ok(())
        });
        self.supervisor.seal();

        rx
    }

    /// Returns `count` fresh copies of this step.
    ///
    /// Copies share the name, function and settings but run independently.
    #[must_use]
    pub fn replicated(&self, count: usize) -> Vec<Self> {
        (0..count)
            .map(|_| {
                Self::from_fn(self.name.clone(), self.func.clone())
                    .with_workers(self.workers)
                    .with_buffered(self.buffered)
                    .with_broadcast(self.broadcast)
            })
            .collect()
    }
}

impl<T> Step<T> {
    /// Returns the supervisor of this step.
    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Requests every worker to stop.
    pub fn kill(&self, reason: Option<&str>) {
        self.supervisor.kill(reason);
    }

    /// Waits for the step to finish and returns its first error.
    pub async fn wait(&self) -> TaskResult {
        self.supervisor.wait().await
    }

    /// Waits until every worker has returned and the output is closed.
    pub async fn dead(&self) {
        self.supervisor.dead().await;
    }

    /// Returns true once the step has finished.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.supervisor.is_dead()
    }

    /// Returns true until the step has finished.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.supervisor.is_alive()
    }
}

impl<T> std::fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("buffered", &self.buffered)
            .field("broadcast", &self.broadcast)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}
