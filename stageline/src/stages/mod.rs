//! Stages: ordered groups of steps.
//!
//! A serial stage chains its steps, each consuming the previous output. A
//! concurrent stage hands the same input to every step and merges their
//! outputs into one channel.

use crate::cancellation::{Failure, Supervisor, TaskResult};
use crate::channel::{channel, Receiver, UNBUFFERED};
use crate::context::Context;
use crate::core::{Payload, Status};
use crate::multiplexer::Multiplexer;
use crate::steps::{Step, StepFn};
use futures::future::join_all;
use tracing::debug;

/// A named group of steps run serially or concurrently.
///
/// Clones share the same supervisor.
pub struct Stage<T> {
    name: String,
    concurrent: bool,
    steps: Vec<Step<T>>,
    supervisor: Supervisor,
}

impl<T> Clone for Stage<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            concurrent: self.concurrent,
            steps: self.steps.clone(),
            supervisor: self.supervisor.clone(),
        }
    }
}

impl<T: Payload> Stage<T> {
    /// Creates a serial stage.
    pub fn new(name: impl Into<String>, steps: impl IntoIterator<Item = Step<T>>) -> Self {
        Self::serial(name, steps)
    }

    /// Creates a stage whose steps are chained in order.
    pub fn serial(name: impl Into<String>, steps: impl IntoIterator<Item = Step<T>>) -> Self {
        Self::build(name.into(), false, steps.into_iter().collect())
    }

    /// Creates a stage whose steps all read the stage input.
    pub fn concurrent(name: impl Into<String>, steps: impl IntoIterator<Item = Step<T>>) -> Self {
        Self::build(name.into(), true, steps.into_iter().collect())
    }

    /// Creates a serial stage with one single-worker step per function.
    ///
    /// Steps are named `"{stage}-{index}"`.
    pub fn serial_fn(name: impl Into<String>, funcs: impl IntoIterator<Item = StepFn<T>>) -> Self {
        let name = name.into();
        let steps = Self::steps_from_fns(&name, funcs);
        Self::build(name, false, steps)
    }

    /// Creates a concurrent stage with one single-worker step per function.
    ///
    /// Steps are named `"{stage}-{index}"`.
    pub fn concurrent_fn(
        name: impl Into<String>,
        funcs: impl IntoIterator<Item = StepFn<T>>,
    ) -> Self {
        let name = name.into();
        let steps = Self::steps_from_fns(&name, funcs);
        Self::build(name, true, steps)
    }

    fn build(name: String, concurrent: bool, steps: Vec<Step<T>>) -> Self {
        Self {
            supervisor: Supervisor::new(name.clone()),
            name,
            concurrent,
            steps,
        }
    }

    fn steps_from_fns(name: &str, funcs: impl IntoIterator<Item = StepFn<T>>) -> Vec<Step<T>> {
        funcs
            .into_iter()
            .enumerate()
            .map(|(index, func)| Step::from_fn(format!("{name}-{index}"), func))
            .collect()
    }

    /// Appends a step.
    pub fn add_step(&mut self, step: Step<T>) {
        self.steps.push(step);
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if steps run side by side on the same input.
    #[must_use]
    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    /// Returns the steps in declaration order.
    #[must_use]
    pub fn steps(&self) -> &[Step<T>] {
        &self.steps
    }

    /// Starts every step and returns the stage output.
    ///
    /// A step-started status is reported right before each step starts.
    pub async fn process(&self, ctx: &Context, input: Receiver<T>) -> Receiver<T> {
        self.supervisor.link(ctx.token());
        let ctx = ctx.scoped(self.supervisor.dying());

        debug!(
            stage = %self.name,
            steps = self.steps.len(),
            concurrent = self.concurrent,
            "Starting stage"
        );

        if self.concurrent {
            let mut outputs = Vec::with_capacity(self.steps.len());
            for step in &self.steps {
                ctx.update_status(step.name(), Status::StepStarted).await;
                outputs.push(step.process(&ctx, input.clone()));
            }
            let mut mux = Multiplexer::merge(format!("{}/merge", self.name), outputs);
            mux.supervisor().link(&self.supervisor.dying());
            let merged = mux.take_output();
            self.track_steps(ctx, Some(mux));
            return merged.unwrap_or_else(|| channel(UNBUFFERED).1);
        }

        let mut output = input;
        for step in &self.steps {
            ctx.update_status(step.name(), Status::StepStarted).await;
            output = step.process(&ctx, output);
        }
        self.track_steps(ctx, None);
        output
    }

    /// Joins every step, reporting each as it finishes.
    ///
    /// The merge of a concurrent stage is drained and closed last. The
    /// earliest step failure becomes the stage error; a step that stopped
    /// only because its output closed loses to any other failure.
    fn track_steps(&self, ctx: Context, mux: Option<Multiplexer<T>>) {
        let steps = self.steps.clone();
        let name = self.name.clone();
        let supervisor = self.supervisor.clone();

        self.supervisor.spawn(move |_dying| async move {
            let ctx = &ctx;
            join_all(steps.iter().map(|step| async move {
                step.dead().await;
                ctx.update_status(step.name(), Status::StepFinished).await;
            }))
            .await;

            let mut failures: Vec<Failure> = steps
                .iter()
                .filter_map(|step| step.supervisor().failure())
                .collect();
            if let Some(mux) = mux {
                let _ = mux.wait().await;
                failures.extend(mux.supervisor().failure());
                mux.close().await;
            }
            if let Some(failure) = Failure::earliest(failures) {
                supervisor.adopt(failure);
            }
            debug!(stage = %name, "Stage finished");

            Ok(())
        });
        self.supervisor.seal();
    }
}

impl<T> Stage<T> {
    /// Returns the supervisor of this stage.
    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Requests every step to stop.
    pub fn kill(&self, reason: Option<&str>) {
        self.supervisor.kill(reason);
    }

    /// Waits for every step and returns the earliest step error.
    ///
    /// Errors raised at the same moment resolve by declaration order.
    pub async fn wait(&self) -> TaskResult {
        self.supervisor.wait().await
    }

    /// Waits until every step has finished.
    pub async fn dead(&self) {
        self.supervisor.dead().await;
    }

    /// Returns true once every step has finished.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.supervisor.is_dead()
    }

    /// Returns true until the stage has finished.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.supervisor.is_alive()
    }

    /// Returns `(finished, total)` step counts.
    #[must_use]
    pub fn step_progress(&self) -> (usize, usize) {
        let finished = self.steps.iter().filter(|step| step.is_dead()).count();
        (finished, self.steps.len())
    }
}

impl<T> std::fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("concurrent", &self.concurrent)
            .field("steps", &self.steps)
            .field("supervisor", &self.supervisor)
            .finish()
    }
}
