//! Supervisor for a tree of related async tasks.

use crate::errors::PipelineError;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Result returned by every supervised task.
pub type TaskResult = Result<(), PipelineError>;

static FAILURE_SEQ: AtomicU64 = AtomicU64::new(0);

/// An error stamped with the order in which it was first recorded.
///
/// The stamp travels with the error when a parent adopts a child's
/// failure, so errors from different branches of the tree compare by when
/// they actually happened.
#[derive(Debug, Clone)]
pub struct Failure {
    seq: u64,
    error: PipelineError,
}

impl Failure {
    fn new(error: PipelineError) -> Self {
        Self {
            seq: FAILURE_SEQ.fetch_add(1, Ordering::SeqCst),
            error,
        }
    }

    /// Returns the recorded error.
    #[must_use]
    pub fn error(&self) -> &PipelineError {
        &self.error
    }

    /// Picks the failure a unit should report.
    ///
    /// Closed-channel errors rank after every other error, then earlier
    /// failures rank first. On equal rank the first listed wins.
    pub fn earliest(failures: impl IntoIterator<Item = Failure>) -> Option<Failure> {
        failures.into_iter().min_by_key(Failure::rank)
    }

    fn rank(&self) -> (bool, u64) {
        (self.error.is_disconnected(), self.seq)
    }
}

/// Tracks the tasks of one unit (step, stage, pipeline or multiplexer).
///
/// Tasks observe the *dying* token and return when it fires. The unit is
/// *dead* once it has been sealed and every spawned task has returned. The
/// first error returned by any task is kept and also kills the unit, so
/// sibling tasks stop early.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    /// Name of the owning unit, used in logs and panic errors.
    name: String,
    /// Cancelled when the unit is killed.
    dying: CancellationToken,
    /// Tasks spawned by the unit.
    tracker: TaskTracker,
    /// Set by the first spawn.
    started: AtomicBool,
    /// The error this unit reports.
    first_error: Mutex<Option<Failure>>,
    /// The first kill reason.
    kill_reason: Mutex<Option<String>>,
}

impl Supervisor {
    /// Creates a new supervisor for the named unit.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                dying: CancellationToken::new(),
                tracker: TaskTracker::new(),
                started: AtomicBool::new(false),
                first_error: Mutex::new(None),
                kill_reason: Mutex::new(None),
            }),
        }
    }

    /// Returns the name of the supervised unit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the token that fires when the unit starts dying.
    #[must_use]
    pub fn dying(&self) -> CancellationToken {
        self.inner.dying.clone()
    }

    /// Returns true once the unit has been killed.
    #[must_use]
    pub fn is_dying(&self) -> bool {
        self.inner.dying.is_cancelled()
    }

    /// Spawns a task owned by this unit.
    ///
    /// The task receives the dying token. Panics are caught and reported as
    /// [`PipelineError::Panicked`].
    pub fn spawn<F, Fut>(&self, task: F) -> JoinHandle<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.inner.started.store(true, Ordering::SeqCst);
        let fut = task(self.dying());
        let inner = self.inner.clone();

        self.inner.tracker.spawn(async move {
            let result = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(PipelineError::panicked(&inner.name, payload.as_ref())),
            };
            if let Err(err) = result {
                inner.fail(err);
            }
        })
    }

    /// Marks that no more tasks will be spawned.
    ///
    /// The unit cannot become dead before it is sealed.
    pub fn seal(&self) {
        self.inner.tracker.close();
    }

    /// Kills this unit when `parent` is cancelled.
    ///
    /// The link is dropped once the unit is dead.
    pub fn link(&self, parent: &CancellationToken) {
        let parent = parent.clone();
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = parent.cancelled() => this.kill(Some("parent cancelled")),
                () = this.inner.tracker.wait() => {}
            }
        });
    }

    /// Requests cancellation of every task.
    ///
    /// Only the first reason is kept. Killing a dead unit does nothing.
    pub fn kill(&self, reason: Option<&str>) {
        if let Some(reason) = reason {
            let mut kill_reason = self.inner.kill_reason.lock();
            if kill_reason.is_none() {
                *kill_reason = Some(reason.to_string());
            }
        }
        if !self.inner.dying.is_cancelled() {
            debug!(unit = %self.inner.name, reason = ?reason, "Killing unit");
            self.inner.dying.cancel();
        }
    }

    /// Returns the first kill reason, if any.
    #[must_use]
    pub fn kill_reason(&self) -> Option<String> {
        self.inner.kill_reason.lock().clone()
    }

    /// Returns true once every task has returned.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
            && self.inner.tracker.is_closed()
            && self.inner.tracker.is_empty()
    }

    /// Returns true while the unit has tasks that may still run.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.is_dead()
    }

    /// Waits until the unit is dead.
    ///
    /// Returns immediately for a unit that never spawned a task.
    pub async fn dead(&self) {
        if self.inner.started.load(Ordering::SeqCst) {
            self.inner.tracker.wait().await;
        }
    }

    /// Waits until the unit is dead and returns its first error.
    pub async fn wait(&self) -> TaskResult {
        self.dead().await;
        self.error().map_or(Ok(()), Err)
    }

    /// Returns the error this unit reports so far.
    #[must_use]
    pub fn error(&self) -> Option<PipelineError> {
        self.failure().map(|failure| failure.error)
    }

    /// Returns the reported error together with its stamp.
    #[must_use]
    pub fn failure(&self) -> Option<Failure> {
        self.inner.first_error.lock().clone()
    }

    /// Records a child's failure as this unit's own, keeping its stamp.
    ///
    /// Replaces the current error only if `failure` ranks before it.
    pub fn adopt(&self, failure: Failure) {
        self.inner.record(failure);
    }

    /// Returns the number of tasks still running.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.tracker.len()
    }
}

impl Inner {
    fn fail(&self, err: PipelineError) {
        self.record(Failure::new(err));
    }

    fn record(&self, failure: Failure) {
        {
            let mut first_error = self.first_error.lock();
            if first_error
                .as_ref()
                .is_some_and(|current| current.rank() <= failure.rank())
            {
                return;
            }
            warn!(unit = %self.name, error = %failure.error, "Task failed");
            *first_error = Some(failure);
        }
        self.dying.cancel();
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("name", &self.inner.name)
            .field("task_count", &self.task_count())
            .field("dying", &self.is_dying())
            .field("dead", &self.is_dead())
            .finish()
    }
}
