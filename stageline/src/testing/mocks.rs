//! Mock progress monitors for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::context::{Context, ProgressMonitor};
use crate::core::Status;

/// A monitor that records every call it receives.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    total: AtomicUsize,
    count: AtomicUsize,
    statuses: Mutex<Vec<(String, Status)>>,
}

impl RecordingMonitor {
    /// Creates a new recording monitor.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a context bound to `token` that reports to this monitor.
    ///
    /// The context stays attached for as long as `self` is alive.
    #[must_use]
    pub fn context(self: &Arc<Self>, token: CancellationToken) -> Context {
        let handle: Arc<dyn ProgressMonitor> = self.clone();
        Context::with_monitor(token, &handle)
    }

    /// Returns the last declared unit total.
    #[must_use]
    pub fn unit_total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Returns the number of recorded increments.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Returns every recorded status transition, in arrival order.
    #[must_use]
    pub fn statuses(&self) -> Vec<(String, Status)> {
        self.statuses.lock().clone()
    }

    /// Returns the names reported with `status`, in arrival order.
    #[must_use]
    pub fn names_with(&self, status: Status) -> Vec<String> {
        self.statuses
            .lock()
            .iter()
            .filter(|(_, s)| *s == status)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ProgressMonitor for RecordingMonitor {
    fn total(&self, value: usize) {
        self.total.store(value, Ordering::SeqCst);
    }

    async fn inc(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    async fn update_status(&self, name: &str, status: Status) {
        self.statuses.lock().push((name.to_string(), status));
    }
}
