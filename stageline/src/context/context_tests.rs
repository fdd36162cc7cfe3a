//! Tests for the context module.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::context::{Context, ProgressMonitor};
    use crate::core::Status;
    use crate::testing::RecordingMonitor;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_detached_context_is_noop() {
        let ctx = Context::background();
        ctx.total(10);
        ctx.inc().await;
        ctx.update_status("step", Status::StepStarted).await;

        assert!(!ctx.has_pipeline());
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_calls_route_to_monitor() {
        let monitor = RecordingMonitor::new();
        let ctx = monitor.context(CancellationToken::new());

        ctx.total(3);
        ctx.inc().await;
        ctx.inc().await;
        ctx.update_status("loader", Status::StageStarted).await;

        assert!(ctx.has_pipeline());
        assert_eq!(monitor.unit_total(), 3);
        assert_eq!(monitor.unit_count(), 2);
        assert_eq!(
            monitor.statuses(),
            vec![("loader".to_string(), Status::StageStarted)]
        );
    }

    #[tokio::test]
    async fn test_dropped_monitor_is_noop() {
        let monitor: Arc<dyn ProgressMonitor> = RecordingMonitor::new();
        let ctx = Context::with_monitor(CancellationToken::new(), &monitor);
        drop(monitor);

        ctx.total(5);
        ctx.inc().await;
        assert!(!ctx.has_pipeline());
    }

    #[tokio::test]
    async fn test_scoped_keeps_pipeline_and_swaps_token() {
        let monitor = RecordingMonitor::new();
        let parent = monitor.context(CancellationToken::new());

        let child_token = CancellationToken::new();
        let child = parent.scoped(child_token.clone());
        child_token.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
        child.inc().await;
        assert_eq!(monitor.unit_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_resolves() {
        let token = CancellationToken::new();
        let ctx = Context::new(token.clone());
        token.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }
}
