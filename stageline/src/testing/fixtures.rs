//! Input fixtures for pipeline testing.

use crate::channel::{channel, Receiver, UNBUFFERED};
use crate::core::Payload;

/// Returns a channel fed with `values` by a background task.
///
/// The channel closes after the last value, or early if nobody reads it
/// any more.
pub fn feed<T, I>(values: I) -> Receiver<T>
where
    T: Payload,
    I: IntoIterator<Item = T> + Send + 'static,
    I::IntoIter: Send,
{
    let (tx, rx) = channel(UNBUFFERED);
    tokio::spawn(async move {
        for value in values {
            if tx.send(value).await.is_err() {
                break;
            }
        }
        tx.close();
    });
    rx
}

/// Returns a channel that never yields and never closes.
///
/// The sender is leaked into a task that waits forever, which keeps the
/// channel open for the lifetime of the runtime.
pub fn pending<T: Payload>() -> Receiver<T> {
    let (tx, rx) = channel(UNBUFFERED);
    tokio::spawn(async move {
        std::future::pending::<()>().await;
        drop(tx);
    });
    rx
}
