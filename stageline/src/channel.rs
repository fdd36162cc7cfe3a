//! Channels connecting steps, stages and pipelines.
//!
//! A [`Sender`] may be cloned and shared by many writers. Closing any clone
//! closes the channel for all of them; values sent afterwards are handed back
//! as [`SendError`]. A [`Receiver`] may also be cloned: clones compete for
//! values, so each value is received by exactly one reader.

use crate::errors::SendError;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Capacity used for unbuffered channels.
///
/// tokio channels need room for at least one value.
pub const UNBUFFERED: usize = 1;

/// Creates a channel holding up to `capacity` values.
///
/// A capacity of zero is treated as [`UNBUFFERED`].
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(UNBUFFERED));
    (
        Sender {
            inner: Arc::new(RwLock::new(Some(tx))),
        },
        Receiver {
            inner: Arc::new(Mutex::new(rx)),
        },
    )
}

/// The writing half of a channel.
pub struct Sender<T> {
    inner: Arc<RwLock<Option<mpsc::Sender<T>>>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Sender<T> {
    /// Sends a value, waiting for capacity.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        let tx = self.inner.read().clone();
        match tx {
            Some(tx) => tx.send(value).await.map_err(|e| SendError(e.0)),
            None => Err(SendError(value)),
        }
    }

    /// Closes the channel for every clone of this sender.
    ///
    /// Closing an already closed channel does nothing.
    pub fn close(&self) {
        self.inner.write().take();
    }

    /// Returns true once the channel was closed or every receiver dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.read().as_ref().map_or(true, mpsc::Sender::is_closed)
    }
}

impl<T> std::fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The reading half of a channel.
pub struct Receiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Receiver<T> {
    /// Receives the next value, or `None` once the channel is closed and drained.
    ///
    /// Cancel safe: dropping the future never loses a value.
    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }

    /// Receives a value without waiting.
    ///
    /// Returns `None` when the channel is empty, closed, or another clone is
    /// currently waiting in [`Receiver::recv`]. A waiting reader gets the
    /// next value first.
    pub fn try_recv(&self) -> Option<T> {
        self.inner.try_lock().ok()?.try_recv().ok()
    }

    /// Drains the channel until it closes, collecting every value.
    pub async fn collect(&self) -> Vec<T> {
        let mut values = Vec::new();
        while let Some(value) = self.recv().await {
            values.push(value);
        }
        values
    }
}

impl<T> std::fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_send_and_close() {
        let (tx, rx) = channel(4);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        tx.close();

        assert_eq!(rx.collect().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_send_after_close_returns_value() {
        let (tx, _rx) = channel(1);
        tx.close();
        tx.close();

        assert!(tx.is_closed());
        assert_eq!(tx.send(7).await, Err(SendError(7)));
    }

    #[tokio::test]
    async fn test_close_from_any_clone() {
        let (tx, rx) = channel::<u8>(1);
        let writer = tx.clone();
        writer.close();

        assert!(tx.is_closed());
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_unbuffered() {
        let (tx, rx) = channel(0);
        tx.send("a").await.unwrap();
        assert_eq!(rx.try_recv(), Some("a"));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_try_recv_yields_to_waiting_reader() {
        let (tx, rx) = channel(4);
        let waiting = rx.clone();
        let reader = tokio::spawn(async move { waiting.recv().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(rx.try_recv(), None);
        tx.send(5).await.unwrap();
        assert_eq!(reader.await.unwrap(), Some(5));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cloned_receivers_compete() {
        let (tx, rx) = channel(8);
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let rx = rx.clone();
                tokio::spawn(async move { rx.collect().await })
            })
            .collect();

        for i in 0..100 {
            tx.send(i).await.unwrap();
        }
        tx.close();

        let mut all = Vec::new();
        for reader in readers {
            all.extend(reader.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
