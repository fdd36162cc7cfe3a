//! Fan-in and fan-out multiplexing between channels.
//!
//! A merge forwards several inputs into one output with no ordering
//! guarantee across inputs. A broadcast copies every input value to each of
//! its outputs in turn, so all outputs see the same ordered sequence.
//!
//! Outputs are only closed by a teardown task once every forwarding task has
//! returned, which rules out sends on a closed channel.

use crate::cancellation::{Supervisor, TaskResult};
use crate::channel::{channel, Receiver, Sender, UNBUFFERED};
use crate::core::Payload;
use tracing::debug;

/// A supervised merge or broadcast between channels.
pub struct Multiplexer<T> {
    supervisor: Supervisor,
    senders: Vec<Sender<T>>,
    outputs: Vec<Receiver<T>>,
}

impl<T: Payload> Multiplexer<T> {
    /// Merges `inputs` into a single output channel.
    ///
    /// One task per input forwards values until that input closes or the
    /// multiplexer is killed.
    pub fn merge(name: impl Into<String>, inputs: Vec<Receiver<T>>) -> Self {
        let supervisor = Supervisor::new(name);
        let (tx, rx) = channel(UNBUFFERED);

        debug!(unit = %supervisor.name(), inputs = inputs.len(), "Starting merge");
        for input in inputs {
            let out = tx.clone();
            supervisor.spawn(move |dying| async move {
                loop {
                    let value = tokio::select! {
                        () = dying.cancelled() => return Ok(()),
                        value = input.recv() => value,
                    };
                    let Some(value) = value else {
                        return Ok(());
                    };
                    tokio::select! {
                        () = dying.cancelled() => return Ok(()),
                        sent = out.send(value) => if sent.is_err() {
                            return Ok(());
                        },
                    }
                }
            });
        }

        let mux = Self {
            supervisor,
            senders: vec![tx],
            outputs: vec![rx],
        };
        mux.teardown();
        mux
    }

    /// Copies every value of `input` to `count` output channels.
    ///
    /// The next input value is read only after the current one has been
    /// accepted by every output or the multiplexer is killed.
    pub fn broadcast(name: impl Into<String>, input: Receiver<T>, count: usize) -> Self {
        let supervisor = Supervisor::new(name);
        let (senders, outputs): (Vec<_>, Vec<_>) =
            (0..count).map(|_| channel(UNBUFFERED)).unzip();

        debug!(unit = %supervisor.name(), outputs = count, "Starting broadcast");
        let outs = senders.clone();
        supervisor.spawn(move |dying| async move {
            loop {
                let value = tokio::select! {
                    () = dying.cancelled() => return Ok(()),
                    value = input.recv() => value,
                };
                let Some(value) = value else {
                    return Ok(());
                };
                if !send_all(&outs, &value, &dying).await {
                    return Ok(());
                }
            }
        });

        let mux = Self {
            supervisor,
            senders,
            outputs,
        };
        mux.teardown();
        mux
    }

    /// Hands out the merged output channel.
    ///
    /// For a broadcast this is the first output. Returns `None` once the
    /// outputs have been taken.
    pub fn take_output(&mut self) -> Option<Receiver<T>> {
        self.take_outputs().into_iter().next()
    }

    /// Hands out every output channel, in order.
    ///
    /// The multiplexer keeps no reader of its own, so an output whose
    /// readers are all dropped stops receiving values.
    pub fn take_outputs(&mut self) -> Vec<Receiver<T>> {
        std::mem::take(&mut self.outputs)
    }

    /// Returns the supervisor of this multiplexer.
    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Requests every forwarding task to stop.
    pub fn kill(&self, reason: Option<&str>) {
        self.supervisor.kill(reason);
    }

    /// Waits for every forwarding task to return.
    pub async fn wait(&self) -> TaskResult {
        self.supervisor.wait().await
    }

    /// Kills the multiplexer, waits for its tasks and closes every output.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        self.supervisor.kill(None);
        self.supervisor.dead().await;
        close_all(&self.senders);
    }

    /// Closes the outputs once the supervisor reports every task dead.
    fn teardown(&self) {
        self.supervisor.seal();
        let supervisor = self.supervisor.clone();
        let senders = self.senders.clone();
        tokio::spawn(async move {
            supervisor.dead().await;
            close_all(&senders);
            debug!(unit = %supervisor.name(), "Multiplexer closed");
        });
    }
}

impl<T> std::fmt::Debug for Multiplexer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("supervisor", &self.supervisor)
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// Offers `value` to every output still read by someone.
///
/// Returns false once no output accepts values or the multiplexer is
/// dying.
async fn send_all<T: Payload>(
    outs: &[Sender<T>],
    value: &T,
    dying: &tokio_util::sync::CancellationToken,
) -> bool {
    let mut accepted = false;
    for out in outs {
        tokio::select! {
            () = dying.cancelled() => return false,
            sent = out.send(value.clone()) => accepted |= sent.is_ok(),
        }
    }
    accepted
}

fn close_all<T>(senders: &[Sender<T>]) {
    for sender in senders {
        sender.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio_test::assert_ok;

    async fn feed(values: Vec<i32>) -> Receiver<i32> {
        let (tx, rx) = channel(UNBUFFERED);
        tokio::spawn(async move {
            for v in values {
                if tx.send(v).await.is_err() {
                    break;
                }
            }
            tx.close();
        });
        rx
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_merge_collects_every_value() {
        let a = feed(vec![1, 2, 3]).await;
        let b = feed(vec![10, 20]).await;
        let c = feed(vec![]).await;

        let mut mux = Multiplexer::merge("merge", vec![a, b, c]);
        let mut values = mux.take_output().unwrap().collect().await;
        values.sort_unstable();

        assert_eq!(values, vec![1, 2, 3, 10, 20]);
        assert_ok!(mux.wait().await);
    }

    #[tokio::test]
    async fn test_merge_without_inputs_closes() {
        let mut mux = Multiplexer::<i32>::merge("empty", Vec::new());
        assert_eq!(mux.take_output().unwrap().recv().await, None);
        assert!(mux.take_output().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_broadcast_preserves_order_per_output() {
        let input = feed((0..20).collect()).await;
        let mut mux = Multiplexer::broadcast("fan", input, 3);

        let readers: Vec<_> = mux
            .take_outputs()
            .into_iter()
            .map(|rx| tokio::spawn(async move { rx.collect().await }))
            .collect();

        for reader in readers {
            assert_eq!(reader.await.unwrap(), (0..20).collect::<Vec<_>>());
        }
        assert_ok!(mux.wait().await);
    }

    #[tokio::test]
    async fn test_kill_closes_outputs() {
        let (_tx, input) = channel::<i32>(UNBUFFERED);
        let mut mux = Multiplexer::broadcast("stuck", input, 2);
        let outputs = mux.take_outputs();

        mux.kill(None);
        assert_ok!(mux.wait().await);

        for rx in &outputs {
            let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
            assert_eq!(closed, Ok(None));
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_tx, input) = channel::<i32>(UNBUFFERED);
        let mut mux = Multiplexer::merge("merge", vec![input]);
        let output = mux.take_output().unwrap();

        mux.close().await;
        mux.close().await;
        mux.kill(Some("again"));

        assert_eq!(output.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_merge_finishes_when_output_is_dropped() {
        let mut mux = Multiplexer::merge("merge", vec![feed((0..100).collect()).await]);
        drop(mux.take_output());

        tokio::time::timeout(Duration::from_secs(1), mux.wait())
            .await
            .expect("merge should stop once nobody reads its output")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_broadcast_skips_dropped_outputs() {
        let mut mux = Multiplexer::broadcast("fan", feed((0..20).collect()).await, 3);
        let mut outputs = mux.take_outputs();
        drop(outputs.remove(1));

        let readers: Vec<_> = outputs
            .into_iter()
            .map(|rx| tokio::spawn(async move { rx.collect().await }))
            .collect();
        for reader in readers {
            assert_eq!(reader.await.unwrap(), (0..20).collect::<Vec<_>>());
        }
        assert_ok!(mux.wait().await);
    }
}
