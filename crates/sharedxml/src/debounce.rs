//! Coalescing of bursts of change notifications
//!
//! All notifications arriving within `window` of the first one in a batch are
//! collapsed into a single run of the downstream action. Nothing is lost: the
//! action re-reads the current state, only the number of runs is reduced.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sending side; cheap to clone and callable from synchronous listeners
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<()>,
}

impl Notifier {
    /// Returns false once the receiving side has gone away
    pub fn notify(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Receiving side that groups notifications into batches
#[derive(Debug)]
pub struct Coalescer {
    rx: mpsc::UnboundedReceiver<()>,
}

pub fn channel() -> (Notifier, Coalescer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Notifier { tx }, Coalescer { rx })
}

impl Coalescer {
    /// Wait for the first notification, then for `window`, and return how many
    /// notifications the batch absorbed. `None` when every notifier is dropped
    /// and nothing is pending.
    pub async fn next_batch(&mut self, window: Duration) -> Option<usize> {
        self.rx.recv().await?;
        let mut count = 1;
        tokio::time::sleep(window).await;
        while self.rx.try_recv().is_ok() {
            count += 1;
        }
        Some(count)
    }
}

/// Run `action` at most once per batch until every notifier is dropped
pub fn spawn_debounced<F, Fut>(mut coalescer: Coalescer, window: Duration, mut action: F) -> JoinHandle<()>
where
    F: FnMut(usize) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(absorbed) = coalescer.next_batch(window).await {
            action(absorbed).await;
        }
    })
}
