//! One-shot completion signal for an event stream.
//!
//! Settled exactly once, when the final event has been delivered and the
//! subscriber has been completed. The error path never settles it: failing
//! the wider request is owned by the enclosing machinery, which has retry
//! context this crate lacks. Any number of [`StreamCompletion`] handles may
//! wait on the same signal.

use thiserror::Error;
use tokio::sync::watch;

/// The transformer was dropped before the stream completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("event stream was dropped before completing")]
pub struct StreamAbandoned;

/// Sending half: settles the signal when delivery finishes.
#[derive(Debug)]
pub(crate) struct CompletionNotifier {
    tx: watch::Sender<bool>,
}

impl CompletionNotifier {
    /// Mark the stream complete. Idempotent; waiters wake at most once.
    pub(crate) fn settle(&self) {
        let _ = self.tx.send(true);
    }
}

/// Waiting half of the completion signal. Cheap to clone.
#[derive(Clone, Debug)]
pub struct StreamCompletion {
    rx: watch::Receiver<bool>,
}

impl StreamCompletion {
    /// Whether the stream has already completed.
    #[must_use]
    pub fn is_complete(&self) -> bool { *self.rx.borrow() }

    /// Wait until the final event has been delivered.
    ///
    /// # Errors
    ///
    /// Returns [`StreamAbandoned`] if the transformer was dropped without
    /// completing, which happens when the stream errored or was cancelled.
    pub async fn wait(mut self) -> Result<(), StreamAbandoned> {
        while !*self.rx.borrow_and_update() {
            self.rx.changed().await.map_err(|_| StreamAbandoned)?;
        }
        Ok(())
    }
}

/// Create a connected notifier/waiter pair.
pub(crate) fn completion_channel() -> (CompletionNotifier, StreamCompletion) {
    let (tx, rx) = watch::channel(false);
    (CompletionNotifier { tx }, StreamCompletion { rx })
}
