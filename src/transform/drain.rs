//! Lease-guarded delivery of queued events to the subscriber.
//!
//! A drain task runs on the injected executor and owns the delivery lease
//! for its lifetime. The loop re-acquires the state lock per iteration and
//! never holds it across a subscriber callback, so subscribers may call
//! `request` (or `cancel`) from inside `on_next` without re-entrancy. After
//! a bounded batch the task re-spawns itself, keeping any one task's stint
//! on the executor short.

use std::sync::Arc;

use super::{Followup, Shared};

/// Deliveries performed before a drain task yields the executor.
const DRAIN_BATCH_LIMIT: usize = 32;

enum Step<E> {
    /// The end-of-stream marker is at the head; run the completion path.
    Finish,
    /// An event was popped and demand consumed; deliver it.
    Deliver(E),
    /// Queue empty or demand exhausted; the lease was released.
    Park { request_bytes: bool },
}

impl<R, E> Shared<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    /// Start a drain task. The caller must have claimed the delivery lease.
    pub(super) fn spawn_drain(self: Arc<Self>) {
        let executor = self.executor.clone();
        executor.spawn(async move { self.drain() });
    }

    fn drain(self: Arc<Self>) {
        let mut delivered = 0usize;
        loop {
            let step = {
                let mut state = self.state_lock();
                if state.done {
                    // Terminal path owns the lease from here on.
                    return;
                }
                if state.head_is_end_of_stream() {
                    Step::Finish
                } else if let Some(event) = state.pop_ready_event() {
                    Step::Deliver(event)
                } else {
                    state.ledger.stop_delivering();
                    let request_bytes =
                        state.ledger.demand() > 0 && state.ledger.try_start_requesting();
                    Step::Park { request_bytes }
                }
            };
            match step {
                Step::Finish => {
                    self.complete_delivery();
                    return;
                }
                Step::Park { request_bytes } => {
                    if request_bytes {
                        self.request_bytes();
                    }
                    return;
                }
                Step::Deliver(event) => {
                    self.subscriber.deliver_next(event);
                    delivered += 1;
                    if delivered >= DRAIN_BATCH_LIMIT {
                        Arc::clone(&self).follow_up(Followup::Drain);
                        return;
                    }
                }
            }
        }
    }
}
