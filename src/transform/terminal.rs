//! At-most-once terminal transitions.
//!
//! Every path that can end the stream converges here. The `done` flag flips
//! under the state lock; subscriber and handler callbacks always run after
//! the lock is released. Completion settles the completion signal, the
//! error path never does — failing the wider request belongs to the
//! enclosing machinery, which has retry context this crate lacks.

use std::sync::Arc;

use crate::{error::{SharedError, StreamError}, panic::catch_and_log};

use super::{Followup, Shared};

impl<R, E> Shared<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    /// Terminal error path: record the first error, notify the subscriber
    /// and the handler. Suppressed entirely once the stream is done.
    pub(super) fn fail(&self, error: StreamError) {
        let error = error.shared();
        {
            let mut state = self.state_lock();
            if state.done {
                log::debug!("suppressing error after stream terminated: {error}");
                return;
            }
            state.done = true;
            state.error = Some(Arc::clone(&error));
        }
        self.subscriber.deliver_error(Arc::clone(&error));
        let mut handler = self.handler_lock();
        catch_and_log("EventStreamResponseHandler::exception_occurred", || {
            handler.exception_occurred(error);
        });
    }

    /// Completion path, reached when the drain loop finds the end-of-stream
    /// marker at the head of the queue: complete the subscriber and the
    /// handler, then settle the completion signal.
    pub(super) fn complete_delivery(&self) {
        {
            let mut state = self.state_lock();
            if state.done {
                log::debug!("suppressing completion after stream terminated");
                return;
            }
            state.done = true;
        }
        self.subscriber.deliver_complete();
        {
            let mut handler = self.handler_lock();
            catch_and_log("EventStreamResponseHandler::complete", || handler.complete());
        }
        self.completion.settle();
    }

    /// The wire-level response has been fully received. With no recorded
    /// error, completion is deferred through the queue so every event ahead
    /// of it is delivered first; otherwise the stored error is returned for
    /// the request layer to act on.
    pub(super) fn request_completed(self: Arc<Self>) -> Result<(), SharedError> {
        let followup = {
            let mut state = self.state_lock();
            if let Some(error) = &state.error {
                return Err(Arc::clone(error));
            }
            state.push_end_of_stream();
            if state.ledger.try_start_delivering() {
                Followup::Drain
            } else {
                Followup::Stay
            }
        };
        self.follow_up(followup);
        Ok(())
    }
}
