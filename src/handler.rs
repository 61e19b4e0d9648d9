//! Caller-facing lifecycle hooks for an event-stream response.

use crate::{error::SharedError, transform::EventPublisher};

/// Hooks invoked as an event-stream response progresses.
///
/// Supplied by the caller when building a transformer. `R` is the initial
/// response type, `E` the event type. Hooks are invoked from the
/// transformer's executor or from the thread feeding bytes; implementations
/// should return promptly.
pub trait EventStreamResponseHandler<R, E>: Send {
    /// The in-band initial response was decoded. Invoked before any event
    /// is delivered.
    fn response_received(&mut self, response: R);

    /// The event stream is ready to be subscribed to.
    ///
    /// Implementations normally subscribe immediately, either with their own
    /// [`EventSubscriber`](crate::transform::EventSubscriber) or via
    /// [`EventPublisher::into_stream`].
    fn on_event_stream(&mut self, publisher: EventPublisher<E>);

    /// Every event was delivered and the stream completed normally.
    fn complete(&mut self);

    /// The stream terminated with an error; no further events follow.
    fn exception_occurred(&mut self, error: SharedError);
}
