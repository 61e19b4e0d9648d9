//! The event-stream response transformer.
//!
//! [`EventStreamTransformer`] adapts a byte-oriented response stream into a
//! pull-based stream of decoded events. Bytes flow in through the byte
//! consumer and frame decoder; decoded messages are dispatched to the
//! handler hook, the event queue, or the error path; a lease-guarded drain
//! task moves queued events to the subscriber as demand allows. Demand
//! propagates the other way: the subscriber requests events, and unmet
//! demand turns into single-chunk byte requests upstream.
//!
//! All shared state (queue, demand, leases, terminal flag, error slot)
//! sits behind one mutex; subscriber and handler callbacks always run with
//! no lock held.

mod consumer;
mod dispatch;
mod drain;
mod ledger;
mod publisher;
mod state;
mod terminal;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use tokio::runtime::Handle;

pub use publisher::{EventPublisher, EventStream, EventSubscriber, EventSubscription};
use publisher::{PublisherCore, SubscriberCell};
use state::StreamState;

use crate::{
    completion::{CompletionNotifier, StreamCompletion, completion_channel},
    error::{BoxError, BuildError, DecodeError, SharedError, StreamError},
    handler::EventStreamResponseHandler,
    message::Message,
    stream::{BoxMessageDecoder, BytePublisher, ByteSubscription, ResponseConsumer},
    unmarshal::Unmarshal,
};

/// Frame decoder plus its accumulation buffer, guarded together.
struct DecodeState {
    decoder: BoxMessageDecoder,
    buffer: BytesMut,
}

/// Work to run once the state lock has been released.
enum Followup {
    Drain,
    RequestBytes,
    Stay,
}

/// State shared between the transformer, the byte consumer, the publisher,
/// and drain tasks.
struct Shared<R, E> {
    state: Mutex<StreamState<E>>,
    decode: Mutex<DecodeState>,
    subscriber: SubscriberCell<E>,
    upstream: Mutex<Option<Arc<dyn ByteSubscription>>>,
    handler: Mutex<Box<dyn EventStreamResponseHandler<R, E>>>,
    initial_response_unmarshaller: Box<dyn Unmarshal<Output = R>>,
    event_unmarshaller: Box<dyn Unmarshal<Output = E>>,
    exception_unmarshaller: Box<dyn Unmarshal<Output = BoxError>>,
    executor: Handle,
    completion: CompletionNotifier,
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R, E> Shared<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    fn state_lock(&self) -> MutexGuard<'_, StreamState<E>> { lock_unpoisoned(&self.state) }

    fn decode_lock(&self) -> MutexGuard<'_, DecodeState> { lock_unpoisoned(&self.decode) }

    fn handler_lock(&self) -> MutexGuard<'_, Box<dyn EventStreamResponseHandler<R, E>>> {
        lock_unpoisoned(&self.handler)
    }

    fn is_done(&self) -> bool { self.state_lock().done }

    fn store_upstream(&self, subscription: Arc<dyn ByteSubscription>) {
        *lock_unpoisoned(&self.upstream) = Some(subscription);
    }

    fn upstream_subscription(&self) -> Option<Arc<dyn ByteSubscription>> {
        lock_unpoisoned(&self.upstream).clone()
    }

    /// Ask the upstream for one more chunk. The requesting lease must be
    /// held; it is released if no upstream subscription exists yet.
    fn request_bytes(&self) {
        match self.upstream_subscription() {
            Some(subscription) => subscription.request(1),
            None => {
                log::debug!("byte request skipped: no upstream subscription");
                self.state_lock().ledger.stop_requesting();
            }
        }
    }

    fn cancel_upstream(&self) {
        if let Some(subscription) = self.upstream_subscription() {
            subscription.cancel();
        }
    }

    fn follow_up(self: Arc<Self>, followup: Followup) {
        match followup {
            Followup::Drain => self.spawn_drain(),
            Followup::RequestBytes => self.spawn_byte_request(),
            Followup::Stay => {}
        }
    }

    /// Issue a byte request from an executor task. Demand signals arrive
    /// from inside handler and subscriber callbacks; requesting through the
    /// executor keeps a synchronously delivered chunk from re-entering
    /// those callbacks while their locks are still held.
    fn spawn_byte_request(self: Arc<Self>) {
        let executor = self.executor.clone();
        executor.spawn(async move { self.request_bytes() });
    }
}

/// Transformer turning a framed byte stream into delivered events.
///
/// Built via [`EventStreamTransformer::builder`]; driven by the request
/// layer through the [`ResponseConsumer`] contract. One transformer serves
/// one logical request; attaching a new byte stream resets the terminal
/// flag so the enclosing machinery can retry an attempt.
pub struct EventStreamTransformer<R, E> {
    shared: Arc<Shared<R, E>>,
    completion: StreamCompletion,
}

impl<R, E> EventStreamTransformer<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    /// Start building a transformer.
    #[must_use]
    pub fn builder() -> Builder<R, E> { Builder::default() }

    /// A handle resolving once the final event has been delivered and the
    /// stream completed normally. Never resolves on error or cancellation.
    #[must_use]
    pub fn completion(&self) -> StreamCompletion { self.completion.clone() }

    /// The outer protocol response arrived. The logical initial response
    /// arrives in-band as an `initial-response` frame instead, so whatever
    /// the request layer parsed is ignored.
    pub fn response_received<Resp>(&mut self, _response: Resp) {}

    /// Attach a new upstream byte stream.
    ///
    /// Clears the terminal flag so a retried attempt can deliver again. The
    /// error slot deliberately survives: a decode failure recorded here
    /// must still surface from [`complete`](Self::complete).
    pub fn on_stream(&mut self, publisher: Box<dyn BytePublisher>) {
        self.shared.state_lock().done = false;
        publisher.subscribe(Box::new(consumer::ByteConsumer::new(Arc::clone(&self.shared))));
    }

    /// The request attempt failed outside the byte stream; runs the
    /// terminal error path.
    pub fn exception_occurred(&mut self, error: StreamError) { self.shared.fail(error); }

    /// The wire-level response has been fully received; completion is
    /// deferred behind any still-queued events.
    ///
    /// # Errors
    ///
    /// Returns the first stream error recorded during decoding.
    pub fn complete(&mut self) -> Result<(), SharedError> {
        Arc::clone(&self.shared).request_completed()
    }
}

impl<Resp, R, E> ResponseConsumer<Resp> for EventStreamTransformer<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    type Output = ();

    fn response_received(&mut self, response: Resp) {
        EventStreamTransformer::response_received(self, response);
    }

    fn on_stream(&mut self, publisher: Box<dyn BytePublisher>) {
        EventStreamTransformer::on_stream(self, publisher);
    }

    fn exception_occurred(&mut self, error: StreamError) {
        EventStreamTransformer::exception_occurred(self, error);
    }

    fn complete(&mut self) -> Result<(), SharedError> { EventStreamTransformer::complete(self) }
}

/// Builder for [`EventStreamTransformer`].
pub struct Builder<R, E> {
    handler: Option<Box<dyn EventStreamResponseHandler<R, E>>>,
    initial_response_unmarshaller: Option<Box<dyn Unmarshal<Output = R>>>,
    event_unmarshaller: Option<Box<dyn Unmarshal<Output = E>>>,
    exception_unmarshaller: Option<Box<dyn Unmarshal<Output = BoxError>>>,
    decoder: Option<BoxMessageDecoder>,
    executor: Option<Handle>,
}

impl<R, E> Default for Builder<R, E> {
    fn default() -> Self {
        Self {
            handler: None,
            initial_response_unmarshaller: None,
            event_unmarshaller: None,
            exception_unmarshaller: None,
            decoder: None,
            executor: None,
        }
    }
}

impl<R, E> Builder<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    /// Lifecycle hooks observing the stream.
    #[must_use]
    pub fn handler(mut self, handler: impl EventStreamResponseHandler<R, E> + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Unmarshaller for the in-band `initial-response` message.
    #[must_use]
    pub fn initial_response_unmarshaller(
        mut self,
        unmarshaller: impl Unmarshal<Output = R> + 'static,
    ) -> Self {
        self.initial_response_unmarshaller = Some(Box::new(unmarshaller));
        self
    }

    /// Unmarshaller for event messages.
    #[must_use]
    pub fn event_unmarshaller(mut self, unmarshaller: impl Unmarshal<Output = E> + 'static) -> Self {
        self.event_unmarshaller = Some(Box::new(unmarshaller));
        self
    }

    /// Unmarshaller for `error` and `exception` messages.
    #[must_use]
    pub fn exception_unmarshaller(
        mut self,
        unmarshaller: impl Unmarshal<Output = BoxError> + 'static,
    ) -> Self {
        self.exception_unmarshaller = Some(Box::new(unmarshaller));
        self
    }

    /// Frame decoder splitting the byte stream into messages.
    #[must_use]
    pub fn decoder(
        mut self,
        decoder: impl tokio_util::codec::Decoder<Item = Message, Error = DecodeError>
        + Send
        + 'static,
    ) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    /// Executor used to run drain tasks. Defaults to the ambient Tokio
    /// runtime.
    #[must_use]
    pub fn executor(mut self, executor: Handle) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Assemble the transformer.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingComponent`] when the handler, any
    /// unmarshaller, or the decoder was not supplied.
    ///
    /// # Panics
    ///
    /// Panics if no executor was supplied and the call is made outside a
    /// Tokio runtime.
    pub fn build(self) -> Result<EventStreamTransformer<R, E>, BuildError> {
        let handler = self
            .handler
            .ok_or(BuildError::MissingComponent("handler"))?;
        let initial_response_unmarshaller = self
            .initial_response_unmarshaller
            .ok_or(BuildError::MissingComponent("initial response unmarshaller"))?;
        let event_unmarshaller = self
            .event_unmarshaller
            .ok_or(BuildError::MissingComponent("event unmarshaller"))?;
        let exception_unmarshaller = self
            .exception_unmarshaller
            .ok_or(BuildError::MissingComponent("exception unmarshaller"))?;
        let decoder = self.decoder.ok_or(BuildError::MissingComponent("decoder"))?;
        let executor = self.executor.unwrap_or_else(Handle::current);
        let (notifier, completion) = completion_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(StreamState::new()),
            decode: Mutex::new(DecodeState {
                decoder,
                buffer: BytesMut::new(),
            }),
            subscriber: SubscriberCell::new(),
            upstream: Mutex::new(None),
            handler: Mutex::new(handler),
            initial_response_unmarshaller,
            event_unmarshaller,
            exception_unmarshaller,
            executor,
            completion: notifier,
        });
        Ok(EventStreamTransformer { shared, completion })
    }
}
