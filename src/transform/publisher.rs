//! Downstream event publishing: subscriber attachment, demand signalling,
//! and the `futures::Stream` bridge.
//!
//! Event streams are single-subscriber. The subscriber pulls with
//! [`EventSubscription::request`]; cancellation propagates straight to the
//! upstream byte subscription without tearing down internal state, so
//! anything still queued is silently dropped.

use std::{
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    error::{SharedError, SubscribeError},
    panic::catch_and_log,
};

use super::{Followup, Shared};

/// Receiver of decoded events from an [`EventPublisher`].
///
/// Callbacks are serialised: `on_subscribe` first, then `on_next` calls in
/// decode order, then at most one of `on_error` or `on_complete`. A panic
/// in any callback is logged and swallowed; it neither stops the stream nor
/// reaches the transport.
pub trait EventSubscriber<E>: Send {
    /// The stream is ready; `subscription` pulls events from it.
    fn on_subscribe(&mut self, subscription: EventSubscription);

    /// One decoded event. Never invoked re-entrantly with `request`.
    fn on_next(&mut self, event: E);

    /// The stream failed; no further events follow.
    fn on_error(&mut self, error: SharedError);

    /// Every event was delivered; the stream is finished.
    fn on_complete(&mut self);
}

/// Demand-side operations the shared pipeline core exposes.
pub(crate) trait SubscriptionCore: Send + Sync {
    fn request_events(self: Arc<Self>, n: u64);
    fn cancel_stream(self: Arc<Self>);
}

/// Attachment-side operations the shared pipeline core exposes.
pub(crate) trait PublisherCore<E>: Send + Sync {
    fn attach(
        self: Arc<Self>,
        subscriber: Box<dyn EventSubscriber<E>>,
    ) -> Result<EventSubscription, SubscribeError>;
}

/// Pull handle held by an attached subscriber.
#[derive(Clone)]
pub struct EventSubscription {
    core: Arc<dyn SubscriptionCore>,
}

impl EventSubscription {
    pub(crate) fn new(core: Arc<dyn SubscriptionCore>) -> Self { Self { core } }

    /// Grant demand for `n` more events. Ignored once the stream has
    /// terminated; `n = 0` is ignored with a warning.
    pub fn request(&self, n: u64) {
        if n == 0 {
            log::warn!("ignoring request for zero events");
            return;
        }
        Arc::clone(&self.core).request_events(n);
    }

    /// Cancel the stream. The upstream byte subscription is cancelled;
    /// no terminal signal will be delivered.
    pub fn cancel(&self) { Arc::clone(&self.core).cancel_stream(); }
}

/// Publisher of decoded events, handed to
/// [`EventStreamResponseHandler::on_event_stream`](crate::handler::EventStreamResponseHandler::on_event_stream).
pub struct EventPublisher<E> {
    core: Arc<dyn PublisherCore<E>>,
}

impl<E> EventPublisher<E> {
    pub(crate) fn new(core: Arc<dyn PublisherCore<E>>) -> Self { Self { core } }

    /// Attach the unique subscriber. It receives `on_subscribe` before this
    /// call returns.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError::AlreadySubscribed`] for every attachment
    /// after the first.
    pub fn subscribe(
        &self,
        subscriber: impl EventSubscriber<E> + 'static,
    ) -> Result<(), SubscribeError> {
        Arc::clone(&self.core).attach(Box::new(subscriber)).map(|_| ())
    }

    /// Consume the publisher into a [`futures::Stream`] of events.
    ///
    /// The stream meters demand one event per item yielded, so buffering
    /// stays bounded by the credit granted. Dropping the stream before a
    /// terminal item cancels the upstream subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError::AlreadySubscribed`] if a subscriber was
    /// already attached.
    pub fn into_stream(self) -> Result<EventStream<E>, SubscribeError>
    where
        E: Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = Arc::clone(&self.core).attach(Box::new(ChannelSubscriber { tx }))?;
        subscription.request(1);
        Ok(EventStream {
            signals: UnboundedReceiverStream::new(rx),
            subscription,
            terminated: false,
        })
    }
}

/// Slot holding the unique downstream subscriber.
///
/// All deliveries lock the slot, which serialises subscriber callbacks even
/// when the terminal paths race the drain loop. Callbacks run panic-isolated;
/// the lock recovers from the poisoning a caught panic leaves behind.
pub(crate) struct SubscriberCell<E> {
    inner: Mutex<Option<Box<dyn EventSubscriber<E>>>>,
}

impl<E> SubscriberCell<E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn EventSubscriber<E>>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the first subscriber and hand it the subscription. A second
    /// attachment fails without disturbing the first.
    pub(crate) fn attach(
        &self,
        subscriber: Box<dyn EventSubscriber<E>>,
        subscription: EventSubscription,
    ) -> Result<(), SubscribeError> {
        let mut slot = self.lock();
        if slot.is_some() {
            log::error!("event stream publishers may only be subscribed to once");
            return Err(SubscribeError::AlreadySubscribed);
        }
        let stored = slot.insert(subscriber);
        stored.on_subscribe(subscription);
        Ok(())
    }

    pub(crate) fn deliver_next(&self, event: E) {
        let mut slot = self.lock();
        if let Some(subscriber) = slot.as_mut() {
            catch_and_log("Subscriber::on_next", || subscriber.on_next(event));
        }
    }

    pub(crate) fn deliver_error(&self, error: SharedError) {
        let mut slot = self.lock();
        if let Some(subscriber) = slot.as_mut() {
            catch_and_log("Subscriber::on_error", || subscriber.on_error(error));
        }
    }

    pub(crate) fn deliver_complete(&self) {
        let mut slot = self.lock();
        if let Some(subscriber) = slot.as_mut() {
            catch_and_log("Subscriber::on_complete", || subscriber.on_complete());
        }
    }
}

impl<R, E> PublisherCore<E> for Shared<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    fn attach(
        self: Arc<Self>,
        subscriber: Box<dyn EventSubscriber<E>>,
    ) -> Result<EventSubscription, SubscribeError> {
        let subscription = EventSubscription::new(Arc::clone(&self) as Arc<dyn SubscriptionCore>);
        self.subscriber.attach(subscriber, subscription.clone())?;
        Ok(subscription)
    }
}

impl<R, E> SubscriptionCore for Shared<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    fn request_events(self: Arc<Self>, n: u64) {
        let followup = {
            let mut state = self.state_lock();
            if state.done {
                return;
            }
            state.ledger.add_demand(n);
            if state.has_queued() {
                if state.ledger.try_start_delivering() {
                    Followup::Drain
                } else {
                    Followup::Stay
                }
            } else if state.ledger.try_start_requesting() {
                Followup::RequestBytes
            } else {
                Followup::Stay
            }
        };
        self.follow_up(followup);
    }

    fn cancel_stream(self: Arc<Self>) { self.cancel_upstream(); }
}

enum ChannelSignal<E> {
    Event(E),
    Failed(SharedError),
    Finished,
}

/// Internal subscriber forwarding into the [`EventStream`] channel.
struct ChannelSubscriber<E> {
    tx: mpsc::UnboundedSender<ChannelSignal<E>>,
}

impl<E: Send + 'static> EventSubscriber<E> for ChannelSubscriber<E> {
    fn on_subscribe(&mut self, _subscription: EventSubscription) {
        // The stream half holds the subscription and meters demand itself.
    }

    fn on_next(&mut self, event: E) {
        let _ = self.tx.send(ChannelSignal::Event(event));
    }

    fn on_error(&mut self, error: SharedError) {
        let _ = self.tx.send(ChannelSignal::Failed(error));
    }

    fn on_complete(&mut self) {
        let _ = self.tx.send(ChannelSignal::Finished);
    }
}

/// [`futures::Stream`] view of an event stream.
///
/// Yields `Ok` per event in decode order, then ends on normal completion,
/// or yields one `Err` and ends on failure.
pub struct EventStream<E> {
    signals: UnboundedReceiverStream<ChannelSignal<E>>,
    subscription: EventSubscription,
    terminated: bool,
}

impl<E> Stream for EventStream<E> {
    type Item = Result<E, SharedError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.signals).poll_next(cx) {
            Poll::Ready(Some(ChannelSignal::Event(event))) => {
                this.subscription.request(1);
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(Some(ChannelSignal::Failed(error))) => {
                this.terminated = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(ChannelSignal::Finished)) | Poll::Ready(None) => {
                this.terminated = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<E> Drop for EventStream<E> {
    fn drop(&mut self) {
        if !self.terminated {
            self.subscription.cancel();
        }
    }
}
