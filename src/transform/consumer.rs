//! The upstream-facing byte consumer.
//!
//! Subscribes to the byte publisher, accumulates chunks, runs the frame
//! decoder, and dispatches every complete message in order. After each
//! chunk it either kicks the drain engine (something is queued) or asks the
//! upstream for one more chunk (demand is still unmet). Requests go out one
//! chunk at a time; the transport sizes and coalesces chunks.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    error::{BoxError, StreamError},
    panic::catch_and_log,
    stream::{ByteSubscriber, ByteSubscription},
};

use super::{EventPublisher, Followup, PublisherCore, Shared};

/// Subscriber attached to the upstream byte publisher.
pub(super) struct ByteConsumer<R, E> {
    shared: Arc<Shared<R, E>>,
}

impl<R, E> ByteConsumer<R, E> {
    pub(super) fn new(shared: Arc<Shared<R, E>>) -> Self { Self { shared } }
}

impl<R, E> ByteSubscriber for ByteConsumer<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    fn on_subscribe(&mut self, subscription: Box<dyn ByteSubscription>) {
        self.shared.store_upstream(Arc::from(subscription));
        let publisher =
            EventPublisher::new(Arc::clone(&self.shared) as Arc<dyn PublisherCore<E>>);
        let panicked = {
            let mut handler = self.shared.handler_lock();
            catch_and_log("EventStreamResponseHandler::on_event_stream", || {
                handler.on_event_stream(publisher);
            })
        };
        if let Some(message) = panicked {
            self.shared.fail(StreamError::Handler(message));
            self.shared.cancel_upstream();
        }
    }

    fn on_next(&mut self, chunk: Bytes) {
        Arc::clone(&self.shared).ingest(chunk);
    }

    fn on_error(&mut self, _error: BoxError) {
        // The request lifecycle reports failures through `exception_occurred`
        // with more context than the raw byte stream has.
    }

    fn on_complete(&mut self) {
        // Byte-level completion says nothing about queued events; the
        // request layer signals completion via `complete` instead.
    }
}

impl<R, E> Shared<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    /// Decode one chunk and dispatch its messages, then re-arm delivery or
    /// byte demand.
    pub(super) fn ingest(self: Arc<Self>, chunk: Bytes) {
        if self.is_done() {
            log::debug!("discarding {} bytes received after stream terminated", chunk.len());
            return;
        }

        let mut messages = Vec::new();
        let decode_failure = {
            let mut guard = self.decode_lock();
            let decode = &mut *guard;
            decode.buffer.extend_from_slice(&chunk);
            loop {
                match decode.decoder.decode(&mut decode.buffer) {
                    Ok(Some(message)) => messages.push(message),
                    Ok(None) => break None,
                    Err(error) => break Some(error),
                }
            }
        };

        for message in messages {
            if let Err(error) = self.dispatch(message) {
                self.fail(error);
                return;
            }
        }
        if let Some(error) = decode_failure {
            self.fail(StreamError::Decode(error));
            return;
        }

        let followup = {
            let mut state = self.state_lock();
            if state.has_queued() {
                state.ledger.stop_requesting();
                if state.ledger.try_start_delivering() {
                    Followup::Drain
                } else {
                    Followup::Stay
                }
            } else if state.ledger.demand() > 0 {
                // The lease taken for the request that produced this chunk
                // carries over to the follow-up request; claim it only when
                // the chunk arrived unsolicited.
                let _ = state.ledger.try_start_requesting();
                Followup::RequestBytes
            } else {
                state.ledger.stop_requesting();
                Followup::Stay
            }
        };
        self.follow_up(followup);
    }
}
