//! Pull-based contracts at the byte seam.
//!
//! The transformer sits between an upstream publisher of opaque byte chunks
//! and a downstream subscriber of decoded events. These traits describe the
//! upstream half and the contract the transformer itself fulfils for the
//! enclosing request layer. All demand is explicit: nothing flows until it
//! is requested.

use bytes::Bytes;
use tokio_util::codec::Decoder;

use crate::{
    error::{BoxError, DecodeError, SharedError, StreamError},
    message::Message,
};

/// Boxed frame decoder turning accumulated bytes into complete messages.
///
/// Any [`tokio_util::codec::Decoder`] yielding [`Message`] values fits; the
/// transformer owns the accumulation buffer and calls `decode` in a loop as
/// chunks arrive.
pub type BoxMessageDecoder = Box<dyn Decoder<Item = Message, Error = DecodeError> + Send>;

/// Handle for pulling byte chunks from the upstream publisher.
///
/// Handed to the subscriber once, via [`ByteSubscriber::on_subscribe`].
pub trait ByteSubscription: Send + Sync {
    /// Ask the publisher for `n` more chunks. The publisher sizes and
    /// coalesces chunks as it sees fit.
    fn request(&self, n: u64);

    /// Stop the flow of bytes. No further signals are expected after the
    /// publisher observes the cancellation.
    fn cancel(&self);
}

/// Receiver of byte chunks from an upstream publisher.
///
/// Signals are serialised by the publisher: `on_subscribe` first, then any
/// number of `on_next` calls, then at most one of `on_error` or
/// `on_complete`.
pub trait ByteSubscriber: Send {
    /// The publisher is ready; `subscription` pulls chunks from it.
    fn on_subscribe(&mut self, subscription: Box<dyn ByteSubscription>);

    /// One chunk of the framed byte stream. Chunk boundaries carry no
    /// meaning; frames may span chunks.
    fn on_next(&mut self, chunk: Bytes);

    /// The upstream failed. Implementations may ignore this when a wider
    /// request lifecycle reports the same failure with more context.
    fn on_error(&mut self, error: BoxError);

    /// The upstream is exhausted. Byte-level completion does not imply that
    /// every decoded event has been delivered downstream.
    fn on_complete(&mut self);
}

/// Source of byte chunks for one response stream.
pub trait BytePublisher: Send {
    /// Attach `subscriber`; the publisher calls back `on_subscribe` with a
    /// subscription before delivering any chunks.
    fn subscribe(self: Box<Self>, subscriber: Box<dyn ByteSubscriber>);
}

/// Contract the request layer drives on a streaming response consumer.
///
/// The request layer parses the outer protocol response, hands over the
/// byte stream, and later reports either wire-level completion or failure.
/// Upstream byte completion alone never terminates the event stream —
/// decoded events may still be queued — so the layer must call [`complete`]
/// once the wire-level response has been fully received.
///
/// [`complete`]: ResponseConsumer::complete
pub trait ResponseConsumer<Resp>: Send {
    /// Value produced once the stream has fully completed.
    type Output;

    /// The outer protocol response arrived. Event-stream consumers receive
    /// their logical initial response in-band instead, so this is typically
    /// a no-op.
    fn response_received(&mut self, response: Resp);

    /// The response body is starting; `publisher` supplies its bytes.
    fn on_stream(&mut self, publisher: Box<dyn BytePublisher>);

    /// The request attempt failed outside the byte stream.
    fn exception_occurred(&mut self, error: StreamError);

    /// The wire-level response has been fully received.
    ///
    /// # Errors
    ///
    /// Returns the first stream error recorded during decoding, so the
    /// request layer can fail its own completion signal; this is the only
    /// top-level path that surfaces a stored error.
    fn complete(&mut self) -> Result<Self::Output, SharedError>;
}
