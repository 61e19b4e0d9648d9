//! Error types for event-stream decoding and delivery.
//!
//! The taxonomy distinguishes decode failures (frame structure or
//! unmarshalling), error frames reported by the service, and failures
//! surfaced by the enclosing request machinery. All of them converge on the
//! transformer's terminal error path, which is why the stream-level error is
//! shared behind an [`Arc`]: the same value is observed by the downstream
//! subscriber, the response handler, and a later `complete()` call.

use std::{io, sync::Arc};

use thiserror::Error;

/// Boxed error type used at the unmarshaller and request-layer seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A terminal stream error, shared across every observer of the stream.
pub type SharedError = Arc<StreamError>;

/// Errors produced while turning bytes into typed values.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame decoder rejected the byte stream.
    #[error("malformed event stream frame: {0}")]
    Frame(#[source] BoxError),

    /// The transport failed mid-frame.
    #[error("I/O error while decoding event stream: {0}")]
    Io(#[from] io::Error),

    /// A caller-supplied unmarshaller rejected a decoded message.
    #[error("failed to unmarshal {context} message: {source}")]
    Unmarshal {
        /// Which unmarshaller failed: `"initial-response"`, `"event"`, or
        /// `"exception"`.
        context: &'static str,
        source: BoxError,
    },
}

impl DecodeError {
    /// Wrap an arbitrary framing failure.
    #[must_use]
    pub fn frame(error: impl Into<BoxError>) -> Self { Self::Frame(error.into()) }

    pub(crate) fn unmarshal(context: &'static str, source: BoxError) -> Self {
        Self::Unmarshal { context, source }
    }
}

/// Terminal errors observed by an event-stream subscription.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Client-side decode failure: the frame decoder or an unmarshaller
    /// rejected wire data.
    #[error("event stream decoding failed: {0}")]
    Decode(#[from] DecodeError),

    /// The service sent an `error` or `exception` frame; the payload was
    /// unmarshalled by the caller-supplied exception unmarshaller.
    #[error("service reported an error: {0}")]
    Service(#[source] BoxError),

    /// The enclosing request machinery failed the attempt.
    #[error("request failed: {0}")]
    Request(#[source] BoxError),

    /// A caller-supplied hook panicked while the stream was being set up.
    #[error("event stream handler failed: {0}")]
    Handler(String),
}

impl StreamError {
    /// Wrap a request-layer failure.
    #[must_use]
    pub fn request(error: impl Into<BoxError>) -> Self { Self::Request(error.into()) }

    /// Move this error behind the shared handle delivered to observers.
    #[must_use]
    pub fn shared(self) -> SharedError { Arc::new(self) }
}

/// Failure to attach a downstream subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SubscribeError {
    /// The publisher already has a subscriber; event streams are
    /// single-subscriber.
    #[error("event stream publishers may only be subscribed to once")]
    AlreadySubscribed,
}

/// Failure to assemble a transformer from its builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A required component was never supplied.
    #[error("missing required component: {0}")]
    MissingComponent(&'static str),
}
