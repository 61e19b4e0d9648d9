#![doc(html_root_url = "https://docs.rs/eventline/latest")]
//! Public API for the `eventline` library.
//!
//! This crate decodes framed event-stream responses and delivers the
//! decoded events to a pull-based subscriber, reconciling the subscriber's
//! event demand against single-chunk byte requests to the upstream
//! transport. The frame decoder and the payload unmarshallers are supplied
//! by the caller; the crate owns ordering, backpressure, and the
//! exactly-once terminal signalling in between.

pub mod completion;
pub mod error;
pub mod handler;
pub mod message;
pub mod panic;
pub mod stream;
pub mod transform;
pub mod unmarshal;

pub use completion::{StreamAbandoned, StreamCompletion};
pub use error::{
    BoxError,
    BuildError,
    DecodeError,
    SharedError,
    StreamError,
    SubscribeError,
};
pub use handler::EventStreamResponseHandler;
pub use message::{Header, HeaderValue, Message};
pub use stream::{
    BoxMessageDecoder,
    BytePublisher,
    ByteSubscriber,
    ByteSubscription,
    ResponseConsumer,
};
pub use transform::{
    Builder,
    EventPublisher,
    EventStream,
    EventStreamTransformer,
    EventSubscriber,
    EventSubscription,
};
pub use unmarshal::{RawResponse, Unmarshal};
