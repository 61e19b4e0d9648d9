//! Decoded event-stream messages.
//!
//! A [`Message`] is one self-contained unit of the event-stream wire format:
//! a list of named, typed headers and an opaque payload. Frame decoders
//! produce messages; the dispatcher classifies them by the reserved
//! `:message-type` and `:event-type` headers.

use bytes::Bytes;

/// Reserved header naming the role of a message on the wire.
pub const MESSAGE_TYPE_HEADER: &str = ":message-type";

/// Reserved header naming the event kind of an `event` message.
pub const EVENT_TYPE_HEADER: &str = ":event-type";

/// `:message-type` value for data-bearing messages.
pub const MESSAGE_TYPE_EVENT: &str = "event";

/// `:message-type` value for service-reported errors.
pub const MESSAGE_TYPE_ERROR: &str = "error";

/// `:message-type` value for modelled service exceptions.
pub const MESSAGE_TYPE_EXCEPTION: &str = "exception";

/// `:event-type` value distinguishing the in-band initial response.
pub const EVENT_TYPE_INITIAL_RESPONSE: &str = "initial-response";

/// A typed header value carried by an event-stream message.
///
/// The wire format supports the full set below; only [`HeaderValue::String`]
/// values are forwarded to unmarshallers (see
/// [`RawResponse`](crate::unmarshal::RawResponse)).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Bytes(Bytes),
    String(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Uuid(u128),
}

impl HeaderValue {
    /// Return the string form when this value is string-typed.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A single named header on a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: HeaderValue,
}

impl Header {
    /// Create a header from a name and typed value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: HeaderValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Shorthand for a string-valued header.
    #[must_use]
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, HeaderValue::String(value.into()))
    }

    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    #[must_use]
    pub fn value(&self) -> &HeaderValue { &self.value }
}

/// One decoded event-stream message: headers plus payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    headers: Vec<Header>,
    payload: Bytes,
}

impl Message {
    /// Assemble a message from decoded headers and payload bytes.
    #[must_use]
    pub fn new(headers: Vec<Header>, payload: Bytes) -> Self { Self { headers, payload } }

    /// Look up a header value by name.
    ///
    /// Names are matched exactly; the reserved names are lowercase on the
    /// wire.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(Header::value)
    }

    /// The `:message-type` header, when present and string-typed.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.header(MESSAGE_TYPE_HEADER).and_then(HeaderValue::as_str)
    }

    /// The `:event-type` header, when present and string-typed.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.header(EVENT_TYPE_HEADER).and_then(HeaderValue::as_str)
    }

    #[must_use]
    pub fn headers(&self) -> &[Header] { &self.headers }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Consume the message, returning the payload bytes.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }
}
