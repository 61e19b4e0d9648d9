//! Unmarshalling seam between decoded messages and caller types.
//!
//! Each message is adapted into a [`RawResponse`] — an HTTP-shaped view
//! carrying the payload as a readable body and the message headers as
//! string-valued response headers — so callers can reuse the unmarshallers
//! generated for ordinary responses. Typed header values other than strings
//! are not propagated through this view.

use bytes::{Buf, Bytes, buf::Reader};

use crate::{
    error::BoxError,
    message::{HeaderValue, Message},
};

/// Property bag handed to unmarshallers alongside the response.
///
/// Event-stream unmarshalling carries no per-call properties, so the bag is
/// always empty; it exists so unmarshaller signatures line up with the rest
/// of a client's response pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionAttributes;

impl ExecutionAttributes {
    /// Look up a named attribute. Always `None` for event-stream messages.
    #[must_use]
    pub fn get(&self, _name: &str) -> Option<&str> { None }
}

/// An HTTP-shaped view of one event-stream message.
#[derive(Clone, Debug)]
pub struct RawResponse {
    body: Bytes,
    headers: Vec<(String, String)>,
    attributes: ExecutionAttributes,
}

impl RawResponse {
    /// Adapt a decoded message: payload becomes the body, string-typed
    /// headers become response headers. Non-string header values are
    /// dropped.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        let headers = message
            .headers()
            .iter()
            .filter_map(|h| match h.value() {
                HeaderValue::String(v) => Some((h.name().to_owned(), v.clone())),
                _ => None,
            })
            .collect();
        Self {
            body: message.payload().clone(),
            headers,
            attributes: ExecutionAttributes,
        }
    }

    /// The message payload.
    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }

    /// The payload as a [`std::io::Read`] stream, for parsers that consume
    /// readers.
    #[must_use]
    pub fn body_reader(&self) -> Reader<Bytes> { self.body.clone().reader() }

    /// Look up a response header by name (ASCII case-insensitive, as for
    /// HTTP headers).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All string-valued headers in wire order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// The (empty) attribute bag.
    #[must_use]
    pub fn attributes(&self) -> &ExecutionAttributes { &self.attributes }
}

/// Capability to decode one message view into a caller type.
///
/// Implemented for free by any compatible closure, which is the usual way
/// to supply unmarshallers:
///
/// ```
/// use eventline::{
///     error::BoxError,
///     unmarshal::{RawResponse, Unmarshal},
/// };
///
/// let unmarshaller = |response: RawResponse| -> Result<String, BoxError> {
///     Ok(String::from_utf8(response.body().to_vec())?)
/// };
/// fn assert_unmarshal(_: &impl Unmarshal<Output = String>) {}
/// assert_unmarshal(&unmarshaller);
/// ```
pub trait Unmarshal: Send + Sync {
    /// The decoded type.
    type Output;

    /// Decode the response view.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload or headers cannot be interpreted;
    /// the transformer wraps it as a client-side decode failure.
    fn unmarshal(&self, response: RawResponse) -> Result<Self::Output, BoxError>;
}

impl<T, F> Unmarshal for F
where
    F: Fn(RawResponse) -> Result<T, BoxError> + Send + Sync,
{
    type Output = T;

    fn unmarshal(&self, response: RawResponse) -> Result<T, BoxError> { self(response) }
}
