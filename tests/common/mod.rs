//! Shared doubles for the integration suites: a scripted upstream
//! publisher, a recording subscriber, a capturing handler, and a small
//! length-prefixed wire codec.

// Each integration binary uses a different slice of these helpers.
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use eventline::{
    BoxError,
    BytePublisher,
    ByteSubscriber,
    ByteSubscription,
    DecodeError,
    EventPublisher,
    EventStreamResponseHandler,
    EventStreamTransformer,
    EventSubscriber,
    EventSubscription,
    Header,
    Message,
    RawResponse,
    SharedError,
};
use tokio_util::codec::Decoder;

/// Event type used across the suites.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestEvent(pub String);

/// Initial response type used across the suites.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestInitial(pub String);

/// Everything observed downstream, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observed {
    Initial(TestInitial),
    Next(TestEvent),
    Error(String),
    Complete,
}

// ---------------------------------------------------------------------------
// Wire codec: u32 frame length, u8 header count, then length-prefixed
// name/value string pairs, remainder is the payload.
// ---------------------------------------------------------------------------

pub struct TestWireDecoder;

impl Decoder for TestWireDecoder {
    type Item = Message;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, DecodeError> {
        if src.len() < 4 {
            return Ok(None);
        }
        let frame_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if src.len() < 4 + frame_len {
            return Ok(None);
        }
        src.advance(4);
        let mut frame = src.split_to(frame_len);
        if frame.is_empty() {
            return Err(DecodeError::frame("frame missing header count"));
        }
        let header_count = frame.get_u8();
        let mut headers = Vec::with_capacity(header_count.into());
        for _ in 0..header_count {
            let name = read_short_string(&mut frame)?;
            let value = read_short_string(&mut frame)?;
            headers.push(Header::string(name, value));
        }
        Ok(Some(Message::new(headers, frame.freeze())))
    }
}

fn read_short_string(frame: &mut BytesMut) -> Result<String, DecodeError> {
    if frame.is_empty() {
        return Err(DecodeError::frame("truncated header block"));
    }
    let len = frame.get_u8() as usize;
    if frame.len() < len {
        return Err(DecodeError::frame("truncated header string"));
    }
    String::from_utf8(frame.split_to(len).to_vec()).map_err(|e| DecodeError::frame(e.to_string()))
}

pub fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Bytes {
    let mut body = BytesMut::new();
    body.put_u8(u8::try_from(headers.len()).expect("too many headers for test frame"));
    for (name, value) in headers {
        body.put_u8(u8::try_from(name.len()).expect("header name too long"));
        body.put_slice(name.as_bytes());
        body.put_u8(u8::try_from(value.len()).expect("header value too long"));
        body.put_slice(value.as_bytes());
    }
    body.put_slice(payload);
    let mut wire = BytesMut::with_capacity(4 + body.len());
    wire.put_u32(u32::try_from(body.len()).expect("test frame too large"));
    wire.put_slice(&body);
    wire.freeze()
}

pub fn event_frame(name: &str) -> Bytes {
    encode_frame(
        &[(":message-type", "event"), (":event-type", "records")],
        name.as_bytes(),
    )
}

pub fn initial_response_frame(body: &str) -> Bytes {
    encode_frame(
        &[(":message-type", "event"), (":event-type", "initial-response")],
        body.as_bytes(),
    )
}

pub fn error_frame(code: &str, message: &str) -> Bytes {
    encode_frame(
        &[(":message-type", "error"), (":error-code", code)],
        message.as_bytes(),
    )
}

/// An event frame whose payload is not valid UTF-8, so the event
/// unmarshaller rejects it.
pub fn undecodable_event_frame() -> Bytes {
    encode_frame(
        &[(":message-type", "event"), (":event-type", "records")],
        &[0xff, 0xfe],
    )
}

/// A frame whose header block is shorter than its header count claims.
pub fn corrupt_frame() -> Bytes {
    let mut wire = BytesMut::new();
    wire.put_u32(1);
    wire.put_u8(3);
    wire.freeze()
}

// ---------------------------------------------------------------------------
// Scripted upstream publisher: serves one preloaded chunk per request, with
// a trampoline so re-entrant requests from inside `on_next` cannot recurse.
// ---------------------------------------------------------------------------

struct UpstreamInner {
    chunks: Mutex<VecDeque<Bytes>>,
    subscriber: Mutex<Option<Box<dyn ByteSubscriber>>>,
    pending: AtomicU64,
    pumping: AtomicBool,
    cancelled: AtomicBool,
    requests: AtomicUsize,
    max_unanswered: AtomicU64,
}

impl UpstreamInner {
    fn pump(&self) {
        loop {
            if self.pumping.swap(true, Ordering::AcqRel) {
                return;
            }
            loop {
                if self.cancelled.load(Ordering::Acquire)
                    || self.pending.load(Ordering::Acquire) == 0
                {
                    break;
                }
                let Some(chunk) = self.chunks.lock().expect("chunk lock").pop_front() else {
                    break;
                };
                self.pending.fetch_sub(1, Ordering::AcqRel);
                let mut slot = self.subscriber.lock().expect("subscriber lock");
                match slot.as_mut() {
                    Some(subscriber) => subscriber.on_next(chunk),
                    None => {
                        self.chunks.lock().expect("chunk lock").push_front(chunk);
                        self.pending.fetch_add(1, Ordering::AcqRel);
                        break;
                    }
                }
            }
            self.pumping.store(false, Ordering::Release);
            let more = !self.cancelled.load(Ordering::Acquire)
                && self.pending.load(Ordering::Acquire) > 0
                && !self.chunks.lock().expect("chunk lock").is_empty()
                && self.subscriber.lock().expect("subscriber lock").is_some();
            if !more {
                return;
            }
        }
    }
}

struct UpstreamSubscription {
    inner: Arc<UpstreamInner>,
}

impl ByteSubscription for UpstreamSubscription {
    fn request(&self, n: u64) {
        self.inner
            .requests
            .fetch_add(usize::try_from(n).unwrap_or(usize::MAX), Ordering::AcqRel);
        let outstanding = self.inner.pending.fetch_add(n, Ordering::AcqRel) + n;
        self.inner.max_unanswered.fetch_max(outstanding, Ordering::AcqRel);
        self.inner.pump();
    }

    fn cancel(&self) { self.inner.cancelled.store(true, Ordering::Release); }
}

/// Byte publisher serving a preloaded chunk script.
pub struct ScriptedPublisher {
    inner: Arc<UpstreamInner>,
}

/// Test-side probe into the scripted publisher.
#[derive(Clone)]
pub struct UpstreamProbe {
    inner: Arc<UpstreamInner>,
}

impl ScriptedPublisher {
    pub fn new(chunks: Vec<Bytes>) -> (Self, UpstreamProbe) {
        let inner = Arc::new(UpstreamInner {
            chunks: Mutex::new(chunks.into()),
            subscriber: Mutex::new(None),
            pending: AtomicU64::new(0),
            pumping: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            max_unanswered: AtomicU64::new(0),
        });
        (
            Self {
                inner: Arc::clone(&inner),
            },
            UpstreamProbe { inner },
        )
    }
}

impl BytePublisher for ScriptedPublisher {
    fn subscribe(self: Box<Self>, mut subscriber: Box<dyn ByteSubscriber>) {
        subscriber.on_subscribe(Box::new(UpstreamSubscription {
            inner: Arc::clone(&self.inner),
        }));
        *self.inner.subscriber.lock().expect("subscriber lock") = Some(subscriber);
        self.inner.pump();
    }
}

impl UpstreamProbe {
    /// Total chunks requested so far.
    pub fn request_count(&self) -> usize { self.inner.requests.load(Ordering::Acquire) }

    /// High-water mark of simultaneously unanswered chunk requests.
    pub fn max_unanswered(&self) -> u64 { self.inner.max_unanswered.load(Ordering::Acquire) }

    pub fn cancelled(&self) -> bool { self.inner.cancelled.load(Ordering::Acquire) }

    pub fn remaining_chunks(&self) -> usize { self.inner.chunks.lock().expect("chunk lock").len() }

    /// Deliver a chunk immediately, outside the request/response cycle, the
    /// way a transport with its own read-ahead would.
    pub fn emit_now(&self, chunk: Bytes) {
        let mut slot = self.inner.subscriber.lock().expect("subscriber lock");
        if let Some(subscriber) = slot.as_mut() {
            subscriber.on_next(chunk);
        }
    }
}

// ---------------------------------------------------------------------------
// Recording subscriber.
// ---------------------------------------------------------------------------

/// Subscriber recording everything it observes, with optional misbehaviour
/// for the cancellation and panic scenarios.
pub struct RecordingSubscriber {
    observed: Arc<Mutex<Vec<Observed>>>,
    subscription: Arc<Mutex<Option<EventSubscription>>>,
    initial_demand: u64,
    cancel_after: Option<usize>,
    panic_on: Option<usize>,
    delivered: usize,
}

/// Test-side probe into a [`RecordingSubscriber`].
#[derive(Clone)]
pub struct SubscriberProbe {
    observed: Arc<Mutex<Vec<Observed>>>,
    subscription: Arc<Mutex<Option<EventSubscription>>>,
}

impl RecordingSubscriber {
    pub fn new(initial_demand: u64) -> (Self, SubscriberProbe) {
        Self::with_log(initial_demand, Arc::new(Mutex::new(Vec::new())))
    }

    /// Record into a caller-supplied log, so handler hooks and subscriber
    /// callbacks can share one chronology.
    pub fn with_log(
        initial_demand: u64,
        observed: Arc<Mutex<Vec<Observed>>>,
    ) -> (Self, SubscriberProbe) {
        let subscription = Arc::new(Mutex::new(None));
        let probe = SubscriberProbe {
            observed: Arc::clone(&observed),
            subscription: Arc::clone(&subscription),
        };
        (
            Self {
                observed,
                subscription,
                initial_demand,
                cancel_after: None,
                panic_on: None,
                delivered: 0,
            },
            probe,
        )
    }

    /// Cancel the subscription from inside `on_next` after `count` events.
    #[must_use]
    pub fn cancel_after(mut self, count: usize) -> Self {
        self.cancel_after = Some(count);
        self
    }

    /// Panic from inside `on_next` on the `count`-th event.
    #[must_use]
    pub fn panic_on(mut self, count: usize) -> Self {
        self.panic_on = Some(count);
        self
    }
}

impl EventSubscriber<TestEvent> for RecordingSubscriber {
    fn on_subscribe(&mut self, subscription: EventSubscription) {
        if self.initial_demand > 0 {
            subscription.request(self.initial_demand);
        }
        *self.subscription.lock().expect("subscription lock") = Some(subscription);
    }

    fn on_next(&mut self, event: TestEvent) {
        self.delivered += 1;
        self.observed
            .lock()
            .expect("observed lock")
            .push(Observed::Next(event));
        if self.cancel_after == Some(self.delivered) {
            if let Some(subscription) =
                self.subscription.lock().expect("subscription lock").as_ref()
            {
                subscription.cancel();
            }
        }
        if self.panic_on == Some(self.delivered) {
            panic!("subscriber bug");
        }
    }

    fn on_error(&mut self, error: SharedError) {
        self.observed
            .lock()
            .expect("observed lock")
            .push(Observed::Error(error.to_string()));
    }

    fn on_complete(&mut self) {
        self.observed
            .lock()
            .expect("observed lock")
            .push(Observed::Complete);
    }
}

impl SubscriberProbe {
    pub fn observed(&self) -> Vec<Observed> { self.observed.lock().expect("observed lock").clone() }

    /// Grant more demand through the stored subscription.
    pub fn request(&self, n: u64) {
        self.subscription
            .lock()
            .expect("subscription lock")
            .as_ref()
            .expect("subscriber was never attached")
            .request(n);
    }

    pub fn cancel(&self) {
        self.subscription
            .lock()
            .expect("subscription lock")
            .as_ref()
            .expect("subscriber was never attached")
            .cancel();
    }
}

// ---------------------------------------------------------------------------
// Capturing handler.
// ---------------------------------------------------------------------------

/// Handler capturing the publisher and recording lifecycle hooks.
pub struct CapturingHandler {
    observed: Arc<Mutex<Vec<Observed>>>,
    publisher: Arc<Mutex<Option<EventPublisher<TestEvent>>>>,
    initial: Arc<Mutex<Option<TestInitial>>>,
    completed: Arc<AtomicBool>,
    failed: Arc<Mutex<Option<String>>>,
}

/// Test-side probe into a [`CapturingHandler`].
#[derive(Clone)]
pub struct HandlerProbe {
    publisher: Arc<Mutex<Option<EventPublisher<TestEvent>>>>,
    initial: Arc<Mutex<Option<TestInitial>>>,
    completed: Arc<AtomicBool>,
    failed: Arc<Mutex<Option<String>>>,
}

pub fn capturing_handler(observed: Arc<Mutex<Vec<Observed>>>) -> (CapturingHandler, HandlerProbe) {
    let publisher = Arc::new(Mutex::new(None));
    let initial = Arc::new(Mutex::new(None));
    let completed = Arc::new(AtomicBool::new(false));
    let failed = Arc::new(Mutex::new(None));
    (
        CapturingHandler {
            observed,
            publisher: Arc::clone(&publisher),
            initial: Arc::clone(&initial),
            completed: Arc::clone(&completed),
            failed: Arc::clone(&failed),
        },
        HandlerProbe {
            publisher,
            initial,
            completed,
            failed,
        },
    )
}

impl EventStreamResponseHandler<TestInitial, TestEvent> for CapturingHandler {
    fn response_received(&mut self, response: TestInitial) {
        self.observed
            .lock()
            .expect("observed lock")
            .push(Observed::Initial(response.clone()));
        *self.initial.lock().expect("initial lock") = Some(response);
    }

    fn on_event_stream(&mut self, publisher: EventPublisher<TestEvent>) {
        *self.publisher.lock().expect("publisher lock") = Some(publisher);
    }

    fn complete(&mut self) { self.completed.store(true, Ordering::Release); }

    fn exception_occurred(&mut self, error: SharedError) {
        *self.failed.lock().expect("failure lock") = Some(error.to_string());
    }
}

impl HandlerProbe {
    pub fn take_publisher(&self) -> EventPublisher<TestEvent> {
        self.publisher
            .lock()
            .expect("publisher lock")
            .take()
            .expect("on_event_stream was never invoked")
    }

    pub fn initial(&self) -> Option<TestInitial> {
        self.initial.lock().expect("initial lock").clone()
    }

    pub fn completed(&self) -> bool { self.completed.load(Ordering::Acquire) }

    pub fn failure(&self) -> Option<String> { self.failed.lock().expect("failure lock").clone() }
}

// ---------------------------------------------------------------------------
// Transformer wiring.
// ---------------------------------------------------------------------------

/// Build a transformer over the test codec and capturing handler, sharing
/// `observed` between the handler's initial-response hook and any
/// [`RecordingSubscriber`] created with the same log.
pub fn build_transformer(
    observed: Arc<Mutex<Vec<Observed>>>,
) -> (EventStreamTransformer<TestInitial, TestEvent>, HandlerProbe) {
    let (handler, probe) = capturing_handler(observed);
    let transformer = EventStreamTransformer::builder()
        .handler(handler)
        .initial_response_unmarshaller(|response: RawResponse| -> Result<TestInitial, BoxError> {
            Ok(TestInitial(String::from_utf8(response.body().to_vec())?))
        })
        .event_unmarshaller(|response: RawResponse| -> Result<TestEvent, BoxError> {
            Ok(TestEvent(String::from_utf8(response.body().to_vec())?))
        })
        .exception_unmarshaller(|response: RawResponse| -> Result<BoxError, BoxError> {
            let code = response.header(":error-code").unwrap_or("unknown").to_owned();
            let message = String::from_utf8_lossy(response.body()).into_owned();
            Ok(format!("{code}: {message}").into())
        })
        .decoder(TestWireDecoder)
        .build()
        .expect("transformer should build");
    (transformer, probe)
}

pub fn shared_log() -> Arc<Mutex<Vec<Observed>>> { Arc::new(Mutex::new(Vec::new())) }

/// Let spawned drain tasks run to quiescence on a current-thread runtime.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
