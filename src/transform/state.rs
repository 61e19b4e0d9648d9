//! Shared pipeline state guarded by a single mutex.
//!
//! Queue, demand ledger, terminal flag, and error slot all live here so
//! every transition is a plain field update under one lock. The terminal
//! callbacks themselves always run after the lock is released.

use std::collections::VecDeque;

use crate::error::SharedError;

use super::ledger::DemandLedger;

/// One entry in the delivery queue.
#[derive(Debug)]
pub(crate) enum QueueItem<E> {
    /// A decoded event awaiting delivery.
    Event(E),
    /// Marker appended once the wire-level response has been fully
    /// received; always the final item.
    EndOfStream,
}

/// Mutable pipeline state: the event queue plus its control fields.
#[derive(Debug)]
pub(crate) struct StreamState<E> {
    pub(crate) queue: VecDeque<QueueItem<E>>,
    pub(crate) ledger: DemandLedger,
    /// Once set, no further events or terminal signals reach the
    /// subscriber. Reset only when a new upstream stream is attached.
    pub(crate) done: bool,
    /// First error observed by any path during the current attempt.
    pub(crate) error: Option<SharedError>,
}

impl<E> StreamState<E> {
    pub(crate) fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            ledger: DemandLedger::default(),
            done: false,
            error: None,
        }
    }

    pub(crate) fn push_event(&mut self, event: E) { self.queue.push_back(QueueItem::Event(event)); }

    /// Append the end-of-stream marker. A second call is ignored so the
    /// marker stays unique and final.
    pub(crate) fn push_end_of_stream(&mut self) {
        if matches!(self.queue.back(), Some(QueueItem::EndOfStream)) {
            return;
        }
        self.queue.push_back(QueueItem::EndOfStream);
    }

    pub(crate) fn has_queued(&self) -> bool { !self.queue.is_empty() }

    pub(crate) fn head_is_end_of_stream(&self) -> bool {
        matches!(self.queue.front(), Some(QueueItem::EndOfStream))
    }

    /// Pop the next event when one is queued and demand remains, consuming
    /// one unit of demand. Leaves the end-of-stream marker in place.
    pub(crate) fn pop_ready_event(&mut self) -> Option<E> {
        match self.queue.front() {
            Some(QueueItem::Event(_)) if self.ledger.demand() > 0 => {
                match self.queue.pop_front() {
                    Some(QueueItem::Event(event)) => {
                        self.ledger.consume_demand();
                        Some(event)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
