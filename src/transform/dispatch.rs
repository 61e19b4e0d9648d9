//! Classification and routing of decoded messages.
//!
//! Invoked synchronously from the byte consumer's decode loop. Messages
//! route by `:message-type`: events are unmarshalled and queued, the in-band
//! initial response goes straight to the handler hook, error and exception
//! frames take the terminal error path, and anything else is skipped.

use crate::{
    error::{DecodeError, StreamError},
    message::{
        EVENT_TYPE_INITIAL_RESPONSE,
        MESSAGE_TYPE_ERROR,
        MESSAGE_TYPE_EVENT,
        MESSAGE_TYPE_EXCEPTION,
        Message,
    },
    panic::catch_and_log,
    unmarshal::RawResponse,
};

use super::Shared;

impl<R, E> Shared<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    /// Route one decoded message.
    ///
    /// Error and exception frames are handled internally via the terminal
    /// error path; an `Err` return means an unmarshaller rejected the
    /// message and the remainder of the chunk must be abandoned.
    pub(super) fn dispatch(&self, message: Message) -> Result<(), StreamError> {
        match message.message_type() {
            Some(MESSAGE_TYPE_EVENT) => self.dispatch_event(&message),
            Some(MESSAGE_TYPE_ERROR | MESSAGE_TYPE_EXCEPTION) => {
                let cause = self
                    .exception_unmarshaller
                    .unmarshal(RawResponse::from_message(&message))
                    .map_err(|e| DecodeError::unmarshal("exception", e))?;
                self.fail(StreamError::Service(cause));
                Ok(())
            }
            other => {
                log::trace!("skipping message of unhandled type {other:?}");
                Ok(())
            }
        }
    }

    fn dispatch_event(&self, message: &Message) -> Result<(), StreamError> {
        let response = RawResponse::from_message(message);
        if message.event_type() == Some(EVENT_TYPE_INITIAL_RESPONSE) {
            let initial = self
                .initial_response_unmarshaller
                .unmarshal(response)
                .map_err(|e| DecodeError::unmarshal("initial-response", e))?;
            let panicked = {
                let mut handler = self.handler_lock();
                catch_and_log("EventStreamResponseHandler::response_received", || {
                    handler.response_received(initial);
                })
            };
            match panicked {
                Some(message) => Err(StreamError::Handler(message)),
                None => Ok(()),
            }
        } else {
            let event = self
                .event_unmarshaller
                .unmarshal(response)
                .map_err(|e| DecodeError::unmarshal("event", e))?;
            self.state_lock().push_event(event);
            Ok(())
        }
    }
}
