//! Panic isolation for caller-supplied callbacks.
//!
//! Subscriber and handler callbacks are foreign code; a bug there must not
//! unwind into the decode pipeline or the transport. Callbacks run through
//! [`catch_and_log`], which swallows the panic after logging it.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
};

/// Format a panic payload into a human-readable message.
///
/// The payload is downcast to `String` or `&'static str` if possible and
/// falls back to a generic marker otherwise.
///
/// ```
/// use eventline::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")), "boom");
/// assert_eq!(format_panic(Box::new(String::from("boom"))), "boom");
/// assert_eq!(format_panic(Box::new(5_u32)), "opaque panic payload");
/// ```
#[must_use]
pub fn format_panic(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(s) => *s,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(s) => (*s).to_string(),
            Err(_) => "opaque panic payload".to_string(),
        },
    }
}

/// Run `callback`, logging and swallowing any panic.
///
/// Returns the panic message when one was caught. `context` names the
/// callback for the log line, e.g. `"Subscriber::on_next"`.
pub fn catch_and_log<F: FnOnce()>(context: &str, callback: F) -> Option<String> {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => None,
        Err(payload) => {
            let message = format_panic(payload);
            log::warn!("panic in {context}, ignoring: {message}");
            Some(message)
        }
    }
}
