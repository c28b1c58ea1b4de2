//! Helper constructors for `Message` envelopes.
//!
//! Reduces boilerplate for producers building unicast or broadcast messages.
//! The timestamp is taken from the wall clock at construction time.

use chrono::Utc;
use parley_types::message::Message;

/// Build a message addressed to a single subscriber.
pub fn unicast(
    sender: impl Into<String>,
    recipient: impl Into<String>,
    content: impl Into<String>,
) -> Message {
    Message {
        sender: sender.into(),
        recipient: recipient.into(),
        content: content.into(),
        broadcast: false,
        timestamp: now_nanos(),
    }
}

/// Build a message for every registered subscriber.
pub fn broadcast(sender: impl Into<String>, content: impl Into<String>) -> Message {
    Message {
        sender: sender.into(),
        recipient: String::new(),
        content: content.into(),
        broadcast: true,
        timestamp: now_nanos(),
    }
}

/// Current time in epoch nanoseconds.
///
/// Saturates to zero outside the representable range (after the year 2262).
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
