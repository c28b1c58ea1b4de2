//! Chat message domain type for Parley.
//!
//! Defines the `Message` envelope routed by the broker, either to a single
//! named recipient or fanned out to every registered subscriber.

use serde::{Deserialize, Serialize};

/// A chat message handed to the broker by a producer.
///
/// Immutable once constructed. The producer is responsible for assigning
/// `sender` and `timestamp`; the broker performs no validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier of the originator.
    pub sender: String,
    /// Identifier of the target subscriber. Ignored when `broadcast` is set.
    #[serde(default)]
    pub recipient: String,
    /// Opaque payload.
    pub content: String,
    /// Fan out to every registered subscriber instead of `recipient`.
    #[serde(default)]
    pub broadcast: bool,
    /// Event time in epoch nanoseconds.
    pub timestamp: i64,
}

impl Message {
    /// Whether this message fans out to all subscribers.
    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    /// The single recipient this message is addressed to, if any.
    ///
    /// Returns `None` for broadcast messages, since `recipient` carries no
    /// meaning there.
    pub fn target(&self) -> Option<&str> {
        if self.broadcast {
            None
        } else {
            Some(&self.recipient)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
