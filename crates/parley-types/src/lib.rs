//! Shared domain types for Parley.
//!
//! This crate contains the value types passed across the broker boundary:
//! the chat `Message` envelope and the broker configuration.
//!
//! Zero infrastructure dependencies -- only serde.

pub mod config;
pub mod message;
