//! Broker core for Parley.
//!
//! This crate holds the routing component itself: a bounded inbound queue,
//! the subscriber registry, and the single routing loop that connects them.
//! It depends only on `parley-types` -- transports and persistence live
//! outside.

pub mod broker;
