//! In-process chat message broker.
//!
//! This module provides the routing primitive between producers and subscribers:
//! - `bus` -- `Broker` active object with the inbound queue and routing loop
//! - `registry` -- `SubscriberRegistry`, the lock-guarded id -> endpoint map
//! - `envelope` -- Helper constructors for `Message`
//! - `stats` -- Delivery counters and their serializable snapshot

pub mod bus;
pub mod envelope;
pub mod registry;
pub mod stats;

pub use bus::{Broker, BrokerError, BrokerState};
pub use registry::{DeliveryReport, SubscriberRegistry};
pub use stats::BrokerStatsSnapshot;
