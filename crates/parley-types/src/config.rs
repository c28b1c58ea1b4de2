//! Broker configuration types for Parley.
//!
//! `BrokerConfig` represents the `config.toml` that controls inbound queue
//! capacity, delivery behaviour and shutdown behaviour of the broker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of pending messages the inbound queue holds.
pub const DEFAULT_INBOUND_CAPACITY: usize = 100;

/// How the routing loop hands a message to subscriber endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Awaited send to each endpoint while holding the registry read lock.
    ///
    /// A full endpoint stalls the routing loop, and with it every other
    /// subscriber and every later message (head-of-line blocking).
    #[default]
    Blocking,
    /// Snapshot the targets, release the lock, then deliver to each target
    /// independently. A full endpoint loses the message instead of stalling
    /// the loop.
    Isolated,
}

/// What the routing loop does with queued messages when cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Stop immediately; anything still queued is dropped.
    #[default]
    Abandon,
    /// Deliver everything already accepted, then stop.
    ///
    /// Drain deliveries never wait on a full endpoint beyond
    /// `delivery_timeout_ms`; such messages are counted as slow drops.
    Drain,
}

/// Top-level configuration for a broker instance.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Maximum number of pending messages before `send_message` blocks.
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,

    /// Delivery strategy used by the routing loop.
    #[serde(default)]
    pub delivery_mode: DeliveryMode,

    /// Per-endpoint delivery timeout in isolated mode. When absent, isolated
    /// delivery never waits for a full endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_timeout_ms: Option<u64>,

    /// Handling of queued messages on cancellation.
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
}

fn default_inbound_capacity() -> usize {
    DEFAULT_INBOUND_CAPACITY
}

impl BrokerConfig {
    /// Inbound capacity with a floor of one slot.
    pub fn effective_capacity(&self) -> usize {
        self.inbound_capacity.max(1)
    }

    /// Isolated-mode delivery timeout, if configured.
    pub fn delivery_timeout(&self) -> Option<Duration> {
        self.delivery_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: default_inbound_capacity(),
            delivery_mode: DeliveryMode::default(),
            delivery_timeout_ms: None,
            shutdown_policy: ShutdownPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_config_default_values() {
        let config = BrokerConfig::default();
        assert_eq!(config.inbound_capacity, 100);
        assert_eq!(config.delivery_mode, DeliveryMode::Blocking);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Abandon);
        assert!(config.delivery_timeout().is_none());
    }

    #[test]
    fn test_broker_config_deserialize_with_defaults() {
        let config: BrokerConfig = toml::from_str("").unwrap();
        assert_eq!(config, BrokerConfig::default());
    }

    #[test]
    fn test_broker_config_deserialize_with_values() {
        let toml_str = r#"
inbound_capacity = 8
delivery_mode = "isolated"
delivery_timeout_ms = 25
shutdown_policy = "drain"
"#;
        let config: BrokerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.inbound_capacity, 8);
        assert_eq!(config.delivery_mode, DeliveryMode::Isolated);
        assert_eq!(config.delivery_timeout(), Some(Duration::from_millis(25)));
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Drain);
    }

    #[test]
    fn test_unknown_delivery_mode_rejected() {
        let result = toml::from_str::<BrokerConfig>(r#"delivery_mode = "eventually""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_effective_capacity_floor() {
        let config = BrokerConfig {
            inbound_capacity: 0,
            ..BrokerConfig::default()
        };
        assert_eq!(config.effective_capacity(), 1);
    }
}
