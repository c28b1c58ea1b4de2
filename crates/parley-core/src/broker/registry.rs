//! Subscriber registry: the broker's only shared mutable state.
//!
//! Maps subscriber ids to their delivery endpoints behind a single
//! reader/writer lock. The map itself is never handed out; registration,
//! lookup and delivery all go through `SubscriberRegistry` so the locking
//! discipline lives in one place.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use parley_types::message::Message;
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tracing::{debug, trace};

/// Delivery endpoint supplied by a subscriber. The broker holds the sending
/// half only while the subscriber is registered.
pub type Endpoint = mpsc::Sender<Message>;

/// Outcome of routing one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Endpoints the message was addressed to.
    pub targets: usize,
    /// Endpoints that accepted the message.
    pub delivered: usize,
    /// Endpoints whose receiver had been dropped.
    pub closed: usize,
    /// Endpoints that were full (isolated mode only).
    pub slow: usize,
    /// Unicast recipient was not registered; nothing was sent.
    pub unroutable: bool,
}

enum Handoff {
    Delivered,
    Closed,
    Slow,
}

impl DeliveryReport {
    fn record(&mut self, user_id: &str, handoff: Handoff) {
        match handoff {
            Handoff::Delivered => {
                trace!(%user_id, "delivered message");
                self.delivered += 1;
            }
            Handoff::Closed => {
                debug!(%user_id, "endpoint closed, message dropped");
                self.closed += 1;
            }
            Handoff::Slow => {
                debug!(%user_id, "endpoint full, message dropped");
                self.slow += 1;
            }
        }
    }
}

/// Lock-guarded map from subscriber id to delivery endpoint.
///
/// At most one endpoint per id; registering an existing id replaces the
/// previous endpoint. Entries never expire.
#[derive(Default)]
pub struct SubscriberRegistry {
    endpoints: RwLock<HashMap<String, Endpoint>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the endpoint for `user_id`.
    ///
    /// Returns `true` if an existing endpoint was replaced. The replaced
    /// sender is dropped, so its receiver closes once drained.
    pub async fn register(&self, user_id: impl Into<String>, endpoint: Endpoint) -> bool {
        let user_id = user_id.into();
        let replaced = self
            .endpoints
            .write()
            .await
            .insert(user_id.clone(), endpoint)
            .is_some();
        debug!(%user_id, replaced, "registered subscriber");
        replaced
    }

    /// Remove the endpoint for `user_id`. Absent ids are a no-op.
    ///
    /// Returns `true` if the subscriber was registered.
    pub async fn unregister(&self, user_id: &str) -> bool {
        let removed = self.endpoints.write().await.remove(user_id).is_some();
        if removed {
            debug!(%user_id, "unregistered subscriber");
        }
        removed
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.endpoints.read().await.contains_key(user_id)
    }

    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.endpoints.read().await.is_empty()
    }

    /// Registered ids in sorted order.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.endpoints.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Route `message` with awaited sends while holding the read lock.
    ///
    /// A full endpoint suspends this call until it has room, which blocks
    /// writers and every other target for the same message. Broadcast
    /// iteration order is unspecified.
    pub async fn deliver_blocking(&self, message: Message) -> DeliveryReport {
        let endpoints = self.endpoints.read().await;
        let mut report = DeliveryReport::default();

        match message.target() {
            None => {
                report.targets = endpoints.len();
                for (user_id, endpoint) in endpoints.iter() {
                    let handoff = match endpoint.send(message.clone()).await {
                        Ok(()) => Handoff::Delivered,
                        Err(_) => Handoff::Closed,
                    };
                    report.record(user_id, handoff);
                }
            }
            Some(recipient) => match endpoints.get(recipient) {
                Some(endpoint) => {
                    report.targets = 1;
                    let handoff = match endpoint.send(message.clone()).await {
                        Ok(()) => Handoff::Delivered,
                        Err(_) => Handoff::Closed,
                    };
                    report.record(recipient, handoff);
                }
                None => {
                    debug!(%recipient, "no such subscriber, message dropped");
                    report.unroutable = true;
                }
            },
        }

        report
    }

    /// Route `message` without holding the lock during delivery.
    ///
    /// Targets are snapshotted under the read lock, then each gets the
    /// message concurrently: `try_send` when `timeout` is `None`, otherwise
    /// `send_timeout`. A full endpoint loses the message and never delays
    /// the others beyond `timeout`.
    pub async fn deliver_isolated(
        &self,
        message: Message,
        timeout: Option<Duration>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let targets: Vec<(String, Endpoint)> = {
            let endpoints = self.endpoints.read().await;
            match message.target() {
                None => endpoints
                    .iter()
                    .map(|(id, endpoint)| (id.clone(), endpoint.clone()))
                    .collect(),
                Some(recipient) => match endpoints.get(recipient) {
                    Some(endpoint) => vec![(recipient.to_string(), endpoint.clone())],
                    None => {
                        debug!(%recipient, "no such subscriber, message dropped");
                        report.unroutable = true;
                        return report;
                    }
                },
            }
        };

        report.targets = targets.len();
        let handoffs = join_all(targets.into_iter().map(|(user_id, endpoint)| {
            let message = message.clone();
            async move {
                let handoff = match timeout {
                    Some(limit) => match endpoint.send_timeout(message, limit).await {
                        Ok(()) => Handoff::Delivered,
                        Err(SendTimeoutError::Timeout(_)) => Handoff::Slow,
                        Err(SendTimeoutError::Closed(_)) => Handoff::Closed,
                    },
                    None => match endpoint.try_send(message) {
                        Ok(()) => Handoff::Delivered,
                        Err(TrySendError::Full(_)) => Handoff::Slow,
                        Err(TrySendError::Closed(_)) => Handoff::Closed,
                    },
                };
                (user_id, handoff)
            }
        }))
        .await;

        for (user_id, handoff) in handoffs {
            report.record(&user_id, handoff);
        }
        report
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.endpoints.try_read().map(|endpoints| endpoints.len()).ok();
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &subscribers)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
