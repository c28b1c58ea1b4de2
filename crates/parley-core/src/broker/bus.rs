//! Chat message broker with a bounded inbound queue and a single routing loop.
//!
//! The `Broker` is an active object: producers call `send_message`, which
//! enqueues onto a bounded `mpsc` queue, and one dedicated task running
//! `run` dequeues each message and forwards it to the recipient's endpoint
//! (or to every endpoint, for broadcasts). The broker's lifetime is bound to
//! a `CancellationToken` shared with its creator.

use std::sync::Arc;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parley_types::config::{BrokerConfig, DeliveryMode, ShutdownPolicy};
use parley_types::message::Message;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::{DeliveryReport, Endpoint, SubscriberRegistry};
use super::stats::{BrokerStats, BrokerStatsSnapshot};

/// Errors surfaced at the broker boundary.
///
/// Unknown recipients and messages abandoned at shutdown are dropped
/// silently and are not represented here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The cancellation token has fired. Do not retry against this broker.
    #[error("broker is closed")]
    Closed,

    /// The inbound queue is at capacity (non-blocking sends only).
    #[error("inbound queue is full")]
    QueueFull,

    /// `run` was called after the routing loop had already been started.
    #[error("routing loop already started")]
    AlreadyRunning,
}

/// Lifecycle of the routing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// Constructed; `run` has not been called.
    Idle,
    /// The routing loop is dequeuing messages.
    Running,
    /// Cancellation fired and the loop has exited. Terminal.
    Stopped,
}

impl BrokerState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Stopped => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Marks the broker stopped when the routing loop exits, including when the
/// `run` future is dropped mid-flight.
struct StopGuard<'a> {
    state: &'a AtomicU8,
    stopped: &'a CancellationToken,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        // State first, so anyone woken by `stopped` already sees Stopped.
        self.state.store(BrokerState::Stopped.as_u8(), Ordering::SeqCst);
        self.stopped.cancel();
    }
}

/// In-process message router between producers and subscriber endpoints.
///
/// Share it as `Arc<Broker>`: one task runs [`Broker::run`], any number of
/// tasks call [`Broker::send_message`], [`Broker::register_user`] and
/// [`Broker::unregister_user`] concurrently.
pub struct Broker {
    cancel: CancellationToken,
    /// Fired when the routing loop exits.
    stopped: CancellationToken,
    inbound_tx: mpsc::Sender<Message>,
    /// Taken by the first call to `run`.
    inbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    registry: SubscriberRegistry,
    stats: BrokerStats,
    state: AtomicU8,
    delivery_mode: DeliveryMode,
    delivery_timeout: Option<Duration>,
    shutdown_policy: ShutdownPolicy,
}

impl Broker {
    /// Create an idle broker with the default configuration.
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_config(cancel, &BrokerConfig::default())
    }

    /// Create an idle broker bound to `cancel`. Routing starts with `run`.
    pub fn with_config(cancel: CancellationToken, config: &BrokerConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.effective_capacity());
        Self {
            cancel,
            stopped: CancellationToken::new(),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            registry: SubscriberRegistry::new(),
            stats: BrokerStats::default(),
            state: AtomicU8::new(BrokerState::Idle.as_u8()),
            delivery_mode: config.delivery_mode,
            delivery_timeout: config.delivery_timeout(),
            shutdown_policy: config.shutdown_policy,
        }
    }

    /// Enqueue a message for routing.
    ///
    /// Waits while the inbound queue is full. Returns `BrokerError::Closed`
    /// if the broker was already cancelled or is cancelled while waiting;
    /// in that case nothing is enqueued. Success means the message was
    /// accepted, not that it will be delivered.
    pub async fn send_message(&self, message: Message) -> Result<(), BrokerError> {
        if self.cancel.is_cancelled() {
            return Err(BrokerError::Closed);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BrokerError::Closed),
            sent = self.inbound_tx.send(message) => {
                sent.map_err(|_| BrokerError::Closed)?;
                self.stats.record_enqueued();
                Ok(())
            }
        }
    }

    /// Enqueue a message without waiting for queue space.
    pub fn try_send_message(&self, message: Message) -> Result<(), BrokerError> {
        if self.cancel.is_cancelled() {
            return Err(BrokerError::Closed);
        }

        self.inbound_tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BrokerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BrokerError::Closed,
        })?;
        self.stats.record_enqueued();
        Ok(())
    }

    /// Register (or replace) the delivery endpoint for `user_id`.
    ///
    /// Visible to the routing loop from its next dequeue. If the loop is
    /// currently blocked delivering to a slow endpoint, this waits for it.
    pub async fn register_user(&self, user_id: impl Into<String>, endpoint: Endpoint) {
        self.registry.register(user_id, endpoint).await;
    }

    /// Create an endpoint with room for `capacity` messages, register it
    /// for `user_id`, and return the receiving half.
    pub async fn subscribe(
        &self,
        user_id: impl Into<String>,
        capacity: usize,
    ) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.registry.register(user_id, tx).await;
        rx
    }

    /// Remove the endpoint for `user_id`, if any.
    ///
    /// Returns `true` if the user was registered. Unknown ids are not an error.
    pub async fn unregister_user(&self, user_id: &str) -> bool {
        self.registry.unregister(user_id).await
    }

    /// Check if a user currently has an endpoint.
    pub async fn is_registered(&self, user_id: &str) -> bool {
        self.registry.contains(user_id).await
    }

    /// Get the number of registered users.
    pub async fn subscriber_count(&self) -> usize {
        self.registry.len().await
    }

    /// Registered user ids, sorted.
    pub async fn subscriber_ids(&self) -> Vec<String> {
        self.registry.ids().await
    }

    /// Messages accepted but not yet dequeued by the routing loop.
    pub fn queued(&self) -> usize {
        self.inbound_tx.max_capacity() - self.inbound_tx.capacity()
    }

    /// Run the routing loop until the cancellation token fires.
    ///
    /// Intended to be called once, from its own task. Returns
    /// `BrokerError::AlreadyRunning` if the loop was started before.
    pub async fn run(&self) -> Result<(), BrokerError> {
        let mut inbound = self
            .inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BrokerError::AlreadyRunning)?;

        let _stop = StopGuard {
            state: &self.state,
            stopped: &self.stopped,
        };
        self.state.store(BrokerState::Running.as_u8(), Ordering::SeqCst);
        info!(
            delivery_mode = ?self.delivery_mode,
            capacity = self.inbound_tx.max_capacity(),
            "routing loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = inbound.recv() => match received {
                    Some(message) => self.route(message).await,
                    // The broker holds a sender, so the queue cannot close first.
                    None => break,
                },
            }
        }

        match self.shutdown_policy {
            ShutdownPolicy::Abandon => {
                let abandoned = inbound.len();
                if abandoned > 0 {
                    warn!(abandoned, "broker cancelled with undelivered messages");
                    self.stats.record_abandoned(abandoned);
                }
            }
            ShutdownPolicy::Drain => {
                // Drain never waits on a full endpoint past the delivery timeout.
                inbound.close();
                while let Some(message) = inbound.recv().await {
                    let report = self
                        .registry
                        .deliver_isolated(message, self.delivery_timeout)
                        .await;
                    self.stats.record_delivery(&report);
                    self.stats.record_drained();
                }
            }
        }

        info!(stats = ?self.stats.snapshot(), "routing loop stopped");
        Ok(())
    }

    /// Spawn [`Broker::run`] onto the current Tokio runtime.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<Result<(), BrokerError>> {
        let broker = Arc::clone(self);
        tokio::spawn(async move { broker.run().await })
    }

    async fn route(&self, message: Message) {
        let report: DeliveryReport = match self.delivery_mode {
            DeliveryMode::Blocking => self.registry.deliver_blocking(message).await,
            DeliveryMode::Isolated => {
                self.registry
                    .deliver_isolated(message, self.delivery_timeout)
                    .await
            }
        };
        debug!(
            targets = report.targets,
            delivered = report.delivered,
            "routed message"
        );
        self.stats.record_delivery(&report);
    }

    /// Fire the cancellation token. Idempotent and irreversible.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// The token this broker's lifetime is bound to.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait until the routing loop has exited.
    ///
    /// Never resolves if `run` is never called.
    pub async fn stopped(&self) {
        self.stopped.cancelled().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    pub fn state(&self) -> BrokerState {
        BrokerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Snapshot of delivery counters.
    pub fn stats(&self) -> BrokerStatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("state", &self.state())
            .field("queued", &self.queued())
            .field("registry", &self.registry)
            .field("delivery_mode", &self.delivery_mode)
            .field("shutdown_policy", &self.shutdown_policy)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::envelope;
    use tokio::time::timeout;

    const QUIET: Duration = Duration::from_millis(50);
    const PROMPT: Duration = Duration::from_secs(2);

    fn start(config: &BrokerConfig) -> (Arc<Broker>, CancellationToken) {
        let token = CancellationToken::new();
        let broker = Arc::new(Broker::with_config(token.clone(), config));
        broker.spawn();
        (broker, token)
    }

    async fn expect(rx: &mut mpsc::Receiver<Message>) -> Message {
        timeout(PROMPT, rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("endpoint closed")
    }

    async fn assert_silent(rx: &mut mpsc::Receiver<Message>) {
        assert!(
            timeout(QUIET, rx.recv()).await.is_err(),
            "unexpected delivery"
        );
    }

    #[tokio::test]
    async fn broadcast_then_unicast_scenario() {
        let (broker, token) = start(&BrokerConfig::default());
        let mut a = broker.subscribe("alice", 8).await;
        let mut b = broker.subscribe("bob", 8).await;

        broker
            .send_message(envelope::broadcast("ops", "hi"))
            .await
            .unwrap();
        assert_eq!(expect(&mut a).await.content, "hi");
        assert_eq!(expect(&mut b).await.content, "hi");

        broker
            .send_message(envelope::unicast("bob", "alice", "psst"))
            .await
            .unwrap();
        assert_eq!(expect(&mut a).await.content, "psst");
        assert_silent(&mut b).await;

        token.cancel();
    }

    #[tokio::test]
    async fn unicast_order_matches_send_order() {
        let (broker, token) = start(&BrokerConfig::default());
        let mut a = broker.subscribe("alice", 128).await;

        for i in 0..50 {
            broker
                .send_message(envelope::unicast("bob", "alice", i.to_string()))
                .await
                .unwrap();
        }
        for i in 0..50 {
            assert_eq!(expect(&mut a).await.content, i.to_string());
        }

        token.cancel();
    }

    #[tokio::test]
    async fn broadcast_and_unicast_keep_relative_order() {
        let (broker, token) = start(&BrokerConfig::default());
        let mut a = broker.subscribe("alice", 8).await;

        broker
            .send_message(envelope::broadcast("ops", "first"))
            .await
            .unwrap();
        broker
            .send_message(envelope::unicast("ops", "alice", "second"))
            .await
            .unwrap();

        assert_eq!(expect(&mut a).await.content, "first");
        assert_eq!(expect(&mut a).await.content, "second");

        token.cancel();
    }

    #[tokio::test]
    async fn broadcast_delivers_exactly_once_per_subscriber() {
        let (broker, token) = start(&BrokerConfig::default());
        let mut receivers = Vec::new();
        for i in 0..5 {
            receivers.push(broker.subscribe(format!("user-{i}"), 4).await);
        }

        broker
            .send_message(envelope::broadcast("ops", "all hands"))
            .await
            .unwrap();

        for rx in receivers.iter_mut() {
            assert_eq!(expect(rx).await.content, "all hands");
        }
        for rx in receivers.iter_mut() {
            assert_silent(rx).await;
        }
        assert_eq!(broker.stats().delivered, 5);

        token.cancel();
    }

    #[tokio::test]
    async fn unknown_recipient_is_dropped_silently() {
        let (broker, token) = start(&BrokerConfig::default());
        let mut a = broker.subscribe("alice", 4).await;

        let result = broker
            .send_message(envelope::unicast("alice", "carol", "are you there?"))
            .await;
        assert!(result.is_ok());

        // Flush through the loop, then check the drop was recorded.
        broker
            .send_message(envelope::unicast("bob", "alice", "sync"))
            .await
            .unwrap();
        assert_eq!(expect(&mut a).await.content, "sync");
        assert_eq!(broker.stats().unroutable, 1);

        token.cancel();
    }

    #[tokio::test]
    async fn reregister_routes_to_newest_endpoint() {
        let (broker, token) = start(&BrokerConfig::default());
        let mut old = broker.subscribe("alice", 4).await;
        let mut new = broker.subscribe("alice", 4).await;
        assert_eq!(broker.subscriber_count().await, 1);

        broker
            .send_message(envelope::unicast("bob", "alice", "hello"))
            .await
            .unwrap();

        assert_eq!(expect(&mut new).await.content, "hello");
        assert!(old.recv().await.is_none());

        token.cancel();
    }

    #[tokio::test]
    async fn unregister_unknown_user_is_noop() {
        let broker = Broker::new(CancellationToken::new());
        assert!(!broker.unregister_user("nobody").await);

        let _rx = broker.subscribe("alice", 1).await;
        assert!(broker.unregister_user("alice").await);
        assert!(!broker.is_registered("alice").await);
    }

    #[tokio::test]
    async fn send_after_cancel_is_rejected() {
        let token = CancellationToken::new();
        let broker = Broker::new(token.clone());
        token.cancel();

        let result = broker.send_message(envelope::broadcast("ops", "late")).await;
        assert_eq!(result, Err(BrokerError::Closed));
        assert_eq!(
            broker.try_send_message(envelope::broadcast("ops", "late")),
            Err(BrokerError::Closed)
        );
        assert_eq!(broker.queued(), 0);
        assert_eq!(broker.stats().enqueued, 0);
    }

    #[tokio::test]
    async fn full_queue_blocks_until_cancelled() {
        let config = BrokerConfig {
            inbound_capacity: 2,
            ..BrokerConfig::default()
        };
        let token = CancellationToken::new();
        let broker = Arc::new(Broker::with_config(token.clone(), &config));

        for i in 0..2 {
            broker
                .send_message(envelope::unicast("a", "b", i.to_string()))
                .await
                .unwrap();
        }
        assert_eq!(broker.queued(), 2);
        assert_eq!(
            broker.try_send_message(envelope::unicast("a", "b", "x")),
            Err(BrokerError::QueueFull)
        );

        let pending = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .send_message(envelope::unicast("a", "b", "blocked"))
                    .await
            })
        };
        tokio::time::sleep(QUIET).await;
        assert!(!pending.is_finished());

        token.cancel();
        let result = timeout(PROMPT, pending).await.unwrap().unwrap();
        assert_eq!(result, Err(BrokerError::Closed));
        assert_eq!(broker.queued(), 2);
    }

    #[tokio::test]
    async fn blocked_sender_resumes_when_loop_drains() {
        let config = BrokerConfig {
            inbound_capacity: 1,
            ..BrokerConfig::default()
        };
        let token = CancellationToken::new();
        let broker = Arc::new(Broker::with_config(token.clone(), &config));
        let mut a = broker.subscribe("alice", 8).await;

        broker
            .send_message(envelope::unicast("b", "alice", "1"))
            .await
            .unwrap();
        let pending = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .send_message(envelope::unicast("b", "alice", "2"))
                    .await
            })
        };

        broker.spawn();
        assert_eq!(timeout(PROMPT, pending).await.unwrap().unwrap(), Ok(()));
        assert_eq!(expect(&mut a).await.content, "1");
        assert_eq!(expect(&mut a).await.content, "2");

        token.cancel();
    }

    #[tokio::test]
    async fn slow_subscriber_blocks_everyone_in_blocking_mode() {
        let (broker, token) = start(&BrokerConfig::default());
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        slow_tx
            .try_send(envelope::unicast("x", "slow", "filler"))
            .unwrap();
        broker.register_user("slow", slow_tx).await;
        let mut fast = broker.subscribe("fast", 8).await;

        broker
            .send_message(envelope::unicast("ops", "slow", "stuck"))
            .await
            .unwrap();
        broker
            .send_message(envelope::unicast("ops", "fast", "waiting"))
            .await
            .unwrap();
        assert_silent(&mut fast).await;

        // Freeing the slow endpoint releases the loop.
        assert_eq!(expect(&mut slow_rx).await.content, "filler");
        assert_eq!(expect(&mut fast).await.content, "waiting");

        token.cancel();
    }

    #[tokio::test]
    async fn slow_subscriber_is_isolated_in_isolated_mode() {
        let config = BrokerConfig {
            delivery_mode: DeliveryMode::Isolated,
            ..BrokerConfig::default()
        };
        let (broker, token) = start(&config);
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        slow_tx
            .try_send(envelope::unicast("x", "slow", "filler"))
            .unwrap();
        broker.register_user("slow", slow_tx).await;
        let mut fast = broker.subscribe("fast", 8).await;

        broker
            .send_message(envelope::broadcast("ops", "hi"))
            .await
            .unwrap();
        assert_eq!(expect(&mut fast).await.content, "hi");

        broker
            .send_message(envelope::unicast("ops", "fast", "sync"))
            .await
            .unwrap();
        assert_eq!(expect(&mut fast).await.content, "sync");
        assert_eq!(broker.stats().dropped_slow, 1);

        token.cancel();
    }

    #[tokio::test]
    async fn abandon_policy_drops_queued_messages() {
        let token = CancellationToken::new();
        let broker = Broker::new(token.clone());
        let mut a = broker.subscribe("alice", 8).await;
        for i in 0..3 {
            broker
                .send_message(envelope::unicast("b", "alice", i.to_string()))
                .await
                .unwrap();
        }

        token.cancel();
        broker.run().await.unwrap();

        assert!(a.try_recv().is_err());
        let stats = broker.stats();
        assert_eq!(stats.abandoned, 3);
        assert_eq!(stats.delivered, 0);
    }

    #[tokio::test]
    async fn drain_policy_delivers_queued_messages() {
        let config = BrokerConfig {
            shutdown_policy: ShutdownPolicy::Drain,
            ..BrokerConfig::default()
        };
        let token = CancellationToken::new();
        let broker = Broker::with_config(token.clone(), &config);
        let mut a = broker.subscribe("alice", 8).await;
        for i in 0..3 {
            broker
                .send_message(envelope::unicast("b", "alice", i.to_string()))
                .await
                .unwrap();
        }

        token.cancel();
        broker.run().await.unwrap();

        for i in 0..3 {
            assert_eq!(a.try_recv().unwrap().content, i.to_string());
        }
        let stats = broker.stats();
        assert_eq!(stats.drained, 3);
        assert_eq!(stats.abandoned, 0);
    }

    #[tokio::test]
    async fn drain_skips_full_endpoint() {
        let config = BrokerConfig {
            shutdown_policy: ShutdownPolicy::Drain,
            ..BrokerConfig::default()
        };
        let token = CancellationToken::new();
        let broker = Arc::new(Broker::with_config(token.clone(), &config));
        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx
            .try_send(envelope::unicast("x", "stuck", "filler"))
            .unwrap();
        broker.register_user("stuck", full_tx).await;
        let mut a = broker.subscribe("alice", 8).await;

        broker
            .send_message(envelope::unicast("ops", "stuck", "never fits"))
            .await
            .unwrap();
        broker
            .send_message(envelope::unicast("ops", "alice", "after"))
            .await
            .unwrap();

        token.cancel();
        broker.spawn();
        timeout(PROMPT, broker.stopped())
            .await
            .expect("drain stalled on a full endpoint");

        assert_eq!(a.try_recv().unwrap().content, "after");
        let stats = broker.stats();
        assert_eq!(stats.drained, 2);
        assert_eq!(stats.dropped_slow, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn run_twice_is_rejected() {
        let token = CancellationToken::new();
        let broker = Broker::new(token.clone());
        assert_eq!(broker.state(), BrokerState::Idle);

        token.cancel();
        assert_eq!(broker.run().await, Ok(()));
        assert_eq!(broker.run().await, Err(BrokerError::AlreadyRunning));
        assert_eq!(broker.state(), BrokerState::Stopped);
    }

    #[tokio::test]
    async fn stopped_resolves_after_cancellation() {
        let (broker, token) = start(&BrokerConfig::default());
        assert!(!broker.is_stopped());

        token.cancel();
        // Cancelling again has no further effect.
        broker.shutdown();

        timeout(PROMPT, broker.stopped())
            .await
            .expect("routing loop did not stop");
        assert!(broker.is_stopped());
        assert_eq!(broker.state(), BrokerState::Stopped);
        assert!(broker.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn aborted_routing_task_reports_stopped() {
        let broker = Arc::new(Broker::new(CancellationToken::new()));
        let routing = broker.spawn();
        tokio::time::sleep(QUIET).await;
        assert_eq!(broker.state(), BrokerState::Running);

        routing.abort();
        assert!(routing.await.unwrap_err().is_cancelled());
        assert!(broker.is_stopped());
        assert_eq!(broker.state(), BrokerState::Stopped);
    }

    #[test]
    fn poisoned_receiver_lock_still_runs() {
        let token = CancellationToken::new();
        let broker = Arc::new(Broker::new(token.clone()));
        {
            let broker = Arc::clone(&broker);
            let _ = std::thread::spawn(move || {
                let _slot = broker.inbound_rx.lock().unwrap();
                panic!("poison the receiver lock");
            })
            .join();
        }
        assert!(broker.inbound_rx.is_poisoned());

        token.cancel();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        assert_eq!(runtime.block_on(broker.run()), Ok(()));
        assert_eq!(broker.state(), BrokerState::Stopped);
    }

    #[tokio::test]
    async fn concurrent_producers_all_delivered() {
        let (broker, token) = start(&BrokerConfig {
            inbound_capacity: 4,
            ..BrokerConfig::default()
        });
        let mut a = broker.subscribe("alice", 256).await;

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let broker = Arc::clone(&broker);
                tokio::spawn(async move {
                    for i in 0..25 {
                        broker
                            .send_message(envelope::unicast(
                                format!("p{p}"),
                                "alice",
                                i.to_string(),
                            ))
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in producers {
            handle.await.unwrap();
        }

        // Per-producer order is preserved through the single loop.
        let mut next = [0usize; 4];
        for _ in 0..100 {
            let msg = expect(&mut a).await;
            let p: usize = msg.sender[1..].parse().unwrap();
            assert_eq!(msg.content, next[p].to_string());
            next[p] += 1;
        }

        token.cancel();
    }

    #[test]
    fn error_display() {
        assert_eq!(BrokerError::Closed.to_string(), "broker is closed");
        assert_eq!(BrokerError::QueueFull.to_string(), "inbound queue is full");
    }

    #[test]
    fn debug_impl() {
        let broker = Broker::new(CancellationToken::new());
        let debug = format!("{broker:?}");
        assert!(debug.contains("Broker"));
        assert!(debug.contains("Idle"));
    }
}
