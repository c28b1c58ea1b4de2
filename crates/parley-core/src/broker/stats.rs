//! Delivery counters for the routing loop.
//!
//! Counters are plain relaxed atomics: they are observability data, not
//! synchronization, and a snapshot may be mid-update across fields.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::registry::DeliveryReport;

/// Live counters owned by a `Broker`.
#[derive(Debug, Default)]
pub(crate) struct BrokerStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    unroutable: AtomicU64,
    dropped_closed: AtomicU64,
    dropped_slow: AtomicU64,
    abandoned: AtomicU64,
    drained: AtomicU64,
}

/// Point-in-time copy of a broker's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStatsSnapshot {
    /// Messages accepted onto the inbound queue.
    pub enqueued: u64,
    /// Successful hand-offs to subscriber endpoints (one per endpoint).
    pub delivered: u64,
    /// Unicast messages whose recipient was not registered.
    pub unroutable: u64,
    /// Hand-offs skipped because the endpoint's receiver was gone.
    pub dropped_closed: u64,
    /// Hand-offs skipped in isolated mode because the endpoint was full.
    pub dropped_slow: u64,
    /// Messages left in the queue when the broker stopped.
    pub abandoned: u64,
    /// Messages routed after cancellation under the drain policy.
    pub drained: u64,
}

impl BrokerStats {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self, report: &DeliveryReport) {
        if report.unroutable {
            self.unroutable.fetch_add(1, Ordering::Relaxed);
        }
        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped_closed
            .fetch_add(report.closed as u64, Ordering::Relaxed);
        self.dropped_slow.fetch_add(report.slow as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self, count: usize) {
        self.abandoned.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_drained(&self) {
        self.drained.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BrokerStatsSnapshot {
        BrokerStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            dropped_closed: self.dropped_closed.load(Ordering::Relaxed),
            dropped_slow: self.dropped_slow.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
        }
    }
}
