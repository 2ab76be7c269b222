//! Router and stage metrics
//!
//! Atomic counters with relaxed ordering. Values are eventually consistent
//! and meant for monitoring, not for synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for the event router
#[derive(Debug, Default)]
pub struct RouterMetrics {
    /// Events passed to `dispatch`
    events_received: AtomicU64,

    /// Events handed to at least one pipeline
    events_routed: AtomicU64,

    /// Events matching no rule
    events_unmatched: AtomicU64,

    /// Enqueue calls made (one per matched target per event)
    enqueues: AtomicU64,

    /// Continuations completed successfully
    deliveries_succeeded: AtomicU64,

    /// Continuations completed with an error
    deliveries_failed: AtomicU64,
}

impl RouterMetrics {
    #[inline]
    pub const fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_routed: AtomicU64::new(0),
            events_unmatched: AtomicU64::new(0),
            enqueues: AtomicU64::new(0),
            deliveries_succeeded: AtomicU64::new(0),
            deliveries_failed: AtomicU64::new(0),
        }
    }

    /// Record an event entering the router
    #[inline]
    pub fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event handed to `targets` pipelines
    #[inline]
    pub fn record_routed(&self, targets: usize) {
        self.events_routed.fetch_add(1, Ordering::Relaxed);
        self.enqueues.fetch_add(targets as u64, Ordering::Relaxed);
    }

    /// Record an event that matched no rule
    #[inline]
    pub fn record_unmatched(&self) {
        self.events_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delivery_succeeded(&self) {
        self.deliveries_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delivery_failed(&self) {
        self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> RouterSnapshot {
        RouterSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_routed: self.events_routed.load(Ordering::Relaxed),
            events_unmatched: self.events_unmatched.load(Ordering::Relaxed),
            enqueues: self.enqueues.load(Ordering::Relaxed),
            deliveries_succeeded: self.deliveries_succeeded.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of router metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterSnapshot {
    pub events_received: u64,
    pub events_routed: u64,
    pub events_unmatched: u64,
    pub enqueues: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
}

impl RouterSnapshot {
    /// Delivery success rate (0.0 - 1.0), None before any delivery completes
    #[inline]
    pub fn delivery_success_rate(&self) -> Option<f64> {
        let total = self.deliveries_succeeded + self.deliveries_failed;
        if total == 0 {
            None
        } else {
            Some(self.deliveries_succeeded as f64 / total as f64)
        }
    }
}

/// Counters shared by all stage kinds; each stage uses the ones that apply
#[derive(Debug, Default)]
pub struct StageMetrics {
    /// Events accepted into the stage
    pub enqueued: AtomicU64,
    /// Events handed to the next stage
    pub forwarded: AtomicU64,
    /// Events failed with an overflow error
    pub overflowed: AtomicU64,
    /// Events rejected because the stage was shutting down
    pub rejected: AtomicU64,
    /// Events failed because a shutdown drain ran out of time
    pub timed_out: AtomicU64,
    /// Batches forwarded by a buffering stage
    pub batches: AtomicU64,
    /// Re-delivery attempts scheduled by a retrying stage
    pub retries: AtomicU64,
    /// Events that failed after their final attempt
    pub exhausted: AtomicU64,
}

impl StageMetrics {
    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of stage metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageSnapshot {
    pub enqueued: u64,
    pub forwarded: u64,
    pub overflowed: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub batches: u64,
    pub retries: u64,
    pub exhausted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_counters() {
        let metrics = RouterMetrics::new();
        metrics.record_received();
        metrics.record_routed(3);
        metrics.record_received();
        metrics.record_unmatched();

        let s = metrics.snapshot();
        assert_eq!(s.events_received, 2);
        assert_eq!(s.events_routed, 1);
        assert_eq!(s.enqueues, 3);
        assert_eq!(s.events_unmatched, 1);
    }

    #[test]
    fn test_delivery_success_rate() {
        let metrics = RouterMetrics::new();
        assert_eq!(metrics.snapshot().delivery_success_rate(), None);

        metrics.record_delivery_succeeded();
        metrics.record_delivery_succeeded();
        metrics.record_delivery_succeeded();
        metrics.record_delivery_failed();
        assert_eq!(metrics.snapshot().delivery_success_rate(), Some(0.75));
    }

    #[test]
    fn test_stage_counters() {
        let metrics = StageMetrics::default();
        StageMetrics::incr(&metrics.enqueued);
        StageMetrics::add(&metrics.forwarded, 4);
        let s = metrics.snapshot();
        assert_eq!(s.enqueued, 1);
        assert_eq!(s.forwarded, 4);
        assert_eq!(s.overflowed, 0);
    }
}
