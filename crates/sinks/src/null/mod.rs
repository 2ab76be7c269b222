//! Null target - discards everything
//!
//! Counts what it receives and drops it. Useful for measuring routing and
//! stage overhead without I/O, and as a placeholder in configurations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use scribe_pipeline::Target;
use scribe_protocol::{Continuation, DeliveryResult, Event};

/// Counters for the null target
#[derive(Debug, Default)]
pub struct NullTargetMetrics {
    batches_received: AtomicU64,
    events_received: AtomicU64,
    flushes: AtomicU64,
}

impl NullTargetMetrics {
    #[inline]
    pub const fn new() -> Self {
        Self {
            batches_received: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_batch(&self, event_count: u64) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
        self.events_received
            .fetch_add(event_count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_received: self.batches_received.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.batches_received.store(0, Ordering::Relaxed);
        self.events_received.store(0, Ordering::Relaxed);
        self.flushes.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of null target counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub batches_received: u64,
    pub events_received: u64,
    pub flushes: u64,
}

/// Target that accepts and drops every event
pub struct NullTarget {
    name: String,
    metrics: Arc<NullTargetMetrics>,
}

impl NullTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: Arc::new(NullTargetMetrics::new()),
        }
    }

    /// Shared handle to the counters, valid after the target is dropped
    pub fn metrics_handle(&self) -> Arc<NullTargetMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn metrics(&self) -> &NullTargetMetrics {
        &self.metrics
    }
}

impl Target for NullTarget {
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn write(&self, _event: &Event) -> DeliveryResult {
        self.metrics.record_batch(1);
        Ok(())
    }

    #[inline]
    fn write_batch(&self, events: &[Arc<Event>]) -> DeliveryResult {
        self.metrics.record_batch(events.len() as u64);
        Ok(())
    }

    fn flush(&self, continuation: Continuation) {
        self.metrics.flushes.fetch_add(1, Ordering::Relaxed);
        continuation.succeed();
    }
}
