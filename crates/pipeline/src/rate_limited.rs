//! Rate-limited diagnostics
//!
//! Hot-path failures (a target failing on every event, a file that cannot be
//! stat'ed on every write) would otherwise flood the log. A
//! `RateLimitedLogger` emits at most one record per interval and reports how
//! many were suppressed in between.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between records
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Severity of a rate-limited record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Error,
}

/// Logs at most once per interval, counting what it suppresses
pub struct RateLimitedLogger {
    min_interval: Duration,
    last_logged: Mutex<Option<Instant>>,
    pending: AtomicU64,
    total: AtomicU64,
}

impl RateLimitedLogger {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_logged: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record a warning; returns true if it was emitted
    pub fn warn(&self, context: &str, message: &str, error: &dyn Display) -> bool {
        self.record(Severity::Warn, context, message, error)
    }

    /// Record an error; returns true if it was emitted
    pub fn error(&self, context: &str, message: &str, error: &dyn Display) -> bool {
        self.record(Severity::Error, context, message, error)
    }

    fn record(&self, severity: Severity, context: &str, message: &str, error: &dyn Display) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.due() {
            return false;
        }

        let suppressed = self.pending.swap(0, Ordering::Relaxed).saturating_sub(1);
        match severity {
            Severity::Warn => tracing::warn!(
                context = %context,
                error = %error,
                suppressed_count = suppressed,
                total,
                "{message}"
            ),
            Severity::Error => tracing::error!(
                context = %context,
                error = %error,
                suppressed_count = suppressed,
                total,
                "{message}"
            ),
        }
        true
    }

    fn due(&self) -> bool {
        let mut last = self.last_logged.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Records suppressed since the last emitted one
    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Records ever passed in
    pub fn total_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.pending.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
        *self.last_logged.lock() = None;
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

impl std::fmt::Debug for RateLimitedLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedLogger")
            .field("min_interval", &self.min_interval)
            .field("total", &self.total_count())
            .finish()
    }
}
