//! Retrying stage
//!
//! An explicit retry state machine. Work is processed one unit at a time so
//! a retried batch is never overtaken by later events:
//!
//! ```text
//!            submit            all slots Ok / final
//!   Idle ───────────→ Delivering ─────────────────→ (next unit | Idle)
//!                        │   ↑
//!       retryable error  │   │ backoff timer fires
//!                        ↓   │
//!                       Backoff
//! ```
//!
//! A unit is re-delivered while its error is retryable and the attempt count
//! is below `max_retries`. Afterwards each original continuation gets
//! `RetriesExhausted` wrapping the last error.
//!
//! At most `queue_limit` events wait behind the unit in flight; beyond that
//! new events fail with `Overflow` instead of queueing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use scribe_protocol::{Continuation, DeliveryError, DeliveryResult, Envelope};
use tokio::sync::oneshot;

use super::{Admission, Stage, StageKind};
use crate::metrics::StageMetrics;
use crate::timer::Timer;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Default cap on the backoff delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Default number of events allowed to wait for delivery
pub const DEFAULT_RETRY_QUEUE_LIMIT: usize = 10_000;

/// Retry count and backoff curve
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Re-deliveries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Growth factor between consecutive retries
    pub multiplier: f64,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Events allowed to wait behind the unit in flight
    pub queue_limit: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: 2.0,
            max_delay: DEFAULT_MAX_DELAY,
            queue_limit: DEFAULT_RETRY_QUEUE_LIMIT,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_queue_limit(mut self, limit: usize) -> Self {
        self.queue_limit = limit.max(1);
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }
}

enum Work {
    Deliver { batch: Vec<Envelope>, attempt: u32 },
    Flush(Continuation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Delivering,
    Backoff,
}

struct RetryState {
    phase: Phase,
    queue: VecDeque<Work>,
    /// Events inside `queue`
    queued_events: usize,
    waiters: Vec<oneshot::Sender<()>>,
    closed: bool,
}

// Who resolves a finished attempt: the pump loop if every slot completed
// while `enqueue_batch` was still on the stack, otherwise the last slot.
const DISPATCHING: u8 = 0;
const COMPLETED_INLINE: u8 = 1;
const RETURNED: u8 = 2;

struct Attempt {
    number: u32,
    originals: Mutex<Vec<Envelope>>,
    results: Mutex<Vec<Option<DeliveryResult>>>,
    remaining: AtomicUsize,
    handoff: AtomicU8,
}

struct Shared {
    policy: RetryPolicy,
    state: Mutex<RetryState>,
    idle: Condvar,
    next: Arc<dyn Stage>,
    timer: Timer,
    metrics: StageMetrics,
}

/// Stage that re-delivers failed events with backoff
pub struct RetryingStage {
    shared: Arc<Shared>,
}

impl RetryingStage {
    pub fn new(policy: RetryPolicy, next: Arc<dyn Stage>, timer: Timer) -> Self {
        Self {
            shared: Arc::new(Shared {
                policy,
                state: Mutex::new(RetryState {
                    phase: Phase::Idle,
                    queue: VecDeque::new(),
                    queued_events: 0,
                    waiters: Vec::new(),
                    closed: false,
                }),
                idle: Condvar::new(),
                next,
                timer,
                metrics: StageMetrics::default(),
            }),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.shared.policy
    }

    /// True while a unit is in flight or waiting out a backoff
    pub fn is_busy(&self) -> bool {
        self.shared.state.lock().phase != Phase::Idle
    }
}

impl Shared {
    fn submit(self: &Arc<Self>, work: Work) -> Admission {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            reject(&self.metrics, work, DeliveryError::Shutdown);
            return Admission::Accepted;
        }
        if let Work::Deliver { batch, .. } = &work {
            // A unit larger than the limit still goes through when nothing waits
            let limit = self.policy.queue_limit.max(1);
            if state.queued_events > 0 && state.queued_events + batch.len() > limit {
                let queued = state.queued_events;
                drop(state);
                StageMetrics::add(&self.metrics.overflowed, work.len() as u64);
                tracing::debug!(queued, limit, "retry queue full, failing new events");
                reject(
                    &StageMetrics::default(),
                    work,
                    DeliveryError::overflow(format!(
                        "retry queue full ({queued} events waiting, limit {limit})"
                    )),
                );
                return Admission::Accepted;
            }
        }
        state.push_back(work);
        if state.phase != Phase::Idle {
            return deferred(&mut state);
        }
        state.phase = Phase::Delivering;
        drop(state);

        self.pump();

        let mut state = self.state.lock();
        if state.phase == Phase::Idle {
            Admission::Accepted
        } else {
            deferred(&mut state)
        }
    }

    fn pump(self: &Arc<Self>) {
        loop {
            let work = {
                let mut state = self.state.lock();
                match state.pop_front() {
                    Some(work) => work,
                    None => {
                        state.phase = Phase::Idle;
                        let waiters = std::mem::take(&mut state.waiters);
                        drop(state);
                        self.idle.notify_all();
                        for waiter in waiters {
                            let _ = waiter.send(());
                        }
                        return;
                    }
                }
            };

            match work {
                Work::Flush(continuation) => self.next.flush(continuation),
                Work::Deliver { batch, attempt } => match self.deliver(batch, attempt) {
                    Some(done) => {
                        if !self.resolve(&done) {
                            return;
                        }
                    }
                    None => return,
                },
            }
        }
    }

    /// Forward one unit; returns the attempt if it finished synchronously
    fn deliver(self: &Arc<Self>, batch: Vec<Envelope>, number: u32) -> Option<Arc<Attempt>> {
        let events: Vec<_> = batch.iter().map(|e| Arc::clone(&e.event)).collect();
        let attempt = Arc::new(Attempt {
            number,
            results: Mutex::new(vec![None; batch.len()]),
            remaining: AtomicUsize::new(batch.len()),
            originals: Mutex::new(batch),
            handoff: AtomicU8::new(DISPATCHING),
        });

        let forwarded = events
            .into_iter()
            .enumerate()
            .map(|(slot, event)| {
                let shared = Arc::clone(self);
                let attempt = Arc::clone(&attempt);
                Envelope::new(
                    event,
                    Continuation::new(move |result| shared.on_slot_done(&attempt, slot, result)),
                )
            })
            .collect::<Vec<_>>();

        StageMetrics::add(&self.metrics.forwarded, forwarded.len() as u64);
        let _ = self.next.enqueue_batch(forwarded);

        match attempt.handoff.compare_exchange(
            DISPATCHING,
            RETURNED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => None,
            Err(_) => Some(attempt),
        }
    }

    fn on_slot_done(self: &Arc<Self>, attempt: &Arc<Attempt>, slot: usize, result: DeliveryResult) {
        if let Some(entry) = attempt.results.lock().get_mut(slot) {
            *entry = Some(result);
        }
        if attempt.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let inline = attempt
            .handoff
            .compare_exchange(
                DISPATCHING,
                COMPLETED_INLINE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !inline && self.resolve(attempt) {
            self.pump();
        }
    }

    /// Complete or reschedule every slot; false when a backoff was scheduled
    fn resolve(self: &Arc<Self>, attempt: &Attempt) -> bool {
        let originals = std::mem::take(&mut *attempt.originals.lock());
        let results = std::mem::take(&mut *attempt.results.lock());

        let mut retry = Vec::new();
        let mut last_error = None;
        for (envelope, result) in originals.into_iter().zip(results) {
            match result.unwrap_or(Err(DeliveryError::Abandoned)) {
                Ok(()) => envelope.complete(Ok(())),
                Err(err) if err.is_retryable() && attempt.number < self.policy.max_retries => {
                    last_error = Some(err);
                    retry.push(envelope);
                }
                Err(err) if err.is_retryable() => {
                    StageMetrics::incr(&self.metrics.exhausted);
                    envelope.complete(Err(DeliveryError::retries_exhausted(
                        attempt.number + 1,
                        err,
                    )));
                }
                Err(err) => envelope.complete(Err(err)),
            }
        }

        if retry.is_empty() {
            return true;
        }

        let next_attempt = attempt.number + 1;
        let delay = self.policy.delay_for_retry(next_attempt);
        StageMetrics::add(&self.metrics.retries, retry.len() as u64);
        tracing::debug!(
            attempt = next_attempt,
            events = retry.len(),
            delay_ms = delay.as_millis() as u64,
            error = %last_error.map(|e| e.to_string()).unwrap_or_default(),
            "scheduling retry"
        );

        self.state.lock().phase = Phase::Backoff;
        let shared = Arc::clone(self);
        self.timer.schedule(delay, move || {
            {
                let mut state = shared.state.lock();
                state.push_front(Work::Deliver {
                    batch: retry,
                    attempt: next_attempt,
                });
                state.phase = Phase::Delivering;
            }
            shared.pump();
        });
        false
    }
}

impl Work {
    fn len(&self) -> usize {
        match self {
            Self::Deliver { batch, .. } => batch.len(),
            Self::Flush(_) => 0,
        }
    }
}

impl RetryState {
    fn push_back(&mut self, work: Work) {
        self.queued_events += work.len();
        self.queue.push_back(work);
    }

    fn push_front(&mut self, work: Work) {
        self.queued_events += work.len();
        self.queue.push_front(work);
    }

    fn pop_front(&mut self) -> Option<Work> {
        let work = self.queue.pop_front()?;
        self.queued_events -= work.len();
        Some(work)
    }
}

fn deferred(state: &mut RetryState) -> Admission {
    let (tx, rx) = oneshot::channel();
    state.waiters.push(tx);
    Admission::Deferred(rx)
}

fn reject(metrics: &StageMetrics, work: Work, err: DeliveryError) {
    match work {
        Work::Deliver { batch, .. } => {
            StageMetrics::add(&metrics.rejected, batch.len() as u64);
            for envelope in batch {
                envelope.complete(Err(err.clone()));
            }
        }
        Work::Flush(continuation) => continuation.fail(err),
    }
}

impl Stage for RetryingStage {
    fn kind(&self) -> StageKind {
        StageKind::Retrying
    }

    fn enqueue_batch(&self, batch: Vec<Envelope>) -> Admission {
        if batch.is_empty() {
            return Admission::Accepted;
        }
        StageMetrics::add(&self.shared.metrics.enqueued, batch.len() as u64);
        self.shared.submit(Work::Deliver { batch, attempt: 0 })
    }

    fn flush(&self, continuation: Continuation) {
        let _ = self.shared.submit(Work::Flush(continuation));
    }

    fn shutdown(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let (leftovers, waiters) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            while state.phase != Phase::Idle {
                if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            state.queued_events = 0;
            (
                std::mem::take(&mut state.queue),
                std::mem::take(&mut state.waiters),
            )
        };

        for waiter in waiters {
            let _ = waiter.send(());
        }
        if !leftovers.is_empty() {
            tracing::warn!(
                remaining = leftovers.len(),
                "retrying stage shutdown timed out, failing pending work"
            );
        }
        for work in leftovers {
            if let Work::Deliver { batch, .. } = &work {
                StageMetrics::add(&self.shared.metrics.timed_out, batch.len() as u64);
            }
            reject(
                &StageMetrics::default(),
                work,
                DeliveryError::timeout("shutdown drain timed out"),
            );
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        self.shared.next.shutdown(remaining);
    }

    fn metrics(&self) -> &StageMetrics {
        &self.shared.metrics
    }

    fn next(&self) -> Option<&dyn Stage> {
        Some(&*self.shared.next)
    }
}

#[cfg(test)]
#[path = "retrying_test.rs"]
mod retrying_test;
