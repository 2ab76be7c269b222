//! Async stage: bounded queue drained by one background worker
//!
//! ```text
//! enqueue() ──→ [VecDeque + overflow policy] ──notify──→ worker task
//!                        ↑                                   │ spawn_blocking
//!               flush sentinel                               ↓
//!                                       drain run ──→ next stage (blocking I/O)
//!                                           │
//!                              Deferred admission, awaited on the worker task
//! ```
//!
//! Forwarding can block on target I/O, so each run of queued items is
//! forwarded on the blocking pool; the worker task itself only waits.
//!
//! Worker lifecycle: `Idle → Draining → Idle`, with `ShuttingDown` reachable
//! from either. Once shutting down, new events fail with a shutdown error and
//! the worker drains until the deadline; anything left fails with a timeout.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use scribe_protocol::{Continuation, DeliveryError, Envelope};
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;

use super::{Admission, Stage, StageKind};
use crate::metrics::StageMetrics;

/// Default queue limit
pub const DEFAULT_QUEUE_LIMIT: usize = 10_000;

/// Default time a `Block` enqueue waits for space
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Default hard ceiling for the `Grow` policy
pub const DEFAULT_GROW_CEILING: usize = 1_000_000;

/// Drain budget used when a stage is dropped without an explicit shutdown
const DROP_DRAIN_BUDGET: Duration = Duration::from_secs(1);

/// What to do when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Block the caller until space frees up or the block timeout elapses
    Block,
    /// Fail the oldest queued event with an overflow error and enqueue
    #[default]
    DiscardOldest,
    /// Keep growing up to the hard ceiling
    Grow,
}

/// Configuration for an async stage
#[derive(Debug, Clone)]
pub struct AsyncStageConfig {
    /// Queue capacity (events; flush sentinels do not count)
    pub queue_limit: usize,
    /// Behavior when the queue is full
    pub overflow: OverflowPolicy,
    /// How long a `Block` enqueue may wait
    pub block_timeout: Duration,
    /// Absolute queue ceiling under `Grow`
    pub grow_ceiling: usize,
}

impl Default for AsyncStageConfig {
    fn default() -> Self {
        Self {
            queue_limit: DEFAULT_QUEUE_LIMIT,
            overflow: OverflowPolicy::default(),
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
            grow_ceiling: DEFAULT_GROW_CEILING,
        }
    }
}

impl AsyncStageConfig {
    pub fn with_queue_limit(mut self, limit: usize) -> Self {
        self.queue_limit = limit;
        self
    }

    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    pub fn with_grow_ceiling(mut self, ceiling: usize) -> Self {
        self.grow_ceiling = ceiling;
        self
    }
}

/// Worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Draining,
    ShuttingDown,
}

enum QueueItem {
    Event(Envelope),
    Flush(Continuation),
}

struct QueueState {
    items: VecDeque<QueueItem>,
    events: usize,
    phase: WorkerPhase,
    deadline: Option<Instant>,
    finished: bool,
    propagated: bool,
}

impl QueueState {
    fn remove_oldest_event(&mut self) -> Option<Envelope> {
        let pos = self
            .items
            .iter()
            .position(|item| matches!(item, QueueItem::Event(_)))?;
        match self.items.remove(pos) {
            Some(QueueItem::Event(envelope)) => {
                self.events -= 1;
                Some(envelope)
            }
            _ => None,
        }
    }

    fn take_all(&mut self) -> VecDeque<QueueItem> {
        self.events = 0;
        std::mem::take(&mut self.items)
    }
}

struct Shared {
    config: AsyncStageConfig,
    queue: Mutex<QueueState>,
    not_full: Condvar,
    finished: Condvar,
    wake: Notify,
    cancel: CancellationToken,
    next: Arc<dyn Stage>,
    metrics: StageMetrics,
}

/// Queueing stage with a single background worker
pub struct AsyncStage {
    shared: Arc<Shared>,
}

impl AsyncStage {
    /// Create the stage and spawn its worker on `runtime`
    pub fn new(config: AsyncStageConfig, next: Arc<dyn Stage>, runtime: &Handle) -> Self {
        let config = AsyncStageConfig {
            queue_limit: config.queue_limit.max(1),
            grow_ceiling: config.grow_ceiling.max(config.queue_limit.max(1)),
            ..config
        };
        let shared = Arc::new(Shared {
            config,
            queue: Mutex::new(QueueState {
                items: VecDeque::new(),
                events: 0,
                phase: WorkerPhase::Idle,
                deadline: None,
                finished: false,
                propagated: false,
            }),
            not_full: Condvar::new(),
            finished: Condvar::new(),
            wake: Notify::new(),
            cancel: CancellationToken::new(),
            next,
            metrics: StageMetrics::default(),
        });

        runtime.spawn(run_worker(Arc::clone(&shared)));
        Self { shared }
    }

    pub fn config(&self) -> &AsyncStageConfig {
        &self.shared.config
    }

    /// Events currently queued
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().events
    }

    pub fn phase(&self) -> WorkerPhase {
        self.shared.queue.lock().phase
    }

    fn push(&self, envelope: Envelope) {
        let shared = &*self.shared;
        let limit = shared.config.queue_limit;
        let mut evicted = None;

        let mut queue = shared.queue.lock();
        if queue.phase == WorkerPhase::ShuttingDown {
            drop(queue);
            StageMetrics::incr(&shared.metrics.rejected);
            envelope.complete(Err(DeliveryError::Shutdown));
            return;
        }

        if queue.events >= limit {
            match shared.config.overflow {
                OverflowPolicy::DiscardOldest => {
                    evicted = queue.remove_oldest_event();
                }
                OverflowPolicy::Grow => {
                    if queue.events >= shared.config.grow_ceiling {
                        drop(queue);
                        StageMetrics::incr(&shared.metrics.overflowed);
                        envelope.complete(Err(DeliveryError::overflow(format!(
                            "queue reached hard ceiling of {}",
                            shared.config.grow_ceiling
                        ))));
                        return;
                    }
                }
                OverflowPolicy::Block => {
                    let deadline = Instant::now() + shared.config.block_timeout;
                    while queue.events >= limit && queue.phase != WorkerPhase::ShuttingDown {
                        if shared.not_full.wait_until(&mut queue, deadline).timed_out() {
                            break;
                        }
                    }
                    if queue.phase == WorkerPhase::ShuttingDown {
                        drop(queue);
                        StageMetrics::incr(&shared.metrics.rejected);
                        envelope.complete(Err(DeliveryError::Shutdown));
                        return;
                    }
                    if queue.events >= limit {
                        drop(queue);
                        StageMetrics::incr(&shared.metrics.overflowed);
                        envelope.complete(Err(DeliveryError::overflow(format!(
                            "queue full ({limit}) after blocking {:?}",
                            shared.config.block_timeout
                        ))));
                        return;
                    }
                }
            }
        }

        queue.items.push_back(QueueItem::Event(envelope));
        queue.events += 1;
        drop(queue);

        StageMetrics::incr(&shared.metrics.enqueued);
        if let Some(oldest) = evicted {
            StageMetrics::incr(&shared.metrics.overflowed);
            oldest.complete(Err(DeliveryError::overflow(format!(
                "discarded oldest event, queue limit {limit}"
            ))));
        }
        shared.wake.notify_one();
    }

    fn begin_shutdown(&self, deadline: Instant) {
        let mut queue = self.shared.queue.lock();
        if queue.phase != WorkerPhase::ShuttingDown {
            queue.phase = WorkerPhase::ShuttingDown;
            queue.deadline = Some(deadline);
        }
        drop(queue);

        self.shared.cancel.cancel();
        self.shared.wake.notify_one();
        self.shared.not_full.notify_all();
    }
}

impl Stage for AsyncStage {
    fn kind(&self) -> StageKind {
        StageKind::Async
    }

    fn enqueue_batch(&self, batch: Vec<Envelope>) -> Admission {
        for envelope in batch {
            self.push(envelope);
        }
        Admission::Accepted
    }

    fn flush(&self, continuation: Continuation) {
        let mut queue = self.shared.queue.lock();
        if queue.phase == WorkerPhase::ShuttingDown {
            drop(queue);
            continuation.fail(DeliveryError::Shutdown);
            return;
        }
        queue.items.push_back(QueueItem::Flush(continuation));
        drop(queue);
        self.shared.wake.notify_one();
    }

    fn shutdown(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        self.begin_shutdown(deadline);

        let leftovers = {
            let mut queue = self.shared.queue.lock();
            let deadline = queue.deadline.unwrap_or(deadline);
            while !queue.finished {
                if self
                    .shared
                    .finished
                    .wait_until(&mut queue, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            if queue.propagated {
                return;
            }
            queue.propagated = true;
            queue.take_all()
        };

        fail_leftovers(&self.shared, leftovers);
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

impl Drop for AsyncStage {
    fn drop(&mut self) {
        // Let the worker drain in the background and exit
        self.begin_shutdown(Instant::now() + DROP_DRAIN_BUDGET);
    }
}

fn fail_leftovers(shared: &Shared, leftovers: VecDeque<QueueItem>) {
    if leftovers.is_empty() {
        return;
    }
    tracing::warn!(
        remaining = leftovers.len(),
        "async stage shutdown timed out, failing queued events"
    );
    for item in leftovers {
        match item {
            QueueItem::Event(envelope) => {
                StageMetrics::incr(&shared.metrics.timed_out);
                envelope.complete(Err(DeliveryError::timeout(
                    "shutdown drain timed out",
                )));
            }
            QueueItem::Flush(continuation) => {
                continuation.fail(DeliveryError::timeout("shutdown drain timed out"));
            }
        }
    }
}

enum Step {
    Item(QueueItem),
    Wait,
    Exit,
}

fn next_step(shared: &Shared) -> Step {
    let mut queue = shared.queue.lock();
    let expired = queue.phase == WorkerPhase::ShuttingDown
        && queue.deadline.is_some_and(|d| Instant::now() >= d);

    if expired {
        Step::Exit
    } else {
        match queue.items.pop_front() {
            Some(item) => {
                if matches!(item, QueueItem::Event(_)) {
                    queue.events -= 1;
                    shared.not_full.notify_one();
                }
                if queue.phase == WorkerPhase::Idle {
                    queue.phase = WorkerPhase::Draining;
                }
                Step::Item(item)
            }
            None if queue.phase == WorkerPhase::ShuttingDown => Step::Exit,
            None => {
                queue.phase = WorkerPhase::Idle;
                Step::Wait
            }
        }
    }
}

/// Forward `first` and the items queued behind it until the queue runs dry
/// or the next stage defers; a deferred admission is handed back
fn drain_run(shared: &Shared, first: QueueItem) -> Option<oneshot::Receiver<()>> {
    let mut item = first;
    loop {
        match item {
            QueueItem::Event(envelope) => {
                StageMetrics::incr(&shared.metrics.forwarded);
                if let Admission::Deferred(rx) = shared.next.enqueue(envelope) {
                    return Some(rx);
                }
            }
            QueueItem::Flush(continuation) => shared.next.flush(continuation),
        }
        match next_step(shared) {
            Step::Item(next) => item = next,
            Step::Wait | Step::Exit => return None,
        }
    }
}

async fn run_worker(shared: Arc<Shared>) {
    loop {
        match next_step(&shared) {
            Step::Item(item) => {
                let run = Arc::clone(&shared);
                match tokio::task::spawn_blocking(move || drain_run(&run, item)).await {
                    Ok(Some(rx)) => await_admission(&shared, rx).await,
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %e, "async stage forward failed"),
                }
            }
            Step::Wait => {
                tokio::select! {
                    _ = shared.wake.notified() => {}
                    _ = shared.cancel.cancelled() => {}
                }
            }
            Step::Exit => break,
        }
    }

    let leftovers = shared.queue.lock().take_all();
    fail_leftovers(&shared, leftovers);
    shared.queue.lock().finished = true;
    shared.finished.notify_all();
    tracing::debug!("async stage worker stopped");
}

async fn await_admission(shared: &Shared, mut rx: oneshot::Receiver<()>) {
    loop {
        let deadline = shared.queue.lock().deadline;
        match deadline {
            Some(deadline) => {
                let deadline = tokio::time::Instant::from_std(deadline);
                let _ = tokio::time::timeout_at(deadline, &mut rx).await;
                return;
            }
            None => {
                tokio::select! {
                    _ = &mut rx => return,
                    _ = shared.cancel.cancelled() => continue,
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "async_stage_test.rs"]
mod async_stage_test;
