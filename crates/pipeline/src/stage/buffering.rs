//! Buffering stage: collects events and forwards them as batches
//!
//! A batch is forwarded when it reaches `buffer_size` events or when the
//! flush timer elapses. With a sliding timeout every new event restarts the
//! timer; otherwise the timer starts with the first event of a batch.
//!
//! Under [`BufferOverflow::Discard`] a full buffer is not forwarded: the
//! oldest pending event fails with `Overflow` to make room, and events only
//! leave on the timer, an explicit flush or shutdown.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use scribe_protocol::{Continuation, DeliveryError, Envelope};

use super::{Admission, Stage, StageKind};
use crate::metrics::StageMetrics;
use crate::timer::{Timer, TimerHandle};

/// Default number of events per batch
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// What a full buffer does with the next event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferOverflow {
    /// Forward the full buffer as a batch
    #[default]
    Flush,
    /// Drop the oldest pending event
    Discard,
}

/// Configuration for a buffering stage
#[derive(Debug, Clone)]
pub struct BufferingConfig {
    /// Events per batch
    pub buffer_size: usize,
    /// Forward a partial batch after this long; `None` waits for a full
    /// batch or an explicit flush
    pub flush_timeout: Option<Duration>,
    /// Restart the timer on every event
    pub sliding_timeout: bool,
    pub overflow: BufferOverflow,
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_timeout: None,
            sliding_timeout: true,
            overflow: BufferOverflow::default(),
        }
    }
}

impl BufferingConfig {
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = Some(timeout);
        self
    }

    pub fn with_sliding_timeout(mut self, sliding: bool) -> Self {
        self.sliding_timeout = sliding;
        self
    }

    pub fn with_overflow(mut self, overflow: BufferOverflow) -> Self {
        self.overflow = overflow;
        self
    }
}

struct BufferState {
    pending: Vec<Envelope>,
    timer: Option<TimerHandle>,
    generation: u64,
    closed: bool,
}

struct Shared {
    config: BufferingConfig,
    // Held across take-and-forward so batches leave in the order they were
    // cut; always acquired before `state`. Reentrant because a synchronous
    // continuation may log back into this stage.
    order: ReentrantMutex<()>,
    state: Mutex<BufferState>,
    next: Arc<dyn Stage>,
    timer: Timer,
    metrics: StageMetrics,
}

/// Batching stage
pub struct BufferingStage {
    shared: Arc<Shared>,
}

impl BufferingStage {
    pub fn new(config: BufferingConfig, next: Arc<dyn Stage>, timer: Timer) -> Self {
        let config = BufferingConfig {
            buffer_size: config.buffer_size.max(1),
            ..config
        };
        Self {
            shared: Arc::new(Shared {
                order: ReentrantMutex::new(()),
                state: Mutex::new(BufferState {
                    pending: Vec::with_capacity(config.buffer_size),
                    timer: None,
                    generation: 0,
                    closed: false,
                }),
                config,
                next,
                timer,
                metrics: StageMetrics::default(),
            }),
        }
    }

    /// Events waiting for the next batch
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }
}

impl Shared {
    /// Take the current partial batch and disarm its timer
    fn take_batch(&self, state: &mut BufferState) -> Vec<Envelope> {
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.generation += 1;
        std::mem::replace(
            &mut state.pending,
            Vec::with_capacity(self.config.buffer_size),
        )
    }

    fn forward(&self, batch: Vec<Envelope>) -> Admission {
        if batch.is_empty() {
            return Admission::Accepted;
        }
        StageMetrics::incr(&self.metrics.batches);
        StageMetrics::add(&self.metrics.forwarded, batch.len() as u64);
        self.next.enqueue_batch(batch)
    }

    fn arm_timer(self: &Arc<Self>, state: &mut BufferState) {
        let Some(timeout) = self.config.flush_timeout else {
            return;
        };
        if state.timer.is_some() && !self.config.sliding_timeout {
            return;
        }
        if let Some(old) = state.timer.take() {
            old.cancel();
        }

        let generation = state.generation;
        let weak = Arc::downgrade(self);
        state.timer = Some(self.timer.schedule(timeout, move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let _order = shared.order.lock();
            let batch = {
                let mut state = shared.state.lock();
                if state.generation != generation || state.closed {
                    return;
                }
                state.timer = None;
                shared.take_batch(&mut state)
            };
            tracing::trace!(events = batch.len(), "buffer flush timer elapsed");
            let _ = shared.forward(batch);
        }));
    }
}

impl Stage for BufferingStage {
    fn kind(&self) -> StageKind {
        StageKind::Buffering
    }

    fn enqueue_batch(&self, batch: Vec<Envelope>) -> Admission {
        let shared = &self.shared;
        let _order = shared.order.lock();
        let mut ready = Vec::new();
        let mut discarded = Vec::new();
        {
            let mut state = shared.state.lock();
            if state.closed {
                drop(state);
                StageMetrics::add(&shared.metrics.rejected, batch.len() as u64);
                for envelope in batch {
                    envelope.complete(Err(DeliveryError::Shutdown));
                }
                return Admission::Accepted;
            }

            StageMetrics::add(&shared.metrics.enqueued, batch.len() as u64);
            for envelope in batch {
                match shared.config.overflow {
                    BufferOverflow::Flush => {
                        state.pending.push(envelope);
                        if state.pending.len() >= shared.config.buffer_size {
                            ready.push(shared.take_batch(&mut state));
                        }
                    }
                    BufferOverflow::Discard => {
                        if state.pending.len() >= shared.config.buffer_size {
                            discarded.push(state.pending.remove(0));
                        }
                        state.pending.push(envelope);
                    }
                }
            }
            if !state.pending.is_empty() {
                shared.arm_timer(&mut state);
            }
        }

        if !discarded.is_empty() {
            StageMetrics::add(&shared.metrics.overflowed, discarded.len() as u64);
            let limit = shared.config.buffer_size;
            for envelope in discarded {
                envelope.complete(Err(DeliveryError::overflow(format!(
                    "buffer full ({limit}), discarded oldest event"
                ))));
            }
        }

        let mut admission = Admission::Accepted;
        for batch in ready {
            admission = shared.forward(batch);
        }
        admission
    }

    fn flush(&self, continuation: Continuation) {
        let _order = self.shared.order.lock();
        let batch = {
            let mut state = self.shared.state.lock();
            if state.closed {
                drop(state);
                continuation.fail(DeliveryError::Shutdown);
                return;
            }
            self.shared.take_batch(&mut state)
        };
        let _ = self.shared.forward(batch);
        self.shared.next.flush(continuation);
    }

    fn shutdown(&self, timeout: Duration) {
        let _order = self.shared.order.lock();
        let batch = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            self.shared.take_batch(&mut state)
        };
        let _ = self.shared.forward(batch);
        self.shared.next.shutdown(timeout);
    }

    fn metrics(&self) -> &StageMetrics {
        &self.shared.metrics
    }

    fn next(&self) -> Option<&dyn Stage> {
        Some(&*self.shared.next)
    }
}

#[cfg(test)]
#[path = "buffering_test.rs"]
mod buffering_test;
