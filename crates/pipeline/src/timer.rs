//! Timer service
//!
//! "Invoke this callback after a delay" with two interchangeable strategies:
//!
//! - **Pool**: each timer is a task on a tokio runtime; callbacks run on the
//!   runtime's blocking pool, since they may deliver to targets.
//! - **Dedicated**: a single background thread keeps a deadline heap and runs
//!   every callback itself, in deadline order.
//!
//! Cancellation is lazy: a cancelled timer stays scheduled and is skipped
//! when it comes due.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::runtime::Handle;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Which strategy a `Timer` uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerStrategy {
    /// Tokio tasks on the runtime worker pool
    #[default]
    Pool,
    /// One dedicated timer thread
    Dedicated,
}

/// Handle to a scheduled callback
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Prevent the callback from running if it has not started yet
    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Cloneable timer service
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

enum TimerInner {
    Pool(Handle),
    Dedicated(DedicatedTimer),
}

impl Timer {
    /// Timer backed by tasks on the given runtime
    pub fn pooled(handle: Handle) -> Self {
        Self {
            inner: Arc::new(TimerInner::Pool(handle)),
        }
    }

    /// Timer backed by a new dedicated thread
    pub fn dedicated(name: &str) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(TimerInner::Dedicated(DedicatedTimer::spawn(name)?)),
        })
    }

    /// Build a timer for a strategy; `Pool` needs a runtime handle
    pub fn with_strategy(strategy: TimerStrategy, handle: &Handle) -> io::Result<Self> {
        match strategy {
            TimerStrategy::Pool => Ok(Self::pooled(handle.clone())),
            TimerStrategy::Dedicated => Self::dedicated("scribe-timer"),
        }
    }

    pub fn strategy(&self) -> TimerStrategy {
        match &*self.inner {
            TimerInner::Pool(_) => TimerStrategy::Pool,
            TimerInner::Dedicated(_) => TimerStrategy::Dedicated,
        }
    }

    /// Run `callback` once after `delay`, unless cancelled first
    pub fn schedule(&self, delay: Duration, callback: impl FnOnce() + Send + 'static) -> TimerHandle {
        let handle = TimerHandle::new();
        match &*self.inner {
            TimerInner::Pool(runtime) => {
                let token = handle.clone();
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if !token.is_cancelled() {
                        tokio::task::spawn_blocking(callback);
                    }
                });
            }
            TimerInner::Dedicated(timer) => {
                timer.push(Instant::now() + delay, handle.clone(), Box::new(callback));
            }
        }
        handle
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("strategy", &self.strategy())
            .finish()
    }
}

// =============================================================================
// Dedicated-thread strategy
// =============================================================================

struct Entry {
    deadline: Instant,
    seq: u64,
    handle: TimerHandle,
    callback: Callback,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap is a max-heap; reverse so the earliest deadline is on top
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct DedicatedShared {
    heap: Mutex<DedicatedState>,
    wake: Condvar,
    next_seq: AtomicU64,
}

struct DedicatedState {
    entries: BinaryHeap<Entry>,
    stopped: bool,
}

struct DedicatedTimer {
    shared: Arc<DedicatedShared>,
    thread: Option<thread::JoinHandle<()>>,
}

impl DedicatedTimer {
    fn spawn(name: &str) -> io::Result<Self> {
        let shared = Arc::new(DedicatedShared {
            heap: Mutex::new(DedicatedState {
                entries: BinaryHeap::new(),
                stopped: false,
            }),
            wake: Condvar::new(),
            next_seq: AtomicU64::new(0),
        });

        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_dedicated(&worker))?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    fn push(&self, deadline: Instant, handle: TimerHandle, callback: Callback) {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut state = self.shared.heap.lock();
        if state.stopped {
            return;
        }
        state.entries.push(Entry {
            deadline,
            seq,
            handle,
            callback,
        });
        self.shared.wake.notify_one();
    }
}

impl Drop for DedicatedTimer {
    fn drop(&mut self) {
        let pending = {
            let mut state = self.shared.heap.lock();
            state.stopped = true;
            std::mem::take(&mut state.entries)
        };
        self.shared.wake.notify_all();
        drop(pending);

        if let Some(thread) = self.thread.take()
            && thread.thread().id() != thread::current().id()
        {
            let _ = thread.join();
        }
    }
}

fn run_dedicated(shared: &DedicatedShared) {
    let mut state = shared.heap.lock();
    loop {
        if state.stopped {
            return;
        }

        let now = Instant::now();
        let next_deadline = state.entries.peek().map(|e| e.deadline);
        match next_deadline {
            None => {
                shared.wake.wait(&mut state);
            }
            Some(deadline) if deadline > now => {
                shared.wake.wait_until(&mut state, deadline);
            }
            Some(_) => {
                let Some(entry) = state.entries.pop() else {
                    continue;
                };
                if entry.handle.is_cancelled() {
                    continue;
                }
                // Callbacks may schedule new timers, so run them unlocked
                drop(state);
                (entry.callback)();
                state = shared.heap.lock();
            }
        }
    }
}

#[cfg(test)]
#[path = "timer_test.rs"]
mod timer_test;
