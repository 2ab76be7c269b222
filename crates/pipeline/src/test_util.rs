//! Shared fixtures for pipeline unit tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use scribe_protocol::{
    Continuation, DeliveryError, DeliveryResult, Envelope, Event, Level,
};
use tokio::sync::oneshot;

use crate::target::Target;

/// Target that records messages and can be scripted to fail
#[derive(Default)]
pub struct RecordingTarget {
    name: String,
    written: Mutex<Vec<String>>,
    batch_sizes: Mutex<Vec<usize>>,
    failures: Mutex<VecDeque<DeliveryError>>,
    write_calls: AtomicUsize,
    flushes: AtomicUsize,
    initialized: AtomicUsize,
    closed: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingTarget {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay: Some(delay),
            ..Default::default()
        })
    }

    /// Fail the next write calls, in order
    pub fn fail_next(&self, errors: impl IntoIterator<Item = DeliveryError>) {
        self.failures.lock().extend(errors);
    }

    pub fn messages(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn initializations(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn attempt(&self, events: &[&Event]) -> DeliveryResult {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        self.batch_sizes.lock().push(events.len());
        self.written
            .lock()
            .extend(events.iter().map(|e| e.message().to_string()));
        Ok(())
    }
}

impl Target for RecordingTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, _timer: &crate::timer::Timer) {
        self.initialized.fetch_add(1, Ordering::SeqCst);
    }

    fn write(&self, event: &Event) -> DeliveryResult {
        self.attempt(&[event])
    }

    fn write_batch(&self, events: &[Arc<Event>]) -> DeliveryResult {
        let refs: Vec<&Event> = events.iter().map(|e| e.as_ref()).collect();
        self.attempt(&refs)
    }

    fn flush(&self, continuation: Continuation) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        continuation.succeed();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Results collected from continuations, keyed by message
#[derive(Clone, Default)]
pub struct Outcomes {
    results: Arc<Mutex<Vec<(String, DeliveryResult)>>>,
}

impl Outcomes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelope for `message` whose completion is recorded here
    pub fn envelope(&self, message: &str) -> Envelope {
        let event = Arc::new(Event::new(Level::Info, "test", message));
        let results = Arc::clone(&self.results);
        let message = message.to_string();
        Envelope::new(
            event,
            Continuation::new(move |result| results.lock().push((message, result))),
        )
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn result_for(&self, message: &str) -> Option<DeliveryResult> {
        self.results
            .lock()
            .iter()
            .find(|(m, _)| m == message)
            .map(|(_, r)| r.clone())
    }

    /// Number of completions seen for `message`
    pub fn count_for(&self, message: &str) -> usize {
        self.results.lock().iter().filter(|(m, _)| m == message).count()
    }

    pub fn successes(&self) -> usize {
        self.results.lock().iter().filter(|(_, r)| r.is_ok()).count()
    }

    /// Poll until `expected` completions arrived
    pub fn wait_for(&self, expected: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.len() >= expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        self.len() >= expected
    }
}

/// Continuation paired with a receiver for its result
pub fn completion() -> (Continuation, oneshot::Receiver<DeliveryResult>) {
    let (tx, rx) = oneshot::channel();
    let continuation = Continuation::new(move |result| {
        let _ = tx.send(result);
    });
    (continuation, rx)
}
