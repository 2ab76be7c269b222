//! Terminal stage: hands events to the target

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use scribe_protocol::{Continuation, DeliveryError, Envelope};

use super::{Admission, Stage, StageKind};
use crate::metrics::StageMetrics;
use crate::target::Target;

/// Last stage of every pipeline
pub struct TerminalStage {
    target: Arc<dyn Target>,
    closed: AtomicBool,
    metrics: StageMetrics,
}

impl TerminalStage {
    pub fn new(target: Arc<dyn Target>) -> Self {
        Self {
            target,
            closed: AtomicBool::new(false),
            metrics: StageMetrics::default(),
        }
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }
}

impl Stage for TerminalStage {
    fn kind(&self) -> StageKind {
        StageKind::Terminal
    }

    fn enqueue_batch(&self, batch: Vec<Envelope>) -> Admission {
        if batch.is_empty() {
            return Admission::Accepted;
        }
        if self.closed.load(Ordering::Acquire) {
            StageMetrics::add(&self.metrics.rejected, batch.len() as u64);
            for envelope in batch {
                envelope.complete(Err(DeliveryError::Shutdown));
            }
            return Admission::Accepted;
        }

        StageMetrics::add(&self.metrics.enqueued, batch.len() as u64);
        let result = match batch.as_slice() {
            [single] => self.target.write(&single.event),
            many => {
                let events: Vec<_> = many.iter().map(|e| Arc::clone(&e.event)).collect();
                self.target.write_batch(&events)
            }
        };
        if result.is_ok() {
            StageMetrics::add(&self.metrics.forwarded, batch.len() as u64);
        }

        for envelope in batch {
            envelope.complete(result.clone());
        }
        Admission::Accepted
    }

    fn flush(&self, continuation: Continuation) {
        if self.closed.load(Ordering::Acquire) {
            continuation.fail(DeliveryError::Shutdown);
            return;
        }
        self.target.flush(continuation);
    }

    fn shutdown(&self, _timeout: Duration) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(target_name = self.target.name(), "closing target");
            self.target.close();
        }
    }

    fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    fn next(&self) -> Option<&dyn Stage> {
        None
    }
}
