//! Target (sink) contract
//!
//! A target is the terminal destination for events: a file, the console, an
//! in-memory buffer, or anything external. Targets are synchronous; queueing,
//! batching and retry are layered on top by pipeline stages.

use std::sync::Arc;

use scribe_protocol::{Continuation, DeliveryResult, Event};

use crate::timer::Timer;

/// Destination for fully formed events
pub trait Target: Send + Sync {
    /// Target name, for diagnostics
    fn name(&self) -> &str;

    /// Called once when a pipeline is built around the target; periodic
    /// housekeeping is scheduled on `timer`
    fn initialize(&self, _timer: &Timer) {}

    /// Deliver one event
    fn write(&self, event: &Event) -> DeliveryResult;

    /// Deliver a batch
    ///
    /// The result applies to the whole batch. The default writes events one
    /// at a time and stops at the first failure, so a retried batch may
    /// repeat events that were already written.
    fn write_batch(&self, events: &[Arc<Event>]) -> DeliveryResult {
        for event in events {
            self.write(event)?;
        }
        Ok(())
    }

    /// Flush buffered output, then complete the continuation
    fn flush(&self, continuation: Continuation) {
        continuation.succeed();
    }

    /// Release resources; called once when the pipeline shuts down
    fn close(&self) {}
}
