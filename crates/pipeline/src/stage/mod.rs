//! Pipeline stages
//!
//! Every stage exposes the same contract (`enqueue`, `flush`, `shutdown`), so
//! stages compose into a chain where each one owns the stage below it:
//!
//! ```text
//! [Async] ──→ [Buffering] ──→ [Retrying] ──→ [Terminal] ──→ Target
//!  queue +     count/timer     backoff via      write /
//!  worker      batching        Timer            write_batch
//! ```
//!
//! Every envelope's continuation is completed exactly once by whichever
//! stage finishes with it: the terminal stage on delivery, or an upper stage
//! on overflow, retry exhaustion, shutdown or timeout.

mod async_stage;
mod buffering;
mod retrying;
mod terminal;

use std::time::Duration;

use scribe_protocol::{Continuation, Envelope};
use tokio::sync::oneshot;

use crate::metrics::StageMetrics;

pub use async_stage::{AsyncStage, AsyncStageConfig, OverflowPolicy};
pub use buffering::{BufferOverflow, BufferingConfig, BufferingStage};
pub use retrying::{RetryPolicy, RetryingStage};
pub use terminal::TerminalStage;

/// Stage variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Async,
    Buffering,
    Retrying,
    Terminal,
}

/// Whether a stage can take more work right away
///
/// A retrying stage that is waiting out a backoff returns `Deferred`; an
/// async worker above it waits for the signal before forwarding the next
/// event, which keeps per-pipeline order and lets the queue fill up (and
/// apply its overflow policy) while the target is failing.
#[derive(Debug)]
pub enum Admission {
    Accepted,
    Deferred(oneshot::Receiver<()>),
}

impl Admission {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Wait until the stage is ready for more work
    pub async fn ready(self) {
        if let Self::Deferred(rx) = self {
            let _ = rx.await;
        }
    }
}

/// Common contract for all pipeline stages
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Accept one event
    fn enqueue(&self, envelope: Envelope) -> Admission {
        self.enqueue_batch(vec![envelope])
    }

    /// Accept several events; order within the batch is preserved
    fn enqueue_batch(&self, batch: Vec<Envelope>) -> Admission;

    /// Complete `continuation` once everything accepted before it has been
    /// pushed through to the target
    fn flush(&self, continuation: Continuation);

    /// Stop accepting work, drain within `timeout`, then shut down the next
    /// stage with whatever budget remains
    fn shutdown(&self, timeout: Duration);

    fn metrics(&self) -> &StageMetrics;

    /// The stage this one forwards to
    fn next(&self) -> Option<&dyn Stage>;
}
