//! Dispatch pipeline: one composed stage chain per target
//!
//! Stages are listed outermost first. A pipeline built with
//! `[Async, Buffering, Retrying]` looks like:
//!
//! ```text
//! enqueue ──→ Async ──→ Buffering ──→ Retrying ──→ Terminal ──→ Target
//! ```
//!
//! A Retrying stage delivers one unit at a time and waits for it to finish,
//! so no Buffering stage may sit below it: the buffer would hold the unit
//! until a flush that is queued behind it. Such chains are rejected.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use scribe_protocol::{Continuation, DeliveryError, DeliveryResult, Envelope, Event};
use tokio::runtime::Handle;

use crate::error::{PipelineError, Result};
use crate::metrics::StageSnapshot;
use crate::stage::{
    Admission, AsyncStage, AsyncStageConfig, BufferingConfig, BufferingStage, RetryPolicy,
    RetryingStage, Stage, StageKind, TerminalStage,
};
use crate::target::Target;
use crate::timer::{Timer, TimerStrategy};

/// One wrapper stage in a pipeline definition
#[derive(Debug, Clone)]
pub enum StageConfig {
    Async(AsyncStageConfig),
    Buffering(BufferingConfig),
    Retrying(RetryPolicy),
}

impl StageConfig {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Async(_) => StageKind::Async,
            Self::Buffering(_) => StageKind::Buffering,
            Self::Retrying(_) => StageKind::Retrying,
        }
    }
}

/// Runtime services shared by every pipeline of a route graph
#[derive(Clone)]
pub struct PipelineContext {
    runtime: Handle,
    timer: Timer,
}

impl PipelineContext {
    pub fn new(runtime: Handle, timer: Timer) -> Self {
        Self { runtime, timer }
    }

    /// Context on the current tokio runtime with a pooled timer
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;
        Ok(Self::new(runtime.clone(), Timer::pooled(runtime)))
    }

    /// Context on `runtime` using the given timer strategy
    pub fn with_strategy(runtime: Handle, strategy: TimerStrategy) -> Result<Self> {
        let timer = Timer::with_strategy(strategy, &runtime).map_err(PipelineError::Timer)?;
        Ok(Self::new(runtime, timer))
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }
}

/// Builder for [`DispatchPipeline`]
pub struct DispatchPipelineBuilder {
    name: Arc<str>,
    target: Arc<dyn Target>,
    stages: Vec<StageConfig>,
}

impl DispatchPipelineBuilder {
    /// Append a stage below the ones already added
    pub fn stage(mut self, config: StageConfig) -> Self {
        self.stages.push(config);
        self
    }

    pub fn with_async(self, config: AsyncStageConfig) -> Self {
        self.stage(StageConfig::Async(config))
    }

    pub fn with_buffering(self, config: BufferingConfig) -> Self {
        self.stage(StageConfig::Buffering(config))
    }

    pub fn with_retry(self, policy: RetryPolicy) -> Self {
        self.stage(StageConfig::Retrying(policy))
    }

    pub fn build(self, context: &PipelineContext) -> Result<DispatchPipeline> {
        self.check_order()?;
        self.target.initialize(context.timer());

        let mut head: Arc<dyn Stage> = Arc::new(TerminalStage::new(Arc::clone(&self.target)));
        for config in self.stages.iter().rev() {
            head = match config {
                StageConfig::Async(config) => {
                    Arc::new(AsyncStage::new(config.clone(), head, context.runtime()))
                }
                StageConfig::Buffering(config) => Arc::new(BufferingStage::new(
                    config.clone(),
                    head,
                    context.timer().clone(),
                )),
                StageConfig::Retrying(policy) => Arc::new(RetryingStage::new(
                    policy.clone(),
                    head,
                    context.timer().clone(),
                )),
            };
        }

        tracing::debug!(
            pipeline = %self.name,
            stages = ?self.stages.iter().map(StageConfig::kind).collect::<Vec<_>>(),
            "pipeline built"
        );
        Ok(DispatchPipeline {
            name: self.name,
            head,
            target: self.target,
        })
    }

    fn check_order(&self) -> Result<()> {
        let retrying = self
            .stages
            .iter()
            .position(|s| s.kind() == StageKind::Retrying);
        let buffering = self
            .stages
            .iter()
            .rposition(|s| s.kind() == StageKind::Buffering);
        match (retrying, buffering) {
            (Some(r), Some(b)) if b > r => Err(PipelineError::stage_order(
                self.name.as_ref(),
                "a buffering stage must be listed before any retrying stage",
            )),
            _ => Ok(()),
        }
    }
}

/// A target wrapped in its stage chain
pub struct DispatchPipeline {
    name: Arc<str>,
    head: Arc<dyn Stage>,
    target: Arc<dyn Target>,
}

impl DispatchPipeline {
    /// Start a pipeline for `target`; the pipeline takes the target's name
    pub fn builder(target: Arc<dyn Target>) -> DispatchPipelineBuilder {
        DispatchPipelineBuilder {
            name: Arc::from(target.name()),
            target,
            stages: Vec::new(),
        }
    }

    /// Pipeline with no wrapper stages
    pub fn direct(target: Arc<dyn Target>) -> Self {
        DispatchPipeline {
            name: Arc::from(target.name()),
            head: Arc::new(TerminalStage::new(Arc::clone(&target))),
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_shared(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    /// Hand one event to the first stage
    pub fn enqueue(&self, event: Arc<Event>, continuation: Continuation) -> Admission {
        self.head.enqueue(Envelope::new(event, continuation))
    }

    pub fn flush(&self, continuation: Continuation) {
        self.head.flush(continuation);
    }

    /// Flush and wait for the barrier
    ///
    /// Must not be called from a task on a current-thread runtime that also
    /// drives this pipeline's async worker.
    pub fn flush_blocking(&self, timeout: Duration) -> DeliveryResult {
        let (tx, rx) = mpsc::sync_channel(1);
        self.flush(Continuation::new(move |result| {
            let _ = tx.send(result);
        }));
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::timeout(format!(
                "flush of '{}' did not complete within {timeout:?}",
                self.name
            ))),
        }
    }

    /// Drain and close the whole chain within `timeout`
    pub fn shutdown(&self, timeout: Duration) {
        let started = Instant::now();
        self.head.shutdown(timeout);
        tracing::debug!(
            pipeline = %self.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline shut down"
        );
    }

    /// Stage kinds, outermost first, ending with `Terminal`
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages().map(|s| s.kind()).collect()
    }

    /// Metrics for each stage, outermost first
    pub fn stage_metrics(&self) -> Vec<(StageKind, StageSnapshot)> {
        self.stages()
            .map(|s| (s.kind(), s.metrics().snapshot()))
            .collect()
    }

    fn stages(&self) -> impl Iterator<Item = &dyn Stage> {
        let head: &dyn Stage = &*self.head;
        std::iter::successors(Some(head), |stage| stage.next())
    }
}

impl std::fmt::Debug for DispatchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_kinds())
            .finish()
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod dispatch_test;
