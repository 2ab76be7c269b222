//! Scribe - Pipeline
//!
//! Routes events to targets through composable delivery stages.
//!
//! # Architecture
//!
//! ```text
//!                        ┌─ LiveRoutes (ArcSwap<RouteGraph>) ─┐
//!                        │                                    │
//! Logger ──→ EventRouter ┼──→ RoutingTable ──→ TargetId ──→ DispatchPipeline
//!                        │                                    │
//!                        └────────────────────────────────────┘
//!                                                             │
//!             [Async] ──→ [Buffering] ──→ [Retrying] ──→ [Terminal] ──→ Target
//! ```
//!
//! # Key Design
//!
//! - **Continuations**: every event carries a one-shot completion callback;
//!   failures never escape `dispatch`
//! - **Arc fan-out**: one `Arc<Event>` is shared by every matched pipeline
//! - **Backpressure**: a retrying stage defers admission, so the async queue
//!   above it fills and applies its overflow policy
//! - **Atomic publish**: reload swaps a fully built `RouteGraph` in one store
//!
//! # Example
//!
//! ```ignore
//! use scribe_pipeline::{DispatchPipeline, EventRouter, LiveRoutes, PipelineContext, RouteGraph};
//! use scribe_routing::{RoutingRule, RoutingTable};
//!
//! let mut builder = RoutingTable::builder();
//! builder.register_target("console")?;
//! builder.add_rule(RoutingRule::new("*").write_to("console"));
//!
//! let context = PipelineContext::current()?;
//! let pipeline = DispatchPipeline::builder(console_target)
//!     .with_async(Default::default())
//!     .build(&context)?;
//!
//! let graph = RouteGraph::new(builder.build()?, [pipeline])?;
//! let router = EventRouter::new(Arc::new(LiveRoutes::new(graph)));
//! router.dispatch(Event::new(Level::Info, "app", "started"));
//! ```

mod dispatch;
mod error;
mod graph;
mod metrics;
mod rate_limited;
mod router;
pub mod stage;
mod target;
mod timer;

pub use dispatch::{DispatchPipeline, DispatchPipelineBuilder, PipelineContext, StageConfig};
pub use error::{PipelineError, Result};
pub use graph::{LiveRoutes, RouteGraph};
pub use metrics::{RouterMetrics, RouterSnapshot, StageMetrics, StageSnapshot};
pub use rate_limited::{DEFAULT_LOG_INTERVAL, RateLimitedLogger, Severity};
pub use router::{DeliveryObserver, EventRouter};
pub use stage::{
    Admission, AsyncStageConfig, BufferOverflow, BufferingConfig, OverflowPolicy, RetryPolicy,
    Stage, StageKind,
};
pub use target::Target;
pub use timer::{Timer, TimerHandle, TimerStrategy};

// Re-export key types from dependencies for convenience
pub use scribe_protocol::{Continuation, DeliveryError, DeliveryResult, Envelope, Event, Level};
pub use scribe_routing::{RoutingRule, RoutingTable, TargetId};

#[cfg(test)]
mod test_util;
