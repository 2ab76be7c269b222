//! Route graph and its publish point
//!
//! A [`RouteGraph`] is the unit that configuration reload replaces: the
//! compiled routing table plus one pipeline per registered target, indexed by
//! `TargetId`. Graphs are immutable once built. [`LiveRoutes`] holds the
//! current graph behind an `ArcSwap`, so dispatchers load it lock-free and a
//! reload publishes a fully built replacement in one atomic store.
//!
//! ```text
//! dispatch ──load_full()──→ Arc<RouteGraph> ──→ table.routes_for() ──→ pipelines[id]
//!                                ↑
//! reload ──compare_and_publish───┘  (old graph drained once unreferenced)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use scribe_protocol::DeliveryResult;
use scribe_routing::{RoutingTable, TargetId};

use crate::dispatch::DispatchPipeline;
use crate::error::{PipelineError, Result};

/// Routing table plus the pipelines it routes to
#[derive(Debug)]
pub struct RouteGraph {
    table: RoutingTable,
    pipelines: Vec<DispatchPipeline>,
}

impl RouteGraph {
    /// Graph with no rules and no targets; drops every event
    pub fn empty() -> Self {
        Self {
            table: RoutingTable::empty(),
            pipelines: Vec::new(),
        }
    }

    /// Pair `table` with pipelines keyed by target name
    ///
    /// Every target registered in the table needs exactly one pipeline.
    /// Pipelines for names the table never registered are shut down and
    /// dropped.
    pub fn new(
        table: RoutingTable,
        pipelines: impl IntoIterator<Item = DispatchPipeline>,
    ) -> Result<Self> {
        let mut by_name: HashMap<String, DispatchPipeline> = HashMap::new();
        for pipeline in pipelines {
            let name = pipeline.name().to_string();
            if by_name.contains_key(&name) {
                pipeline.shutdown(Duration::ZERO);
                return Err(PipelineError::duplicate_pipeline(name));
            }
            by_name.insert(name, pipeline);
        }

        let mut ordered = Vec::with_capacity(table.target_count());
        for name in table.target_names() {
            match by_name.remove(name) {
                Some(pipeline) => ordered.push(pipeline),
                None => return Err(PipelineError::missing_pipeline(name.as_str())),
            }
        }

        for (name, unused) in by_name {
            tracing::warn!(target_name = %name, "pipeline not referenced by routing table, closing");
            unused.shutdown(Duration::ZERO);
        }

        Ok(Self {
            table,
            pipelines: ordered,
        })
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    #[inline]
    pub fn pipeline(&self, id: TargetId) -> Option<&DispatchPipeline> {
        self.pipelines.get(id.as_usize())
    }

    pub fn pipeline_by_name(&self, name: &str) -> Option<&DispatchPipeline> {
        self.pipelines.iter().find(|p| p.name() == name)
    }

    pub fn pipelines(&self) -> &[DispatchPipeline] {
        &self.pipelines
    }

    /// No rules and no targets
    pub fn is_empty(&self) -> bool {
        self.table.is_empty() && self.pipelines.is_empty()
    }

    /// Flush every pipeline and wait; the first failure is returned after
    /// all pipelines were given their chance
    pub fn flush(&self, timeout: Duration) -> DeliveryResult {
        let deadline = Instant::now() + timeout;
        let mut first_error = None;
        for pipeline in &self.pipelines {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Err(err) = pipeline.flush_blocking(remaining) {
                tracing::warn!(pipeline = pipeline.name(), error = %err, "flush failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Shut down every pipeline, sharing one deadline
    pub fn shutdown(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        for pipeline in &self.pipelines {
            pipeline.shutdown(deadline.saturating_duration_since(Instant::now()));
        }
    }
}

/// Atomically swappable handle to the live route graph
pub struct LiveRoutes {
    current: ArcSwap<RouteGraph>,
}

impl LiveRoutes {
    pub fn new(graph: RouteGraph) -> Self {
        Self {
            current: ArcSwap::from_pointee(graph),
        }
    }

    pub fn empty() -> Self {
        Self::new(RouteGraph::empty())
    }

    /// Current graph
    ///
    /// Returns an owned `Arc` so the strong count reflects every dispatcher
    /// still using a graph after it was replaced.
    #[inline]
    pub fn load(&self) -> Arc<RouteGraph> {
        self.current.load_full()
    }

    /// Publish unconditionally, returning the previous graph
    pub fn publish(&self, graph: Arc<RouteGraph>) -> Arc<RouteGraph> {
        self.current.swap(graph)
    }

    /// Publish only if `expected` is still live
    ///
    /// On success returns the previous graph. If another writer got there
    /// first, `graph` is handed back unpublished.
    pub fn compare_and_publish(
        &self,
        expected: &Arc<RouteGraph>,
        graph: Arc<RouteGraph>,
    ) -> std::result::Result<Arc<RouteGraph>, Arc<RouteGraph>> {
        let previous = self.current.compare_and_swap(expected, Arc::clone(&graph));
        if Arc::ptr_eq(&*previous, expected) {
            Ok(arc_swap::Guard::into_inner(previous))
        } else {
            Err(graph)
        }
    }
}

impl Default for LiveRoutes {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for LiveRoutes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let graph = self.current.load();
        f.debug_struct("LiveRoutes")
            .field("rules", &graph.table().rule_count())
            .field("targets", &graph.table().target_count())
            .finish()
    }
}

