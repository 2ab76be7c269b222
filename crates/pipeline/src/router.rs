//! Event router: matches events against the live routing table and fans them
//! out to pipelines
//!
//! `dispatch` never fails and never waits on delivery. Each matched pipeline
//! gets its own continuation; failures are counted, logged through a
//! rate-limited logger and handed to an optional [`DeliveryObserver`].

use std::sync::Arc;

use scribe_protocol::{Continuation, DeliveryResult, Event};

use crate::graph::LiveRoutes;
use crate::metrics::{RouterMetrics, RouterSnapshot};
use crate::rate_limited::RateLimitedLogger;

/// Hook invoked once per (event, target) when delivery completes
pub trait DeliveryObserver: Send + Sync {
    fn on_delivered(&self, target: &str, event: &Event, result: &DeliveryResult);
}

struct RouterShared {
    metrics: RouterMetrics,
    failures: RateLimitedLogger,
    observer: Option<Arc<dyn DeliveryObserver>>,
}

/// Routes events to the pipelines of the live route graph
pub struct EventRouter {
    routes: Arc<LiveRoutes>,
    shared: Arc<RouterShared>,
}

impl EventRouter {
    pub fn new(routes: Arc<LiveRoutes>) -> Self {
        Self::build(routes, None)
    }

    pub fn with_observer(routes: Arc<LiveRoutes>, observer: Arc<dyn DeliveryObserver>) -> Self {
        Self::build(routes, Some(observer))
    }

    fn build(routes: Arc<LiveRoutes>, observer: Option<Arc<dyn DeliveryObserver>>) -> Self {
        Self {
            routes,
            shared: Arc::new(RouterShared {
                metrics: RouterMetrics::new(),
                failures: RateLimitedLogger::default(),
                observer,
            }),
        }
    }

    /// The publish point this router reads from
    pub fn routes(&self) -> &Arc<LiveRoutes> {
        &self.routes
    }

    /// Route one event; returns the number of pipelines it was handed to
    pub fn dispatch(&self, event: Event) -> usize {
        self.dispatch_shared(Arc::new(event))
    }

    /// Route an already shared event
    pub fn dispatch_shared(&self, event: Arc<Event>) -> usize {
        let shared = &self.shared;
        shared.metrics.record_received();

        let graph = self.routes.load();
        let routes = graph.table().routes_for(event.source());
        let targets = routes.targets(event.level());
        if targets.is_empty() {
            shared.metrics.record_unmatched();
            return 0;
        }

        let mut handed = 0;
        for &id in targets {
            let Some(pipeline) = graph.pipeline(id) else {
                shared.failures.error(
                    &id.to_string(),
                    "routing table references a target without pipeline",
                    &id,
                );
                continue;
            };
            let continuation = self.continuation(pipeline.name_shared(), Arc::clone(&event));
            let _ = pipeline.enqueue(Arc::clone(&event), continuation);
            handed += 1;
        }

        shared.metrics.record_routed(handed);
        handed
    }

    fn continuation(&self, target: Arc<str>, event: Arc<Event>) -> Continuation {
        let shared = Arc::clone(&self.shared);
        Continuation::new(move |result| {
            match &result {
                Ok(()) => shared.metrics.record_delivery_succeeded(),
                Err(err) => {
                    shared.metrics.record_delivery_failed();
                    shared.failures.warn(&target, "event delivery failed", err);
                }
            }
            if let Some(observer) = &shared.observer {
                observer.on_delivered(&target, &event, &result);
            }
        })
    }

    /// Snapshot of routing and delivery counters
    pub fn metrics(&self) -> RouterSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Delivery failures seen, including those not logged
    pub fn failure_count(&self) -> u64 {
        self.shared.failures.total_count()
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("routes", &self.routes)
            .field("observer", &self.shared.observer.is_some())
            .finish()
    }
}
