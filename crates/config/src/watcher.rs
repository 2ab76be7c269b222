//! Configuration watcher
//!
//! Turns file change notifications into debounced reloads of the live route
//! graph:
//!
//! ```text
//! notify_changed(path) ──→ (re)arm debounce timer ──→ reload on a blocking thread
//!                                                       │
//!        capture live graph ──→ ConfigSource::load ──→ build graph
//!                                                       │
//!        compare_and_publish(captured, new) ── ok ──→ replace WatchSet, retire old graph
//!                                          └─ lost ──→ discard new graph
//! ```
//!
//! A failed load or build leaves the previous graph live. A configuration
//! with no rules and no targets unloads logging by publishing an empty graph.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use scribe_pipeline::{LiveRoutes, PipelineContext, RouteGraph, TimerHandle};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::source::{ConfigSource, WatchSet};

/// Quiet period before a reload runs
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// How long a retired graph may stay referenced by dispatchers
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shutdown budget for a retired graph's pipelines
pub const DEFAULT_RETIRE_SHUTDOWN: Duration = Duration::from_secs(5);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ConfigWatcherConfig {
    pub debounce: Duration,
    pub drain_timeout: Duration,
    pub retire_shutdown: Duration,
}

impl Default for ConfigWatcherConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            retire_shutdown: DEFAULT_RETIRE_SHUTDOWN,
        }
    }
}

impl ConfigWatcherConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_retire_shutdown(mut self, timeout: Duration) -> Self {
        self.retire_shutdown = timeout;
        self
    }
}

/// What a reload did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// New graph published
    Swapped,
    /// Empty configuration; an empty graph was published
    Unloaded,
    /// The live graph changed while loading; the new graph was discarded
    Superseded,
}

// =============================================================================
// Stats
// =============================================================================

#[derive(Debug, Default)]
struct ReloadStats {
    notifications: AtomicU64,
    ignored: AtomicU64,
    attempts: AtomicU64,
    swaps: AtomicU64,
    unloads: AtomicU64,
    failures: AtomicU64,
    superseded: AtomicU64,
    retired: AtomicU64,
}

impl ReloadStats {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ReloadSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ReloadSnapshot {
            notifications: get(&self.notifications),
            ignored: get(&self.ignored),
            attempts: get(&self.attempts),
            swaps: get(&self.swaps),
            unloads: get(&self.unloads),
            failures: get(&self.failures),
            superseded: get(&self.superseded),
            retired: get(&self.retired),
        }
    }
}

/// Point-in-time reload counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSnapshot {
    /// Change notifications received
    pub notifications: u64,
    /// Notifications for paths outside the WatchSet, or while stopped
    pub ignored: u64,
    /// Reloads started
    pub attempts: u64,
    /// Graphs published, including unloads
    pub swaps: u64,
    /// Empty configurations published
    pub unloads: u64,
    /// Loads or builds that failed and kept the previous graph
    pub failures: u64,
    /// Graphs discarded because the live graph moved underneath
    pub superseded: u64,
    /// Retired graphs fully shut down
    pub retired: u64,
}

// =============================================================================
// Watcher
// =============================================================================

struct WatchState {
    watch_set: WatchSet,
    running: bool,
    /// Bumped on every (re)arm; a timer only fires for the latest generation
    generation: u64,
    pending: Option<TimerHandle>,
}

struct Shared {
    source: Arc<dyn ConfigSource>,
    routes: Arc<LiveRoutes>,
    context: PipelineContext,
    config: ConfigWatcherConfig,
    state: Mutex<WatchState>,
    /// Serializes reloads
    reloading: Mutex<()>,
    last_error: Mutex<Option<String>>,
    stats: ReloadStats,
}

/// Debounced, optimistic reloader for a [`LiveRoutes`] publish point
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConfigWatcher {
    shared: Arc<Shared>,
}

impl ConfigWatcher {
    pub fn new(
        source: Arc<dyn ConfigSource>,
        routes: Arc<LiveRoutes>,
        context: PipelineContext,
        config: ConfigWatcherConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                routes,
                context,
                config,
                state: Mutex::new(WatchState {
                    watch_set: WatchSet::default(),
                    running: false,
                    generation: 0,
                    pending: None,
                }),
                reloading: Mutex::new(()),
                last_error: Mutex::new(None),
                stats: ReloadStats::default(),
            }),
        }
    }

    /// Begin reacting to notifications for `watch_set`
    pub fn start(&self, watch_set: WatchSet) {
        let mut state = self.shared.state.lock();
        debug!(files = watch_set.len(), "config watcher started");
        state.watch_set = watch_set;
        state.running = true;
    }

    /// Stop reacting to notifications and cancel a pending reload
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        state.running = false;
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.cancel();
        }
        debug!("config watcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Current WatchSet
    pub fn watch_set(&self) -> WatchSet {
        self.shared.state.lock().watch_set.clone()
    }

    /// A reload is armed and has not fired yet
    pub fn is_pending(&self) -> bool {
        self.shared.state.lock().pending.is_some()
    }

    pub fn routes(&self) -> &Arc<LiveRoutes> {
        &self.shared.routes
    }

    pub fn config(&self) -> &ConfigWatcherConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> ReloadSnapshot {
        self.shared.stats.snapshot()
    }

    /// Message of the most recent failed reload, cleared by a successful one
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    /// Filesystem notification entry point
    ///
    /// (Re)starts the debounce timer when `path` is watched. Returns whether
    /// the notification was accepted.
    pub fn notify_changed(&self, path: &Path) -> bool {
        let shared = &self.shared;
        ReloadStats::bump(&shared.stats.notifications);

        let mut state = shared.state.lock();
        if !state.running || !state.watch_set.contains(path) {
            ReloadStats::bump(&shared.stats.ignored);
            return false;
        }

        if let Some(pending) = state.pending.take() {
            pending.cancel();
        }
        state.generation += 1;
        let generation = state.generation;
        let weak = Arc::downgrade(shared);
        state.pending = Some(
            shared
                .context
                .timer()
                .schedule(shared.config.debounce, move || debounce_elapsed(weak, generation)),
        );
        debug!(path = %path.display(), "config change noticed, reload armed");
        true
    }

    /// Reload immediately on the calling thread
    ///
    /// Blocks while building pipelines; do not call from a current-thread
    /// runtime's only worker.
    pub fn reload_now(&self) -> Result<ReloadOutcome> {
        self.shared.reload()
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("source", &self.shared.source.describe())
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

fn debounce_elapsed(weak: Weak<Shared>, generation: u64) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    {
        let mut state = shared.state.lock();
        if !state.running || state.generation != generation {
            return;
        }
        state.pending = None;
    }

    let runtime = shared.context.runtime().clone();
    runtime.spawn_blocking(move || {
        // Failures are already logged and counted
        let _ = shared.reload();
    });
}

impl Shared {
    fn reload(self: &Arc<Self>) -> Result<ReloadOutcome> {
        let _reloading = self.reloading.lock();
        ReloadStats::bump(&self.stats.attempts);
        let started = Instant::now();

        let expected = self.routes.load();
        let (graph, watch_set) = match self.load_graph() {
            Ok(graph) => graph,
            Err(e) => {
                ReloadStats::bump(&self.stats.failures);
                warn!(
                    source = %self.source.describe(),
                    error = %e,
                    "configuration reload failed, keeping previous configuration"
                );
                *self.last_error.lock() = Some(e.to_string());
                return Err(e);
            }
        };
        let unload = graph.is_empty();

        match self.routes.compare_and_publish(&expected, Arc::new(graph)) {
            Ok(previous) => {
                drop(expected);
                self.state.lock().watch_set = watch_set;
                *self.last_error.lock() = None;
                ReloadStats::bump(&self.stats.swaps);
                if unload {
                    ReloadStats::bump(&self.stats.unloads);
                    info!(source = %self.source.describe(), "configuration is empty, logging unloaded");
                } else {
                    let live = self.routes.load();
                    info!(
                        source = %self.source.describe(),
                        rules = live.table().rule_count(),
                        targets = live.table().target_count(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "configuration reloaded"
                    );
                }
                self.retire(previous);
                Ok(if unload {
                    ReloadOutcome::Unloaded
                } else {
                    ReloadOutcome::Swapped
                })
            }
            Err(rejected) => {
                ReloadStats::bump(&self.stats.superseded);
                warn!(
                    source = %self.source.describe(),
                    "configuration replaced during reload, discarding new configuration"
                );
                rejected.shutdown(Duration::ZERO);
                Ok(ReloadOutcome::Superseded)
            }
        }
    }

    fn load_graph(&self) -> Result<(RouteGraph, WatchSet)> {
        let loaded = self.source.load()?;
        let watch_set = loaded.watch_set.clone();
        if loaded.is_empty() {
            return Ok((RouteGraph::empty(), watch_set));
        }
        Ok((loaded.build_graph(&self.context)?, watch_set))
    }

    /// Shut a replaced graph down once no dispatcher holds it
    fn retire(self: &Arc<Self>, previous: Arc<RouteGraph>) {
        if previous.pipelines().is_empty() {
            ReloadStats::bump(&self.stats.retired);
            return;
        }

        let shared = Arc::clone(self);
        self.context.runtime().spawn(async move {
            let deadline = Instant::now() + shared.config.drain_timeout;
            while Arc::strong_count(&previous) > 1 && Instant::now() < deadline {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
            let holders = Arc::strong_count(&previous) - 1;
            if holders > 0 {
                warn!(holders, "retired configuration still in use, shutting down anyway");
            }

            let budget = shared.config.retire_shutdown;
            let _ = tokio::task::spawn_blocking(move || {
                previous.shutdown(budget);
                ReloadStats::bump(&shared.stats.retired);
                debug!("retired configuration shut down");
            })
            .await;
        });
    }
}

#[cfg(test)]
#[path = "watcher_test.rs"]
mod watcher_test;
