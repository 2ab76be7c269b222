//! Log factory: owns the live route graph and its configuration lifecycle
//!
//! ```text
//! LogFactoryBuilder ──build──→ initial reload ──→ LiveRoutes
//!                                    │
//!                     ConfigWatcher ←┴─ PollingWatcher (optional)
//!
//! LogFactory::logger(name) ──→ Logger ──→ EventRouter ──→ LiveRoutes
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use scribe_config::{
    ConfigSource, ConfigWatcher, ConfigWatcherConfig, PollingWatcher, PollingWatcherConfig,
    ReloadOutcome, TargetRegistry, TomlConfigSource,
};
use scribe_pipeline::{
    DeliveryObserver, DeliveryResult, EventRouter, LiveRoutes, PipelineContext, PipelineError,
    RouteGraph, TimerStrategy,
};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::Result;
use crate::logger::Logger;

/// Budget used by [`LogFactory::shutdown`] when dropped without one
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Builder for [`LogFactory`]
pub struct LogFactoryBuilder {
    runtime: Option<Handle>,
    timer: TimerStrategy,
    source: Option<Arc<dyn ConfigSource>>,
    watcher: ConfigWatcherConfig,
    auto_reload: bool,
    polling: Option<PollingWatcherConfig>,
    observer: Option<Arc<dyn DeliveryObserver>>,
}

impl Default for LogFactoryBuilder {
    fn default() -> Self {
        Self {
            runtime: None,
            timer: TimerStrategy::Pool,
            source: None,
            watcher: ConfigWatcherConfig::default(),
            auto_reload: true,
            polling: Some(PollingWatcherConfig::default()),
            observer: None,
        }
    }
}

impl LogFactoryBuilder {
    /// Runtime for workers and timers; defaults to the ambient runtime
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn timer_strategy(mut self, strategy: TimerStrategy) -> Self {
        self.timer = strategy;
        self
    }

    pub fn config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// TOML file using the built-in target types
    pub fn config_file(self, path: impl Into<PathBuf>) -> Self {
        self.config_source(Arc::new(TomlConfigSource::with_builtin_targets(path)))
    }

    /// TOML file using a custom target registry
    pub fn config_file_with_registry(
        self,
        path: impl Into<PathBuf>,
        registry: Arc<TargetRegistry>,
    ) -> Self {
        self.config_source(Arc::new(TomlConfigSource::new(path, registry)))
    }

    pub fn watcher_config(mut self, config: ConfigWatcherConfig) -> Self {
        self.watcher = config;
        self
    }

    /// React to changes of the watched files; on by default
    pub fn auto_reload(mut self, enabled: bool) -> Self {
        self.auto_reload = enabled;
        self
    }

    /// Built-in polling notifier; `None` leaves notification to the caller
    /// through [`LogFactory::watcher`]
    pub fn polling(mut self, config: Option<PollingWatcherConfig>) -> Self {
        self.polling = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Load the initial configuration and start watching it
    ///
    /// A failed initial load is returned; nothing is left running.
    pub fn build(self) -> Result<LogFactory> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| PipelineError::NoRuntime)?,
        };
        let context = PipelineContext::with_strategy(runtime.clone(), self.timer)?;
        let routes = Arc::new(LiveRoutes::empty());
        let router = Arc::new(match self.observer {
            Some(observer) => EventRouter::with_observer(Arc::clone(&routes), observer),
            None => EventRouter::new(Arc::clone(&routes)),
        });

        let mut poller = None;
        let watcher = match self.source {
            Some(source) => {
                let watcher =
                    ConfigWatcher::new(source, Arc::clone(&routes), context, self.watcher);
                watcher.reload_now()?;
                if self.auto_reload {
                    watcher.start(watcher.watch_set());
                    poller = self
                        .polling
                        .map(|config| PollingWatcher::spawn(watcher.clone(), config, &runtime));
                }
                Some(watcher)
            }
            None => None,
        };

        let live = routes.load();
        info!(
            rules = live.table().rule_count(),
            targets = live.table().target_count(),
            auto_reload = watcher.as_ref().is_some_and(ConfigWatcher::is_running),
            "log factory started"
        );

        Ok(LogFactory {
            routes,
            router,
            watcher,
            poller: Mutex::new(poller),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Entry point: hands out loggers and controls the engine's lifecycle
pub struct LogFactory {
    routes: Arc<LiveRoutes>,
    router: Arc<EventRouter>,
    watcher: Option<ConfigWatcher>,
    poller: Mutex<Option<PollingWatcher>>,
    shut_down: AtomicBool,
}

impl LogFactory {
    pub fn builder() -> LogFactoryBuilder {
        LogFactoryBuilder::default()
    }

    pub fn logger(&self, name: &str) -> Logger {
        Logger::new(name, Arc::clone(&self.router))
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn routes(&self) -> &Arc<LiveRoutes> {
        &self.routes
    }

    /// The watcher, when the factory was built with a config source
    pub fn watcher(&self) -> Option<&ConfigWatcher> {
        self.watcher.as_ref()
    }

    /// Reload the configuration immediately, bypassing the debounce
    ///
    /// Returns `None` without a config source or after shutdown.
    pub fn reload(&self) -> Result<Option<ReloadOutcome>> {
        if self.is_shut_down() {
            return Ok(None);
        }
        match &self.watcher {
            Some(watcher) => Ok(Some(watcher.reload_now()?)),
            None => Ok(None),
        }
    }

    /// Wait until every event accepted so far has reached its target
    ///
    /// Blocks the calling thread; do not call from an async task.
    pub fn flush(&self, timeout: Duration) -> DeliveryResult {
        self.routes.load().flush(timeout)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop watching, unload the configuration and drain its pipelines
    ///
    /// Later events are dropped. Blocks the calling thread for up to
    /// `timeout`; calling it again does nothing.
    pub fn shutdown(&self, timeout: Duration) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop_watching();

        let deadline = Instant::now() + timeout;
        let previous = self.routes.publish(Arc::new(RouteGraph::empty()));
        while Arc::strong_count(&previous) > 1 && Instant::now() < deadline {
            std::thread::sleep(DRAIN_POLL_INTERVAL);
        }
        previous.shutdown(deadline.saturating_duration_since(Instant::now()));
        debug!("log factory shut down");
    }

    fn stop_watching(&self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.stop();
        }
        if let Some(watcher) = &self.watcher {
            watcher.stop();
        }
    }
}

impl Drop for LogFactory {
    fn drop(&mut self) {
        // Pipelines drain through their own drop; only the background
        // watchers need stopping here
        self.stop_watching();
    }
}

impl std::fmt::Debug for LogFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFactory")
            .field("watcher", &self.watcher)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
