//! Scribe - Configuration
//!
//! Loads rules and targets, builds route graphs and keeps the live graph up
//! to date as configuration files change.
//!
//! # Pieces
//!
//! - [`ConfigSource`]: produces a [`LoadedConfig`] (rules, targets, watched
//!   files). [`TomlConfigSource`] is the bundled implementation.
//! - [`TargetRegistry`]: type name to factory mapping used by the TOML source.
//! - [`ConfigWatcher`]: debounced reload with optimistic publish and
//!   last-known-good fallback.
//! - [`PollingWatcher`]: a built-in change notifier that feeds the watcher.
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "warn"
//!
//! [targets.app]
//! type = "file"
//! path = "logs/${shortdate}.log"
//! stages = [{ kind = "async" }]
//!
//! [[rules]]
//! name = "*"
//! min_level = "info"
//! write_to = ["app"]
//! ```
//!
//! # Example
//!
//! ```ignore
//! let routes = Arc::new(LiveRoutes::empty());
//! let source = Arc::new(TomlConfigSource::with_builtin_targets("scribe.toml"));
//! let watcher = ConfigWatcher::new(source, routes.clone(), context, Default::default());
//! watcher.reload_now()?;
//! watcher.start(watcher.watch_set());
//! let _poller = PollingWatcher::spawn(watcher.clone(), Default::default(), &handle);
//! ```

mod builtin;
mod error;
mod logging;
mod model;
mod poll;
mod registry;
mod source;
mod watcher;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use model::{
    AsyncSpec, BufferOverflowSetting, BufferingSpec, ConfigDocument, OverflowSetting, RetrySpec,
    RuleConfig, StageSpec, TargetConfig,
};
pub use poll::{DEFAULT_POLL_INTERVAL, PollingWatcher, PollingWatcherConfig};
pub use registry::{TargetFactory, TargetRegistry, TargetRegistryBuilder, TargetSettings};
pub use source::{
    ConfigSource, FnConfigSource, LoadedConfig, TargetDecl, TomlConfigSource, WatchSet,
};
pub use watcher::{
    ConfigWatcher, ConfigWatcherConfig, DEFAULT_DEBOUNCE, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_RETIRE_SHUTDOWN, ReloadOutcome, ReloadSnapshot,
};
