//! Scribe
//!
//! In-process log delivery: named loggers route events through per-target
//! pipelines (async queue, retry, buffering) to files, the console or memory.
//! The configuration can be reloaded while events are in flight.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use scribe::LogFactory;
//!
//! let factory = LogFactory::builder().config_file("scribe.toml").build()?;
//! let log = factory.logger("app.http");
//! log.info("listening");
//! log.event(Level::Warn, "slow request")
//!     .property("elapsed_ms", 1200)
//!     .send();
//!
//! factory.shutdown(Duration::from_secs(5));
//! ```

mod error;
mod factory;
mod logger;
mod logging;

pub use error::{Result, ScribeError};
pub use factory::{DEFAULT_SHUTDOWN_TIMEOUT, LogFactory, LogFactoryBuilder};
pub use logger::{EventBuilder, Logger};
pub use logging::init_tracing;

pub use scribe_config as config;
pub use scribe_config::{
    ConfigSource, ConfigWatcher, ConfigWatcherConfig, FnConfigSource, LoadedConfig, LogConfig,
    PollingWatcherConfig, ReloadOutcome, TargetDecl, TargetRegistry, TomlConfigSource, WatchSet,
};
pub use scribe_pipeline as pipeline;
pub use scribe_pipeline::{
    AsyncStageConfig, BufferingConfig, DeliveryObserver, OverflowPolicy, RetryPolicy, StageConfig,
    Target, TimerStrategy,
};
pub use scribe_protocol::{DeliveryError, DeliveryResult, ErrorKind, Event, Level, PropertyValue};
pub use scribe_routing::RoutingRule;
pub use scribe_sinks as sinks;
