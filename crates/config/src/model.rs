//! TOML document model
//!
//! A configuration document declares named targets, the stage chain wrapped
//! around each one, and an ordered list of rules. Other documents can be
//! pulled in with `include`.
//!
//! # Example
//!
//! ```toml
//! include = ["targets.d/audit.toml"]
//!
//! [targets.app]
//! type = "file"
//! path = "logs/${shortdate}.log"
//! archive_every = "day"
//! stages = [
//!     { kind = "async", queue_limit = 5000, overflow = "block", block_timeout = "250ms" },
//!     { kind = "retry", max_retries = 2, initial_delay = "50ms" },
//! ]
//!
//! [targets.console]
//! # type inferred from the name
//!
//! [[rules]]
//! name = "*"
//! min_level = "info"
//! write_to = ["app", "console"]
//! ```

use std::collections::HashMap;
use std::time::Duration;

use scribe_pipeline::{
    AsyncStageConfig, BufferOverflow, BufferingConfig, OverflowPolicy, RetryPolicy, StageConfig,
};
use scribe_protocol::Level;
use scribe_routing::RoutingRule;
use serde::Deserialize;

use crate::logging::LogConfig;

fn default_true() -> bool {
    true
}

/// One configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    /// Further documents, relative to this file's directory
    pub include: Vec<String>,

    /// Match source names case-sensitively
    /// Default: true
    pub case_sensitive: bool,

    /// Internal diagnostics; only read from the main file
    pub log: LogConfig,

    /// Named target instances
    pub targets: HashMap<String, TargetConfig>,

    /// Rules, evaluated in order
    pub rules: Vec<RuleConfig>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            case_sensitive: true,
            log: LogConfig::default(),
            targets: HashMap::new(),
            rules: Vec::new(),
        }
    }
}

/// A target declaration
///
/// Keys other than `type`, `enabled` and `stages` are handed to the factory
/// registered for the type.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Registered type name; defaults to the target's own name
    #[serde(rename = "type")]
    pub type_name: Option<String>,

    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Wrapper stages, outermost first
    #[serde(default)]
    pub stages: Vec<StageSpec>,

    #[serde(flatten)]
    pub settings: toml::Table,
}

impl TargetConfig {
    /// Type to look up in the registry
    pub fn resolved_type<'a>(&'a self, name: &'a str) -> &'a str {
        self.type_name.as_deref().unwrap_or(name)
    }

    pub fn stage_configs(&self) -> Vec<StageConfig> {
        self.stages.iter().map(StageSpec::to_stage_config).collect()
    }
}

// =============================================================================
// Stages
// =============================================================================

/// A wrapper stage around a target
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageSpec {
    Async(AsyncSpec),
    Buffering(BufferingSpec),
    Retry(RetrySpec),
}

impl StageSpec {
    pub fn to_stage_config(&self) -> StageConfig {
        match self {
            Self::Async(spec) => StageConfig::Async(spec.into()),
            Self::Buffering(spec) => StageConfig::Buffering(spec.into()),
            Self::Retry(spec) => StageConfig::Retrying(spec.into()),
        }
    }
}

/// Overflow policy as written in configuration
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowSetting {
    Block,
    #[default]
    DiscardOldest,
    Grow,
}

impl From<OverflowSetting> for OverflowPolicy {
    fn from(setting: OverflowSetting) -> Self {
        match setting {
            OverflowSetting::Block => OverflowPolicy::Block,
            OverflowSetting::DiscardOldest => OverflowPolicy::DiscardOldest,
            OverflowSetting::Grow => OverflowPolicy::Grow,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AsyncSpec {
    /// Default: 10000
    pub queue_limit: usize,

    /// Default: discard_oldest
    pub overflow: OverflowSetting,

    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub block_timeout: Duration,

    /// Default: 1000000
    pub grow_ceiling: usize,
}

impl Default for AsyncSpec {
    fn default() -> Self {
        let defaults = AsyncStageConfig::default();
        Self {
            queue_limit: defaults.queue_limit,
            overflow: OverflowSetting::default(),
            block_timeout: defaults.block_timeout,
            grow_ceiling: defaults.grow_ceiling,
        }
    }
}

impl From<&AsyncSpec> for AsyncStageConfig {
    fn from(spec: &AsyncSpec) -> Self {
        AsyncStageConfig::default()
            .with_queue_limit(spec.queue_limit)
            .with_overflow(spec.overflow.into())
            .with_block_timeout(spec.block_timeout)
            .with_grow_ceiling(spec.grow_ceiling)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferingSpec {
    /// Default: 100
    pub buffer_size: usize,

    /// Forward a partial batch after this long
    /// Default: none
    #[serde(with = "humantime_serde")]
    pub flush_timeout: Option<Duration>,

    /// Default: true
    pub sliding_timeout: bool,

    /// Default: flush
    pub overflow: BufferOverflowSetting,
}

/// Buffer overflow action as written in configuration
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BufferOverflowSetting {
    #[default]
    Flush,
    Discard,
}

impl From<BufferOverflowSetting> for BufferOverflow {
    fn from(setting: BufferOverflowSetting) -> Self {
        match setting {
            BufferOverflowSetting::Flush => BufferOverflow::Flush,
            BufferOverflowSetting::Discard => BufferOverflow::Discard,
        }
    }
}

impl Default for BufferingSpec {
    fn default() -> Self {
        let defaults = BufferingConfig::default();
        Self {
            buffer_size: defaults.buffer_size,
            flush_timeout: defaults.flush_timeout,
            sliding_timeout: defaults.sliding_timeout,
            overflow: BufferOverflowSetting::default(),
        }
    }
}

impl From<&BufferingSpec> for BufferingConfig {
    fn from(spec: &BufferingSpec) -> Self {
        let config = BufferingConfig::default()
            .with_buffer_size(spec.buffer_size)
            .with_sliding_timeout(spec.sliding_timeout)
            .with_overflow(spec.overflow.into());
        match spec.flush_timeout {
            Some(timeout) => config.with_flush_timeout(timeout),
            None => config,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySpec {
    /// Default: 3
    pub max_retries: u32,

    /// Default: 100ms
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Default: 2.0
    pub multiplier: f64,

    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Default: 10000
    pub queue_limit: usize,
}

impl Default for RetrySpec {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_retries: defaults.max_retries,
            initial_delay: defaults.initial_delay,
            multiplier: defaults.multiplier,
            max_delay: defaults.max_delay,
            queue_limit: defaults.queue_limit,
        }
    }
}

impl From<&RetrySpec> for RetryPolicy {
    fn from(spec: &RetrySpec) -> Self {
        RetryPolicy::default()
            .with_max_retries(spec.max_retries)
            .with_initial_delay(spec.initial_delay)
            .with_multiplier(spec.multiplier)
            .with_max_delay(spec.max_delay)
            .with_queue_limit(spec.queue_limit)
    }
}

// =============================================================================
// Rules
// =============================================================================

/// A routing rule as written in configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Source name pattern
    /// Default: "*"
    #[serde(default = "default_pattern", alias = "logger")]
    pub name: String,

    /// Exact level; overrides `min_level` and `max_level`
    pub level: Option<Level>,

    pub min_level: Option<Level>,

    pub max_level: Option<Level>,

    /// Target names
    #[serde(default)]
    pub write_to: Vec<String>,

    /// Stop evaluating later rules when this one matches
    #[serde(default, rename = "final")]
    pub is_final: bool,

    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_pattern() -> String {
    "*".to_string()
}

impl RuleConfig {
    pub fn to_rule(&self) -> RoutingRule {
        let mut rule = RoutingRule::new(self.name.clone());
        if let Some(level) = self.level {
            rule = rule.levels(level..=level);
        } else {
            if let Some(min) = self.min_level {
                rule = rule.min_level(min);
            }
            if let Some(max) = self.max_level {
                rule = rule.max_level(max);
            }
        }
        for target in &self.write_to {
            rule = rule.write_to(target.clone());
        }
        if self.is_final {
            rule = rule.final_rule();
        }
        rule
    }
}

#[cfg(test)]
#[path = "model_test.rs"]
mod model_test;
