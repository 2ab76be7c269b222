//! Routing rules
//!
//! A rule is an uncompiled, name-based description. `RoutingTable` compiles
//! rules into patterns and target ids.

use std::ops::RangeInclusive;

use scribe_protocol::Level;

/// Ordered routing rule
///
/// # Example
///
/// ```
/// use scribe_protocol::Level;
/// use scribe_routing::RoutingRule;
///
/// let rule = RoutingRule::new("app.db*")
///     .min_level(Level::Warn)
///     .write_to("file")
///     .write_to("console")
///     .final_rule();
///
/// assert!(rule.is_final);
/// assert_eq!(rule.targets, vec!["file", "console"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    /// Source name pattern
    pub pattern: String,
    /// Inclusive lower bound
    pub min_level: Level,
    /// Inclusive upper bound
    pub max_level: Level,
    /// Target names, in declaration order
    pub targets: Vec<String>,
    /// Stop evaluating later rules once this one matches
    pub is_final: bool,
}

impl RoutingRule {
    /// Rule matching every level from `Trace` to `Fatal`
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            min_level: Level::Trace,
            max_level: Level::Fatal,
            targets: Vec::new(),
            is_final: false,
        }
    }

    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    /// Set both bounds at once
    pub fn levels(mut self, range: RangeInclusive<Level>) -> Self {
        self.min_level = *range.start();
        self.max_level = *range.end();
        self
    }

    /// Append a target
    pub fn write_to(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Mark as final
    pub fn final_rule(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Whether `level` falls inside the rule's inclusive range
    #[inline]
    pub fn accepts_level(&self, level: Level) -> bool {
        self.min_level <= level && level <= self.max_level
    }
}
