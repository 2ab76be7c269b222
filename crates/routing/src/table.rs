//! Compiled routing table
//!
//! The table is built once per configuration and never mutated afterwards.
//! Rule evaluation runs once per distinct source name: the per-level target
//! lists are cached so the dispatch hot path is a single map lookup.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use scribe_protocol::Level;

use crate::error::{Result, RoutingError};
use crate::pattern::NamePattern;
use crate::rule::RoutingRule;
use crate::target_id::TargetId;

/// Distinct source names cached per table before falling back to uncached
/// evaluation
pub const ROUTE_CACHE_LIMIT: usize = 10_000;

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: NamePattern,
    min_level: Level,
    max_level: Level,
    targets: Vec<TargetId>,
    is_final: bool,
}

/// Resolved targets for one source name, indexed by level
#[derive(Debug, Clone, Default)]
pub struct SourceRoutes {
    per_level: [Box<[TargetId]>; Level::COUNT],
}

impl SourceRoutes {
    /// Deduplicated targets for events at `level`
    #[inline]
    pub fn targets(&self, level: Level) -> &[TargetId] {
        self.per_level
            .get(level.ordinal())
            .map(|t| &**t)
            .unwrap_or(&[])
    }
}

/// Immutable, compiled routing rules
///
/// # Example
///
/// ```
/// use scribe_protocol::Level;
/// use scribe_routing::{RoutingRule, RoutingTable};
///
/// let mut builder = RoutingTable::builder();
/// let x = builder.register_target("X").unwrap();
/// let y = builder.register_target("Y").unwrap();
/// builder.add_rule(RoutingRule::new("A*").write_to("X").final_rule());
/// builder.add_rule(RoutingRule::new("*").write_to("Y"));
/// let table = builder.build().unwrap();
///
/// assert_eq!(table.routes_for("A1").targets(Level::Info), &[x]);
/// assert_eq!(table.routes_for("B1").targets(Level::Info), &[y]);
/// ```
#[derive(Debug)]
pub struct RoutingTable {
    rules: Vec<CompiledRule>,
    target_names: Vec<String>,
    case_sensitive: bool,
    cache: DashMap<Arc<str>, Arc<SourceRoutes>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl RoutingTable {
    /// Table with no rules and no targets; every event is dropped
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            target_names: Vec::new(),
            case_sensitive: true,
            cache: DashMap::new(),
        }
    }

    /// Start building a table
    #[must_use]
    pub fn builder() -> RoutingTableBuilder {
        RoutingTableBuilder::default()
    }

    /// Cached routes for a source name
    pub fn routes_for(&self, source: &str) -> Arc<SourceRoutes> {
        if let Some(hit) = self.cache.get(source) {
            return Arc::clone(hit.value());
        }

        let routes = Arc::new(self.compute(source));
        if self.cache.len() < ROUTE_CACHE_LIMIT {
            self.cache.insert(Arc::from(source), Arc::clone(&routes));
        }
        routes
    }

    /// Evaluate rules for one event without touching the cache
    ///
    /// Rules are tried in order. Matching rules contribute their targets
    /// (first occurrence wins on duplicates); a matching final rule stops
    /// evaluation.
    pub fn evaluate(&self, source: &str, level: Level) -> Vec<TargetId> {
        let folded;
        let name = if self.case_sensitive {
            source
        } else {
            folded = source.to_lowercase();
            folded.as_str()
        };
        self.evaluate_folded(name, level)
    }

    fn evaluate_folded(&self, name: &str, level: Level) -> Vec<TargetId> {
        let mut out = Vec::new();
        if level == Level::Off {
            return out;
        }

        for rule in &self.rules {
            if level < rule.min_level || level > rule.max_level {
                continue;
            }
            if !rule.pattern.matches(name) {
                continue;
            }
            for &target in &rule.targets {
                if !out.contains(&target) {
                    out.push(target);
                }
            }
            if rule.is_final {
                break;
            }
        }
        out
    }

    fn compute(&self, source: &str) -> SourceRoutes {
        let folded;
        let name = if self.case_sensitive {
            source
        } else {
            folded = source.to_lowercase();
            folded.as_str()
        };

        let mut routes = SourceRoutes::default();
        for level in Level::ALL {
            routes.per_level[level.ordinal()] = self.evaluate_folded(name, level).into_boxed_slice();
        }
        routes
    }

    /// Name of a target by id
    #[inline]
    pub fn target_name(&self, id: TargetId) -> Option<&str> {
        self.target_names.get(id.as_usize()).map(String::as_str)
    }

    /// Registered target names, indexed by `TargetId`
    #[inline]
    pub fn target_names(&self) -> &[String] {
        &self.target_names
    }

    #[inline]
    pub fn target_count(&self) -> usize {
        self.target_names.len()
    }

    #[inline]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// No rules and no targets
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.target_names.is_empty()
    }

    #[inline]
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Number of source names currently cached
    #[inline]
    pub fn cached_sources(&self) -> usize {
        self.cache.len()
    }
}

/// Builder for `RoutingTable`
#[derive(Debug)]
pub struct RoutingTableBuilder {
    target_ids: HashMap<String, TargetId>,
    target_names: Vec<String>,
    rules: Vec<RoutingRule>,
    case_sensitive: bool,
}

impl Default for RoutingTableBuilder {
    fn default() -> Self {
        Self {
            target_ids: HashMap::new(),
            target_names: Vec::new(),
            rules: Vec::new(),
            case_sensitive: true,
        }
    }
}

impl RoutingTableBuilder {
    /// Apply case sensitivity uniformly to every pattern (default: true)
    pub fn case_sensitive(&mut self, case_sensitive: bool) -> &mut Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Register a target name and get its id
    pub fn register_target(&mut self, name: impl Into<String>) -> Result<TargetId> {
        let name = name.into();
        if self.target_ids.contains_key(&name) {
            return Err(RoutingError::duplicate_target(name));
        }
        let count = self.target_names.len();
        let index = u16::try_from(count).map_err(|_| RoutingError::TooManyTargets {
            count: count + 1,
            max: TargetId::MAX_TARGETS,
        })?;
        let id = TargetId::new(index);
        self.target_ids.insert(name.clone(), id);
        self.target_names.push(name);
        Ok(id)
    }

    /// Append a rule; rules are evaluated in the order they are added
    pub fn add_rule(&mut self, rule: RoutingRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Look up a registered target
    pub fn target_id(&self, name: &str) -> Option<TargetId> {
        self.target_ids.get(name).copied()
    }

    /// Compile patterns and resolve target names
    pub fn build(self) -> Result<RoutingTable> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in self.rules {
            if rule.min_level > rule.max_level {
                return Err(RoutingError::InvertedLevels {
                    pattern: rule.pattern,
                    min: rule.min_level.to_string(),
                    max: rule.max_level.to_string(),
                });
            }
            let pattern = NamePattern::parse(&rule.pattern, self.case_sensitive)?;
            let targets = rule
                .targets
                .iter()
                .map(|name| {
                    self.target_ids
                        .get(name)
                        .copied()
                        .ok_or_else(|| RoutingError::unknown_target(name, &rule.pattern))
                })
                .collect::<Result<Vec<_>>>()?;
            rules.push(CompiledRule {
                pattern,
                min_level: rule.min_level,
                max_level: rule.max_level,
                targets,
                is_final: rule.is_final,
            });
        }

        Ok(RoutingTable {
            rules,
            target_names: self.target_names,
            case_sensitive: self.case_sensitive,
            cache: DashMap::new(),
        })
    }
}
