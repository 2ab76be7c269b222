//! Scribe - Routing
//!
//! Ordered rule matching from events to targets.
//!
//! # Design
//!
//! Rules are compiled once per configuration into a `RoutingTable`. Each rule
//! has a source name pattern, an inclusive level range, a list of targets and
//! a final flag. Rules are evaluated in declaration order:
//!
//! - a matching rule adds its targets (deduplicated, first occurrence wins)
//! - a matching final rule stops evaluation
//! - an event matching no rule has no targets and is dropped
//!
//! Targets are addressed by `TargetId`, an index assigned in registration
//! order, so the dispatch path never compares target names.

mod error;
mod pattern;
mod rule;
mod table;
mod target_id;

#[cfg(test)]
mod table_test;

pub use error::{Result, RoutingError};
pub use pattern::NamePattern;
pub use rule::RoutingRule;
pub use table::{ROUTE_CACHE_LIMIT, RoutingTable, RoutingTableBuilder, SourceRoutes};
pub use target_id::TargetId;
