//! Tests for RoutingTable
//!
//! Tests cover rule ordering, final rules, level bounds, target dedup,
//! case folding and the per-source route cache.

use scribe_protocol::Level;

use crate::{RoutingError, RoutingRule, RoutingTable, TargetId};

fn table_with(targets: &[&str], rules: Vec<RoutingRule>) -> RoutingTable {
    let mut builder = RoutingTable::builder();
    for name in targets {
        builder.register_target(*name).unwrap();
    }
    for rule in rules {
        builder.add_rule(rule);
    }
    builder.build().unwrap()
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_empty_table_drops_everything() {
    let table = RoutingTable::empty();
    assert!(table.is_empty());
    assert!(table.routes_for("any").targets(Level::Fatal).is_empty());
}

#[test]
fn test_register_assigns_sequential_ids() {
    let mut builder = RoutingTable::builder();
    assert_eq!(builder.register_target("a").unwrap(), TargetId::new(0));
    assert_eq!(builder.register_target("b").unwrap(), TargetId::new(1));
    assert_eq!(builder.target_id("b"), Some(TargetId::new(1)));
}

#[test]
fn test_duplicate_target_rejected() {
    let mut builder = RoutingTable::builder();
    builder.register_target("a").unwrap();
    let err = builder.register_target("a").unwrap_err();
    assert_eq!(err, RoutingError::duplicate_target("a"));
}

#[test]
fn test_unknown_target_rejected() {
    let mut builder = RoutingTable::builder();
    builder.register_target("a").unwrap();
    builder.add_rule(RoutingRule::new("*").write_to("missing"));
    let err = builder.build().unwrap_err();
    assert!(matches!(err, RoutingError::UnknownTarget { ref name, .. } if name == "missing"));
}

#[test]
fn test_inverted_levels_rejected() {
    let mut builder = RoutingTable::builder();
    builder.register_target("a").unwrap();
    builder.add_rule(
        RoutingRule::new("*")
            .min_level(Level::Error)
            .max_level(Level::Info)
            .write_to("a"),
    );
    assert!(matches!(
        builder.build(),
        Err(RoutingError::InvertedLevels { .. })
    ));
}

#[test]
fn test_invalid_pattern_rejected() {
    let mut builder = RoutingTable::builder();
    builder.register_target("a").unwrap();
    builder.add_rule(RoutingRule::new("app*db").write_to("a"));
    assert!(matches!(
        builder.build(),
        Err(RoutingError::InvalidPattern { .. })
    ));
}

// =============================================================================
// Matching
// =============================================================================

#[test]
fn test_min_level_filters_lower_levels() {
    let table = table_with(
        &["A"],
        vec![RoutingRule::new("*").min_level(Level::Info).write_to("A")],
    );
    let a = TargetId::new(0);

    assert!(table.evaluate("any.logger", Level::Debug).is_empty());
    assert_eq!(table.evaluate("any.logger", Level::Info), vec![a]);
    assert_eq!(table.evaluate("any.logger", Level::Warn), vec![a]);
}

#[test]
fn test_max_level_is_inclusive() {
    let table = table_with(
        &["A"],
        vec![RoutingRule::new("*").levels(Level::Debug..=Level::Info).write_to("A")],
    );
    assert!(table.evaluate("x", Level::Trace).is_empty());
    assert_eq!(table.evaluate("x", Level::Info).len(), 1);
    assert!(table.evaluate("x", Level::Warn).is_empty());
}

#[test]
fn test_final_rule_stops_evaluation() {
    let table = table_with(
        &["X", "Y"],
        vec![
            RoutingRule::new("A*").write_to("X").final_rule(),
            RoutingRule::new("*").write_to("Y"),
        ],
    );
    let (x, y) = (TargetId::new(0), TargetId::new(1));

    assert_eq!(table.evaluate("A1", Level::Info), vec![x]);
    assert_eq!(table.evaluate("B1", Level::Info), vec![y]);
}

#[test]
fn test_final_rule_only_stops_when_it_matches() {
    let table = table_with(
        &["X", "Y"],
        vec![
            RoutingRule::new("A*")
                .min_level(Level::Error)
                .write_to("X")
                .final_rule(),
            RoutingRule::new("*").write_to("Y"),
        ],
    );
    let (x, y) = (TargetId::new(0), TargetId::new(1));

    assert_eq!(table.evaluate("A1", Level::Info), vec![y]);
    assert_eq!(table.evaluate("A1", Level::Error), vec![x]);
}

#[test]
fn test_non_final_rules_fan_out() {
    let table = table_with(
        &["X", "Y"],
        vec![
            RoutingRule::new("app.*").write_to("X"),
            RoutingRule::new("*").write_to("Y"),
        ],
    );
    assert_eq!(
        table.evaluate("app.web", Level::Info),
        vec![TargetId::new(0), TargetId::new(1)]
    );
}

#[test]
fn test_duplicate_targets_deduplicated() {
    let table = table_with(
        &["A", "B"],
        vec![
            RoutingRule::new("*").write_to("A").write_to("A"),
            RoutingRule::new("app*").write_to("B").write_to("A"),
        ],
    );
    assert_eq!(
        table.evaluate("app", Level::Info),
        vec![TargetId::new(0), TargetId::new(1)]
    );
}

#[test]
fn test_no_match_yields_no_targets() {
    let table = table_with(&["A"], vec![RoutingRule::new("db.*").write_to("A")]);
    assert!(table.evaluate("web.http", Level::Fatal).is_empty());
}

#[test]
fn test_off_level_never_routes() {
    let table = table_with(&["A"], vec![RoutingRule::new("*").write_to("A")]);
    assert!(table.evaluate("x", Level::Off).is_empty());
}

#[test]
fn test_case_insensitive_matching() {
    let mut builder = RoutingTable::builder();
    builder.case_sensitive(false);
    builder.register_target("A").unwrap();
    builder.add_rule(RoutingRule::new("App.*").write_to("A"));
    let table = builder.build().unwrap();

    assert_eq!(table.evaluate("APP.server", Level::Info).len(), 1);
    assert_eq!(table.routes_for("app.Server").targets(Level::Info).len(), 1);
}

#[test]
fn test_case_sensitive_by_default() {
    let table = table_with(&["A"], vec![RoutingRule::new("App.*").write_to("A")]);
    assert!(table.evaluate("app.server", Level::Info).is_empty());
}

// =============================================================================
// Route cache
// =============================================================================

#[test]
fn test_cached_routes_match_evaluation() {
    let table = table_with(
        &["X", "Y", "Z"],
        vec![
            RoutingRule::new("db*").min_level(Level::Warn).write_to("X"),
            RoutingRule::new("*pool").write_to("Y").final_rule(),
            RoutingRule::new("*").write_to("Z"),
        ],
    );

    for source in ["db", "db.pool", "web", "dbpool", ""] {
        let cached = table.routes_for(source);
        for level in Level::ALL {
            assert_eq!(
                cached.targets(level),
                table.evaluate(source, level).as_slice(),
                "source={source} level={level}"
            );
        }
    }
}

#[test]
fn test_routes_cached_per_source() {
    let table = table_with(&["A"], vec![RoutingRule::new("*").write_to("A")]);
    table.routes_for("one");
    table.routes_for("one");
    table.routes_for("two");
    assert_eq!(table.cached_sources(), 2);
}
