use chrono::{DateTime, Duration, TimeZone, Utc};
use diagtui::config::SourceConfig;
use diagtui::core::{Condition, FilterTree, Level, Logic, Operator, TimeRange, Window, compile_tree};
use diagtui::services::{SortOrder, SqliteBackend, WindowPlanner, WindowedRows};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

fn hour() -> TimeRange {
    TimeRange::new(base(), base() + Duration::hours(1))
}

fn seeded_backend() -> SqliteBackend {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let b = base().timestamp();
    backend
        .execute_batch(&format!(
            "CREATE TABLE logs (timestamp INTEGER, level TEXT, message TEXT, service TEXT);
             INSERT INTO logs VALUES
                ({}, 'ERROR', 'disk full', 'api'),
                ({}, 'warn', 'slow query', 'db'),
                ({}, 'info', 'ok', 'api'),
                ({}, 'Exception', 'boom', 'worker'),
                ({}, 'debug', 'no service', NULL),
                ({}, 'error', 'too late', 'api'),
                ({}, 'error', 'too early', 'api');",
            b + 10,
            b + 20,
            b + 30,
            b + 40,
            b + 50,
            b + 7_200,
            b - 10,
        ))
        .unwrap();
    backend
}

fn fetch(tree: &FilterTree) -> WindowedRows {
    let planner = WindowPlanner::new(SourceConfig::default());
    planner
        .fetch(&seeded_backend(), &hour(), &compile_tree(tree), Window::new(100), SortOrder::Desc)
        .unwrap()
}

fn messages(rows: &WindowedRows) -> Vec<&str> {
    rows.rows.iter().map(|r| r.message.as_str()).collect()
}

#[test]
fn empty_filter_returns_every_row_in_range() {
    let rows = fetch(&FilterTree::new());
    assert_eq!(
        messages(&rows),
        vec!["no service", "boom", "ok", "slow query", "disk full"]
    );
    assert_eq!(rows.level_counts.get(&Level::Error), Some(&2));
    assert_eq!(rows.level_counts.get(&Level::Warning), Some(&1));
    assert_eq!(rows.bounds, Some((base() + Duration::seconds(10), base() + Duration::seconds(50))));
    assert!(rows.is_last_page());
}

#[test]
fn or_root_cannot_escape_the_time_range() {
    let mut tree = FilterTree::new();
    tree.set_logic(&[], Logic::Or);
    tree.add_condition(&[], Condition::new("service", Operator::Eq, "api"));
    tree.add_condition(&[], Condition::new("level", Operator::Like, "warn"));

    let rows = fetch(&tree);
    assert_eq!(messages(&rows), vec!["ok", "slow query", "disk full"]);
}

#[test]
fn not_groups_negate_each_child() {
    let mut tree = FilterTree::new();
    let not_and = tree.add_group(&[], Logic::NotAnd);
    tree.add_condition(&not_and, Condition::new("service", Operator::Eq, "api"));
    tree.add_condition(&not_and, Condition::new("service", Operator::Eq, "db"));
    assert_eq!(compile_tree(&tree).sql, "(NOT (`service` = ?) AND NOT (`service` = ?))");

    // NULL service compares as unknown and drops out
    assert_eq!(messages(&fetch(&tree)), vec!["boom"]);

    let mut single = FilterTree::new();
    let not_or = single.add_group(&[], Logic::NotOr);
    single.add_condition(&not_or, Condition::new("service", Operator::Eq, "api"));
    // a lone child passes through as is, negation only applies to two or more
    assert_eq!(compile_tree(&single).sql, "`service` = ?");
    assert_eq!(messages(&fetch(&single)), vec!["ok", "disk full"]);
}

#[test]
fn list_and_null_operators() {
    let mut tree = FilterTree::new();
    tree.add_condition(&[], Condition::new("service", Operator::In, "api, worker"));
    assert_eq!(messages(&fetch(&tree)), vec!["boom", "ok", "disk full"]);

    let mut tree = FilterTree::new();
    tree.add_condition(&[], Condition::new("service", Operator::IsNull, ""));
    assert_eq!(messages(&fetch(&tree)), vec!["no service"]);
}

#[test]
fn hostile_values_are_bound_not_spliced() {
    let mut tree = FilterTree::new();
    tree.add_condition(
        &[],
        Condition::new("service", Operator::Eq, "api' OR '1'='1"),
    );
    assert!(fetch(&tree).rows.is_empty());
}

#[test]
fn drill_in_narrows_to_the_attribute() {
    let rows = fetch(&FilterTree::new());
    let boom = &rows.rows[1];
    assert_eq!(boom.canonical_level, Level::Error);
    assert_eq!(boom.attributes.get("service").map(String::as_str), Some("worker"));

    let mut tree = FilterTree::new();
    tree.drill_in("service", "worker");
    assert_eq!(messages(&fetch(&tree)), vec!["boom"]);
}

#[test]
fn saved_filter_compiles_identically_after_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filter.json");

    let mut tree = FilterTree::new();
    tree.add_condition(&[], Condition::new("level", Operator::NotLike, "debug"));
    let or = tree.add_group(&[], Logic::Or);
    tree.add_condition(&or, Condition::new("service", Operator::Eq, "api"));
    tree.add_condition(&or, Condition::new("service", Operator::Eq, "db"));
    tree.save_to_file(&path).unwrap();

    let loaded = FilterTree::load_from_file(&path).unwrap();
    assert_eq!(loaded, tree);
    assert_eq!(compile_tree(&loaded), compile_tree(&tree));
    assert_eq!(messages(&fetch(&loaded)), vec!["ok", "slow query", "disk full"]);
}

#[test]
fn date_and_precise_columns_are_constrained_and_sorted() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let b = base().timestamp();
    let ns = |secs: i64, frac: i64| secs * 1_000_000_000 + frac;
    backend
        .execute_batch(&format!(
            "CREATE TABLE events (ts INTEGER, day TEXT, ts_ns INTEGER, severity TEXT, body TEXT);
             INSERT INTO events VALUES
                ({s}, '2024-05-01', {a}, 'info', 'first'),
                ({s}, '2024-05-01', {c}, 'warn', 'third'),
                ({s}, '2024-05-01', {m}, 'info', 'second'),
                ({s}, '2024-04-30', {c}, 'error', 'wrong partition');",
            s = b + 10,
            a = ns(b + 10, 100),
            m = ns(b + 10, 500),
            c = ns(b + 10, 900),
        ))
        .unwrap();

    let source = SourceConfig {
        table: "events".to_string(),
        time_column: "ts".to_string(),
        date_column: Some("day".to_string()),
        precise_time_column: Some("ts_ns".to_string()),
        message_column: "body".to_string(),
        level_column: "severity".to_string(),
        ..SourceConfig::default()
    };
    let planner = WindowPlanner::new(source);
    let rows = planner
        .fetch(&backend, &hour(), &compile_tree(&FilterTree::new()), Window::new(10), SortOrder::Asc)
        .unwrap();

    assert_eq!(messages(&rows), vec!["first", "second", "third"]);
    assert_eq!(rows.rows[2].timestamp.timestamp_subsec_nanos(), 900);
    assert_eq!(rows.rows[2].canonical_level, Level::Warning);
    assert_eq!(rows.rows[0].attributes.get("day").map(String::as_str), Some("2024-05-01"));
}
