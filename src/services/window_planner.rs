//! Windowed fetches scoped by a mandatory time range.
//!
//! The time constraint is always emitted first and the user predicate is
//! appended in its own parentheses, so no predicate can widen the range.
use crate::config::SourceConfig;
use crate::core::buckets::BucketedSeries;
use crate::core::level::Level;
use crate::core::predicate::{Predicate, quote_identifier};
use crate::core::types::{LogRow, QueryArg, TimeRange, Window};
use crate::core::zoom::ZoomStack;
use crate::services::backend::{BackendError, CellValue, QueryBackend, QueryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("result has no `{0}` column")]
    MissingColumn(String),
    #[error("row {row}: `{column}` is not a timestamp ({value})")]
    BadTimestamp {
        row: usize,
        column: String,
        value: String,
    },
    #[error("row {row}: `{column}` is not a number ({value})")]
    BadNumber {
        row: usize,
        column: String,
        value: String,
    },
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[strum(serialize = "ASC")]
    Asc,
    #[default]
    #[strum(serialize = "DESC")]
    Desc,
}

impl SortOrder {
    pub fn toggle(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// A planned statement plus what it was planned for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub sql: String,
    pub args: Vec<QueryArg>,
    pub range: TimeRange,
    pub window: Window,
}

/// Result of one windowed fetch
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedRows {
    pub rows: Vec<LogRow>,
    /// Range the fetch was scoped to
    pub range: TimeRange,
    pub window: Window,
    /// Earliest and latest timestamps among the returned rows
    pub bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub level_counts: BTreeMap<Level, usize>,
}

impl WindowedRows {
    /// Fewer rows than a full page means there is nothing further
    pub fn is_last_page(&self) -> bool {
        self.rows.len() < self.window.size
    }
}

pub(crate) fn epoch_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt()
        .unwrap_or_else(|| ts.timestamp().saturating_mul(1_000_000_000))
}

/// Builds and runs time-scoped, paged row fetches against one source table
#[derive(Debug, Clone)]
pub struct WindowPlanner {
    source: SourceConfig,
}

impl WindowPlanner {
    pub fn new(source: SourceConfig) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn table_sql(&self) -> String {
        quote_identifier(&self.source.table)
    }

    /// Precise column when configured, else the primary time column
    pub fn effective_time_column(&self) -> &str {
        self.source
            .precise_time_column
            .as_deref()
            .unwrap_or(&self.source.time_column)
    }

    /// Range constraint on every configured time column
    pub fn time_constraint(&self, range: &TimeRange) -> Predicate {
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        let mut between = |column: &str, lo: QueryArg, hi: QueryArg| {
            let column = quote_identifier(column);
            clauses.push(format!("{column} >= ?"));
            clauses.push(format!("{column} <= ?"));
            args.push(lo);
            args.push(hi);
        };

        between(
            &self.source.time_column,
            QueryArg::Integer(range.from.timestamp()),
            QueryArg::Integer(range.to.timestamp()),
        );
        if let Some(date_column) = &self.source.date_column {
            between(
                date_column,
                QueryArg::Text(range.from_date().format("%Y-%m-%d").to_string()),
                QueryArg::Text(range.to_date().format("%Y-%m-%d").to_string()),
            );
        }
        if let Some(precise) = &self.source.precise_time_column {
            between(
                precise,
                QueryArg::Integer(epoch_nanos(range.from)),
                QueryArg::Integer(epoch_nanos(range.to)),
            );
        }
        Predicate::new(clauses.join(" AND "), args)
    }

    /// WHERE body: the time constraint followed by the parenthesized user predicate
    pub fn where_clause(&self, range: &TimeRange, predicate: &Predicate) -> Predicate {
        let mut scoped = self.time_constraint(range);
        if !predicate.is_empty() {
            scoped.sql = format!("{} AND ({})", scoped.sql, predicate.sql);
            scoped.args.extend(predicate.args.iter().cloned());
        }
        scoped
    }

    pub fn plan(
        &self,
        range: &TimeRange,
        predicate: &Predicate,
        window: Window,
        order: SortOrder,
    ) -> FetchRequest {
        let scoped = self.where_clause(range, predicate);
        let sql = format!(
            "SELECT * FROM {} WHERE {} ORDER BY {} {} LIMIT {} OFFSET {}",
            self.table_sql(),
            scoped.sql,
            quote_identifier(self.effective_time_column()),
            order,
            window.size,
            window.offset
        );
        FetchRequest {
            sql,
            args: scoped.args,
            range: *range,
            window,
        }
    }

    #[instrument(skip(self, backend, predicate), fields(offset = window.offset, size = window.size))]
    pub fn fetch(
        &self,
        backend: &dyn QueryBackend,
        range: &TimeRange,
        predicate: &Predicate,
        window: Window,
        order: SortOrder,
    ) -> Result<WindowedRows, FetchError> {
        let request = self.plan(range, predicate, window, order);
        self.run(backend, &request)
    }

    /// Execute an already planned request
    pub fn run(
        &self,
        backend: &dyn QueryBackend,
        request: &FetchRequest,
    ) -> Result<WindowedRows, FetchError> {
        let result = backend.query(&request.sql, &request.args)?;
        let rows = self.decode_rows(&result)?;
        debug!(rows = rows.len(), "window fetched");

        let bounds = rows
            .iter()
            .map(|r| r.timestamp)
            .fold(None, |acc: Option<(DateTime<Utc>, DateTime<Utc>)>, ts| match acc {
                None => Some((ts, ts)),
                Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
            });
        let mut level_counts = BTreeMap::new();
        for row in &rows {
            *level_counts.entry(row.canonical_level).or_insert(0) += 1;
        }

        Ok(WindowedRows {
            rows,
            range: request.range,
            window: request.window,
            bounds,
            level_counts,
        })
    }

    /// Map result rows onto `LogRow`s; one bad timestamp fails the batch
    pub fn decode_rows(&self, result: &QueryResult) -> Result<Vec<LogRow>, FetchError> {
        let time_column = self.effective_time_column();
        let precise = self.source.precise_time_column.is_some();
        let time_idx = result
            .column_index(time_column)
            .ok_or_else(|| FetchError::MissingColumn(time_column.to_string()))?;
        let message_idx = result.column_index(&self.source.message_column);
        let level_idx = result.column_index(&self.source.level_column);

        result
            .rows
            .iter()
            .enumerate()
            .map(|(row_no, cells)| {
                let timestamp = decode_timestamp(&cells[time_idx], precise).ok_or_else(|| {
                    FetchError::BadTimestamp {
                        row: row_no,
                        column: time_column.to_string(),
                        value: cells[time_idx].to_string(),
                    }
                })?;
                let text_at = |idx: Option<usize>| {
                    idx.and_then(|i| cells[i].as_text()).unwrap_or_default()
                };
                let level = text_at(level_idx);
                let attributes = result
                    .columns
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != time_idx && Some(*i) != message_idx && Some(*i) != level_idx)
                    .filter_map(|(i, name)| cells[i].as_text().map(|v| (name.clone(), v)))
                    .collect();
                Ok(LogRow {
                    timestamp,
                    message: text_at(message_idx),
                    canonical_level: Level::canonicalize(&level),
                    level,
                    attributes,
                })
            })
            .collect()
    }
}

/// Epoch seconds (or nanoseconds when `precise`), or RFC 3339 text
fn decode_timestamp(cell: &CellValue, precise: bool) -> Option<DateTime<Utc>> {
    if let CellValue::Text(text) = cell {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(text.trim()) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    let raw = cell.as_i64()?;
    if precise {
        Some(DateTime::from_timestamp_nanos(raw))
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}

/// Predicate, zoom history, window and overview series, invalidated together
#[derive(Debug, Clone)]
pub struct QueryScope {
    predicate: Predicate,
    zoom: ZoomStack,
    window: Window,
    series: Option<BucketedSeries>,
}

impl QueryScope {
    pub fn new(range: TimeRange, page_size: usize) -> Self {
        Self {
            predicate: Predicate::default(),
            zoom: ZoomStack::new(range),
            window: Window::new(page_size.max(1)),
            series: None,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn range(&self) -> TimeRange {
        self.zoom.current()
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn zoom(&self) -> &ZoomStack {
        &self.zoom
    }

    pub fn series(&self) -> Option<&BucketedSeries> {
        self.series.as_ref()
    }

    pub fn set_series(&mut self, series: BucketedSeries) {
        self.series = Some(series);
    }

    fn invalidate(&mut self) {
        self.window.reset();
        self.series = None;
    }

    /// Adopt a newly compiled predicate; paging and zoom start over
    pub fn apply_predicate(&mut self, predicate: Predicate) {
        self.predicate = predicate;
        self.zoom.reset();
        self.invalidate();
    }

    /// Replace the base range outright, forgetting zoom history
    pub fn set_range(&mut self, range: TimeRange) {
        self.zoom.rebase(range);
        self.invalidate();
    }

    pub fn zoom_in(&mut self, range: TimeRange) {
        self.zoom.push_and_narrow(range);
        self.invalidate();
    }

    pub fn zoom_out(&mut self) -> bool {
        let popped = self.zoom.pop_and_restore();
        if popped {
            self.invalidate();
        }
        popped
    }

    pub fn zoom_reset(&mut self) -> bool {
        let reset = self.zoom.reset();
        if reset {
            self.invalidate();
        }
        reset
    }

    /// Back to the first page, e.g. after the sort order flips
    pub fn reset_window(&mut self) {
        self.window.reset();
    }

    pub fn next_page(&mut self) {
        self.window.next_page();
    }

    /// `false` when already on the first page
    pub fn previous_page(&mut self) -> bool {
        let before = self.window.offset;
        self.window.previous_page();
        before != self.window.offset
    }

    pub fn plan(&self, planner: &WindowPlanner, order: SortOrder) -> FetchRequest {
        planner.plan(&self.range(), &self.predicate, self.window, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buckets::BucketLayout;
    use crate::core::zoom::DEFAULT_ZOOM_CAPACITY;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn range() -> TimeRange {
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap();
        TimeRange::new(from, from + Duration::hours(2))
    }

    #[test]
    fn plan_scopes_time_before_user_predicate() {
        let planner = WindowPlanner::new(SourceConfig::default());
        let predicate = Predicate::new(
            "`a` = ? OR `b` = ?",
            vec![QueryArg::from("x"), QueryArg::from("y")],
        );
        let request = planner.plan(&range(), &predicate, Window { offset: 400, size: 200 }, SortOrder::Desc);
        assert_eq!(
            request.sql,
            "SELECT * FROM `logs` WHERE `timestamp` >= ? AND `timestamp` <= ? AND (`a` = ? OR `b` = ?) \
             ORDER BY `timestamp` DESC LIMIT 200 OFFSET 400"
        );
        assert_eq!(
            request.args,
            vec![
                QueryArg::Integer(range().from.timestamp()),
                QueryArg::Integer(range().to.timestamp()),
                QueryArg::from("x"),
                QueryArg::from("y"),
            ]
        );
    }

    #[test]
    fn secondary_columns_add_constraints_and_sort_key() {
        let planner = WindowPlanner::new(SourceConfig {
            date_column: Some("day".into()),
            precise_time_column: Some("ts_ns".into()),
            ..SourceConfig::default()
        });
        let request = planner.plan(&range(), &Predicate::default(), Window::new(10), SortOrder::Asc);
        assert_eq!(
            request.sql,
            "SELECT * FROM `logs` WHERE `timestamp` >= ? AND `timestamp` <= ? \
             AND `day` >= ? AND `day` <= ? AND `ts_ns` >= ? AND `ts_ns` <= ? \
             ORDER BY `ts_ns` ASC LIMIT 10 OFFSET 0"
        );
        assert_eq!(request.args[2], QueryArg::from("2024-05-01"));
        assert_eq!(request.args[3], QueryArg::from("2024-05-02"));
        assert_eq!(
            request.args[4],
            QueryArg::Integer(range().from.timestamp() * 1_000_000_000)
        );
    }

    #[test]
    fn decode_splits_fixed_fields_from_attributes() {
        let planner = WindowPlanner::new(SourceConfig::default());
        let result = QueryResult {
            columns: vec!["timestamp".into(), "level".into(), "message".into(), "host".into(), "trace".into()],
            rows: vec![vec![
                CellValue::Integer(1_714_604_400),
                CellValue::Text("WARN".into()),
                CellValue::Text("disk almost full".into()),
                CellValue::Text("db-1".into()),
                CellValue::Null,
            ]],
        };
        let rows = planner.decode_rows(&result).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].canonical_level, Level::Warning);
        assert_eq!(rows[0].level, "WARN");
        assert_eq!(rows[0].message, "disk almost full");
        assert_eq!(rows[0].attributes.get("host").map(String::as_str), Some("db-1"));
        assert!(!rows[0].attributes.contains_key("trace"));
    }

    #[test]
    fn one_bad_timestamp_fails_the_fetch() {
        let planner = WindowPlanner::new(SourceConfig::default());
        let result = QueryResult {
            columns: vec!["timestamp".into()],
            rows: vec![
                vec![CellValue::Integer(1)],
                vec![CellValue::Text("yesterday".into())],
            ],
        };
        let err = planner.decode_rows(&result).unwrap_err();
        assert!(matches!(err, FetchError::BadTimestamp { row: 1, .. }));

        let missing = QueryResult { columns: vec!["other".into()], rows: vec![] };
        assert!(matches!(planner.decode_rows(&missing), Err(FetchError::MissingColumn(_))));
    }

    #[test]
    fn applying_a_predicate_resets_window() {
        let mut scope = QueryScope::new(range(), 200);
        for _ in 0..10 {
            scope.next_page();
        }
        assert_eq!(scope.window().offset, 2000);
        scope.apply_predicate(Predicate::new("`a` = ?", vec![QueryArg::from("1")]));
        assert_eq!(scope.window().offset, 0);
    }

    #[test]
    fn zoom_invalidates_series_and_window() {
        let mut scope = QueryScope::new(range(), 50);
        let layout = BucketLayout::new(&range(), 40);
        scope.set_series(BucketedSeries::empty(layout));
        scope.next_page();

        let narrow = layout.bucket_range(3);
        scope.zoom_in(narrow);
        assert_eq!(scope.range(), narrow);
        assert_eq!(scope.window().offset, 0);
        assert!(scope.series().is_none());

        scope.set_series(BucketedSeries::empty(layout));
        assert!(scope.zoom_out());
        assert_eq!(scope.range(), range());
        assert!(scope.series().is_none());
        assert!(!scope.zoom_out());
    }

    #[test]
    fn predicate_change_resets_zoom() {
        let mut scope = QueryScope::new(range(), 50);
        scope.zoom_in(TimeRange::new(range().from, range().from + Duration::minutes(5)));
        scope.apply_predicate(Predicate::default());
        assert_eq!(scope.range(), range());
        assert!(!scope.zoom().can_zoom_out());
    }

    #[test]
    fn set_range_forgets_zoom_history() {
        let mut scope = QueryScope::new(range(), 50);
        scope.zoom_in(TimeRange::new(range().from, range().from + Duration::minutes(5)));
        scope.next_page();

        let later = TimeRange::new(range().to, range().to + Duration::hours(1));
        scope.set_range(later);
        assert_eq!(scope.range(), later);
        assert_eq!(scope.window().offset, 0);
        assert!(!scope.zoom_reset());
        assert_eq!(scope.range(), later);
    }

    #[test]
    fn deep_zoom_drains_back_to_the_full_range() {
        let mut scope = QueryScope::new(range(), 50);
        let mut narrowed = range();
        for _ in 0..=DEFAULT_ZOOM_CAPACITY {
            narrowed = TimeRange::new(narrowed.from, narrowed.to - Duration::seconds(1));
            scope.zoom_in(narrowed);
        }
        assert_eq!(scope.zoom().depth(), DEFAULT_ZOOM_CAPACITY);
        while scope.zoom_out() {}
        assert_eq!(scope.range(), range());

        for _ in 0..=DEFAULT_ZOOM_CAPACITY {
            scope.zoom_in(TimeRange::new(range().from, range().from + Duration::seconds(1)));
        }
        scope.apply_predicate(Predicate::default());
        assert_eq!(scope.range(), range());
    }
}
