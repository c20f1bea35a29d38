//! Backend-side level/bucket aggregation for the overview sparklines.
use crate::core::buckets::{BucketLayout, BucketedSeries, LevelCount};
use crate::core::level::{Level, canonical_level_sql};
use crate::core::predicate::{Predicate, quote_identifier};
use crate::core::types::{TimeRange, Window};
use crate::services::backend::QueryBackend;
use crate::services::window_planner::{FetchError, FetchRequest, WindowPlanner};
use std::str::FromStr;
use tracing::{debug, instrument};

/// Plan the grouped count query for `layout`
///
/// Bucket indices come from `BucketLayout::sql_index_expr` so they match
/// what `BucketedSeries::from_rows` computes for the same rows.
pub fn plan_overview(
    planner: &WindowPlanner,
    range: &TimeRange,
    predicate: &Predicate,
    layout: &BucketLayout,
) -> FetchRequest {
    let source = planner.source();
    let (bucket_sql, mut args) = layout.sql_index_expr(&quote_identifier(&source.time_column));
    let scoped = planner.where_clause(range, predicate);
    args.extend(scoped.args);
    let sql = format!(
        "SELECT {} AS canonical_level, {} AS bucket_index, COUNT(*) AS n FROM {} WHERE {} GROUP BY 1, 2",
        canonical_level_sql(&source.level_column),
        bucket_sql,
        planner.table_sql(),
        scoped.sql
    );
    FetchRequest {
        sql,
        args,
        range: *range,
        window: Window::new(layout.count()),
    }
}

#[instrument(skip(backend, planner, predicate))]
pub fn fetch_overview(
    backend: &dyn QueryBackend,
    planner: &WindowPlanner,
    range: &TimeRange,
    predicate: &Predicate,
    render_width: usize,
) -> Result<BucketedSeries, FetchError> {
    let layout = BucketLayout::new(range, render_width);
    let request = plan_overview(planner, range, predicate, &layout);
    let result = backend.query(&request.sql, &request.args)?;

    let column = |name: &str| {
        result
            .column_index(name)
            .ok_or_else(|| FetchError::MissingColumn(name.to_string()))
    };
    let (level_idx, bucket_idx, count_idx) = (
        column("canonical_level")?,
        column("bucket_index")?,
        column("n")?,
    );

    let mut counts = Vec::with_capacity(result.rows.len());
    for (row, cells) in result.rows.iter().enumerate() {
        let number = |idx: usize, name: &str| {
            cells[idx].as_i64().ok_or_else(|| FetchError::BadNumber {
                row,
                column: name.to_string(),
                value: cells[idx].to_string(),
            })
        };
        let level = cells[level_idx]
            .as_text()
            .and_then(|name| Level::from_str(&name).ok())
            .unwrap_or(Level::Other);
        counts.push(LevelCount {
            level,
            bucket: number(bucket_idx, "bucket_index")?,
            count: number(count_idx, "n")?.max(0) as u64,
        });
    }
    debug!(cells = counts.len(), buckets = layout.count(), "overview aggregated");
    Ok(BucketedSeries::from_counts(layout, counts))
}
