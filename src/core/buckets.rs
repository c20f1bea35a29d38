//! Fixed-width time buckets and level sparklines for the overview.
//!
//! `BucketLayout` is the only place bucket boundaries are derived. The
//! client-side path (`BucketedSeries::from_rows`) and the backend aggregate
//! query (`BucketLayout::sql_index_expr`) both go through it.
use crate::core::level::Level;
use crate::core::types::{LogRow, QueryArg, TimeRange};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

pub const MIN_BUCKETS: usize = 40;
pub const MAX_BUCKETS: usize = 200;

/// Width of the label column shared by the aggregate bar and every level row
pub const LABEL_WIDTH: usize = 8;

pub const SPARK_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
pub const SPARK_BLANK: char = ' ';

/// Bucket geometry for one `(time range, render width)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLayout {
    range: TimeRange,
    interval_seconds: i64,
    count: usize,
}

impl BucketLayout {
    pub fn new(range: &TimeRange, render_width: usize) -> Self {
        let count = render_width.clamp(MIN_BUCKETS, MAX_BUCKETS);
        let interval_seconds = (range.seconds() / count as i64).max(1);
        Self { range: *range, interval_seconds, count }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn interval_seconds(&self) -> i64 {
        self.interval_seconds
    }

    pub fn range(&self) -> &TimeRange {
        &self.range
    }

    fn clamp_index(&self, raw: i64) -> usize {
        raw.clamp(0, self.count as i64 - 1) as usize
    }

    /// Bucket for a timestamp given in whole epoch seconds
    pub fn index_for_epoch(&self, epoch_seconds: i64) -> usize {
        let offset = epoch_seconds - self.range.from.timestamp();
        self.clamp_index(offset.div_euclid(self.interval_seconds))
    }

    pub fn index_for(&self, ts: DateTime<Utc>) -> usize {
        self.index_for_epoch(ts.timestamp())
    }

    /// Start timestamp of every bucket
    pub fn boundaries(&self) -> Vec<DateTime<Utc>> {
        (0..self.count)
            .map(|i| self.range.from + Duration::seconds(i as i64 * self.interval_seconds))
            .collect()
    }

    fn bucket_start(&self, index: usize) -> DateTime<Utc> {
        self.range.from + Duration::seconds(index as i64 * self.interval_seconds)
    }

    /// Whether bucket `index` starts before the end of the range
    ///
    /// Ranges shorter than the bucket count leave trailing buckets past `to`.
    pub fn bucket_in_range(&self, index: usize) -> bool {
        index == 0 || (index < self.count && self.bucket_start(index) < self.range.to)
    }

    /// Time covered by bucket `index`, never extending past the range
    ///
    /// The last bucket runs to the end of the range.
    pub fn bucket_range(&self, index: usize) -> TimeRange {
        let index = index.min(self.count - 1);
        let start = self.bucket_start(index).min(self.range.to);
        let end = if index + 1 == self.count {
            self.range.to
        } else {
            (start + Duration::seconds(self.interval_seconds)).min(self.range.to)
        };
        TimeRange::new(start, end)
    }

    /// Human-readable label per bucket, coarser as the interval grows
    pub fn labels(&self) -> Vec<String> {
        let format = if self.interval_seconds < 60 {
            "%H:%M:%S"
        } else if self.interval_seconds < 86_400 {
            "%H:%M"
        } else {
            "%m-%d %H:%M"
        };
        self.boundaries()
            .iter()
            .map(|ts| ts.format(format).to_string())
            .collect()
    }

    /// SQL expression computing the same clamped bucket index from an epoch-seconds column
    pub fn sql_index_expr(&self, column_sql: &str) -> (String, Vec<QueryArg>) {
        (
            format!("MIN(MAX(CAST(({column_sql} - ?) / ? AS INTEGER), 0), ?)"),
            vec![
                QueryArg::Integer(self.range.from.timestamp()),
                QueryArg::Integer(self.interval_seconds),
                QueryArg::Integer(self.count as i64 - 1),
            ],
        )
    }
}

/// Pre-aggregated count for one `(level, bucket)` cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelCount {
    pub level: Level,
    pub bucket: i64,
    pub count: u64,
}

/// Per-level counts sharing one bucket layout
#[derive(Debug, Clone, PartialEq)]
pub struct BucketedSeries {
    layout: BucketLayout,
    levels: BTreeMap<Level, Vec<u64>>,
    labels: Vec<String>,
}

impl BucketedSeries {
    /// Every canonical level present, all zeros
    pub fn empty(layout: BucketLayout) -> Self {
        let levels = Level::iter().map(|level| (level, vec![0; layout.count()])).collect();
        let labels = layout.labels();
        Self { layout, levels, labels }
    }

    pub fn from_events(
        layout: BucketLayout,
        events: impl IntoIterator<Item = (DateTime<Utc>, Level)>,
    ) -> Self {
        let mut series = Self::empty(layout);
        for (ts, level) in events {
            let bucket = series.layout.index_for(ts);
            series.bump(level, bucket, 1);
        }
        series
    }

    /// Client-side aggregation over already fetched rows
    pub fn from_rows<'a>(layout: BucketLayout, rows: impl IntoIterator<Item = &'a LogRow>) -> Self {
        Self::from_events(layout, rows.into_iter().map(|row| (row.timestamp, row.canonical_level)))
    }

    /// Ingest counts pre-aggregated by the backend
    pub fn from_counts(layout: BucketLayout, counts: impl IntoIterator<Item = LevelCount>) -> Self {
        let mut series = Self::empty(layout);
        for cell in counts {
            let bucket = series.layout.clamp_index(cell.bucket);
            series.bump(cell.level, bucket, cell.count);
        }
        series
    }

    fn bump(&mut self, level: Level, bucket: usize, by: u64) {
        if let Some(values) = self.levels.get_mut(&level) {
            values[bucket] += by;
        }
    }

    pub fn layout(&self) -> &BucketLayout {
        &self.layout
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn series(&self, level: Level) -> &[u64] {
        self.levels.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn levels(&self) -> impl Iterator<Item = (Level, &[u64])> {
        self.levels.iter().map(|(level, values)| (*level, values.as_slice()))
    }

    /// Sum across levels per bucket
    pub fn totals(&self) -> Vec<u64> {
        let mut totals = vec![0; self.layout.count()];
        for values in self.levels.values() {
            for (total, value) in totals.iter_mut().zip(values) {
                *total += value;
            }
        }
        totals
    }

    pub fn total_count(&self) -> u64 {
        self.totals().iter().sum()
    }

    /// Aggregate bar: the "all" label followed by the totals sparkline
    pub fn aggregate_bar(&self) -> String {
        format!("{}{}", label_prefix("all"), sparkline(&self.totals()))
    }

    pub fn level_line(&self, level: Level) -> String {
        format!("{}{}", label_prefix(level.as_str()), sparkline(self.series(level)))
    }

    /// Aggregate bar followed by one row per level, all label-aligned
    pub fn overview_lines(&self) -> Vec<String> {
        std::iter::once(self.aggregate_bar())
            .chain(Level::iter().map(|level| self.level_line(level)))
            .collect()
    }
}

/// Pad or cut a row label to exactly `LABEL_WIDTH` characters
pub fn label_prefix(name: &str) -> String {
    let cut: String = name.chars().take(LABEL_WIDTH - 1).collect();
    format!("{cut:<width$}", width = LABEL_WIDTH)
}

/// Render counts as glyphs scaled between the smallest and largest non-zero value
///
/// Zero buckets render blank so "no data" is distinct from the minimum.
pub fn sparkline(values: &[u64]) -> String {
    let (min, max) = values
        .iter()
        .copied()
        .filter(|v| *v > 0)
        .fold((None, None), |(min, max): (Option<u64>, Option<u64>), v| {
            (Some(min.map_or(v, |m| m.min(v))), Some(max.map_or(v, |m| m.max(v))))
        });
    let (Some(min), Some(max)) = (min, max) else {
        return std::iter::repeat(SPARK_BLANK).take(values.len()).collect();
    };
    let top = SPARK_GLYPHS.len() - 1;
    values
        .iter()
        .map(|&v| {
            if v == 0 {
                SPARK_BLANK
            } else if max == min {
                SPARK_GLYPHS[top]
            } else {
                let scaled = (v - min) as f64 / (max - min) as f64 * top as f64;
                SPARK_GLYPHS[(scaled.round() as i64).clamp(0, top as i64) as usize]
            }
        })
        .collect()
}
