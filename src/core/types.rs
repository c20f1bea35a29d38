use crate::core::level::Level;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed time interval `[from, to]` used to scope every fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, swapping the bounds if they arrive reversed
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        if from <= to {
            Self { from, to }
        } else {
            Self { from: to, to: from }
        }
    }

    /// Range covering the last `duration` up to now
    pub fn ending_now(duration: Duration) -> Self {
        let to = Utc::now();
        Self::new(to - duration, to)
    }

    /// Whole seconds between the bounds
    pub fn seconds(&self) -> i64 {
        (self.to - self.from).num_seconds()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.from && ts <= self.to
    }

    pub fn from_date(&self) -> NaiveDate {
        self.from.date_naive()
    }

    pub fn to_date(&self) -> NaiveDate {
        self.to.date_naive()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.from.format("%Y-%m-%d %H:%M:%S"),
            self.to.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Current page of a windowed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset: usize,
    pub size: usize,
}

impl Window {
    pub fn new(size: usize) -> Self {
        Self { offset: 0, size }
    }

    pub fn next_page(&mut self) {
        self.offset += self.size;
    }

    /// Step back one page, never below zero
    pub fn previous_page(&mut self) {
        self.offset = self.offset.saturating_sub(self.size);
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new(200)
    }
}

/// Positional argument bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryArg {
    Text(String),
    Integer(i64),
}

impl From<&str> for QueryArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for QueryArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for QueryArg {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl fmt::Display for QueryArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Integer(i) => write!(f, "{i}"),
        }
    }
}

/// One decoded row of a windowed fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Level exactly as stored by the source
    pub level: String,
    pub canonical_level: Level,
    /// Every other returned column, kept for drill-in
    pub attributes: BTreeMap<String, String>,
}
