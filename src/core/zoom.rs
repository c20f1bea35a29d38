use crate::core::types::TimeRange;
use std::collections::VecDeque;

pub const DEFAULT_ZOOM_CAPACITY: usize = 32;

/// Bounded history of time ranges for drill-down and restore
///
/// `original` is captured on the first drill-down and survives the history
/// dropping its oldest entries, so `reset` always returns to where zooming began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoomStack {
    current: TimeRange,
    history: VecDeque<TimeRange>,
    original: Option<TimeRange>,
    capacity: usize,
}

impl ZoomStack {
    pub fn new(current: TimeRange) -> Self {
        Self::with_capacity(current, DEFAULT_ZOOM_CAPACITY)
    }

    pub fn with_capacity(current: TimeRange, capacity: usize) -> Self {
        Self {
            current,
            history: VecDeque::new(),
            original: None,
            capacity: capacity.max(1),
        }
    }

    pub fn current(&self) -> TimeRange {
        self.current
    }

    pub fn original(&self) -> Option<TimeRange> {
        self.original
    }

    pub fn depth(&self) -> usize {
        self.history.len()
    }

    pub fn can_zoom_out(&self) -> bool {
        !self.history.is_empty()
    }

    /// Remember the current range and narrow to `range`
    pub fn push_and_narrow(&mut self, range: TimeRange) {
        if self.history.is_empty() && self.original.is_none() {
            self.original = Some(self.current);
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(self.current);
        self.current = range;
    }

    /// Restore the most recently pushed range; `false` when there is nothing to pop
    pub fn pop_and_restore(&mut self) -> bool {
        match self.history.pop_back() {
            Some(previous) => {
                // a full history may have dropped the ranges between `original` and `previous`
                self.current = if self.history.is_empty() {
                    self.original.take().unwrap_or(previous)
                } else {
                    previous
                };
                true
            }
            None => false,
        }
    }

    /// Jump back to the original range and clear the history
    pub fn reset(&mut self) -> bool {
        match self.original.take() {
            Some(original) => {
                self.current = original;
                self.history.clear();
                true
            }
            None => false,
        }
    }

    /// Forget all history and adopt `range` as the new base
    pub fn rebase(&mut self, range: TimeRange) {
        self.current = range;
        self.history.clear();
        self.original = None;
    }
}
