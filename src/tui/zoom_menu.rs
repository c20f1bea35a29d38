use crate::core::buckets::BucketLayout;
use crate::core::types::TimeRange;
use crate::tui::action::NavCommand;
use strum::{Display, EnumIter, IntoEnumIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum ZoomItem {
    #[strum(serialize = "Zoom in")]
    ZoomIn,
    #[strum(serialize = "Zoom out")]
    ZoomOut,
    #[strum(serialize = "Reset zoom")]
    Reset,
    Cancel,
}

impl ZoomItem {
    /// Zoom out and reset need history to act on
    pub fn is_available(self, can_zoom_out: bool) -> bool {
        match self {
            ZoomItem::ZoomOut | ZoomItem::Reset => can_zoom_out,
            ZoomItem::ZoomIn | ZoomItem::Cancel => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomMenuState {
    /// Moving a cursor over the buckets
    Idle { cursor: usize },
    /// Action menu open for the bucket under `cursor`
    Menu { cursor: usize, selected: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomOutcome {
    Idle,
    Changed,
    ZoomIn(TimeRange),
    ZoomOut,
    Reset,
}

#[derive(Debug, Clone)]
pub struct ZoomMenu {
    state: ZoomMenuState,
}

impl Default for ZoomMenu {
    fn default() -> Self {
        Self { state: ZoomMenuState::Idle { cursor: 0 } }
    }
}

impl ZoomMenu {
    pub fn state(&self) -> ZoomMenuState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        match self.state {
            ZoomMenuState::Idle { cursor } | ZoomMenuState::Menu { cursor, .. } => cursor,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ZoomMenuState::Menu { .. })
    }

    /// Keep the cursor on a bucket after the series changes size
    pub fn clamp_cursor(&mut self, bucket_count: usize) {
        let last = bucket_count.saturating_sub(1);
        match &mut self.state {
            ZoomMenuState::Idle { cursor } | ZoomMenuState::Menu { cursor, .. } => {
                *cursor = (*cursor).min(last);
            }
        }
    }

    pub fn handle(
        &mut self,
        command: NavCommand,
        layout: Option<&BucketLayout>,
        can_zoom_out: bool,
    ) -> ZoomOutcome {
        let items: Vec<ZoomItem> = ZoomItem::iter().collect();
        match self.state {
            ZoomMenuState::Idle { cursor } => {
                let Some(layout) = layout else {
                    return ZoomOutcome::Idle;
                };
                let last = layout.count().saturating_sub(1);
                let moved = match command {
                    NavCommand::MovePrevious | NavCommand::MoveOut => cursor.saturating_sub(1),
                    NavCommand::MoveNext | NavCommand::MoveInto => (cursor + 1).min(last),
                    NavCommand::Activate => {
                        self.state = ZoomMenuState::Menu { cursor, selected: 0 };
                        return ZoomOutcome::Changed;
                    }
                    _ => return ZoomOutcome::Idle,
                };
                if moved == cursor {
                    return ZoomOutcome::Idle;
                }
                self.state = ZoomMenuState::Idle { cursor: moved };
                ZoomOutcome::Changed
            }
            ZoomMenuState::Menu { cursor, selected } => match command {
                NavCommand::MoveNext | NavCommand::MoveInto => {
                    let selected = (selected + 1) % items.len();
                    self.state = ZoomMenuState::Menu { cursor, selected };
                    ZoomOutcome::Changed
                }
                NavCommand::MovePrevious | NavCommand::MoveOut => {
                    let selected = (selected + items.len() - 1) % items.len();
                    self.state = ZoomMenuState::Menu { cursor, selected };
                    ZoomOutcome::Changed
                }
                NavCommand::Cancel => {
                    self.state = ZoomMenuState::Idle { cursor };
                    ZoomOutcome::Changed
                }
                NavCommand::Activate => {
                    let item = items[selected];
                    if !item.is_available(can_zoom_out) {
                        return ZoomOutcome::Idle;
                    }
                    let outcome = match item {
                        ZoomItem::ZoomIn => match layout {
                            Some(layout) if layout.bucket_in_range(cursor) => {
                                ZoomOutcome::ZoomIn(layout.bucket_range(cursor))
                            }
                            _ => return ZoomOutcome::Idle,
                        },
                        ZoomItem::ZoomOut => ZoomOutcome::ZoomOut,
                        ZoomItem::Reset => ZoomOutcome::Reset,
                        ZoomItem::Cancel => {
                            self.state = ZoomMenuState::Idle { cursor };
                            return ZoomOutcome::Changed;
                        }
                    };
                    if outcome != ZoomOutcome::Idle {
                        self.state = ZoomMenuState::Idle { cursor: 0 };
                    }
                    outcome
                }
                _ => ZoomOutcome::Idle,
            },
        }
    }
}
