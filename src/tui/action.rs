use crate::core::buckets::BucketedSeries;
use crate::services::window_planner::{FetchError, WindowedRows};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Everything a key can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Action {
    // Application
    Quit,
    Refresh,
    FocusFilter,
    FocusLogs,
    FocusOverview,
    SaveFilter,
    LoadFilter,

    // Filter tree and its sub-modes
    MoveNext,
    MovePrevious,
    MoveInto,
    MoveOut,
    Activate,
    Delete,
    CycleLogic,
    Apply,
    Cancel,
    Erase,

    // Log window
    NextPage,
    PreviousPage,
    DrillIn,
    ToggleOrder,
}

impl Action {
    pub fn description(&self) -> &'static str {
        match self {
            Action::Quit => "Quit",
            Action::Refresh => "Refresh",
            Action::FocusFilter => "Filter",
            Action::FocusLogs => "Logs",
            Action::FocusOverview => "Overview",
            Action::SaveFilter => "Save filter",
            Action::LoadFilter => "Load filter",
            Action::MoveNext => "Next",
            Action::MovePrevious => "Previous",
            Action::MoveInto => "Into",
            Action::MoveOut => "Out",
            Action::Activate => "Select",
            Action::Delete => "Delete",
            Action::CycleLogic => "Cycle logic",
            Action::Apply => "Apply",
            Action::Cancel => "Cancel",
            Action::Erase => "Erase",
            Action::NextPage => "Next page",
            Action::PreviousPage => "Previous page",
            Action::DrillIn => "Filter on row",
            Action::ToggleOrder => "Sort order",
        }
    }

    /// Navigator command for this action, if it has one
    pub fn nav_command(self) -> Option<NavCommand> {
        Some(match self {
            Action::MoveNext => NavCommand::MoveNext,
            Action::MovePrevious => NavCommand::MovePrevious,
            Action::MoveInto => NavCommand::MoveInto,
            Action::MoveOut => NavCommand::MoveOut,
            Action::Activate => NavCommand::Activate,
            Action::Delete => NavCommand::Delete,
            Action::CycleLogic => NavCommand::CycleLogic,
            Action::Apply => NavCommand::Apply,
            Action::Cancel => NavCommand::Cancel,
            Action::Erase => NavCommand::Erase,
            _ => return None,
        })
    }
}

/// Device-independent input to the filter tree navigator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    MoveNext,
    MovePrevious,
    MoveInto,
    MoveOut,
    Activate,
    Delete,
    CycleLogic,
    Apply,
    Cancel,
    Input(char),
    Erase,
}

/// Identifies one issued fetch; only the latest per kind is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Messages delivered into the event loop
#[derive(Debug, Clone)]
pub enum Message {
    Tick,
    Resize(u16, u16),
    Quit,
    Action(Action),
    RowsLoaded {
        id: RequestId,
        result: Result<WindowedRows, Arc<FetchError>>,
    },
    OverviewLoaded {
        id: RequestId,
        result: Result<BucketedSeries, Arc<FetchError>>,
    },
}
