pub mod config;
pub mod core;
pub mod logging;
pub mod services;
pub mod tui;

pub use core::{FilterTree, Predicate, TimeRange};
pub use services::{QueryBackend, SqliteBackend, WindowPlanner};
pub use tui::App;
