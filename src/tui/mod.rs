pub mod action;
pub mod app;
pub mod navigator;
pub mod view;
pub mod zoom_menu;

pub use action::{Action, Message, NavCommand, RequestId};
pub use app::{App, Pane, RequestTracker};
pub use navigator::{NavOutcome, TreeNavigator};
pub use zoom_menu::ZoomMenu;
