pub mod backend;
pub mod overview;
pub mod window_planner;

pub use backend::{BackendError, CellValue, QueryBackend, QueryResult, SqliteBackend};
pub use overview::fetch_overview;
pub use window_planner::{FetchError, FetchRequest, QueryScope, SortOrder, WindowPlanner, WindowedRows};
