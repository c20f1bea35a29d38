use crate::config::{Config, Mode, OverviewMode};
use crate::core::buckets::{BucketLayout, BucketedSeries, LABEL_WIDTH};
use crate::core::filter::FilterTree;
use crate::core::types::{LogRow, TimeRange};
use crate::services::backend::QueryBackend;
use crate::services::overview::fetch_overview;
use crate::services::window_planner::{QueryScope, SortOrder, WindowPlanner, WindowedRows};
use crate::tui::action::{Action, Message, NavCommand, RequestId};
use crate::tui::navigator::{NavOutcome, TreeNavigator};
use crate::tui::view;
use crate::tui::zoom_menu::{ZoomMenu, ZoomOutcome};
use color_eyre::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::Backend;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// Which fetch a `RequestId` was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Rows,
    Overview,
}

/// Monotonic per-kind request ids; only the newest id of a kind is applied
#[derive(Debug, Default)]
pub struct RequestTracker {
    rows: u64,
    overview: u64,
}

impl RequestTracker {
    fn counter(&mut self, kind: FetchKind) -> &mut u64 {
        match kind {
            FetchKind::Rows => &mut self.rows,
            FetchKind::Overview => &mut self.overview,
        }
    }

    pub fn issue(&mut self, kind: FetchKind) -> RequestId {
        let counter = self.counter(kind);
        *counter += 1;
        RequestId(*counter)
    }

    pub fn is_current(&self, kind: FetchKind, id: RequestId) -> bool {
        let latest = match kind {
            FetchKind::Rows => self.rows,
            FetchKind::Overview => self.overview,
        };
        id.0 == latest
    }
}

/// Pane that receives key input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Filter,
    Logs,
    Overview,
}

/// Application state
///
/// Owns the filter, the query scope and the last results. Fetches run on the
/// blocking pool and report back through `Message`s on the app channel.
pub struct App {
    config: Config,
    backend: Arc<dyn QueryBackend>,
    planner: Arc<WindowPlanner>,
    scope: QueryScope,
    navigator: TreeNavigator,
    zoom_menu: ZoomMenu,
    order: SortOrder,
    pane: Pane,

    /// Last successfully fetched window
    rows: Option<WindowedRows>,
    selected_row: usize,
    /// Index into the selected row's drill-in fields
    selected_field: usize,

    /// Advisory line shown in the status bar
    status: Option<String>,
    pending_rows: bool,
    render_width: usize,
    ticks: u64,

    requests: RequestTracker,
    tx: UnboundedSender<Message>,
    should_quit: bool,
}

impl App {
    pub fn new(
        config: Config,
        backend: Arc<dyn QueryBackend>,
        range: TimeRange,
        tx: UnboundedSender<Message>,
    ) -> Self {
        let planner = Arc::new(WindowPlanner::new(config.source.clone()));
        let scope = QueryScope::new(range, config.source.page_size);
        let order = config.source.order;
        Self {
            config,
            backend,
            planner,
            scope,
            navigator: TreeNavigator::default(),
            zoom_menu: ZoomMenu::default(),
            order,
            pane: Pane::Logs,
            rows: None,
            selected_row: 0,
            selected_field: 0,
            status: None,
            pending_rows: false,
            render_width: 80,
            ticks: 0,
            requests: RequestTracker::default(),
            tx,
            should_quit: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scope(&self) -> &QueryScope {
        &self.scope
    }

    pub fn navigator(&self) -> &TreeNavigator {
        &self.navigator
    }

    pub fn zoom_menu(&self) -> &ZoomMenu {
        &self.zoom_menu
    }

    pub fn rows(&self) -> Option<&WindowedRows> {
        self.rows.as_ref()
    }

    pub fn selected_row(&self) -> usize {
        self.selected_row
    }

    pub fn selected_field(&self) -> usize {
        self.selected_field
    }

    pub fn pane(&self) -> Pane {
        self.pane
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_rows
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn render_width(&self) -> usize {
        self.render_width
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Key-binding mode for the focused pane
    pub fn mode(&self) -> Mode {
        match self.pane {
            Pane::Filter => self.navigator.mode(),
            Pane::Logs => Mode::Logs,
            Pane::Overview => Mode::Overview,
        }
    }

    /// Drive the terminal until the user quits
    pub async fn run<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        rx: &mut UnboundedReceiver<Message>,
    ) -> Result<()> {
        let mut events = EventStream::new();
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        let size = terminal.size()?;
        self.resize(size.width);
        self.refresh();

        loop {
            terminal.draw(|frame| view::draw(frame, self))?;

            tokio::select! {
                _ = ticker.tick() => self.update(Message::Tick)?,
                Some(message) = rx.recv() => self.update(message)?,
                maybe_event = events.next() => match maybe_event {
                    Some(Ok(Event::Key(key))) => self.handle_key(key)?,
                    Some(Ok(Event::Resize(w, h))) => self.update(Message::Resize(w, h))?,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                },
            }

            if self.should_quit {
                break;
            }
        }
        Ok(())
    }

    /// Translate a key press into an action for the focused pane
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }
        let mode = self.mode();
        if let Some(action) = self.config.action_for_key(mode, key) {
            debug!(?mode, ?action, "key bound");
            return self.update(Message::Action(action));
        }
        if mode == Mode::Edit {
            if let KeyCode::Char(c) = key.code {
                if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
                    self.on_filter_command(NavCommand::Input(c));
                }
            }
        }
        Ok(())
    }

    pub fn update(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Tick => self.ticks = self.ticks.wrapping_add(1),
            Message::Resize(width, _) => {
                if self.resize(width) && self.config.source.overview == OverviewMode::Backend {
                    self.fetch_overview();
                }
            }
            Message::Quit => self.should_quit = true,
            Message::Action(action) => self.handle_action(action)?,
            Message::RowsLoaded { id, result } => {
                if !self.requests.is_current(FetchKind::Rows, id) {
                    debug!(%id, "dropping stale rows");
                    return Ok(());
                }
                self.pending_rows = false;
                match result {
                    Ok(rows) => self.apply_rows(rows),
                    Err(e) => {
                        error!("row fetch failed: {e}");
                        self.status = Some(format!("Fetch failed: {e}"));
                    }
                }
            }
            Message::OverviewLoaded { id, result } => {
                if !self.requests.is_current(FetchKind::Overview, id) {
                    debug!(%id, "dropping stale overview");
                    return Ok(());
                }
                match result {
                    Ok(series) => self.apply_series(series),
                    Err(e) => {
                        warn!("overview fetch failed: {e}");
                        self.status = Some(format!("Overview unavailable: {e}"));
                    }
                }
            }
        }
        Ok(())
    }

    fn resize(&mut self, width: u16) -> bool {
        let render_width = (width as usize).saturating_sub(LABEL_WIDTH + 2);
        let changed = render_width != self.render_width;
        self.render_width = render_width;
        changed
    }

    pub fn handle_action(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Quit => self.should_quit = true,
            Action::Refresh => self.refresh(),
            Action::FocusFilter => self.pane = Pane::Filter,
            Action::FocusLogs => self.pane = Pane::Logs,
            Action::FocusOverview => self.pane = Pane::Overview,
            Action::SaveFilter => self.save_filter(),
            Action::LoadFilter => self.load_filter(),
            other => match self.pane {
                Pane::Filter => {
                    if let Some(command) = other.nav_command() {
                        self.on_filter_command(command);
                    }
                }
                Pane::Logs => self.on_logs_action(other),
                Pane::Overview => {
                    if let Some(command) = other.nav_command() {
                        self.on_overview_command(command);
                    }
                }
            },
        }
        Ok(())
    }

    fn on_filter_command(&mut self, command: NavCommand) {
        match self.navigator.handle(command) {
            NavOutcome::Applied(predicate) => {
                info!(sql = %predicate.sql, args = predicate.args.len(), "filter applied");
                self.scope.apply_predicate(predicate);
                self.status = None;
                self.refresh();
            }
            NavOutcome::Rejected(err) => self.status = Some(err.to_string()),
            NavOutcome::Dismissed => self.pane = Pane::Logs,
            NavOutcome::Changed => self.status = None,
            NavOutcome::Idle => {}
        }
    }

    fn on_logs_action(&mut self, action: Action) {
        let row_count = self.rows.as_ref().map_or(0, |r| r.rows.len());
        match action {
            Action::MoveNext => {
                self.selected_row = (self.selected_row + 1).min(row_count.saturating_sub(1));
                self.selected_field = 0;
            }
            Action::MovePrevious => {
                self.selected_row = self.selected_row.saturating_sub(1);
                self.selected_field = 0;
            }
            Action::MoveInto => {
                let fields = self.selected_fields().len();
                if fields > 0 {
                    self.selected_field = (self.selected_field + 1) % fields;
                }
            }
            Action::MoveOut => {
                let fields = self.selected_fields().len();
                if fields > 0 {
                    self.selected_field = (self.selected_field + fields - 1) % fields;
                }
            }
            Action::NextPage => {
                if self.rows.as_ref().is_some_and(|r| !r.is_last_page()) {
                    self.scope.next_page();
                    self.fetch_rows();
                }
            }
            Action::PreviousPage => {
                if self.scope.previous_page() {
                    self.fetch_rows();
                }
            }
            Action::ToggleOrder => {
                self.order = self.order.toggle();
                self.scope.reset_window();
                self.fetch_rows();
            }
            Action::DrillIn => self.drill_in(),
            _ => {}
        }
    }

    fn on_overview_command(&mut self, command: NavCommand) {
        let layout = self.scope.series().map(|s| *s.layout());
        let can_zoom_out = self.scope.zoom().can_zoom_out();
        let outcome = self.zoom_menu.handle(command, layout.as_ref(), can_zoom_out);
        let zoomed = match outcome {
            ZoomOutcome::ZoomIn(range) => {
                self.scope.zoom_in(range);
                true
            }
            ZoomOutcome::ZoomOut => self.scope.zoom_out(),
            ZoomOutcome::Reset => self.scope.zoom_reset(),
            ZoomOutcome::Idle => {
                if command == NavCommand::Cancel && !self.zoom_menu.is_open() {
                    self.pane = Pane::Logs;
                }
                false
            }
            ZoomOutcome::Changed => false,
        };
        if zoomed {
            info!(range = %self.scope.range(), depth = self.scope.zoom().depth(), "zoom changed");
            self.refresh();
        }
    }

    /// `(field, value)` pairs of the selected row that can become conditions
    pub fn selected_fields(&self) -> Vec<(String, String)> {
        let Some(row) = self.current_row() else {
            return Vec::new();
        };
        std::iter::once((self.config.source.level_column.clone(), row.level.clone()))
            .chain(row.attributes.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    pub fn current_row(&self) -> Option<&LogRow> {
        self.rows.as_ref()?.rows.get(self.selected_row)
    }

    fn drill_in(&mut self) {
        let fields = self.selected_fields();
        let Some((field, value)) = fields.get(self.selected_field) else {
            return;
        };
        self.navigator.drill_in(field, value);
        if let NavOutcome::Applied(predicate) = self.navigator.apply() {
            info!(%field, %value, "drill-in applied");
            self.scope.apply_predicate(predicate);
            self.refresh();
        }
    }

    /// Apply a `field:value` shortcut such as a level chip
    pub fn apply_category(&mut self, category: &str) {
        if self.navigator.apply_category(category) == NavOutcome::Changed {
            if let NavOutcome::Applied(predicate) = self.navigator.apply() {
                self.scope.apply_predicate(predicate);
                self.refresh();
            }
        }
    }

    fn save_filter(&mut self) {
        let path = self.config.filter_file();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        self.status = Some(match self.navigator.tree().save_to_file(&path) {
            Ok(()) => format!("Filter saved to {}", path.display()),
            Err(e) => {
                warn!("saving filter failed: {e}");
                e.to_string()
            }
        });
    }

    fn load_filter(&mut self) {
        let path = self.config.filter_file();
        match FilterTree::load_from_file(&path) {
            Ok(tree) => {
                self.navigator.replace_tree(tree);
                self.pane = Pane::Filter;
                self.status = Some(format!("Filter loaded from {}; apply to run", path.display()));
            }
            Err(e) => {
                warn!("loading filter failed: {e}");
                self.status = Some(e.to_string());
            }
        }
    }

    fn apply_rows(&mut self, rows: WindowedRows) {
        self.selected_row = self.selected_row.min(rows.rows.len().saturating_sub(1));
        self.selected_field = 0;
        if self.config.source.overview == OverviewMode::Client {
            let layout = BucketLayout::new(&self.scope.range(), self.render_width);
            self.apply_series(BucketedSeries::from_rows(layout, rows.rows.iter()));
        }
        self.rows = Some(rows);
    }

    fn apply_series(&mut self, series: BucketedSeries) {
        self.zoom_menu.clamp_cursor(series.layout().count());
        self.scope.set_series(series);
    }

    /// Re-issue the row fetch and, in backend mode, the overview aggregate
    pub fn refresh(&mut self) {
        self.fetch_rows();
        if self.config.source.overview == OverviewMode::Backend {
            self.fetch_overview();
        }
    }

    fn fetch_rows(&mut self) {
        let id = self.requests.issue(FetchKind::Rows);
        let request = self.scope.plan(&self.planner, self.order);
        let backend = Arc::clone(&self.backend);
        let planner = Arc::clone(&self.planner);
        let tx = self.tx.clone();
        self.pending_rows = true;
        debug!(%id, offset = request.window.offset, "fetching rows");
        tokio::task::spawn_blocking(move || {
            let result = planner.run(backend.as_ref(), &request).map_err(Arc::new);
            let _ = tx.send(Message::RowsLoaded { id, result });
        });
    }

    fn fetch_overview(&mut self) {
        let id = self.requests.issue(FetchKind::Overview);
        let range = self.scope.range();
        let predicate = self.scope.predicate().clone();
        let width = self.render_width;
        let backend = Arc::clone(&self.backend);
        let planner = Arc::clone(&self.planner);
        let tx = self.tx.clone();
        debug!(%id, width, "fetching overview");
        tokio::task::spawn_blocking(move || {
            let result = fetch_overview(backend.as_ref(), &planner, &range, &predicate, width)
                .map_err(Arc::new);
            let _ = tx.send(Message::OverviewLoaded { id, result });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_latest_request_is_current() {
        let mut tracker = RequestTracker::default();
        let first = tracker.issue(FetchKind::Rows);
        let second = tracker.issue(FetchKind::Rows);
        let overview = tracker.issue(FetchKind::Overview);
        assert!(!tracker.is_current(FetchKind::Rows, first));
        assert!(tracker.is_current(FetchKind::Rows, second));
        assert!(tracker.is_current(FetchKind::Overview, overview));
        assert_eq!(overview, RequestId(1));
    }
}
