//! Plain text rendering of the app state.
use crate::config::Mode;
use crate::core::buckets::label_prefix;
use crate::core::filter::FilterNode;
use crate::core::level::Level;
use crate::tui::action::Action;
use crate::tui::app::{App, Pane};
use crate::tui::navigator::{EditField, Focus, GroupSlot, NavigatorState};
use crate::tui::zoom_menu::{ZoomItem, ZoomMenuState};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};
use strum::IntoEnumIterator;

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

fn focused() -> Style {
    Style::default().add_modifier(Modifier::REVERSED)
}

fn pane_block(title: String, active: bool) -> Block<'static> {
    let block = Block::bordered().title(title);
    if active {
        block.border_style(Style::default().add_modifier(Modifier::BOLD))
    } else {
        block
    }
}

pub fn draw(frame: &mut Frame, app: &App) {
    let overview_height = Level::iter().count() as u16 + 4;
    let [overview_area, body, status_area] = Layout::vertical([
        Constraint::Length(overview_height),
        Constraint::Min(5),
        Constraint::Length(1),
    ])
    .areas(frame.area());
    let [filter_area, logs_area] =
        Layout::horizontal([Constraint::Percentage(35), Constraint::Percentage(65)]).areas(body);

    draw_overview(frame, overview_area, app);
    draw_filter(frame, filter_area, app);
    draw_logs(frame, logs_area, app);
    draw_status(frame, status_area, app);
}

fn draw_overview(frame: &mut Frame, area: Rect, app: &App) {
    let scope = app.scope();
    let title = format!(" Overview {} (zoom {}) ", scope.range(), scope.zoom().depth());
    let block = pane_block(title, app.pane() == Pane::Overview);

    let Some(series) = scope.series() else {
        frame.render_widget(Paragraph::new("loading…").block(block), area);
        return;
    };

    let mut lines: Vec<Line> = series.overview_lines().into_iter().map(Line::from).collect();
    let menu = app.zoom_menu();
    let cursor = menu.cursor();
    let label = series.labels().get(cursor).cloned().unwrap_or_default();
    lines.push(Line::from(format!("{}{}^ {label}", label_prefix(""), " ".repeat(cursor))));

    if let ZoomMenuState::Menu { selected, .. } = menu.state() {
        let can_zoom_out = scope.zoom().can_zoom_out();
        let items: Vec<Span> = ZoomItem::iter()
            .enumerate()
            .flat_map(|(i, item)| {
                let mut style = Style::default();
                if !item.is_available(can_zoom_out) {
                    style = style.add_modifier(Modifier::DIM);
                }
                if i == selected {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                [Span::styled(format!("[{item}]"), style), Span::raw(" ")]
            })
            .collect();
        lines.push(Line::from(items));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_filter(frame: &mut Frame, area: Rect, app: &App) {
    let navigator = app.navigator();
    let dirty = if navigator.is_dirty() { " *" } else { "" };
    let block = pane_block(format!(" Filter{dirty} "), app.pane() == Pane::Filter);
    let focus = navigator.focus();

    let mut lines = Vec::new();
    for line in navigator.tree().lines() {
        let indent = Span::raw("  ".repeat(line.depth));
        let slot_style = |slot: GroupSlot| match focus {
            Focus::Node { path, slot: s } if *path == line.path && *s == slot => focused(),
            _ => Style::default(),
        };
        let spans = match navigator.tree().get(&line.path) {
            Some(FilterNode::Group { .. }) => vec![
                indent,
                Span::styled(format!("[{}]", line.label), slot_style(GroupSlot::Logic)),
                Span::raw(" "),
                Span::styled("[+cond]", slot_style(GroupSlot::AddCondition)),
                Span::raw(" "),
                Span::styled("[+group]", slot_style(GroupSlot::AddGroup)),
            ],
            _ => {
                let style = match focus.path() {
                    Some(path) if path == line.path.as_slice() => focused(),
                    _ => Style::default(),
                };
                vec![indent, Span::styled(line.label, style)]
            }
        };
        lines.push(Line::from(spans));
    }
    let apply_style = if *focus == Focus::Apply { focused() } else { Style::default() };
    lines.push(Line::from(Span::styled("[ Apply ]", apply_style)));

    match navigator.state() {
        NavigatorState::Tree => {}
        NavigatorState::Edit(form) => {
            let field_line = |name: &str, text: String, field: EditField| {
                let style = if form.focus == field { focused() } else { Style::default() };
                Line::from(vec![Span::raw(format!("{name:>6}: ")), Span::styled(text, style)])
            };
            let operator = form.operator.map(|op| op.to_string()).unwrap_or_else(|| "<op>".into());
            lines.push(Line::from(""));
            lines.push(field_line("field", form.field.clone(), EditField::Field));
            lines.push(field_line("op", operator, EditField::Operator));
            lines.push(field_line("value", form.value.clone(), EditField::Value));
        }
        NavigatorState::LogicSelect { logic, .. } => {
            lines.push(Line::from(""));
            lines.push(Line::from(vec![
                Span::raw(" logic: "),
                Span::styled(format!("< {logic} >"), focused()),
            ]));
        }
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_logs(frame: &mut Frame, area: Rect, app: &App) {
    let window = app.scope().window();
    let shown = app.rows().map_or(0, |r| r.rows.len());
    let title = format!(
        " Logs {}-{} {} ",
        window.offset,
        window.offset + shown,
        app.order()
    );
    let mut block = pane_block(title, app.pane() == Pane::Logs);
    let fields = app.selected_fields();
    if let Some((field, value)) = fields.get(app.selected_field()) {
        block = block.title_bottom(format!(" {field} = {value} "));
    }

    let height = area.height.saturating_sub(2) as usize;
    let selected = app.selected_row();
    let skip = selected.saturating_sub(height.saturating_sub(1));
    let lines: Vec<Line> = app
        .rows()
        .map(|rows| {
            rows.rows
                .iter()
                .enumerate()
                .skip(skip)
                .take(height)
                .map(|(i, row)| {
                    let text = format!(
                        "{} {:<7} {}",
                        row.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        row.canonical_level,
                        row.message
                    );
                    if i == selected && app.pane() == Pane::Logs {
                        Line::styled(text, focused())
                    } else {
                        Line::from(text)
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_status(frame: &mut Frame, area: Rect, app: &App) {
    let spinner = if app.is_loading() {
        SPINNER[(app.ticks() % SPINNER.len() as u64) as usize]
    } else {
        ' '
    };
    let text = match app.status() {
        Some(status) => status.to_string(),
        None => {
            let mode = app.mode();
            app.config().instructions(mode, hints_for(mode))
        }
    };
    frame.render_widget(Paragraph::new(format!("{spinner} {text}")), area);
}

fn hints_for(mode: Mode) -> &'static [Action] {
    match mode {
        Mode::Tree => &[Action::Activate, Action::Delete, Action::CycleLogic, Action::Apply],
        Mode::Edit => &[Action::MoveNext, Action::MoveInto, Action::Activate, Action::Cancel],
        Mode::LogicSelect => &[Action::MoveNext, Action::Activate, Action::Cancel],
        Mode::Logs => &[Action::NextPage, Action::PreviousPage, Action::DrillIn, Action::ToggleOrder],
        Mode::Overview => &[Action::MoveNext, Action::Activate, Action::Cancel],
        Mode::Global => &[Action::FocusFilter, Action::Quit],
    }
}
