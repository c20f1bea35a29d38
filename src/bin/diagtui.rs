use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, ValueEnum};
use color_eyre::Result;
use color_eyre::config::HookBuilder;
use crossterm::cursor::Show;
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use diagtui::config::Config;
use diagtui::core::TimeRange;
use diagtui::services::{QueryBackend, SqliteBackend};
use diagtui::tui::App;
use lazy_static::lazy_static;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Explore diagnostic rows with boolean filters and zoomable level timelines
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable file logging at the given level (overrides RUST_LOG)
    #[arg(long = "logging", value_enum)]
    logging: Option<LogLevel>,
    /// Path to a config file (overrides default config discovery)
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
    /// SQLite database holding the rows
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
    /// Table to query
    #[arg(long, value_name = "NAME")]
    table: Option<String>,
    /// Look back this far from now, e.g. 15m, 2h, 1d
    #[arg(long, value_name = "DURATION", default_value = "1h", value_parser = parse_since)]
    since: Duration,
    /// Range start (RFC 3339); needs --to
    #[arg(long, value_parser = parse_timestamp, requires = "to")]
    from: Option<DateTime<Utc>>,
    /// Range end (RFC 3339); needs --from
    #[arg(long, value_parser = parse_timestamp, requires = "from")]
    to: Option<DateTime<Utc>>,
    /// Start with a `field:value` condition; repeatable
    #[arg(long = "category", value_name = "FIELD:VALUE")]
    categories: Vec<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

lazy_static! {
    static ref SINCE: Regex = Regex::new(r"^\s*(\d+)\s*([smhdw])\s*$").expect("valid duration regex");
}

fn parse_since(raw: &str) -> Result<Duration, String> {
    let caps = SINCE
        .captures(raw)
        .ok_or_else(|| format!("`{raw}` is not a duration like 15m, 2h or 1d"))?;
    let amount: i64 = caps[1].parse().map_err(|e| format!("`{raw}`: {e}"))?;
    let seconds = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => 604_800,
    };
    amount
        .checked_mul(seconds)
        .and_then(Duration::try_seconds)
        .filter(|d| *d > Duration::zero())
        .ok_or_else(|| format!("`{raw}` is out of range"))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("`{raw}`: {e}"))
}

fn restore_terminal() -> io::Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, Show)
}

fn install_hooks() -> Result<()> {
    let (panic_hook, eyre_hook) = HookBuilder::default().into_hooks();
    eyre_hook.install()?;
    let panic_hook = panic_hook.into_panic_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = restore_terminal();
        panic_hook(info);
    }));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    install_hooks()?;
    let args = Args::parse();

    let log_path = std::env::current_dir()?.join(diagtui::logging::LOG_FILE.as_str());
    diagtui::logging::init_with(Some(log_path), args.logging.map(Into::into))?;

    let mut config = Config::from_path(args.config.as_ref())?;
    if let Some(database) = args.database {
        config.source.database = Some(database);
    }
    if let Some(table) = args.table {
        config.source.table = table;
    }

    let backend: Arc<dyn QueryBackend> = Arc::new(match &config.source.database {
        Some(path) => SqliteBackend::open(path)?,
        None => SqliteBackend::open_in_memory()?,
    });
    let range = match (args.from, args.to) {
        (Some(from), Some(to)) => TimeRange::new(from, to),
        _ => TimeRange::ending_now(args.since),
    };
    info!(%range, table = %config.source.table, "starting");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut app = App::new(config, backend, range, tx);
    for category in &args.categories {
        app.apply_category(category);
    }

    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;

    let result = app.run(&mut terminal, &mut rx).await;
    restore_terminal()?;
    if let Err(e) = &result {
        error!("Error: {e}");
    }
    result
}
