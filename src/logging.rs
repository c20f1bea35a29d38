use color_eyre::Result;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_error::ErrorLayer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

lazy_static::lazy_static! {
    pub static ref LOG_FILE: String = format!("{}.log", env!("CARGO_PKG_NAME"));
}

/// Initialize file logging; the terminal belongs to the UI so nothing is written to stderr
pub fn init_with(custom_log_path: Option<PathBuf>, level: Option<tracing::Level>) -> Result<()> {
    let log_path = match custom_log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            path
        }
        None => std::env::current_dir()?.join(LOG_FILE.as_str()),
    };

    // An explicit level wins over RUST_LOG
    let env_filter = match level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy(),
    };

    let file: Arc<File> = Arc::new(OpenOptions::new().create(true).append(true).open(&log_path)?);
    let file_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_writer(file)
        .with_target(false)
        .with_ansi(false)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(ErrorLayer::default())
        .try_init()?;

    Ok(())
}
