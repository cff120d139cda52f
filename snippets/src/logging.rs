use anyhow::Result;
use chrono::Local;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with file-based logging.
/// Logs are written to ~/.config/snippets/logs/snippets-YYYY-MM-DD-HH-MM-SS.log
///
/// The returned guard flushes pending lines when dropped; hold it until exit.
pub fn init_logging() -> Result<(PathBuf, WorkerGuard)> {
    let logs_dir = dirs::config_dir()
        .ok_or(anyhow::anyhow!("Could not find config directory"))?
        .join("snippets")
        .join("logs");
    std::fs::create_dir_all(&logs_dir)?;

    let timestamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
    let log_filename = format!("snippets-{}.log", timestamp);
    let log_path = logs_dir.join(&log_filename);

    let file_appender = tracing_appender::rolling::never(&logs_dir, &log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    // Default to INFO, can be overridden with RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    Ok((log_path, guard))
}
