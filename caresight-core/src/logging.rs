use std::ffi::OsStr;
use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from the configured
/// level. `format = "json"` emits machine-readable lines for log shipping;
/// anything else renders human-readable output for development. When
/// `file_path` is set, output goes to that file through a non-blocking
/// appender instead of stdout; the returned guard flushes buffered lines on
/// drop and must be held for the life of the process.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let log_level = parse_log_level(&config.level)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.format.as_str() == "json" {
        let layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_line_number(true)
            .with_file(true);

        match &config.file_path {
            Some(path) => {
                let (writer, guard) = non_blocking_file(path)?;
                registry.with(layer.with_writer(writer)).init();
                Ok(Some(guard))
            }
            None => {
                registry.with(layer).init();
                Ok(None)
            }
        }
    } else {
        let layer = fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_line_number(true)
            .with_file(false);

        match &config.file_path {
            Some(path) => {
                let (writer, guard) = non_blocking_file(path)?;
                registry
                    .with(layer.with_ansi(false).with_writer(writer))
                    .init();
                Ok(Some(guard))
            }
            None => {
                registry.with(layer).init();
                Ok(None)
            }
        }
    }
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}

/// Split a log file path into the directory and file name the appender wants.
fn split_log_path(path: &str) -> anyhow::Result<(&Path, &OsStr)> {
    let path = Path::new(path);
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Log file path has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, name))
}

fn non_blocking_file(path: &str) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let (dir, name) = split_log_path(path)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy().into_owned())
        .build(dir)
        .map_err(|e| anyhow::anyhow!("Failed to open log file {path}: {e}"))?;
    Ok(tracing_appender::non_blocking(appender))
}
