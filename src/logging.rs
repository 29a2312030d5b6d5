//! File logging for the binary

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable overriding the log filter
pub const LOG_FILTER_ENV: &str = "RELEASE_TRACKER_LOG";

pub const DEFAULT_LOG_FILTER: &str = "info";

/// Filter directive from the environment, falling back to [`DEFAULT_LOG_FILTER`]
pub fn resolve_filter(env_value: Option<String>) -> String {
    env_value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

/// Install a subscriber appending to `log_path`.
///
/// The returned guard flushes pending lines when dropped and must outlive
/// every request.
pub fn init(log_path: &Path, filter: &str) -> anyhow::Result<WorkerGuard> {
    let dir = log_path
        .parent()
        .context("Log path has no parent directory")?;
    let file_name = log_path
        .file_name()
        .context("Log path has no file name")?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {:?}", dir))?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .parse(filter)
        .with_context(|| format!("Invalid log filter {:?}", filter))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(env_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
