//! Logging setup.
//!
//! Logs go to stderr (human-readable or JSON) and to a daily-rotated file
//! under `.gatekeeper/logs/`. `RUST_LOG` overrides the configured level.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSection;

const LOG_FILE_PREFIX: &str = "gatekeeper.log";

/// Keeps the non-blocking file writer alive. Pending lines are flushed when
/// it is dropped.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initialize the global subscriber. Call once, early in `main`.
pub fn init(config: &LoggingSection, log_dir: &Path, verbose: bool) -> Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Invalid log level")?;

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let (stderr_plain, stderr_json) = if config.json {
        (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
        )
    } else {
        (
            Some(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_plain)
        .with(stderr_json)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(log_dir = %log_dir.display(), level = %default_level, "Logging initialized");

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (captured by the test harness).
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
