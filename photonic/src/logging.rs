//! Logging setup.
//!
//! Installs a `tracing` subscriber that writes human-readable lines to stderr
//! and, optionally, to a daily-rolling file under the state directory.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use time::macros::format_description;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "photonic.log";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {}: {source}", path.display())]
    LogDir { path: PathBuf, source: io::Error },

    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Logging options.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Log at `debug` instead of `info` (ignored when `RUST_LOG` is set).
    pub verbose: bool,

    /// Also write logs to a daily-rolling file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl LogConfig {
    fn default_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive until the process exits. It is `None` when no log directory is used.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_timer(timer.clone())
        .with_filter(build_filter(config));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::LogDir {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(timer)
                .with_filter(build_filter(config));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(guard)
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(config.default_level().into())
        .from_env_lossy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(LogConfig::default().default_level(), LevelFilter::INFO);

        let verbose = LogConfig {
            verbose: true,
            log_dir: None,
        };
        assert_eq!(verbose.default_level(), LevelFilter::DEBUG);
    }
}
