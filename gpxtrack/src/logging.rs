//! Tracing subscriber setup for binaries.
//!
//! Logs always go to stderr. When a directory is configured they are also
//! written, without ANSI colours, to a daily rolling file through a
//! non-blocking writer. `RUST_LOG` overrides the configured level.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

/// Prefix of rolling log file names.
pub const LOG_FILE_PREFIX: &str = "gpxtrack";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log directory {path}: {source}")]
    Appender {
        path: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `gpxtrack=debug`.
    pub level: String,
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            directory: None,
            file_prefix: LOG_FILE_PREFIX.to_string(),
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Same settings with a different level, e.g. from `--verbose`.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            directory: settings.directory.clone(),
            file_prefix: LOG_FILE_PREFIX.to_string(),
        }
    }
}

/// Installs the global subscriber.
///
/// The returned guard flushes the log file when dropped and must be kept alive
/// for as long as logging is wanted.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(false);

    let (file_layer, guard) = match file_appender(config)? {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(guard)
}

/// Daily rolling appender for the configured directory, if any.
fn file_appender(config: &LoggingConfig) -> Result<Option<RollingFileAppender>, LoggingError> {
    let Some(directory) = &config.directory else {
        return Ok(None);
    };
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(config.file_prefix.as_str())
        .filename_suffix("log")
        .build(directory)
        .map(Some)
        .map_err(|source| LoggingError::Appender {
            path: directory.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_from_settings() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            directory: Some(PathBuf::from("/var/log/gpxtrack")),
        };
        let config = LoggingConfig::from(&settings);
        assert_eq!(config.level, "debug");
        assert_eq!(config.directory, Some(PathBuf::from("/var/log/gpxtrack")));
        assert_eq!(config.file_prefix, LOG_FILE_PREFIX);
    }

    #[test]
    fn test_no_directory_no_appender() {
        assert!(file_appender(&LoggingConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_appender_writes_into_directory() {
        let temp = TempDir::new().unwrap();
        let config = LoggingConfig::new("info").with_directory(temp.path().join("logs"));

        let mut appender = file_appender(&config).unwrap().unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let files: Vec<_> = std::fs::read_dir(temp.path().join("logs"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with(LOG_FILE_PREFIX));
        assert!(files[0].ends_with(".log"));
    }
}
