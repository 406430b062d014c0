//! Logging setup for the workbench binaries.
//!
//! Libraries only emit `tracing` events; binaries decide where they go by
//! building a [`LogConfig`] and calling [`init_logging`] once at startup.

use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding a filter directive (e.g. `debug`, `paw_collect=trace`).
pub const LOG_ENV: &str = "PAW_LOG";
/// Environment variable selecting the console format (`pretty` or `json`).
pub const LOG_FORMAT_ENV: &str = "PAW_LOG_FORMAT";
/// Environment variable naming a file that receives JSON logs.
pub const LOG_FILE_ENV: &str = "PAW_LOG_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub stderr: bool,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("failed to open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Keeps background log writers alive; drop at process exit.
#[must_use = "dropping the guards stops file logging"]
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

impl LogConfig {
    /// Build a configuration from `PAW_LOG*` variables, using `default_level`
    /// when `PAW_LOG` is unset.
    pub fn from_env(default_level: &str) -> Self {
        let level = std::env::var(LOG_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_level.to_string());
        let format = match std::env::var(LOG_FORMAT_ENV).as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        let file = std::env::var(LOG_FILE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            level,
            format,
            stderr: false,
            file,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file = Some(path);
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        EnvFilter::try_new(&self.level).map_err(|e| LoggingError::Filter {
            filter: self.level.clone(),
            message: e.to_string(),
        })
    }
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let mut guards = Vec::new();

    let console = match (config.format, config.stderr) {
        (LogFormat::Pretty, true) => fmt::layer().with_writer(std::io::stderr).boxed(),
        (LogFormat::Pretty, false) => fmt::layer().with_writer(std::io::stdout).boxed(),
        (LogFormat::Json, true) => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        (LogFormat::Json, false) => fmt::layer().json().with_writer(std::io::stdout).boxed(),
    };

    let file_layer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::File {
                    path: path.clone(),
                    source,
                })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            guards.push(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(config.filter()?)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(LoggingGuards { _guards: guards })
}
