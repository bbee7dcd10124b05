//! Logging setup for the command-line front end.
//!
//! Human-readable output goes to stderr so that stdout stays free for command
//! output. A JSON log file is written alongside, rotated and pruned by
//! `tracing-appender`.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log file name prefix.
const LOG_FILE_PREFIX: &str = "vidgrab";

/// Crates whose events are let through at the configured levels.
const OWN_TARGETS: [&str; 2] = ["vidgrab", "vidgrab_core"];

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where log files are stored; `None` disables the file layer.
    pub log_directory: Option<PathBuf>,
    /// Log file name prefix (e.g. "vidgrab" -> "vidgrab.2026-01-15.log").
    pub log_file_prefix: String,
    /// Maximum level printed to stderr.
    pub console_level: Level,
    /// Maximum level written to the log file.
    pub file_level: Level,
    /// How often to rotate log files.
    pub rotation: LogRotation,
    /// Number of rotated files to keep (0 = keep all).
    pub max_log_files: usize,
    /// Whether to include ANSI color codes in console output.
    pub console_ansi: bool,
    /// Whether to log span open/close events.
    pub log_span_events: bool,
}

/// Log rotation frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogRotation {
    /// A new file every hour.
    Hourly,
    /// A new file every day.
    Daily,
    /// A single file.
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Self::HOURLY,
            LogRotation::Daily => Self::DAILY,
            LogRotation::Never => Self::NEVER,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::quiet()
    }
}

impl LoggingConfig {
    /// Warnings only on the console, debug in the file.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            log_directory: Some(default_log_directory()),
            log_file_prefix: LOG_FILE_PREFIX.to_string(),
            console_level: Level::WARN,
            file_level: Level::DEBUG,
            rotation: LogRotation::Daily,
            max_log_files: 7,
            console_ansi: true,
            log_span_events: false,
        }
    }

    /// Debug on the console, trace in the file.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            console_level: Level::DEBUG,
            file_level: Level::TRACE,
            log_span_events: true,
            ..Self::quiet()
        }
    }

    /// Pick a preset from the `--verbose` flag.
    #[must_use]
    pub fn for_verbosity(verbose: bool) -> Self {
        if verbose { Self::verbose() } else { Self::quiet() }
    }

    /// Set the log directory.
    #[must_use]
    pub fn with_log_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_directory = Some(path.into());
        self
    }

    /// Disable file logging.
    #[must_use]
    pub fn without_file(mut self) -> Self {
        self.log_directory = None;
        self
    }

    /// Set the console log level.
    #[must_use]
    pub const fn with_console_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }

    /// Set the log rotation frequency.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Keeps the file writer alive. Dropping it flushes pending entries.
#[derive(Debug)]
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the console filter. Falls back to console-only
/// logging when no log directory is configured.
///
/// # Errors
///
/// Returns an error if the log directory or file cannot be created, or if a
/// global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let span_events = if config.log_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(Level::WARN, config.console_level)));
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.console_ansi)
        .with_target(false)
        .with_span_events(span_events.clone())
        .with_filter(console_filter);

    let (file_layer, file_guard) = match &config.log_directory {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| LoggingError::DirectoryCreationFailed {
                path: dir.clone(),
                reason: e.to_string(),
            })?;

            let appender = RollingFileAppender::builder()
                .rotation(config.rotation.into())
                .filename_prefix(&config.log_file_prefix)
                .filename_suffix("log")
                .max_log_files(config.max_log_files.max(1))
                .build(dir)
                .map_err(|e| LoggingError::AppenderFailed(e.to_string()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(span_events)
                .json()
                .with_filter(EnvFilter::new(directives(Level::INFO, config.file_level)));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Default log directory.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vidgrab")
        .join("logs")
}

/// Filter directives: `default` for dependencies, `own` for our crates.
fn directives(default: Level, own: Level) -> String {
    let own = level_to_directive(own);
    let mut out = level_to_directive(default).to_string();
    for target in OWN_TARGETS {
        out.push_str(&format!(",{target}={own}"));
    }
    out
}

const fn level_to_directive(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Errors raised while installing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("Failed to create log directory {path}: {reason}")]
    DirectoryCreationFailed {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        reason: String,
    },

    /// The rolling file appender could not be built.
    #[error("Failed to open log file: {0}")]
    AppenderFailed(String),

    /// A global subscriber was already set.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_is_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.console_level, Level::WARN);
        assert_eq!(config.file_level, Level::DEBUG);
        assert_eq!(config.rotation, LogRotation::Daily);
        assert!(config.log_directory.is_some());
    }

    #[test]
    fn test_verbosity_presets() {
        let config = LoggingConfig::for_verbosity(true);
        assert_eq!(config.console_level, Level::DEBUG);
        assert_eq!(config.file_level, Level::TRACE);
        assert!(config.log_span_events);

        let config = LoggingConfig::for_verbosity(false);
        assert_eq!(config.console_level, Level::WARN);
        assert!(!config.log_span_events);
    }

    #[test]
    fn test_builders() {
        let config = LoggingConfig::quiet()
            .with_console_level(Level::ERROR)
            .with_rotation(LogRotation::Never)
            .with_log_directory("/tmp/vidgrab-logs");
        assert_eq!(config.console_level, Level::ERROR);
        assert_eq!(config.rotation, LogRotation::Never);
        assert_eq!(config.log_directory, Some(PathBuf::from("/tmp/vidgrab-logs")));

        assert!(config.without_file().log_directory.is_none());
    }

    #[test]
    fn test_directives() {
        assert_eq!(
            directives(Level::WARN, Level::DEBUG),
            "warn,vidgrab=debug,vidgrab_core=debug"
        );
    }

    #[test]
    fn test_rotation_conversion() {
        assert!(matches!(Rotation::from(LogRotation::Hourly), Rotation::HOURLY));
        assert!(matches!(Rotation::from(LogRotation::Daily), Rotation::DAILY));
        assert!(matches!(Rotation::from(LogRotation::Never), Rotation::NEVER));
    }

    #[test]
    fn test_default_log_directory() {
        let dir = default_log_directory();
        assert!(dir.to_string_lossy().contains("vidgrab"));
        assert!(dir.ends_with("logs"));
    }
}
