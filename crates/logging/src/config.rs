//! Logging configuration and subscriber installation
//!
//! [`init`] installs a global `tracing` subscriber shaped by a
//! [`LoggingConfig`] and makes a logger forwarding into it the process-wide
//! default entry. `RUST_LOG` overrides the configured level for the
//! subscriber when set.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::binding::{default_entry_installed, set_default_logger};
use crate::entry::{Level, Logger};
use crate::error::{LoggingError, LoggingResult};
use crate::handlers::TracingHandler;

/// Environment variable overriding [`LoggingConfig::level`]
pub const LEVEL_ENV: &str = "CTXLOG_LEVEL";

/// Environment variable overriding [`LoggingConfig::format`]
pub const FORMAT_ENV: &str = "CTXLOG_FORMAT";

/// Microsecond-resolution timestamp formatter
struct MicrosecondTimestamp;

impl FormatTime for MicrosecondTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = chrono::Utc::now();
        write!(
            w,
            "{}.{:06}",
            now.format("%Y-%m-%d %H:%M:%S"),
            now.timestamp_subsec_micros()
        )
    }
}

/// Output format of the installed subscriber
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line, human-readable
    Pretty,
    /// Single-line text
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl FromStr for OutputFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level of the default logger
    pub level: Level,
    /// Subscriber output format
    pub format: OutputFormat,
    /// Whether to include the event target
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to include file and line information
    pub include_file_line: bool,
    /// Whether to use microsecond timestamps
    pub high_precision_timestamps: bool,
    /// Whether to emit ANSI colors
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: OutputFormat::Compact,
            include_target: true,
            include_thread_ids: false,
            include_file_line: false,
            high_precision_timestamps: true,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Load configuration from a JSON file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> LoggingResult<Self> {
        let config_str = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&config_str)?)
    }

    /// Apply `CTXLOG_LEVEL` / `CTXLOG_FORMAT` overrides from the environment
    pub fn with_env_overrides(self) -> LoggingResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> LoggingResult<Self> {
        if let Some(level) = lookup(LEVEL_ENV) {
            self.level = level.parse()?;
        }
        if let Some(format) = lookup(FORMAT_ENV) {
            self.format = format.parse()?;
        }
        Ok(self)
    }

    /// Filter directive used when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> &'static str {
        match self.level {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error | Level::Fatal => "error",
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.filter_directive()))
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(self.include_target)
            .with_thread_ids(self.include_thread_ids)
            .with_file(self.include_file_line)
            .with_line_number(self.include_file_line)
            .with_level(true);

        match (self.format, self.high_precision_timestamps) {
            (OutputFormat::Pretty, true) => layer.pretty().with_ansi(self.ansi).with_timer(MicrosecondTimestamp).boxed(),
            (OutputFormat::Pretty, false) => layer.pretty().with_ansi(self.ansi).boxed(),
            (OutputFormat::Compact, true) => layer.compact().with_ansi(self.ansi).with_timer(MicrosecondTimestamp).boxed(),
            (OutputFormat::Compact, false) => layer.compact().with_ansi(self.ansi).boxed(),
            (OutputFormat::Json, true) => layer.json().with_ansi(false).with_timer(MicrosecondTimestamp).boxed(),
            (OutputFormat::Json, false) => layer.json().with_ansi(false).boxed(),
        }
    }
}

/// Install the global subscriber and the process-wide default entry
///
/// Fails with `AlreadyInitialized` without installing anything when the
/// default entry is already fixed, including by an earlier fallback lookup.
pub fn init(config: LoggingConfig) -> LoggingResult<()> {
    if default_entry_installed() {
        return Err(LoggingError::AlreadyInitialized);
    }

    let layer = config.fmt_layer().with_filter(config.env_filter());

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| LoggingError::Subscriber(e.to_string()))?;

    set_default_logger(Arc::new(Logger::new(TracingHandler, config.level)))
}

/// Initialize the logging system from a JSON configuration file
pub fn init_from_file(path: impl AsRef<Path>) -> LoggingResult<()> {
    init(LoggingConfig::from_file(path)?)
}

/// Initialize the logging system with default configuration and
/// environment overrides
pub fn init_default() -> LoggingResult<()> {
    init(LoggingConfig::default().with_env_overrides()?)
}
