//! Log entries, loggers and the records they emit
//!
//! An [`Entry`] is an immutable logging handle: a shared [`Logger`] plus the
//! structured fields accumulated so far. Enriching an entry never touches the
//! original, it produces a new entry with the merged field set.

use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LoggingError;
use crate::handlers::Handler;
use crate::timing::Trace;

/// Field name used for attached errors
pub const ERROR_FIELD: &str = "error";

/// Severity of a log record
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Diagnostic detail
    Debug,
    /// Normal operation
    #[default]
    Info,
    /// Something unexpected but recoverable
    Warn,
    /// A failed operation
    Error,
    /// Terminal; the process exits after emitting
    Fatal,
}

impl Level {
    /// All levels in ascending severity
    pub const ALL: [Level; 5] = [Level::Debug, Level::Info, Level::Warn, Level::Error, Level::Fatal];

    /// Lowercase name of the level
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Structured fields carried by an entry, keyed by field name
pub type Fields = BTreeMap<String, Value>;

/// Anything that can be merged into an entry's fields
pub trait IntoFields {
    /// Convert into a field set
    fn into_fields(self) -> Fields;
}

impl<K: Into<String>, V: Into<Value>> IntoFields for BTreeMap<K, V> {
    fn into_fields(self) -> Fields {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

impl<K: Into<String>, V: Into<Value>> IntoFields for HashMap<K, V> {
    fn into_fields(self) -> Fields {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

impl<K: Into<String>, V: Into<Value>> IntoFields for Vec<(K, V)> {
    fn into_fields(self) -> Fields {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> IntoFields for [(K, V); N] {
    fn into_fields(self) -> Fields {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

impl IntoFields for serde_json::Map<String, Value> {
    fn into_fields(self) -> Fields {
        self.into_iter().collect()
    }
}

/// A single emitted log record, as seen by handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// When the record was emitted
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: Level,
    /// Log message
    pub message: String,
    /// Accumulated fields of the emitting entry
    pub fields: Fields,
}

/// A handler paired with a minimum level
pub struct Logger {
    /// Destination for records
    handler: Arc<dyn Handler>,
    /// Records below this level are dropped
    level: Level,
}

impl Logger {
    /// Create a logger over the given handler
    pub fn new(handler: impl Handler + 'static, level: Level) -> Self {
        Self::with_handler(Arc::new(handler), level)
    }

    /// Create a logger over an already shared handler
    pub fn with_handler(handler: Arc<dyn Handler>, level: Level) -> Self {
        Self { handler, level }
    }

    /// Minimum level this logger emits
    pub fn level(&self) -> Level {
        self.level
    }

    /// The handler records are sent to
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Whether a record at `level` would be emitted
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    fn log(&self, level: Level, message: String, fields: &Fields) {
        if !self.enabled(level) {
            return;
        }

        let record = Record {
            timestamp: Utc::now(),
            level,
            message,
            fields: fields.clone(),
        };

        // Sink failures never reach the caller.
        if let Err(e) = self.handler.handle(&record) {
            eprintln!("error logging: {}", e);
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("level", &self.level).finish_non_exhaustive()
    }
}

/// Immutable logging handle carrying accumulated fields
#[derive(Clone)]
pub struct Entry {
    logger: Arc<Logger>,
    fields: Fields,
}

impl Entry {
    /// Create an entry over `logger` with no fields
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            logger,
            fields: Fields::new(),
        }
    }

    /// The logger this entry emits through
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Fields accumulated so far
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Derive an entry with `fields` merged in; new keys override existing ones
    pub fn with_fields(&self, fields: impl IntoFields) -> Entry {
        let mut merged = self.fields.clone();
        merged.extend(fields.into_fields());
        Entry {
            logger: Arc::clone(&self.logger),
            fields: merged,
        }
    }

    /// Derive an entry with a single extra field
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<Value>) -> Entry {
        let mut fields = self.fields.clone();
        fields.insert(key.into(), value.into());
        Entry {
            logger: Arc::clone(&self.logger),
            fields,
        }
    }

    /// Derive an entry carrying the error's message under `"error"`
    pub fn with_error<E: StdError + ?Sized>(&self, err: &E) -> Entry {
        self.with_field(ERROR_FIELD, err.to_string())
    }

    /// Emit `message` at `level`
    pub fn log(&self, level: Level, message: impl Into<String>) {
        self.logger.log(level, message.into(), &self.fields);
    }

    /// Emit a formatted message at `level`; formatting is skipped when filtered out
    pub fn logf(&self, level: Level, args: fmt::Arguments<'_>) {
        if self.logger.enabled(level) {
            self.logger.log(level, fmt::format(args), &self.fields);
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message);
    }

    /// Emit at fatal level, then exit the process with status 1
    pub fn fatal(&self, message: impl Into<String>) -> ! {
        self.log(Level::Fatal, message);
        std::process::exit(1)
    }

    pub fn debugf(&self, args: fmt::Arguments<'_>) {
        self.logf(Level::Debug, args);
    }

    pub fn infof(&self, args: fmt::Arguments<'_>) {
        self.logf(Level::Info, args);
    }

    pub fn warnf(&self, args: fmt::Arguments<'_>) {
        self.logf(Level::Warn, args);
    }

    pub fn errorf(&self, args: fmt::Arguments<'_>) {
        self.logf(Level::Error, args);
    }

    /// Formatted fatal, then exit the process with status 1
    pub fn fatalf(&self, args: fmt::Arguments<'_>) -> ! {
        self.logf(Level::Fatal, args);
        std::process::exit(1)
    }

    /// Log `message` now and return a handle that logs its completion
    pub fn trace(&self, message: impl Into<String>) -> Trace {
        Trace::start(self.clone(), message.into())
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.logger, &other.logger) && self.fields == other.fields
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("logger", &self.logger)
            .field("fields", &self.fields)
            .finish()
    }
}
