//! Record handlers
//!
//! A [`Handler`] is the sink a [`Logger`](crate::Logger) hands records to.
//! The default process logger forwards into `tracing`, so the installed
//! subscriber decides where records end up.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::entry::{Level, Record};
use crate::error::LoggingError;

/// Target used for records forwarded into `tracing`
pub const TRACING_TARGET: &str = "ctxlog";

/// Destination for log records
pub trait Handler: Send + Sync {
    /// Handle a single record
    fn handle(&self, record: &Record) -> Result<(), LoggingError>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn handle(&self, record: &Record) -> Result<(), LoggingError> {
        (**self).handle(record)
    }
}

/// Forwards records to the current `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHandler;

impl Handler for TracingHandler {
    fn handle(&self, record: &Record) -> Result<(), LoggingError> {
        let fields = serde_json::to_string(&record.fields)?;
        let message = record.message.as_str();

        match record.level {
            Level::Debug => debug!(target: TRACING_TARGET, fields = %fields, "{}", message),
            Level::Info => info!(target: TRACING_TARGET, fields = %fields, "{}", message),
            Level::Warn => warn!(target: TRACING_TARGET, fields = %fields, "{}", message),
            Level::Error => error!(target: TRACING_TARGET, fields = %fields, "{}", message),
            Level::Fatal => error!(target: TRACING_TARGET, fatal = true, fields = %fields, "{}", message),
        }

        Ok(())
    }
}

/// Writes each record as one JSON object per line
pub struct JsonHandler<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonHandler<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonHandler<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl JsonHandler<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> Handler for JsonHandler<W> {
    fn handle(&self, record: &Record) -> Result<(), LoggingError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct MemoryHandler {
    records: Mutex<Vec<Record>>,
}

impl MemoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records handled so far, in order
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// The most recent record
    pub fn last(&self) -> Option<Record> {
        self.records.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Handler for MemoryHandler {
    fn handle(&self, record: &Record) -> Result<(), LoggingError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Drops every record
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardHandler;

impl Handler for DiscardHandler {
    fn handle(&self, _record: &Record) -> Result<(), LoggingError> {
        Ok(())
    }
}
