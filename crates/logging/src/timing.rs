//! Trace spans: a start record now, a completion record later
//!
//! [`Trace`] logs its message when created and a matching completion record
//! with the elapsed `duration` (milliseconds) when stopped. A handle that is
//! dropped without being stopped still emits the completion record, so every
//! exit path is covered.

use std::error::Error as StdError;
use std::thread;
use std::time::{Duration, Instant};

use crate::entry::{Entry, ERROR_FIELD};

/// Field carrying the elapsed milliseconds of a trace
pub const DURATION_FIELD: &str = "duration";

/// An open trace span
#[must_use = "a trace logs its completion when stopped or dropped"]
pub struct Trace {
    /// Entry both records are emitted through
    entry: Entry,
    /// Message repeated on completion
    message: String,
    /// Start time
    start: Instant,
    /// Whether the completion record has been emitted
    stopped: bool,
}

impl Trace {
    pub(crate) fn start(entry: Entry, message: String) -> Self {
        entry.info(message.clone());
        Self {
            entry,
            message,
            start: Instant::now(),
            stopped: false,
        }
    }

    /// The traced message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Elapsed time without stopping the trace
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Emit the completion record at info level
    pub fn stop(mut self) -> Duration {
        self.complete(None)
    }

    /// Emit the completion record at error level, carrying `err`
    pub fn stop_with_error<E: StdError + ?Sized>(mut self, err: &E) -> Duration {
        self.complete(Some(err.to_string()))
    }

    /// Stop according to the outcome of the traced operation
    pub fn finish<T, E: StdError>(self, result: &Result<T, E>) -> Duration {
        match result {
            Ok(_) => self.stop(),
            Err(e) => self.stop_with_error(e),
        }
    }

    fn complete(&mut self, error: Option<String>) -> Duration {
        let elapsed = self.start.elapsed();
        if self.stopped {
            return elapsed;
        }
        self.stopped = true;

        let entry = self.entry.with_field(DURATION_FIELD, elapsed.as_millis() as u64);
        match error {
            None => entry.info(self.message.clone()),
            Some(err) => entry.with_field(ERROR_FIELD, err).error(self.message.clone()),
        }

        elapsed
    }
}

impl Drop for Trace {
    fn drop(&mut self) {
        if !self.stopped {
            let error = thread::panicking().then(|| "panicked".to_string());
            self.complete(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Level, Logger};
    use crate::handlers::MemoryHandler;
    use serde_json::json;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;
    use std::thread::sleep;

    fn entry() -> (Arc<MemoryHandler>, Entry) {
        let handler = Arc::new(MemoryHandler::new());
        let logger = Arc::new(Logger::with_handler(handler.clone(), Level::Debug));
        (handler, Entry::new(logger).with_field("job", "sync"))
    }

    #[test]
    fn test_trace_start_and_stop() {
        let (handler, entry) = entry();

        let trace = entry.trace("syncing");
        assert_eq!(handler.len(), 1);
        sleep(Duration::from_millis(2));
        let elapsed = trace.stop();
        assert!(elapsed >= Duration::from_millis(2));

        let records = handler.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::Info);
        assert_eq!(records[0].message, "syncing");
        assert!(records[0].fields.get(DURATION_FIELD).is_none());

        assert_eq!(records[1].level, Level::Info);
        assert_eq!(records[1].message, "syncing");
        assert_eq!(records[1].fields.get("job"), Some(&json!("sync")));
        assert!(records[1].fields[DURATION_FIELD].as_u64().unwrap() >= 2);
    }

    #[test]
    fn test_trace_stop_with_error() {
        let (handler, entry) = entry();
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream timed out");

        entry.trace("fetching").stop_with_error(&err);

        let last = handler.last().unwrap();
        assert_eq!(last.level, Level::Error);
        assert_eq!(last.fields.get(ERROR_FIELD), Some(&json!("upstream timed out")));
        assert!(last.fields.contains_key(DURATION_FIELD));
    }

    #[test]
    fn test_trace_finish_follows_result() {
        let (handler, entry) = entry();

        let ok: Result<u8, std::fmt::Error> = Ok(1);
        entry.trace("ok").finish(&ok);
        assert_eq!(handler.last().unwrap().level, Level::Info);

        let failed: Result<u8, std::fmt::Error> = Err(std::fmt::Error);
        entry.trace("failed").finish(&failed);
        assert_eq!(handler.last().unwrap().level, Level::Error);
    }

    #[test]
    fn test_drop_emits_completion_once() {
        let (handler, entry) = entry();
        {
            let _trace = entry.trace("scoped");
        }
        assert_eq!(handler.len(), 2);

        entry.trace("stopped").stop();
        assert_eq!(handler.len(), 4);
    }

    #[test]
    fn test_drop_while_panicking_records_error() {
        let (handler, entry) = entry();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _trace = entry.trace("risky");
            panic!("boom");
        }));
        assert!(result.is_err());

        let last = handler.last().unwrap();
        assert_eq!(last.level, Level::Error);
        assert_eq!(last.message, "risky");
        assert_eq!(last.fields.get(ERROR_FIELD), Some(&json!("panicked")));
    }
}
