//! Context logger binding
//!
//! Binds an [`Entry`] to a [`Context`] and resolves it again for logging.
//! Each context node binds at most one entry; deriving replaces the binding
//! for the child while the parent keeps its own. Field accumulation happens
//! inside the entry, not in the context.
//!
//! Lookup walks the context's ancestry for the nearest bound entry and falls
//! back to the process-wide default entry when none is bound, so logging
//! through a context never fails.
//!
//! ```
//! use std::sync::Arc;
//! use ctxlog::{Context, Level, Logger, MemoryHandler};
//!
//! let handler = Arc::new(MemoryHandler::new());
//! let logger = Arc::new(Logger::with_handler(handler.clone(), Level::Info));
//!
//! let ctx = ctxlog::bind_logger(&Context::background(), logger);
//! let ctx = ctxlog::with_field(&ctx, "request_id", "r-42");
//! ctxlog::info(&ctx, "handled");
//!
//! assert_eq!(handler.last().unwrap().fields["request_id"], "r-42");
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::context::Context;
use crate::entry::{Entry, IntoFields, Level, Logger};
use crate::error::{LoggingError, LoggingResult};
use crate::handlers::TracingHandler;
use crate::timing::Trace;

/// Context key for the bound entry
struct EntryKey;

/// Process-wide fallback entry
static DEFAULT_ENTRY: OnceCell<Entry> = OnceCell::new();

/// Install the process-wide default entry
///
/// Must happen before the first lookup that falls back to the default;
/// afterwards the default is fixed and this returns `AlreadyInitialized`.
pub fn set_default_entry(entry: Entry) -> LoggingResult<()> {
    DEFAULT_ENTRY.set(entry).map_err(|_| LoggingError::AlreadyInitialized)
}

/// Whether the process-wide default entry has been fixed, either explicitly
/// or by a lookup that fell back to it
pub fn default_entry_installed() -> bool {
    DEFAULT_ENTRY.get().is_some()
}

/// Install a fresh entry over `logger` as the process-wide default
pub fn set_default_logger(logger: Arc<Logger>) -> LoggingResult<()> {
    set_default_entry(Entry::new(logger))
}

/// The process-wide default entry
///
/// If nothing was installed, the default forwards everything to `tracing`
/// and leaves filtering to the subscriber.
pub fn default_entry() -> &'static Entry {
    DEFAULT_ENTRY.get_or_init(|| Entry::new(Arc::new(Logger::new(TracingHandler, Level::Debug))))
}

/// Derive a context bound to a fresh entry over `logger`
pub fn bind_logger(ctx: &Context, logger: Arc<Logger>) -> Context {
    bind_entry(ctx, Entry::new(logger))
}

/// Derive a context whose lookup yields exactly `entry`
pub fn bind_entry(ctx: &Context, entry: Entry) -> Context {
    ctx.with_value::<EntryKey, Entry>(entry)
}

/// Derive a context whose entry always logs `fields`
pub fn with_fields(ctx: &Context, fields: impl IntoFields) -> Context {
    bind_entry(ctx, entry(ctx).with_fields(fields))
}

/// Derive a context whose entry always logs `key = value`
pub fn with_field(ctx: &Context, key: impl Into<String>, value: impl Into<Value>) -> Context {
    bind_entry(ctx, entry(ctx).with_field(key, value))
}

/// Derive a context whose entry always logs `err` under `"error"`
pub fn with_error<E: StdError + ?Sized>(ctx: &Context, err: &E) -> Context {
    bind_entry(ctx, entry(ctx).with_error(err))
}

/// The entry bound to `ctx`, or the process-wide default
pub fn entry(ctx: &Context) -> &Entry {
    match bound_entry(ctx) {
        Some(entry) => entry,
        None => default_entry(),
    }
}

/// The entry bound to `ctx`, without falling back to the default
pub fn bound_entry(ctx: &Context) -> Option<&Entry> {
    ctx.value::<EntryKey, Entry>()
}

/// Lookup for callers holding an optional context
///
/// # Panics
///
/// Panics when `ctx` is `None`: a context must always be supplied.
pub fn entry_from(ctx: Option<&Context>) -> &Entry {
    match ctx {
        Some(ctx) => entry(ctx),
        None => panic!("no context passed to entry"),
    }
}

/// Debug level message
pub fn debug(ctx: &Context, message: impl Into<String>) {
    entry(ctx).debug(message);
}

/// Info level message
pub fn info(ctx: &Context, message: impl Into<String>) {
    entry(ctx).info(message);
}

/// Warn level message
pub fn warn(ctx: &Context, message: impl Into<String>) {
    entry(ctx).warn(message);
}

/// Error level message
pub fn error(ctx: &Context, message: impl Into<String>) {
    entry(ctx).error(message);
}

/// Fatal level message, followed by an exit
pub fn fatal(ctx: &Context, message: impl Into<String>) -> ! {
    entry(ctx).fatal(message)
}

/// Debug level formatted message; see [`debugf!`](crate::debugf!)
pub fn debugf(ctx: &Context, args: fmt::Arguments<'_>) {
    entry(ctx).debugf(args);
}

/// Info level formatted message; see [`infof!`](crate::infof!)
pub fn infof(ctx: &Context, args: fmt::Arguments<'_>) {
    entry(ctx).infof(args);
}

/// Warn level formatted message; see [`warnf!`](crate::warnf!)
pub fn warnf(ctx: &Context, args: fmt::Arguments<'_>) {
    entry(ctx).warnf(args);
}

/// Error level formatted message; see [`errorf!`](crate::errorf!)
pub fn errorf(ctx: &Context, args: fmt::Arguments<'_>) {
    entry(ctx).errorf(args);
}

/// Fatal level formatted message, followed by an exit
pub fn fatalf(ctx: &Context, args: fmt::Arguments<'_>) -> ! {
    entry(ctx).fatalf(args)
}

/// Log `message` and return a handle that logs its completion when stopped
/// or dropped
pub fn trace(ctx: &Context, message: impl Into<String>) -> Trace {
    entry(ctx).trace(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Fields, Record};
    use crate::handlers::{JsonHandler, MemoryHandler};
    use serde_json::json;
    use std::collections::HashMap;
    use std::process::Command;
    use std::thread;

    const FATAL_CHILD_ENV: &str = "CTXLOG_FATAL_CHILD";

    fn memory_context(level: Level) -> (Arc<MemoryHandler>, Arc<Logger>, Context) {
        let handler = Arc::new(MemoryHandler::new());
        let logger = Arc::new(Logger::with_handler(handler.clone(), level));
        let ctx = bind_logger(&Context::background(), logger.clone());
        (handler, logger, ctx)
    }

    #[test]
    fn test_bind_logger_yields_fresh_entry() {
        let (_, logger, ctx) = memory_context(Level::Info);
        assert_eq!(entry(&ctx), &Entry::new(logger));
        assert!(entry(&ctx).fields().is_empty());
    }

    #[test]
    fn test_bind_entry_yields_same_entry() {
        let (_, logger, _) = memory_context(Level::Info);
        let bound = Entry::new(logger).with_field("svc", "api");
        let ctx = bind_entry(&Context::background(), bound.clone());
        assert_eq!(entry(&ctx), &bound);
    }

    #[test]
    fn test_unbound_context_falls_back_to_default() {
        let ctx = Context::background().with_cancel().0;
        assert!(bound_entry(&ctx).is_none());
        assert!(std::ptr::eq(entry(&ctx), default_entry()));
        assert!(default_entry_installed());
        assert!(matches!(
            set_default_entry(default_entry().clone()),
            Err(LoggingError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_with_fields_accumulates() {
        let (handler, _, ctx) = memory_context(Level::Info);
        let mut first = HashMap::new();
        first.insert("a", 1);
        let ctx = with_fields(&ctx, first);
        let ctx = with_fields(&ctx, [("b", 2)]);

        info(&ctx, "done");

        let mut expected = Fields::new();
        expected.insert("a".to_string(), json!(1));
        expected.insert("b".to_string(), json!(2));
        assert_eq!(handler.records()[0].fields, expected);
    }

    #[test]
    fn test_with_fields_overrides() {
        let (handler, _, ctx) = memory_context(Level::Info);
        let ctx = with_fields(&ctx, [("a", 1)]);
        let ctx = with_fields(&ctx, [("a", 2)]);

        info(&ctx, "done");

        assert_eq!(handler.last().unwrap().fields.get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_with_field() {
        let (handler, _, ctx) = memory_context(Level::Info);
        let ctx = with_field(&ctx, "foo", true);
        info(&ctx, "done");

        let mut expected = Fields::new();
        expected.insert("foo".to_string(), json!(true));
        assert_eq!(handler.records()[0].fields, expected);
    }

    #[test]
    fn test_with_error() {
        let (handler, _, ctx) = memory_context(Level::Info);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "an error");
        let ctx = with_error(&ctx, &err);
        info(&ctx, "done");

        assert_eq!(handler.records()[0].fields.get("error"), Some(&json!("an error")));
    }

    #[test]
    fn test_levels() {
        let (handler, _, ctx) = memory_context(Level::Debug);

        debug(&ctx, "Debug");
        info(&ctx, "Info");
        warn(&ctx, "Warn");
        error(&ctx, "Error");
        crate::debugf!(&ctx, "Debugf");
        crate::infof!(&ctx, "Infof {}", 1);
        crate::warnf!(&ctx, "Warnf {:>3}", "x");
        crate::errorf!(&ctx, "Errorf {value}", value = 2.5);

        let records = handler.records();
        let levels: Vec<Level> = records.iter().map(|r| r.level).collect();
        assert_eq!(
            levels,
            vec![
                Level::Debug,
                Level::Info,
                Level::Warn,
                Level::Error,
                Level::Debug,
                Level::Info,
                Level::Warn,
                Level::Error,
            ]
        );
        assert_eq!(records[5].message, "Infof 1");
        assert_eq!(records[6].message, "Warnf   x");
        assert_eq!(records[7].message, "Errorf 2.5");
    }

    #[test]
    fn test_derivation_does_not_mutate_parent() {
        let (handler, _, parent) = memory_context(Level::Info);
        let before = entry(&parent).clone();

        let child = with_field(&parent, "k", "v");

        assert_eq!(entry(&parent), &before);
        assert_ne!(entry(&child), &before);

        info(&parent, "parent");
        info(&child, "child");
        let records = handler.records();
        assert!(records[0].fields.is_empty());
        assert_eq!(records[1].fields.get("k"), Some(&json!("v")));
    }

    #[test]
    fn test_nearest_binding_wins() {
        let (outer_handler, _, outer) = memory_context(Level::Info);
        let inner_handler = Arc::new(MemoryHandler::new());
        let inner_logger = Arc::new(Logger::with_handler(inner_handler.clone(), Level::Info));

        let inner = bind_logger(&with_field(&outer, "scope", "outer"), inner_logger);
        let inner = inner.with_cancel().0;

        info(&inner, "inner");
        info(&outer, "outer");

        assert_eq!(inner_handler.len(), 1);
        assert!(inner_handler.records()[0].fields.is_empty());
        assert_eq!(outer_handler.len(), 1);
    }

    #[test]
    fn test_trace_through_context() {
        let (handler, _, ctx) = memory_context(Level::Info);
        let ctx = with_field(&ctx, "op", "upload");

        trace(&ctx, "uploading").stop();

        let records = handler.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.fields.get("op") == Some(&json!("upload"))));
        assert!(records[1].fields.contains_key("duration"));
    }

    #[test]
    fn test_long_field_chain_logs_and_drops() {
        let (handler, _, mut ctx) = memory_context(Level::Info);
        for i in 0..100_000u32 {
            ctx = with_field(&ctx, "step", i);
        }

        info(&ctx, "deep");
        drop(ctx);

        let record = handler.last().unwrap();
        assert_eq!(record.fields.get("step"), Some(&json!(99_999)));
        assert_eq!(record.fields.len(), 1);
    }

    #[test]
    fn test_concurrent_derivation_from_shared_context() {
        let (handler, _, ctx) = memory_context(Level::Info);

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let ctx = ctx.clone();
                thread::spawn(move || {
                    let ctx = with_field(&ctx, "worker", i);
                    info(&ctx, "working");
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let mut seen: Vec<u64> = handler
            .records()
            .iter()
            .map(|r| r.fields["worker"].as_u64().unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<u64>>());
        assert!(entry(&ctx).fields().is_empty());
    }

    #[test]
    #[should_panic(expected = "no context passed to entry")]
    fn test_entry_from_none_panics() {
        entry_from(None);
    }

    #[test]
    fn test_entry_from_some_resolves() {
        let (_, logger, ctx) = memory_context(Level::Info);
        assert_eq!(entry_from(Some(&ctx)), &Entry::new(logger));
    }

    #[test]
    fn test_fatal_exits_after_emitting() {
        if std::env::var_os(FATAL_CHILD_ENV).is_some() {
            let logger = Arc::new(Logger::new(JsonHandler::stderr(), Level::Debug));
            let ctx = bind_logger(&Context::background(), logger);
            let ctx = with_field(&ctx, "stage", "shutdown");
            fatal(&ctx, "unrecoverable");
        }

        let output = Command::new(std::env::current_exe().unwrap())
            .args(["binding::tests::test_fatal_exits_after_emitting", "--exact", "--test-threads=1"])
            .env(FATAL_CHILD_ENV, "1")
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(1));

        let stderr = String::from_utf8_lossy(&output.stderr);
        let line = stderr.lines().find(|l| l.starts_with('{')).expect("no fatal record");
        let record: Record = serde_json::from_str(line).unwrap();
        assert_eq!(record.level, Level::Fatal);
        assert_eq!(record.message, "unrecoverable");
        assert_eq!(record.fields.get("stage"), Some(&json!("shutdown")));
    }
}
