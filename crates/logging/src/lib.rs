//! Context-scoped structured logging
//!
//! This crate attaches a logger entry to a request-scoped [`Context`] and
//! logs through whatever entry the context carries:
//! - Binding a logger or a prepared entry to a context
//! - Progressive enrichment with fields or an error, each producing a new
//!   derived context while the parent keeps its own entry
//! - Lookup walking the context ancestry, falling back to a process-wide
//!   default entry
//! - Debug, info, warn, error and fatal logging, plain and formatted
//! - Trace spans logging an operation's start and completion with its duration
//!
//! The default entry forwards into `tracing`; [`init`] installs a subscriber
//! for it from a [`LoggingConfig`].

pub mod binding;
pub mod config;
pub mod context;
pub mod entry;
pub mod error;
pub mod handlers;
pub mod timing;

pub use binding::{
    bind_entry, bind_logger, bound_entry, debug, debugf, default_entry, default_entry_installed, entry, entry_from,
    error, errorf, fatal, fatalf, info, infof, set_default_entry, set_default_logger, trace, warn, warnf, with_error,
    with_field, with_fields,
};
pub use config::{init, init_default, init_from_file, LoggingConfig, OutputFormat};
pub use context::Context;
pub use entry::{Entry, Fields, IntoFields, Level, Logger, Record, ERROR_FIELD};
pub use error::{LoggingError, LoggingResult};
pub use handlers::{DiscardHandler, Handler, JsonHandler, MemoryHandler, TracingHandler};
pub use timing::{Trace, DURATION_FIELD};

/// Debug level formatted message through the context's entry
///
/// ```
/// # let ctx = ctxlog::Context::background();
/// ctxlog::debugf!(&ctx, "retrying in {}ms", 250);
/// ```
#[macro_export]
macro_rules! debugf {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::debugf($ctx, format_args!($($arg)+))
    };
}

/// Info level formatted message through the context's entry
#[macro_export]
macro_rules! infof {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::infof($ctx, format_args!($($arg)+))
    };
}

/// Warn level formatted message through the context's entry
#[macro_export]
macro_rules! warnf {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::warnf($ctx, format_args!($($arg)+))
    };
}

/// Error level formatted message through the context's entry
#[macro_export]
macro_rules! errorf {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::errorf($ctx, format_args!($($arg)+))
    };
}

/// Fatal level formatted message through the context's entry, followed by
/// an exit
#[macro_export]
macro_rules! fatalf {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::fatalf($ctx, format_args!($($arg)+))
    };
}

/// Macro for initializing logging at program start
#[macro_export]
macro_rules! init_logging {
    () => {
        $crate::init_default().expect("Failed to initialize logging system")
    };
    ($config:expr) => {
        $crate::init($config).expect("Failed to initialize logging system")
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
