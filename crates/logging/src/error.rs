//! Error types for the logging facade

use std::io;

/// Logging error types
#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error("Logging system already initialized")]
    AlreadyInitialized,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Subscriber error: {0}")]
    Subscriber(String),

    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    #[error("Invalid output format: {0}")]
    InvalidFormat(String),
}

/// Result type for logging operations
pub type LoggingResult<T> = Result<T, LoggingError>;
