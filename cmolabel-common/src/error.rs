//! Common error types for the CMO label generator

use thiserror::Error;

/// Common result type for label-generator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the label-generator crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload could not be deserialized
    #[error("Parse error: {0}")]
    Parse(String),

    /// Label comparison received input that parses as neither dialect
    #[error("Invalid label comparison: {0}")]
    InvalidLabel(String),

    /// Message bus or sample-store transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// New work submitted after drain has begun
    #[error("Service shutting down, no longer accepting work")]
    ShuttingDown,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
