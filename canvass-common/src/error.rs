//! Common error types for canvass services

use thiserror::Error;

/// Common result type for canvass operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across canvass services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input, or an update that would break a submission invariant
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error (serialization, corrupt stored values)
    #[error("Internal error: {0}")]
    Internal(String),
}
