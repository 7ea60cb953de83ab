//! Error types for canvass-sync
//!
//! External failures (spreadsheet, coverage service) are transient by
//! definition here: nothing retries them inline, the next reconciler run does.
//! Store failures are the only ones that can fail an ingestion.

use thiserror::Error;

/// Sync error type
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connection, timeout or other transport failure talking to an external service
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// External service answered with an unexpected status
    #[error("{service} returned HTTP {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// External service answered successfully but the body was not understood
    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    /// Operation does not apply to this submission (e.g. FS step on a non-FS submission)
    #[error("Not applicable: {0}")]
    Ineligible(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Submission Store failure
    #[error(transparent)]
    Store(#[from] canvass_common::Error),
}

impl SyncError {
    /// True for failures of an external system that a later run may repair
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. } | SyncError::Api { .. } | SyncError::Decode { .. }
        )
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
