//! Event store error types
//!
//! A version mismatch is reported as its own variant so callers can tell a
//! lost race (reload and retry) apart from a failed write.

use thiserror::Error;

use core_kernel::{PortError, SakId};
use domain_koe::KoeError;

/// Errors that can occur while reading or appending case logs
#[derive(Debug, Error)]
pub enum StoreError {
    /// The log changed since the caller read it
    #[error("Concurrency conflict on case {sak_id}: expected version {expected}, actual {actual}")]
    Concurrency {
        sak_id: SakId,
        expected: u64,
        actual: u64,
    },

    /// A batch was empty or spanned more than one case
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// A persisted log violates the `version == len(events)` invariant
    #[error("Corrupt log for case {sak_id}: {message}")]
    Corrupt { sak_id: SakId, message: String },

    /// A persisted event could not be decoded
    #[error("Unreadable event: {0}")]
    Event(#[from] KoeError),

    /// File system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Creates a concurrency conflict
    pub fn concurrency(sak_id: &SakId, expected: u64, actual: u64) -> Self {
        StoreError::Concurrency {
            sak_id: sak_id.clone(),
            expected,
            actual,
        }
    }

    /// Creates an invalid batch error
    pub fn invalid_batch(message: impl Into<String>) -> Self {
        StoreError::InvalidBatch(message.into())
    }

    /// Creates a corrupt log error
    pub fn corrupt(sak_id: &SakId, message: impl Into<String>) -> Self {
        StoreError::Corrupt {
            sak_id: sak_id.clone(),
            message: message.into(),
        }
    }

    /// Returns true for version conflicts
    pub fn is_concurrency(&self) -> bool {
        matches!(self, StoreError::Concurrency { .. })
    }

    /// Returns true if reloading and retrying may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Concurrency { .. } => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionFailed(_) | StoreError::Database(sqlx::Error::PoolTimedOut)
        )
    }
}

impl From<StoreError> for PortError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Concurrency { .. } => PortError::Conflict {
                message: error.to_string(),
            },
            StoreError::InvalidBatch(message) => PortError::validation(message),
            StoreError::ConnectionFailed(message) => PortError::connection(message),
            other => PortError::internal(other.to_string()),
        }
    }
}
