//! Error types for the scheduler module

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Cadence prediction failures
///
/// Never propagated: callers fall back to a weekly schedule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictionError {
    #[error("no publish timestamps to predict from")]
    EmptyHistory,

    #[error("unparseable publish timestamp: '{0}'")]
    UnparseableTimestamp(String),
}

/// Scheduler-specific errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Catalog read or write failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The offloaded polling worker panicked or was cancelled
    #[error("poll worker failed: {reason}")]
    Worker { reason: String },

    /// The sweep could not list the catalog's sources
    #[error("cannot list sources of {catalog}: {source}")]
    SweepListing {
        catalog: String,
        #[source]
        source: StorageError,
    },
}

impl SchedulerError {
    /// Create a worker error
    pub fn worker(reason: impl Into<String>) -> Self {
        Self::Worker {
            reason: reason.into(),
        }
    }

    /// Whether the catalog was merely busy
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_busy())
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_busy(),
            Self::Worker { .. } => true,
            Self::SweepListing { .. } => false,
        }
    }
}

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::worker(err.to_string())
    }
}
