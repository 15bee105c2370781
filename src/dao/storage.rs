use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be reached or rejected the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable context.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Request exceeded a backend-enforced size cap.
    #[error("{what} limited to {limit} entries, got {requested}")]
    LimitExceeded {
        /// Capped quantity (`containment query ids`, `batch writes`).
        what: &'static str,
        /// Backend cap.
        limit: usize,
        /// Size of the rejected request.
        requested: usize,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Reject a request of `requested` entries when it exceeds `limit`.
    pub fn check_limit(what: &'static str, limit: usize, requested: usize) -> StorageResult<()> {
        if requested > limit {
            Err(StorageError::LimitExceeded {
                what,
                limit,
                requested,
            })
        } else {
            Ok(())
        }
    }
}
