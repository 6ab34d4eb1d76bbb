//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use heed::MdbError;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Rejected key, value or configuration
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored expiry metadata has the wrong length
    #[error("Malformed expiry record: expected {expected} bytes, got {actual}")]
    Format { expected: usize, actual: usize },

    /// The store was closed before the call
    #[error("Cache store has been closed")]
    Disposed,

    /// The engine refused a write because its map is full
    #[error("Storage exhausted: the configured max size has been reached")]
    StorageExhausted,

    /// Any other failure reported by the storage engine
    #[error("Engine error: {0}")]
    Engine(String),

    /// A blocking task behind an async call did not complete
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Returns true for errors caused by the caller's input rather than the store.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidArgument(_) | CacheError::Format { .. }
        )
    }
}

// == Engine Error Conversion ==
impl From<heed::Error> for CacheError {
    fn from(err: heed::Error) -> Self {
        match err {
            heed::Error::Mdb(MdbError::MapFull) => CacheError::StorageExhausted,
            other => CacheError::Engine(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Engine(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
