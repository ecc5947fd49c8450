//! Storage error types

use thiserror::Error;

/// Errors from a [`super::RatchetStore`] implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Underlying I/O or database failure
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A stored record could not be encoded or decoded
    #[error("storage serialization error: {0}")]
    Serialization(String),
}
