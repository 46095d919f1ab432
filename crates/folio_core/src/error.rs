//! Error types for Folio core.

use crate::checkpoint::CheckpointId;
use folio_protocol::{ProtocolError, ValidationError};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Folio core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] folio_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Manifest could not be decoded or encoded.
    #[error("manifest error: {0}")]
    Manifest(#[from] ProtocolError),

    /// Stored bytes failed their integrity check.
    #[error("corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// No checkpoint with this id exists.
    #[error("checkpoint {0} not found")]
    CheckpointNotFound(CheckpointId),

    /// Bytes are not in a format this version understands.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A record was rejected by the schema gate.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The persisted replica cannot be used.
    #[error("replica unavailable: {message}")]
    ReplicaUnavailable {
        /// Why the replica is unusable.
        message: String,
    },
}

impl CoreError {
    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a replica unavailable error.
    pub fn replica_unavailable(message: impl Into<String>) -> Self {
        Self::ReplicaUnavailable {
            message: message.into(),
        }
    }

    /// Returns true if stored data is damaged or unreadable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. } | Self::InvalidFormat { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_classification() {
        assert!(CoreError::corruption("crc").is_corruption());
        assert!(CoreError::invalid_format("magic").is_corruption());
        assert!(!CoreError::CheckpointNotFound(3).is_corruption());
    }

    #[test]
    fn display_names_the_checkpoint() {
        assert_eq!(
            CoreError::CheckpointNotFound(42).to_string(),
            "checkpoint 42 not found"
        );
    }
}
