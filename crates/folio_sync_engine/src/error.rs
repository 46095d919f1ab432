//! Error types for the sync engine.

use folio_core::CoreError;
use folio_protocol::ValidationError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The provider is not authenticated or could not connect.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transient or permanent I/O failure against the provider.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote manifest moved since it was fetched.
    #[error("version conflict: expected remote version {expected:?}, found {actual:?}")]
    Conflict {
        /// Version the upload was based on.
        expected: Option<u64>,
        /// Version the remote actually holds.
        actual: Option<u64>,
    },

    /// A merged record failed the schema gate.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A checkpoint blob or remote manifest is missing or undecodable.
    #[error("corruption: {0}")]
    Corruption(String),

    /// Local state error.
    #[error("core error: {0}")]
    Core(CoreError),

    /// The orchestrator has not been initialized, or was disconnected by a
    /// restore.
    #[error("sync not initialized")]
    NotInitialized,
}

impl SyncError {
    /// Creates an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Creates a retryable network error.
    pub fn network_retryable(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable network error.
    pub fn network_fatal(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { retryable, .. } => *retryable,
            SyncError::Conflict { .. } => true,
            _ => false,
        }
    }

    /// Returns true for an optimistic-concurrency rejection.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict { .. })
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(inner) => SyncError::Validation(inner),
            err if err.is_corruption() => SyncError::Corruption(err.to_string()),
            err => SyncError::Core(err),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::network_retryable(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Corruption(format!("remote manifest: {err}"))
    }
}
