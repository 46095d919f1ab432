//! Error types for the protocol crate.

use crate::validate::RecordKind;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding manifests.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The manifest JSON could not be parsed.
    #[error("manifest decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A record failed the schema gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} record {key:?}: {reason}")]
pub struct ValidationError {
    /// Which schema the record was checked against.
    pub kind: RecordKind,
    /// Key of the offending record (book id, annotation id, filename...).
    pub key: String,
    /// Human-readable reason.
    pub reason: String,
}

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(kind: RecordKind, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            reason: reason.into(),
        }
    }
}
