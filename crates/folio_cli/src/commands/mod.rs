//! CLI command implementations.

pub mod checkpoint;
pub mod merge;
pub mod sync;
pub mod validate;

use folio_core::{
    CheckpointConfig, CheckpointStore, CoreResult, MemoryDocument, ReplicaStore, SyncState,
    DEFAULT_RETENTION,
};
use folio_protocol::Manifest;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Replica file inside a library directory.
pub const REPLICA_FILE: &str = "replica.bin";

/// Checkpoint log inside a library directory.
pub const CHECKPOINT_FILE: &str = "checkpoints.log";

/// Device id remembered between `sync` runs.
pub const DEVICE_FILE: &str = "device.id";

/// Errors the commands report on top of library errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// The directory holds no library.
    #[error("no library found at {0}")]
    NoLibrary(PathBuf),

    /// An option value was not understood.
    #[error("invalid {option}: {value}")]
    InvalidOption {
        /// Option name.
        option: &'static str,
        /// Rejected value.
        value: String,
    },

    /// Some records failed validation.
    #[error("{0} record(s) failed validation")]
    InvalidRecords(usize),
}

/// Reads a manifest file.
pub fn read_manifest(path: &Path) -> Result<Manifest, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    Ok(Manifest::from_slice(&bytes)?)
}

/// Opens the live state of the library at `path`.
pub fn open_state(path: &Path) -> CoreResult<SyncState<MemoryDocument>> {
    let replica = ReplicaStore::open(&path.join(REPLICA_FILE))?;
    SyncState::with_replica(MemoryDocument::new(), replica)
}

/// Opens the checkpoint store of the library at `path`.
pub fn open_checkpoints(path: &Path) -> CoreResult<CheckpointStore> {
    CheckpointStore::open(
        &path.join(CHECKPOINT_FILE),
        CheckpointConfig::new(DEFAULT_RETENTION),
    )
}

/// Fails unless `path` already holds a replica.
pub fn require_library(path: &Path) -> Result<(), CliError> {
    if path.join(REPLICA_FILE).exists() {
        Ok(())
    } else {
        Err(CliError::NoLibrary(path.to_path_buf()))
    }
}

/// Formats Unix milliseconds as seconds with a fraction.
pub fn format_timestamp(millis: u64) -> String {
    format!("{}.{:03}", millis / 1000, millis % 1000)
}
