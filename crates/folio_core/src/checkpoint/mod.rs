//! Checkpoints: point-in-time snapshots of the whole document.
//!
//! A checkpoint is taken before every sync cycle and on demand. The log
//! keeps the newest `retention` entries; older ones are pruned in the same
//! transaction that inserts a new one.
//!
//! ## Usage
//!
//! ```rust
//! use folio_core::{CheckpointConfig, CheckpointStore, MemoryDocument, SyncState};
//!
//! let state = SyncState::new(MemoryDocument::new());
//! let store = CheckpointStore::in_memory(CheckpointConfig::default());
//!
//! let id = store.create_checkpoint(&state, "manual").unwrap();
//! assert_eq!(store.list_checkpoints().unwrap()[0].id, id);
//! ```

mod file_log;
mod log;
mod store;

pub use file_log::FileCheckpointLog;
pub use log::{CheckpointLog, MemoryCheckpointLog};
pub use store::{
    CheckpointDiff, CheckpointStore, CollectionCounts, RestoreHooks, RestoreMode, RestoreOutcome,
};

/// Identifier of a checkpoint. Ids increase monotonically and are never
/// reused.
pub type CheckpointId = u64;

/// Checkpoint metadata, without the blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Id.
    pub id: CheckpointId,
    /// Creation time (ms).
    pub timestamp: u64,
    /// What caused the checkpoint (`pre-sync`, `manual`, ...).
    pub trigger: String,
    /// Size of the framed blob in bytes.
    pub size: usize,
}

/// A stored checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Metadata.
    pub info: CheckpointInfo,
    /// The framed snapshot of the document.
    pub blob: Vec<u8>,
}

/// A checkpoint about to be inserted; the log assigns the id.
#[derive(Debug, Clone)]
pub struct NewCheckpoint {
    /// Creation time (ms).
    pub timestamp: u64,
    /// What caused the checkpoint.
    pub trigger: String,
    /// The framed snapshot.
    pub blob: Vec<u8>,
}

/// Sorts newest first: timestamp descending, then id descending.
pub(crate) fn newest_first(entries: &mut [CheckpointInfo]) {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}
