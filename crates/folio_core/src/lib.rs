//! # Folio Core
//!
//! Local state management for Folio: the replicated document, its persisted
//! replica, and the checkpoint store.
//!
//! ## Architecture
//!
//! - [`SyncState`] owns the live [`ReplicatedDocument`], the optional
//!   [`ReplicaStore`] it is persisted to, and the record validator every
//!   manifest write goes through.
//! - [`CheckpointStore`] snapshots the document into a [`CheckpointLog`]
//!   and restores it with a fixed, destructive sequence.
//! - Snapshots and the file log are framed with a magic, a version and a
//!   CRC32 so damaged bytes are never applied.
//!
//! ## Example
//!
//! ```rust
//! use folio_core::{MemoryDocument, SyncState};
//!
//! let mut state = SyncState::new(MemoryDocument::new());
//! state.update(|m| m.register_device("dev-1", "Laptop", "linux", 0)).unwrap();
//! assert_eq!(state.manifest().unwrap().device_registry.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checkpoint;
mod clock;
mod config;
mod document;
mod error;
mod replica;
pub mod snapshot;
mod state;

pub use checkpoint::{
    Checkpoint, CheckpointDiff, CheckpointId, CheckpointInfo, CheckpointLog, CheckpointStore,
    CollectionCounts, FileCheckpointLog, MemoryCheckpointLog, NewCheckpoint, RestoreHooks,
    RestoreMode, RestoreOutcome,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CheckpointConfig, DEFAULT_RETENTION};
pub use document::{Container, MemoryDocument, ReplicatedDocument};
pub use error::{CoreError, CoreResult};
pub use replica::ReplicaStore;
pub use state::SyncState;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
