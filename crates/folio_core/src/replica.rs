//! The persisted replica: the on-device copy of the document state.

use crate::error::{CoreError, CoreResult};
use crate::snapshot::{decode_snapshot, encode_snapshot};
use folio_storage::{FileBackend, StorageBackend};
use std::path::Path;
use std::sync::Arc;

/// Stores the encoded document state as one framed snapshot.
///
/// Every `save` replaces the previous content. An empty store means no
/// replica has been written yet.
#[derive(Clone)]
pub struct ReplicaStore {
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for ReplicaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaStore").finish_non_exhaustive()
    }
}

impl ReplicaStore {
    /// Creates a replica over `backend`.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Opens a file-backed replica, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Ok(Self::new(Arc::new(FileBackend::open_with_create_dirs(path)?)))
    }

    /// Returns true if the backend can currently serve requests.
    pub fn is_available(&self) -> bool {
        self.backend.probe().is_ok()
    }

    /// Loads the stored document state, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReplicaUnavailable`] if the backend is closed and
    /// a corruption error if the stored snapshot is damaged.
    pub fn load(&self) -> CoreResult<Option<Vec<u8>>> {
        let data = self.backend.read_all().map_err(unavailable)?;
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(decode_snapshot(&data)?.to_vec()))
    }

    /// Replaces the stored state with `state`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReplicaUnavailable`] if the backend is closed.
    pub fn save(&self, state: &[u8]) -> CoreResult<()> {
        let framed = encode_snapshot(state)?;
        self.backend.replace(&framed).map_err(unavailable)
    }

    /// Deletes the stored state.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReplicaUnavailable`] if the backend is closed.
    pub fn wipe(&self) -> CoreResult<()> {
        self.backend.truncate(0).map_err(unavailable)?;
        self.backend.sync().map_err(unavailable)
    }
}

fn unavailable(err: folio_storage::StorageError) -> CoreError {
    if err.is_unavailable() {
        CoreError::replica_unavailable(err.to_string())
    } else {
        CoreError::Storage(err)
    }
}
