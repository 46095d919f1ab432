//! The live sync state handle.

use crate::document::ReplicatedDocument;
use crate::error::{CoreError, CoreResult};
use crate::replica::ReplicaStore;
use folio_protocol::{changed_records, Manifest, RecordValidator, SchemaValidator};
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns the live document, its persisted replica and the write gate.
///
/// There is exactly one `SyncState` per library. It is created at startup
/// and moved into whatever drives sync; every read and write of live state
/// goes through it.
pub struct SyncState<D> {
    document: D,
    replica: Option<ReplicaStore>,
    validator: Arc<dyn RecordValidator>,
}

impl<D: ReplicatedDocument> SyncState<D> {
    /// Creates a state with no persisted replica.
    pub fn new(document: D) -> Self {
        Self {
            document,
            replica: None,
            validator: Arc::new(SchemaValidator),
        }
    }

    /// Creates a state backed by `replica`, loading whatever it holds into
    /// `document`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored replica is damaged or unreadable.
    pub fn with_replica(mut document: D, replica: ReplicaStore) -> CoreResult<Self> {
        if let Some(state) = replica.load()? {
            document.apply_update(&state)?;
            debug!(bytes = state.len(), "loaded persisted replica");
        }
        Ok(Self {
            document,
            replica: Some(replica),
            validator: Arc::new(SchemaValidator),
        })
    }

    /// Replaces the record validator.
    pub fn with_validator(mut self, validator: Arc<dyn RecordValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// The live document.
    pub fn document(&self) -> &D {
        &self.document
    }

    /// The persisted replica, if any.
    pub fn replica(&self) -> Option<&ReplicaStore> {
        self.replica.as_ref()
    }

    /// Returns true if a replica is configured and its backend is usable.
    pub fn has_available_replica(&self) -> bool {
        self.replica.as_ref().is_some_and(ReplicaStore::is_available)
    }

    /// Reads the live manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not hold a valid manifest.
    pub fn manifest(&self) -> CoreResult<Manifest> {
        self.document.read_manifest()
    }

    /// Validates `candidate` against the live state, writes it and persists.
    ///
    /// Only records that are new or changed are validated. Nothing is
    /// written if any of them is rejected. If the replica write fails the
    /// live document is put back as it was, so live and persisted state
    /// never diverge. Returns the number of changed records.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for a rejected record, or a write or
    /// persist error.
    pub fn commit(&mut self, candidate: &Manifest) -> CoreResult<usize> {
        let current = self.document.read_manifest()?;
        let changed = changed_records(&current, candidate);
        for record in &changed {
            self.validator.validate(record)?;
        }

        self.transact(|document| document.write_manifest(candidate))?;
        debug!(changed = changed.len(), version = candidate.version, "committed manifest");
        Ok(changed.len())
    }

    /// Applies `change` to a copy of the live manifest and commits it.
    ///
    /// # Errors
    ///
    /// See [`SyncState::commit`].
    pub fn update<F>(&mut self, change: F) -> CoreResult<Manifest>
    where
        F: FnOnce(&mut Manifest),
    {
        let mut manifest = self.document.read_manifest()?;
        change(&mut manifest);
        self.commit(&manifest)?;
        Ok(manifest)
    }

    /// Writes the live document to the replica, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the replica write fails.
    pub fn persist(&self) -> CoreResult<()> {
        if let Some(replica) = &self.replica {
            replica.save(&self.document.encode_state()?)?;
        }
        Ok(())
    }

    /// Encodes the whole live document.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn snapshot(&self) -> CoreResult<Vec<u8>> {
        self.document.encode_state()
    }

    /// Puts the document back to `snapshot` and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be applied or persisted.
    pub fn rollback(&mut self, snapshot: &[u8]) -> CoreResult<()> {
        self.document.replace_with_update(snapshot)?;
        if let Err(err) = self.persist() {
            warn!(error = %err, "rolled back live document but could not persist it");
            return Err(err);
        }
        Ok(())
    }

    /// Runs `change` on the live document directly and persists.
    ///
    /// Bypasses the record gate; for application containers outside the
    /// manifest.
    ///
    /// # Errors
    ///
    /// Returns an error from `change` or from persisting.
    pub fn edit_document<F>(&mut self, change: F) -> CoreResult<()>
    where
        F: FnOnce(&mut D) -> CoreResult<()>,
    {
        self.transact(change)
    }

    /// Runs `change` and persists the result. On any failure the live
    /// document is reverted to its state before `change`.
    fn transact<F>(&mut self, change: F) -> CoreResult<()>
    where
        F: FnOnce(&mut D) -> CoreResult<()>,
    {
        let before = self.document.encode_state()?;
        let result = change(&mut self.document).and_then(|()| self.persist());
        if let Err(err) = result {
            if let Err(revert_err) = self.document.replace_with_update(&before) {
                warn!(error = %revert_err, "could not revert live document after failed write");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Installs `document` as the live document and persists it as the new
    /// replica. Returns the previous document.
    ///
    /// If persisting fails the previous document stays live and is
    /// re-persisted on a best-effort basis.
    pub(crate) fn install(&mut self, document: D) -> CoreResult<D> {
        let previous = std::mem::replace(&mut self.document, document);
        if let Err(err) = self.persist() {
            self.document = previous;
            if let Err(persist_err) = self.persist() {
                warn!(error = %persist_err, "could not re-persist live document");
            }
            return Err(err);
        }
        Ok(previous)
    }

    /// In-place replacement of the live document with an update blob.
    pub(crate) fn replace_in_place(&mut self, update: &[u8]) -> CoreResult<()> {
        self.document.replace_with_update(update)?;
        match self.persist() {
            Err(CoreError::ReplicaUnavailable { .. }) | Ok(()) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl<D: std::fmt::Debug> std::fmt::Debug for SyncState<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncState")
            .field("document", &self.document)
            .field("replica", &self.replica)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use folio_protocol::{Record, ValidationError};
    use folio_storage::InMemoryBackend;

    fn state_with_replica() -> (SyncState<MemoryDocument>, ReplicaStore) {
        let replica = ReplicaStore::new(Arc::new(InMemoryBackend::new()));
        let state = SyncState::with_replica(MemoryDocument::new(), replica.clone()).unwrap();
        (state, replica)
    }

    #[test]
    fn commit_persists_to_replica() {
        let (mut state, replica) = state_with_replica();
        let mut manifest = Manifest::new("d1");
        manifest.version = 2;
        state.commit(&manifest).unwrap();

        let reloaded = SyncState::with_replica(MemoryDocument::new(), replica).unwrap();
        assert_eq!(reloaded.manifest().unwrap().version, 2);
    }

    #[test]
    fn rejected_record_blocks_the_write() {
        let (mut state, _) = state_with_replica();
        let before = state.manifest().unwrap();

        let result = state.update(|m| {
            m.lexicon.push(folio_protocol::LexiconRule {
                id: "not-a-uuid".into(),
                original: "x".into(),
                replacement: "y".into(),
                created: 1,
                is_regex: None,
                book_id: None,
            });
        });
        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(state.manifest().unwrap(), before);
    }

    #[test]
    fn custom_validator_sees_only_changed_records() {
        let (mut state, _) = state_with_replica();
        state
            .update(|m| m.register_device("d1", "Phone", "android", 1))
            .unwrap();

        fn deny_new_devices(record: &Record<'_>) -> Result<(), ValidationError> {
            match record {
                Record::Device { id, .. } if *id != "d1" => {
                    Err(ValidationError::new(record.kind(), record.key(), "unknown device"))
                }
                _ => Ok(()),
            }
        }
        let mut state = state.with_validator(Arc::new(deny_new_devices));

        // Unchanged d1 entry is not re-checked; a new device is.
        state.update(|m| m.version += 1).unwrap();
        assert!(state
            .update(|m| m.register_device("d2", "Laptop", "linux", 2))
            .is_err());
    }

    #[test]
    fn rollback_restores_snapshot() {
        let (mut state, replica) = state_with_replica();
        state.update(|m| m.version = 1).unwrap();
        let snapshot = state.snapshot().unwrap();

        state.update(|m| m.version = 9).unwrap();
        state.rollback(&snapshot).unwrap();
        assert_eq!(state.manifest().unwrap().version, 1);

        let reloaded = SyncState::with_replica(MemoryDocument::new(), replica).unwrap();
        assert_eq!(reloaded.manifest().unwrap().version, 1);
    }

    #[test]
    fn failed_replica_write_reverts_the_live_document() {
        let backend = Arc::new(InMemoryBackend::new());
        let replica = ReplicaStore::new(backend.clone());
        let mut state = SyncState::with_replica(MemoryDocument::new(), replica.clone()).unwrap();
        state.update(|m| m.version = 1).unwrap();
        let before = state.manifest().unwrap();

        backend.set_available(false);
        let result = state.update(|m| {
            m.version = 2;
            m.books.insert("b1".into(), folio_protocol::BookEntry::default());
        });
        assert!(matches!(result, Err(CoreError::ReplicaUnavailable { .. })));
        assert_eq!(state.manifest().unwrap(), before);

        backend.set_available(true);
        let reloaded = SyncState::with_replica(MemoryDocument::new(), replica).unwrap();
        assert_eq!(reloaded.manifest().unwrap(), before);
    }

    #[test]
    fn failed_edit_reverts_application_containers() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut state =
            SyncState::with_replica(MemoryDocument::new(), ReplicaStore::new(backend.clone()))
                .unwrap();
        state
            .edit_document(|d| {
                d.set_text("notes", "kept");
                Ok(())
            })
            .unwrap();

        backend.set_available(false);
        assert!(state
            .edit_document(|d| {
                d.set_text("notes", "lost");
                Ok(())
            })
            .is_err());
        assert_eq!(state.document().text("notes"), Some("kept"));
    }

    #[test]
    fn state_without_replica_still_commits() {
        let mut state = SyncState::new(MemoryDocument::new());
        assert!(!state.has_available_replica());
        state.update(|m| m.version = 3).unwrap();
        assert_eq!(state.manifest().unwrap().version, 3);
    }
}
