//! Checkpoint creation, inspection and restore.

use super::file_log::FileCheckpointLog;
use super::log::{CheckpointLog, MemoryCheckpointLog};
use super::{Checkpoint, CheckpointId, CheckpointInfo, NewCheckpoint};
use crate::clock::{Clock, SystemClock};
use crate::config::CheckpointConfig;
use crate::document::ReplicatedDocument;
use crate::error::{CoreError, CoreResult};
use crate::snapshot::{decode_snapshot, encode_snapshot};
use crate::state::SyncState;
use async_trait::async_trait;
use folio_protocol::Manifest;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Side effects a restore needs from the rest of the application.
#[async_trait]
pub trait RestoreHooks: Send + Sync {
    /// Stops all sync activity. Called before anything is wiped.
    async fn disconnect_sync(&self);

    /// Asks the application to reload so every view sees the restored state.
    async fn request_reload(&self);
}

/// How a restore was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// The replica was wiped and rebuilt from a fresh document instance.
    Replica,
    /// No usable replica: the live document was replaced in place.
    InPlace,
}

/// Result of a successful restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// The restored checkpoint.
    pub checkpoint: CheckpointInfo,
    /// How it was restored.
    pub mode: RestoreMode,
}

/// Record counts of one manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionCounts {
    /// Books.
    pub books: usize,
    /// Annotations across all books.
    pub annotations: usize,
    /// Lexicon rules.
    pub lexicon: usize,
    /// Reading-list rows.
    pub reading_list: usize,
    /// TTS positions.
    pub tts_positions: usize,
    /// Registered devices.
    pub devices: usize,
}

impl CollectionCounts {
    /// Counts the records of `manifest`.
    pub fn of(manifest: &Manifest) -> Self {
        Self {
            books: manifest.books.len(),
            annotations: manifest.annotation_count(),
            lexicon: manifest.lexicon.len(),
            reading_list: manifest.reading_list.len(),
            tts_positions: manifest.transient_state.tts_positions.len(),
            devices: manifest.device_registry.len(),
        }
    }
}

/// What restoring a checkpoint would change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointDiff {
    /// The inspected checkpoint.
    pub checkpoint: CheckpointInfo,
    /// Manifest version stored in the checkpoint.
    pub checkpoint_version: u64,
    /// Manifest version of the live document.
    pub live_version: u64,
    /// Counts in the checkpoint.
    pub checkpoint_counts: CollectionCounts,
    /// Counts in the live document.
    pub live_counts: CollectionCounts,
    /// Books the checkpoint has and the live document lacks.
    pub books_restored: Vec<String>,
    /// Books the live document has and the checkpoint lacks.
    pub books_dropped: Vec<String>,
}

/// Creates, lists, inspects and restores checkpoints.
pub struct CheckpointStore {
    log: Arc<dyn CheckpointLog>,
    config: CheckpointConfig,
    clock: Arc<dyn Clock>,
}

impl CheckpointStore {
    /// Creates a store over `log`.
    pub fn new(log: Arc<dyn CheckpointLog>, config: CheckpointConfig) -> Self {
        Self {
            log,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Creates a store with an in-memory log.
    pub fn in_memory(config: CheckpointConfig) -> Self {
        Self::new(Arc::new(MemoryCheckpointLog::new()), config)
    }

    /// Opens a store with a file-backed log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened.
    pub fn open(path: &Path, config: CheckpointConfig) -> CoreResult<Self> {
        Ok(Self::new(Arc::new(FileCheckpointLog::open(path)?), config))
    }

    /// Replaces the clock used for timestamps and throttling.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The store configuration.
    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Snapshots the whole document and appends it to the log, pruning the
    /// oldest entries beyond the retention limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be encoded or the log write
    /// fails.
    pub fn create_checkpoint<D: ReplicatedDocument>(
        &self,
        state: &SyncState<D>,
        trigger: &str,
    ) -> CoreResult<CheckpointId> {
        let blob = encode_snapshot(&state.snapshot()?)?;
        let size = blob.len();
        let (id, pruned) = self.log.insert_and_prune(
            NewCheckpoint {
                timestamp: self.clock.now_millis(),
                trigger: trigger.to_string(),
                blob,
            },
            self.config.retention,
        )?;

        info!(id, trigger, size, "created checkpoint");
        if !pruned.is_empty() {
            debug!(pruned = ?pruned, "pruned old checkpoints");
        }
        Ok(id)
    }

    /// Creates a checkpoint unless one with the same trigger is younger
    /// than `interval`.
    ///
    /// # Errors
    ///
    /// See [`CheckpointStore::create_checkpoint`].
    pub fn create_automatic_checkpoint<D: ReplicatedDocument>(
        &self,
        state: &SyncState<D>,
        trigger: &str,
        interval: Duration,
    ) -> CoreResult<Option<CheckpointId>> {
        if let Some(latest) = self.log.latest_with_trigger(trigger)? {
            let age = self.clock.now_millis().saturating_sub(latest.timestamp);
            if u128::from(age) < interval.as_millis() {
                debug!(trigger, age_ms = age, "skipping automatic checkpoint");
                return Ok(None);
            }
        }
        self.create_checkpoint(state, trigger).map(Some)
    }

    /// All checkpoints, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn list_checkpoints(&self) -> CoreResult<Vec<CheckpointInfo>> {
        self.log.list()
    }

    /// Fetches one checkpoint with its blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn get_checkpoint(&self, id: CheckpointId) -> CoreResult<Option<Checkpoint>> {
        self.log.get(id)
    }

    /// Decodes a checkpoint into an isolated document and compares it with
    /// the live state. Nothing is modified.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CheckpointNotFound`], a corruption error for a
    /// damaged blob, or a decode error.
    pub fn inspect_checkpoint<D: ReplicatedDocument>(
        &self,
        id: CheckpointId,
        state: &SyncState<D>,
    ) -> CoreResult<CheckpointDiff> {
        let checkpoint = self.log.get(id)?.ok_or(CoreError::CheckpointNotFound(id))?;
        let mut isolated = state.document().fresh();
        isolated.apply_update(decode_snapshot(&checkpoint.blob)?)?;

        let stored = isolated.read_manifest()?;
        let live = state.manifest()?;

        Ok(CheckpointDiff {
            checkpoint_version: stored.version,
            live_version: live.version,
            checkpoint_counts: CollectionCounts::of(&stored),
            live_counts: CollectionCounts::of(&live),
            books_restored: stored
                .books
                .keys()
                .filter(|id| !live.books.contains_key(*id))
                .cloned()
                .collect(),
            books_dropped: live
                .books
                .keys()
                .filter(|id| !stored.books.contains_key(*id))
                .cloned()
                .collect(),
            checkpoint: checkpoint.info,
        })
    }

    /// Replaces the live state with a checkpoint.
    ///
    /// The blob is fetched, verified and imported into a fresh document
    /// instance first; a missing, damaged or undecodable checkpoint leaves
    /// everything untouched. Then, in order: sync is disconnected, the
    /// persisted replica is wiped, the fresh instance is persisted and
    /// installed as the live document, and a reload is requested.
    ///
    /// Without a usable replica the live document is replaced in place in
    /// one step instead.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CheckpointNotFound`], a corruption error, a
    /// decode error, or a replica error.
    pub async fn restore_checkpoint<D, H>(
        &self,
        id: CheckpointId,
        state: &mut SyncState<D>,
        hooks: &H,
    ) -> CoreResult<RestoreOutcome>
    where
        D: ReplicatedDocument,
        H: RestoreHooks + ?Sized,
    {
        let checkpoint = self.log.get(id)?.ok_or(CoreError::CheckpointNotFound(id))?;
        let payload = decode_snapshot(&checkpoint.blob)?;
        let mut restored = state.document().fresh();
        restored.apply_update(payload)?;
        info!(id, trigger = %checkpoint.info.trigger, "restoring checkpoint");

        if !state.has_available_replica() {
            warn!(id, "no usable replica, restoring in place without an isolated import (unsafe)");
            hooks.disconnect_sync().await;
            state.replace_in_place(payload)?;
            hooks.request_reload().await;
            return Ok(RestoreOutcome {
                checkpoint: checkpoint.info,
                mode: RestoreMode::InPlace,
            });
        }

        hooks.disconnect_sync().await;
        info!(id, "sync disconnected");

        if let Some(replica) = state.replica() {
            replica.wipe()?;
        }
        info!(id, "persisted replica wiped");

        state.install(restored)?;
        info!(id, "restored document installed");

        hooks.request_reload().await;
        Ok(RestoreOutcome {
            checkpoint: checkpoint.info,
            mode: RestoreMode::Replica,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::document::MemoryDocument;
    use crate::replica::ReplicaStore;
    use folio_protocol::BookEntry;
    use folio_storage::{InMemoryBackend, StorageBackend, StorageResult};
    use parking_lot::Mutex;

    type Events = Arc<Mutex<Vec<String>>>;

    struct Recording {
        events: Events,
    }

    #[async_trait]
    impl RestoreHooks for Recording {
        async fn disconnect_sync(&self) {
            self.events.lock().push("disconnect".into());
        }

        async fn request_reload(&self) {
            self.events.lock().push("reload".into());
        }
    }

    struct RecordingBackend {
        inner: InMemoryBackend,
        events: Events,
    }

    impl StorageBackend for RecordingBackend {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&self, data: &[u8]) -> StorageResult<u64> {
            self.events.lock().push("replica.append".into());
            self.inner.append(data)
        }

        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }

        fn sync(&self) -> StorageResult<()> {
            self.inner.sync()
        }

        fn truncate(&self, new_size: u64) -> StorageResult<()> {
            self.events.lock().push(format!("replica.truncate({new_size})"));
            self.inner.truncate(new_size)
        }

        fn replace(&self, data: &[u8]) -> StorageResult<()> {
            self.events.lock().push("replica.replace".into());
            self.inner.replace(data)
        }
    }

    fn manifest_with_books(version: u64, books: &[&str]) -> Manifest {
        let mut manifest = Manifest::new("d1");
        manifest.version = version;
        for book in books {
            manifest.books.insert((*book).to_string(), BookEntry::default());
        }
        manifest
    }

    fn recorded_state(events: &Events) -> (SyncState<MemoryDocument>, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend {
            inner: InMemoryBackend::new(),
            events: events.clone(),
        });
        let replica = ReplicaStore::new(backend.clone());
        let state = SyncState::with_replica(MemoryDocument::new(), replica).unwrap();
        (state, backend)
    }

    #[test]
    fn eleven_checkpoints_keep_ten_and_drop_the_oldest() {
        let state = SyncState::new(MemoryDocument::new());
        let store = CheckpointStore::in_memory(CheckpointConfig::default());

        let mut ids = Vec::new();
        for _ in 0..11 {
            ids.push(store.create_checkpoint(&state, "manual").unwrap());
        }

        let listed = store.list_checkpoints().unwrap();
        assert_eq!(listed.len(), 10);
        assert!(listed.iter().all(|c| c.id != ids[0]));
        assert!(store.get_checkpoint(ids[0]).unwrap().is_none());
    }

    #[test]
    fn automatic_checkpoints_are_throttled_per_trigger() {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = CheckpointStore::in_memory(CheckpointConfig::default()).with_clock(clock.clone());
        let state = SyncState::new(MemoryDocument::new());
        let interval = Duration::from_millis(1_000);

        assert!(store
            .create_automatic_checkpoint(&state, "pre-sync", interval)
            .unwrap()
            .is_some());

        clock.advance(Duration::from_millis(500));
        assert!(store
            .create_automatic_checkpoint(&state, "pre-sync", interval)
            .unwrap()
            .is_none());
        // A different trigger is not throttled by pre-sync.
        assert!(store
            .create_automatic_checkpoint(&state, "interval", interval)
            .unwrap()
            .is_some());

        clock.advance(Duration::from_millis(1_500));
        assert!(store
            .create_automatic_checkpoint(&state, "pre-sync", interval)
            .unwrap()
            .is_some());
        assert_eq!(store.list_checkpoints().unwrap().len(), 3);
    }

    #[test]
    fn inspect_reports_differences_without_touching_state() {
        let mut state = SyncState::new(MemoryDocument::new());
        state.commit(&manifest_with_books(1, &["a", "b"])).unwrap();
        let store = CheckpointStore::in_memory(CheckpointConfig::default());
        let id = store.create_checkpoint(&state, "manual").unwrap();

        state.commit(&manifest_with_books(2, &["b", "c"])).unwrap();
        let diff = store.inspect_checkpoint(id, &state).unwrap();

        assert_eq!(diff.checkpoint_version, 1);
        assert_eq!(diff.live_version, 2);
        assert_eq!(diff.books_restored, vec!["a".to_string()]);
        assert_eq!(diff.books_dropped, vec!["c".to_string()]);
        assert_eq!(diff.checkpoint_counts.books, 2);
        assert_eq!(state.manifest().unwrap().version, 2);
    }

    #[tokio::test]
    async fn restore_runs_steps_in_order() {
        let events: Events = Arc::default();
        let (mut state, _) = recorded_state(&events);
        state.commit(&manifest_with_books(1, &["a"])).unwrap();

        let store = CheckpointStore::in_memory(CheckpointConfig::default());
        let id = store.create_checkpoint(&state, "manual").unwrap();
        state.commit(&manifest_with_books(2, &["a", "b"])).unwrap();

        events.lock().clear();
        let hooks = Recording {
            events: events.clone(),
        };
        let outcome = store.restore_checkpoint(id, &mut state, &hooks).await.unwrap();

        assert_eq!(outcome.mode, RestoreMode::Replica);
        assert_eq!(
            *events.lock(),
            vec![
                "disconnect",
                "replica.truncate(0)",
                "replica.replace",
                "reload",
            ]
        );
        assert_eq!(state.manifest().unwrap(), manifest_with_books(1, &["a"]));
    }

    #[tokio::test]
    async fn restored_state_is_what_the_replica_holds() {
        let events: Events = Arc::default();
        let (mut state, backend) = recorded_state(&events);
        state.commit(&manifest_with_books(4, &["x"])).unwrap();
        let store = CheckpointStore::in_memory(CheckpointConfig::default());
        let id = store.create_checkpoint(&state, "manual").unwrap();
        state.commit(&manifest_with_books(5, &[])).unwrap();

        let hooks = Recording {
            events: events.clone(),
        };
        store.restore_checkpoint(id, &mut state, &hooks).await.unwrap();

        let reloaded =
            SyncState::with_replica(MemoryDocument::new(), ReplicaStore::new(backend)).unwrap();
        assert_eq!(reloaded.manifest().unwrap().version, 4);
    }

    #[tokio::test]
    async fn missing_checkpoint_touches_nothing() {
        let events: Events = Arc::default();
        let (mut state, _) = recorded_state(&events);
        let store = CheckpointStore::in_memory(CheckpointConfig::default());
        events.lock().clear();

        let hooks = Recording {
            events: events.clone(),
        };
        let err = store.restore_checkpoint(99, &mut state, &hooks).await.unwrap_err();
        assert!(matches!(err, CoreError::CheckpointNotFound(99)));
        assert!(events.lock().is_empty());
    }

    #[tokio::test]
    async fn corrupt_blob_aborts_before_disconnect() {
        let events: Events = Arc::default();
        let (mut state, _) = recorded_state(&events);
        state.commit(&manifest_with_books(3, &["keep"])).unwrap();

        let log = Arc::new(MemoryCheckpointLog::new());
        let mut blob = encode_snapshot(&state.snapshot().unwrap()).unwrap();
        let middle = blob.len() / 2;
        blob[middle] ^= 0xFF;
        let (id, _) = log
            .insert_and_prune(
                NewCheckpoint {
                    timestamp: 1,
                    trigger: "manual".into(),
                    blob,
                },
                10,
            )
            .unwrap();
        let store = CheckpointStore::new(log, CheckpointConfig::default());
        events.lock().clear();

        let hooks = Recording {
            events: events.clone(),
        };
        let err = store.restore_checkpoint(id, &mut state, &hooks).await.unwrap_err();
        assert!(err.is_corruption());
        assert!(events.lock().is_empty());
        assert_eq!(state.manifest().unwrap().version, 3);
    }

    #[tokio::test]
    async fn undecodable_blob_aborts_before_disconnect() {
        let events: Events = Arc::default();
        let (mut state, backend) = recorded_state(&events);
        state.commit(&manifest_with_books(3, &["keep"])).unwrap();

        let log = Arc::new(MemoryCheckpointLog::new());
        let blob = encode_snapshot(b"checksummed but not a document").unwrap();
        let (id, _) = log
            .insert_and_prune(
                NewCheckpoint {
                    timestamp: 1,
                    trigger: "manual".into(),
                    blob,
                },
                10,
            )
            .unwrap();
        let store = CheckpointStore::new(log, CheckpointConfig::default());
        events.lock().clear();

        let hooks = Recording {
            events: events.clone(),
        };
        assert!(store.restore_checkpoint(id, &mut state, &hooks).await.is_err());
        assert!(events.lock().is_empty());
        assert_eq!(state.manifest().unwrap().version, 3);

        let reloaded =
            SyncState::with_replica(MemoryDocument::new(), ReplicaStore::new(backend)).unwrap();
        assert_eq!(reloaded.manifest().unwrap().version, 3);
    }

    #[tokio::test]
    async fn without_replica_restore_is_in_place() {
        let mut state = SyncState::new(MemoryDocument::new());
        state.commit(&manifest_with_books(1, &["a"])).unwrap();
        let store = CheckpointStore::in_memory(CheckpointConfig::default());
        let id = store.create_checkpoint(&state, "manual").unwrap();
        state.commit(&manifest_with_books(2, &["b"])).unwrap();

        let events: Events = Arc::default();
        let hooks = Recording {
            events: events.clone(),
        };
        let outcome = store.restore_checkpoint(id, &mut state, &hooks).await.unwrap();

        assert_eq!(outcome.mode, RestoreMode::InPlace);
        assert_eq!(*events.lock(), vec!["disconnect", "reload"]);
        assert_eq!(state.manifest().unwrap(), manifest_with_books(1, &["a"]));
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.log");
        let mut state = SyncState::new(MemoryDocument::new());
        state.commit(&manifest_with_books(7, &["a"])).unwrap();

        let id = {
            let store = CheckpointStore::open(&path, CheckpointConfig::default()).unwrap();
            store.create_checkpoint(&state, "manual").unwrap()
        };

        let store = CheckpointStore::open(&path, CheckpointConfig::default()).unwrap();
        let diff = store.inspect_checkpoint(id, &state).unwrap();
        assert_eq!(diff.checkpoint_version, 7);
    }

    #[test]
    fn file_backed_store_stays_bounded_by_retention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.log");
        let names: Vec<String> = (0..200).map(|i| format!("book-{i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut state = SyncState::new(MemoryDocument::new());
        state.commit(&manifest_with_books(1, &names)).unwrap();

        let store = CheckpointStore::open(&path, CheckpointConfig::new(2)).unwrap();
        store.create_checkpoint(&state, "manual").unwrap();
        store.create_checkpoint(&state, "manual").unwrap();
        let retained = std::fs::metadata(&path).unwrap().len();

        for _ in 0..98 {
            store.create_checkpoint(&state, "manual").unwrap();
        }
        assert_eq!(store.list_checkpoints().unwrap().len(), 2);
        assert!(std::fs::metadata(&path).unwrap().len() <= 3 * retained);
    }
}
