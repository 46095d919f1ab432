//! Manifest fixtures and file-backed test helpers.

use folio_core::{CheckpointConfig, CheckpointStore, MemoryDocument, ReplicaStore, SyncState};
use folio_protocol::{
    Annotation, AnnotationKind, BookEntry, BookMetadata, DeviceInfo, LexiconRule, Manifest,
    ReadingHistory, ReadingListEntry, ReadingStatus, Session, TtsPosition,
};
use std::path::PathBuf;
use tempfile::TempDir;

/// A fresh random UUID string.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A range CFI inside spine item `item`, from `start` to `end` characters.
pub fn range(item: u32, start: u32, end: u32) -> String {
    format!("epubcfi(/6/{item}!/4/2,/1:{start},/1:{end})")
}

/// A book with a title and a `last_read` stamp.
pub fn book(id: &str, title: &str, last_read: u64) -> BookEntry {
    BookEntry {
        metadata: BookMetadata {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            last_read: Some(last_read),
            ..BookMetadata::default()
        },
        history: ReadingHistory {
            book_id: id.to_string(),
            ..ReadingHistory::default()
        },
        annotations: Vec::new(),
    }
}

/// A highlight on `book_id` with a valid UUID.
pub fn highlight(book_id: &str, text: &str) -> Annotation {
    Annotation {
        id: new_id(),
        book_id: book_id.to_string(),
        cfi_range: range(4, 0, text.len() as u32),
        text: text.to_string(),
        kind: AnnotationKind::Highlight,
        color: "yellow".to_string(),
        note: None,
        created: 1,
    }
}

/// A plain-text lexicon rule with a valid UUID.
pub fn lexicon_rule(original: &str, replacement: &str) -> LexiconRule {
    LexiconRule {
        id: new_id(),
        original: original.to_string(),
        replacement: replacement.to_string(),
        created: 1,
        is_regex: None,
        book_id: None,
    }
}

/// A reading-list entry keyed by `filename`.
pub fn reading_entry(filename: &str, percentage: f64, last_updated: u64) -> ReadingListEntry {
    ReadingListEntry {
        filename: filename.to_string(),
        title: filename.trim_end_matches(".epub").to_string(),
        author: "Unknown".to_string(),
        status: Some(ReadingStatus::CurrentlyReading),
        percentage,
        rating: None,
        last_updated,
        isbn: None,
    }
}

/// A TTS position stamped `updated_at`.
pub fn tts_position(cfi: &str, updated_at: u64) -> TtsPosition {
    TtsPosition {
        cfi: Some(cfi.to_string()),
        section_index: None,
        queue_index: None,
        updated_at,
    }
}

/// A reading session.
pub fn session(timestamp: u64, kind: &str) -> Session {
    Session {
        timestamp,
        kind: kind.to_string(),
        cfi_range: None,
        label: None,
    }
}

/// Fluent construction of test manifests.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    manifest: Manifest,
}

impl ManifestBuilder {
    /// Starts an empty manifest written by `device_id`.
    pub fn new(device_id: &str) -> Self {
        Self {
            manifest: Manifest::new(device_id),
        }
    }

    /// Sets the version.
    pub fn version(mut self, version: u64) -> Self {
        self.manifest.version = version;
        self
    }

    /// Adds or replaces a book.
    pub fn book(mut self, id: &str, entry: BookEntry) -> Self {
        self.manifest.books.insert(id.to_string(), entry);
        self
    }

    /// Appends an annotation to an existing book.
    ///
    /// # Panics
    ///
    /// Panics if the book was not added first.
    pub fn annotation(mut self, book_id: &str, annotation: Annotation) -> Self {
        self.manifest
            .books
            .get_mut(book_id)
            .expect("add the book before its annotations")
            .annotations
            .push(annotation);
        self
    }

    /// Adds read ranges to an existing book.
    ///
    /// # Panics
    ///
    /// Panics if the book was not added first.
    pub fn read_ranges(mut self, book_id: &str, ranges: &[String]) -> Self {
        self.manifest
            .books
            .get_mut(book_id)
            .expect("add the book before its ranges")
            .history
            .read_ranges
            .extend(ranges.iter().cloned());
        self
    }

    /// Appends a lexicon rule.
    pub fn lexicon(mut self, rule: LexiconRule) -> Self {
        self.manifest.lexicon.push(rule);
        self
    }

    /// Adds a reading-list entry under its filename.
    pub fn reading(mut self, entry: ReadingListEntry) -> Self {
        self.manifest
            .reading_list
            .insert(entry.filename.clone(), entry);
        self
    }

    /// Adds a TTS position for `book_id`.
    pub fn tts(mut self, book_id: &str, position: TtsPosition) -> Self {
        self.manifest
            .transient_state
            .tts_positions
            .insert(book_id.to_string(), position);
        self
    }

    /// Registers a device.
    pub fn device(mut self, id: &str, name: &str, last_active: u64) -> Self {
        self.manifest.device_registry.insert(
            id.to_string(),
            DeviceInfo {
                name: name.to_string(),
                platform: "test".to_string(),
                user_agent: None,
                last_active,
            },
        );
        self
    }

    /// Sets an unknown top-level key.
    pub fn extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.manifest.extra.insert(key.to_string(), value);
        self
    }

    /// Finishes the manifest.
    pub fn build(self) -> Manifest {
        self.manifest
    }
}

/// A library rooted in a temporary directory.
///
/// The directory is removed when the library is dropped.
pub struct TestLibrary {
    dir: TempDir,
}

impl Default for TestLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLibrary {
    /// Creates an empty library directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of the persisted replica.
    pub fn replica_path(&self) -> PathBuf {
        self.dir.path().join("replica.bin")
    }

    /// Path of the checkpoint log.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.path().join("checkpoints.log")
    }

    /// A folder usable as a directory remote.
    pub fn remote_dir(&self) -> PathBuf {
        self.dir.path().join("remote")
    }

    /// Opens the live state from the replica on disk.
    ///
    /// # Panics
    ///
    /// Panics if the replica cannot be opened or loaded.
    pub fn open_state(&self) -> SyncState<MemoryDocument> {
        let replica = ReplicaStore::open(&self.replica_path()).expect("Failed to open replica");
        SyncState::with_replica(MemoryDocument::new(), replica).expect("Failed to load replica")
    }

    /// Opens the file-backed checkpoint store.
    ///
    /// # Panics
    ///
    /// Panics if the log cannot be opened.
    pub fn open_checkpoints(&self, retention: usize) -> CheckpointStore {
        CheckpointStore::open(&self.checkpoint_path(), CheckpointConfig::new(retention))
            .expect("Failed to open checkpoint log")
    }
}
