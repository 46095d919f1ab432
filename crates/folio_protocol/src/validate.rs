//! Record validation, the schema gate in front of every write.
//!
//! A merged manifest is not applied wholesale: [`changed_records`] lists the
//! records that differ from the live state and each one goes through a
//! [`RecordValidator`]. One rejected record rejects the write.

use crate::error::ValidationError;
use crate::manifest::{
    Annotation, BookEntry, DeviceInfo, LexiconRule, Manifest, ReadingListEntry, TtsPosition,
};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// The schema a record is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A book entry (metadata and history).
    Book,
    /// A single annotation.
    Annotation,
    /// A lexicon rule.
    Lexicon,
    /// A reading-list row.
    ReadingList,
    /// A TTS playback position.
    TtsPosition,
    /// A device registry entry.
    Device,
}

impl RecordKind {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Annotation => "annotation",
            Self::Lexicon => "lexicon",
            Self::ReadingList => "reading-list",
            Self::TtsPosition => "tts-position",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate record borrowed from a manifest.
#[derive(Debug, Clone, Copy)]
pub enum Record<'a> {
    /// A book entry. Its annotations are checked separately.
    Book {
        /// Map key.
        id: &'a str,
        /// The entry.
        entry: &'a BookEntry,
    },
    /// An annotation in the book keyed by `book_id`.
    Annotation {
        /// Key of the owning book.
        book_id: &'a str,
        /// The annotation.
        annotation: &'a Annotation,
    },
    /// A lexicon rule.
    Lexicon(&'a LexiconRule),
    /// A reading-list row.
    ReadingList {
        /// Map key.
        filename: &'a str,
        /// The row.
        entry: &'a ReadingListEntry,
    },
    /// A TTS position.
    TtsPosition {
        /// Map key.
        key: &'a str,
        /// The position.
        position: &'a TtsPosition,
    },
    /// A device registry entry.
    Device {
        /// Device id.
        id: &'a str,
        /// The entry.
        info: &'a DeviceInfo,
    },
}

impl Record<'_> {
    /// The schema this record belongs to.
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Book { .. } => RecordKind::Book,
            Record::Annotation { .. } => RecordKind::Annotation,
            Record::Lexicon(_) => RecordKind::Lexicon,
            Record::ReadingList { .. } => RecordKind::ReadingList,
            Record::TtsPosition { .. } => RecordKind::TtsPosition,
            Record::Device { .. } => RecordKind::Device,
        }
    }

    /// The key identifying this record in error messages.
    pub fn key(&self) -> &str {
        match self {
            Record::Book { id, .. } => id,
            Record::Annotation { annotation, .. } => &annotation.id,
            Record::Lexicon(rule) => &rule.id,
            Record::ReadingList { filename, .. } => filename,
            Record::TtsPosition { key, .. } => key,
            Record::Device { id, .. } => id,
        }
    }

    fn reject(&self, reason: impl Into<String>) -> ValidationError {
        ValidationError::new(self.kind(), self.key(), reason)
    }
}

/// Checks a record before it is written.
pub trait RecordValidator: Send + Sync {
    /// Returns an error if `record` must not be written.
    fn validate(&self, record: &Record<'_>) -> Result<(), ValidationError>;
}

impl<F> RecordValidator for F
where
    F: Fn(&Record<'_>) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, record: &Record<'_>) -> Result<(), ValidationError> {
        self(record)
    }
}

/// The default structural rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    /// Creates the default validator.
    pub fn new() -> Self {
        Self
    }
}

impl RecordValidator for SchemaValidator {
    fn validate(&self, record: &Record<'_>) -> Result<(), ValidationError> {
        if record.key().trim().is_empty() {
            return Err(record.reject("empty key"));
        }

        match *record {
            Record::Book { entry, .. } => {
                if let Some(progress) = entry.metadata.progress {
                    if !(0.0..=1.0).contains(&progress) {
                        return Err(record.reject(format!("progress {progress} outside 0..=1")));
                    }
                }
                if entry.history.read_ranges.iter().any(|r| r.trim().is_empty()) {
                    return Err(record.reject("empty read range"));
                }
            }
            Record::Annotation {
                book_id,
                annotation,
            } => {
                if Uuid::parse_str(&annotation.id).is_err() {
                    return Err(record.reject("id is not a UUID"));
                }
                if annotation.book_id != book_id {
                    return Err(record.reject(format!(
                        "bookId {:?} does not match owning book {book_id:?}",
                        annotation.book_id
                    )));
                }
                if annotation.cfi_range.trim().is_empty() {
                    return Err(record.reject("empty cfiRange"));
                }
            }
            Record::Lexicon(rule) => {
                if Uuid::parse_str(&rule.id).is_err() {
                    return Err(record.reject("id is not a UUID"));
                }
                if rule.original.is_empty() {
                    return Err(record.reject("empty original text"));
                }
            }
            Record::ReadingList { filename, entry } => {
                if entry.filename != filename {
                    return Err(record.reject(format!(
                        "filename {:?} does not match its key",
                        entry.filename
                    )));
                }
                if !(0.0..=1.0).contains(&entry.percentage) {
                    return Err(record.reject(format!(
                        "percentage {} outside 0..=1",
                        entry.percentage
                    )));
                }
                if let Some(rating) = entry.rating {
                    if !(1..=5).contains(&rating) {
                        return Err(record.reject(format!("rating {rating} outside 1..=5")));
                    }
                }
            }
            Record::TtsPosition { position, .. } => {
                if position.cfi.as_deref().is_some_and(|cfi| cfi.trim().is_empty()) {
                    return Err(record.reject("empty cfi"));
                }
            }
            Record::Device { info, .. } => {
                if info.name.trim().is_empty() {
                    return Err(record.reject("empty device name"));
                }
            }
        }
        Ok(())
    }
}

/// Lists every record in `candidate` that is new or differs from `current`.
///
/// Removals are not reported; the merge never removes records.
pub fn changed_records<'a>(current: &Manifest, candidate: &'a Manifest) -> Vec<Record<'a>> {
    let mut changed = Vec::new();

    for (id, entry) in &candidate.books {
        let existing = current.books.get(id);
        let metadata_or_history_changed = existing
            .map_or(true, |e| e.metadata != entry.metadata || e.history != entry.history);
        if metadata_or_history_changed {
            changed.push(Record::Book { id, entry });
        }

        let known: HashMap<&str, &Annotation> = existing
            .map(|e| e.annotations.iter().map(|a| (a.id.as_str(), a)).collect())
            .unwrap_or_default();
        for annotation in &entry.annotations {
            if known.get(annotation.id.as_str()) != Some(&annotation) {
                changed.push(Record::Annotation {
                    book_id: id,
                    annotation,
                });
            }
        }
    }

    let known: HashMap<&str, &LexiconRule> =
        current.lexicon.iter().map(|r| (r.id.as_str(), r)).collect();
    for rule in &candidate.lexicon {
        if known.get(rule.id.as_str()) != Some(&rule) {
            changed.push(Record::Lexicon(rule));
        }
    }

    for (filename, entry) in &candidate.reading_list {
        if current.reading_list.get(filename) != Some(entry) {
            changed.push(Record::ReadingList { filename, entry });
        }
    }

    for (key, position) in &candidate.transient_state.tts_positions {
        if current.transient_state.tts_positions.get(key) != Some(position) {
            changed.push(Record::TtsPosition { key, position });
        }
    }

    for (id, info) in &candidate.device_registry {
        if current.device_registry.get(id) != Some(info) {
            changed.push(Record::Device { id, info });
        }
    }

    changed
}
