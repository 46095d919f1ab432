//! The manifest: the serializable snapshot of all syncable library state.
//!
//! Manifests travel as JSON with camelCase keys. Every collection may be
//! missing (or `null`) on the wire and is then treated as empty. Keys this
//! version does not know about are kept in `extra` maps so a manifest written
//! by a newer client survives a round trip through an older one.

use crate::error::ProtocolResult;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Unknown keys preserved verbatim.
pub type ExtraFields = BTreeMap<String, Value>;

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Syncable state of one library, as produced by one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Monotonically non-decreasing version, also the optimistic-concurrency token.
    #[serde(default)]
    pub version: u64,
    /// Wall-clock time (ms) of the merge or write that produced this instance.
    #[serde(default)]
    pub last_updated: u64,
    /// Device that produced this instance.
    #[serde(default)]
    pub device_id: String,
    /// Per-book payload keyed by book id.
    #[serde(default, deserialize_with = "nullable")]
    pub books: BTreeMap<String, BookEntry>,
    /// Text-replacement rules, unique by id.
    #[serde(default, deserialize_with = "nullable")]
    pub lexicon: Vec<LexiconRule>,
    /// External reading-list tracking keyed by filename.
    #[serde(default, deserialize_with = "nullable")]
    pub reading_list: BTreeMap<String, ReadingListEntry>,
    /// Ephemeral state such as playback positions.
    #[serde(default, deserialize_with = "nullable")]
    pub transient_state: TransientState,
    /// Known devices keyed by device id.
    #[serde(default, deserialize_with = "nullable")]
    pub device_registry: BTreeMap<String, DeviceInfo>,
    /// Top-level keys unknown to this version.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Manifest {
    /// Creates an empty manifest produced by `device_id`.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Self::default()
        }
    }

    /// Parses a manifest from JSON.
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses a manifest from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes to compact JSON.
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serializes to indented JSON.
    pub fn to_json_pretty(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the total number of annotations across all books.
    pub fn annotation_count(&self) -> usize {
        self.books.values().map(|b| b.annotations.len()).sum()
    }

    /// Returns true if the manifest carries no user data.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
            && self.lexicon.is_empty()
            && self.reading_list.is_empty()
            && self.transient_state.tts_positions.is_empty()
    }

    /// Records `device_id` as seen at `now` in the device registry.
    pub fn register_device(&mut self, device_id: &str, name: &str, platform: &str, now: u64) {
        let entry = self
            .device_registry
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceInfo {
                name: name.to_string(),
                platform: platform.to_string(),
                user_agent: None,
                last_active: now,
            });
        entry.name = name.to_string();
        entry.platform = platform.to_string();
        entry.last_active = entry.last_active.max(now);
    }
}

/// Everything synced about a single book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    /// Library metadata (title, progress, ...).
    #[serde(default, deserialize_with = "nullable")]
    pub metadata: BookMetadata,
    /// Reading history.
    #[serde(default, deserialize_with = "nullable")]
    pub history: ReadingHistory,
    /// Highlights and notes.
    #[serde(default, deserialize_with = "nullable")]
    pub annotations: Vec<Annotation>,
}

/// Partial book metadata. Every field is optional; last-write-wins is keyed
/// on `last_read`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    /// Book id, normally equal to the map key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Description or blurb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Cover image location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    /// When the book was imported (ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<u64>,
    /// When the book was last read (ms). LWW key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read: Option<u64>,
    /// Reading progress in `0..=1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Current reading location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_cfi: Option<String>,
    /// Content hash of the book file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    /// Size of the book file in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Character count, used for time estimates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chars: Option<u64>,
    /// Metadata keys unknown to this version.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl BookMetadata {
    /// The LWW timestamp; missing counts as zero.
    pub fn last_read_or_zero(&self) -> u64 {
        self.last_read.unwrap_or(0)
    }
}

/// Reading history of one book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingHistory {
    /// Book this history belongs to.
    #[serde(default)]
    pub book_id: String,
    /// Normalized, coalesced CFI ranges that have been read.
    #[serde(default, deserialize_with = "nullable")]
    pub read_ranges: Vec<String>,
    /// Timestamped reading events.
    #[serde(default, deserialize_with = "nullable")]
    pub sessions: Vec<Session>,
    /// Last change (ms).
    #[serde(default)]
    pub last_updated: u64,
}

/// A timestamped reading event, unique by `(timestamp, kind)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// When the event happened (ms).
    pub timestamp: u64,
    /// Event type (`page`, `tts`, `scroll`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Range covered by the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfi_range: Option<String>,
    /// Display label such as a chapter title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Session {
    /// Merge key.
    pub fn key(&self) -> (u64, &str) {
        (self.timestamp, self.kind.as_str())
    }
}

/// Annotation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    /// A colored highlight.
    Highlight,
    /// A highlight carrying a note.
    Note,
}

/// A highlight or note. Immutable by contract: an edit is a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// UUID.
    pub id: String,
    /// Owning book.
    pub book_id: String,
    /// Annotated range.
    pub cfi_range: String,
    /// Selected text.
    pub text: String,
    /// Highlight or note.
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    /// Display color.
    pub color: String,
    /// Note body for `note` annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Creation time (ms).
    pub created: u64,
}

/// A pronunciation/text replacement rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexiconRule {
    /// UUID.
    pub id: String,
    /// Text to match.
    pub original: String,
    /// Replacement text.
    pub replacement: String,
    /// Creation time (ms).
    pub created: u64,
    /// Whether `original` is a regular expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_regex: Option<bool>,
    /// Restricts the rule to one book.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<String>,
}

/// Reading-list status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingStatus {
    /// Finished.
    Read,
    /// In progress.
    CurrentlyReading,
    /// Queued.
    ToRead,
}

/// An external reading-list row keyed by filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingListEntry {
    /// File name, equal to the map key.
    pub filename: String,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReadingStatus>,
    /// Progress in `0..=1`.
    #[serde(default)]
    pub percentage: f64,
    /// Star rating in `1..=5`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    /// Last change (ms). LWW key.
    pub last_updated: u64,
    /// ISBN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
}

/// State that only matters for a short while, such as playback positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransientState {
    /// Playback positions keyed by book id (or book/section key).
    #[serde(default, deserialize_with = "nullable")]
    pub tts_positions: BTreeMap<String, TtsPosition>,
    /// Keys unknown to this version.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Where text-to-speech playback stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsPosition {
    /// Location of the current sentence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfi: Option<String>,
    /// Spine section index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_index: Option<u32>,
    /// Position in the playback queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_index: Option<u32>,
    /// Last change (ms). LWW key.
    pub updated_at: u64,
}

/// A device known to the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Display name.
    pub name: String,
    /// Platform (`web`, `android`, `linux`, ...).
    pub platform: String,
    /// Browser user agent, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Last time the device synced (ms).
    pub last_active: u64,
}
