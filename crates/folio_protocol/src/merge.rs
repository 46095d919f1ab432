//! The manifest merge engine.
//!
//! [`merge`] combines the local and the remote manifest into one. It is pure
//! apart from stamping `last_updated`, deterministic, and never fails:
//! missing collections are empty and malformed records are the validators'
//! job, upstream.
//!
//! | Field | Strategy |
//! |---|---|
//! | `version` | max |
//! | `device_id` | local |
//! | unknown top-level keys | union, local wins |
//! | `books` | copy one-sided entries, merge shared ones per sub-field |
//! | `metadata` | LWW on `last_read` (tie: local); loser fills missing fields |
//! | `history.read_ranges` | union, re-normalized |
//! | `history.sessions` | union on `(timestamp, type)`, remote wins, sorted |
//! | `history.last_updated` | max |
//! | `annotations` | union on id, **local wins** |
//! | `lexicon` | union on id, **local wins** |
//! | `reading_list` | LWW on `last_updated` (tie: local) |
//! | `tts_positions` | LWW on `updated_at` (tie: local) |
//! | `device_registry` | shallow merge, **remote wins** |
//!
//! Annotations carry no update timestamp, so an id collision cannot be
//! resolved by recency; they are immutable by contract and an edit is a new
//! id.

use crate::cfi::union_ranges;
use crate::manifest::{
    Annotation, BookEntry, BookMetadata, ExtraFields, LexiconRule, Manifest, ReadingHistory,
    ReadingListEntry, Session, TransientState, TtsPosition,
};
use std::collections::{BTreeMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Merges `local` and `remote`, stamping `last_updated` with the current time.
pub fn merge(local: &Manifest, remote: &Manifest) -> Manifest {
    merge_at(local, remote, now_millis())
}

/// Merges `local` and `remote`, stamping `last_updated` with `now`.
pub fn merge_at(local: &Manifest, remote: &Manifest, now: u64) -> Manifest {
    Manifest {
        version: local.version.max(remote.version),
        last_updated: now,
        device_id: local.device_id.clone(),
        books: merge_books(&local.books, &remote.books),
        lexicon: union_by_id(&local.lexicon, &remote.lexicon),
        reading_list: merge_latest(&local.reading_list, &remote.reading_list),
        transient_state: merge_transient(&local.transient_state, &remote.transient_state),
        device_registry: remote_wins(&local.device_registry, &remote.device_registry),
        extra: local_wins(&local.extra, &remote.extra),
    }
}

/// Records deduplicated by id.
trait Identified {
    fn id(&self) -> &str;
}

impl Identified for Annotation {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for LexiconRule {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Records resolved by a last-write-wins timestamp.
trait Stamped {
    fn stamp(&self) -> u64;
}

impl Stamped for ReadingListEntry {
    fn stamp(&self) -> u64 {
        self.last_updated
    }
}

impl Stamped for TtsPosition {
    fn stamp(&self) -> u64 {
        self.updated_at
    }
}

fn merge_books(
    local: &BTreeMap<String, BookEntry>,
    remote: &BTreeMap<String, BookEntry>,
) -> BTreeMap<String, BookEntry> {
    let mut merged = local.clone();
    for (id, remote_entry) in remote {
        let entry = match local.get(id) {
            Some(local_entry) => merge_book(local_entry, remote_entry),
            None => remote_entry.clone(),
        };
        merged.insert(id.clone(), entry);
    }
    merged
}

fn merge_book(local: &BookEntry, remote: &BookEntry) -> BookEntry {
    BookEntry {
        metadata: merge_metadata(&local.metadata, &remote.metadata),
        history: merge_history(&local.history, &remote.history),
        annotations: union_by_id(&local.annotations, &remote.annotations),
    }
}

fn merge_metadata(local: &BookMetadata, remote: &BookMetadata) -> BookMetadata {
    let (winner, loser) = if remote.last_read_or_zero() > local.last_read_or_zero() {
        (remote, local)
    } else {
        (local, remote)
    };

    let mut merged = winner.clone();
    fill(&mut merged.id, &loser.id);
    fill(&mut merged.title, &loser.title);
    fill(&mut merged.author, &loser.author);
    fill(&mut merged.description, &loser.description);
    fill(&mut merged.cover_url, &loser.cover_url);
    fill(&mut merged.added_at, &loser.added_at);
    fill(&mut merged.last_read, &loser.last_read);
    fill(&mut merged.progress, &loser.progress);
    fill(&mut merged.current_cfi, &loser.current_cfi);
    fill(&mut merged.file_hash, &loser.file_hash);
    fill(&mut merged.file_size, &loser.file_size);
    fill(&mut merged.total_chars, &loser.total_chars);
    for (key, value) in &loser.extra {
        merged
            .extra
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    merged
}

fn fill<T: Clone>(slot: &mut Option<T>, fallback: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(fallback);
    }
}

fn merge_history(local: &ReadingHistory, remote: &ReadingHistory) -> ReadingHistory {
    let mut sessions: BTreeMap<(u64, String), Session> = BTreeMap::new();
    for session in local.sessions.iter().chain(&remote.sessions) {
        sessions.insert(
            (session.timestamp, session.kind.clone()),
            session.clone(),
        );
    }

    let book_id = if local.book_id.is_empty() {
        remote.book_id.clone()
    } else {
        local.book_id.clone()
    };

    ReadingHistory {
        book_id,
        read_ranges: union_ranges(&local.read_ranges, &remote.read_ranges),
        sessions: sessions.into_values().collect(),
        last_updated: local.last_updated.max(remote.last_updated),
    }
}

fn merge_transient(local: &TransientState, remote: &TransientState) -> TransientState {
    TransientState {
        tts_positions: merge_latest(&local.tts_positions, &remote.tts_positions),
        extra: local_wins(&local.extra, &remote.extra),
    }
}

/// Union by id. Local order first, then ids only the remote has; on a
/// collision the local record is kept.
fn union_by_id<T: Identified + Clone>(local: &[T], remote: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    local
        .iter()
        .chain(remote)
        .filter(|record| seen.insert(record.id()))
        .cloned()
        .collect()
}

/// Per key, keep the record with the larger stamp; ties keep local.
fn merge_latest<T: Stamped + Clone>(
    local: &BTreeMap<String, T>,
    remote: &BTreeMap<String, T>,
) -> BTreeMap<String, T> {
    let mut merged = local.clone();
    for (key, remote_value) in remote {
        let newer = local
            .get(key)
            .map_or(true, |local_value| remote_value.stamp() > local_value.stamp());
        if newer {
            merged.insert(key.clone(), remote_value.clone());
        }
    }
    merged
}

fn remote_wins<V: Clone>(local: &BTreeMap<String, V>, remote: &BTreeMap<String, V>) -> BTreeMap<String, V> {
    let mut merged = local.clone();
    merged.extend(remote.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

fn local_wins(local: &ExtraFields, remote: &ExtraFields) -> ExtraFields {
    remote_wins(remote, local)
}
