//! Property-based test generators using proptest.
//!
//! Generated manifests are already in the shape the merge engine produces:
//! ids are unique UUIDs, read ranges are normalized, sessions are sorted and
//! unique on `(timestamp, type)`. That makes `merge(m, m) == m` a fair
//! property to check.

use folio_protocol::{
    normalize_ranges, Annotation, AnnotationKind, BookEntry, BookMetadata, DeviceInfo,
    LexiconRule, Manifest, ReadingHistory, ReadingListEntry, ReadingStatus, Session,
    TransientState, TtsPosition,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Strategy for UUID strings.
pub fn uuid_strategy() -> impl Strategy<Value = String> {
    any::<u128>().prop_map(|n| Uuid::from_u128(n).to_string())
}

/// Strategy for small book ids, so two manifests often share books.
pub fn book_id_strategy() -> impl Strategy<Value = String> {
    (0u8..6).prop_map(|n| format!("book-{n}"))
}

/// Strategy for timestamps in a narrow window, so ties happen.
pub fn timestamp_strategy() -> impl Strategy<Value = u64> {
    1_000u64..1_020
}

/// Strategy for one range CFI.
pub fn cfi_range_strategy() -> impl Strategy<Value = String> {
    (1u32..4, 0u32..50, 1u32..30)
        .prop_map(|(item, start, len)| crate::fixtures::range(item * 2, start, start + len))
}

/// Strategy for a normalized set of read ranges.
pub fn read_ranges_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(cfi_range_strategy(), 0..5).prop_map(|ranges| normalize_ranges(ranges))
}

fn session_strategy() -> impl Strategy<Value = Vec<Session>> {
    prop::collection::btree_map(
        (timestamp_strategy(), prop::sample::select(vec!["page", "tts", "scroll"])),
        prop::option::of(cfi_range_strategy()),
        0..4,
    )
    .prop_map(|sessions| {
        sessions
            .into_iter()
            .map(|((timestamp, kind), cfi_range)| Session {
                timestamp,
                kind: kind.to_string(),
                cfi_range,
                label: None,
            })
            .collect()
    })
}

fn annotation_strategy(book_id: String) -> impl Strategy<Value = Vec<Annotation>> {
    prop::collection::btree_map(
        uuid_strategy(),
        (cfi_range_strategy(), "[a-z ]{1,12}", any::<bool>(), timestamp_strategy()),
        0..3,
    )
    .prop_map(move |annotations| {
        annotations
            .into_iter()
            .map(|(id, (cfi_range, text, is_note, created))| Annotation {
                id,
                book_id: book_id.clone(),
                cfi_range,
                text,
                kind: if is_note {
                    AnnotationKind::Note
                } else {
                    AnnotationKind::Highlight
                },
                color: "yellow".to_string(),
                note: is_note.then(|| "note".to_string()),
                created,
            })
            .collect()
    })
}

/// Strategy for one book entry with the given id.
pub fn book_entry_strategy(id: String) -> impl Strategy<Value = BookEntry> {
    (
        prop::option::of("[A-Z][a-z]{2,10}"),
        prop::option::of(timestamp_strategy()),
        prop::option::of(0.0f64..=1.0),
        read_ranges_strategy(),
        session_strategy(),
        timestamp_strategy(),
        annotation_strategy(id.clone()),
    )
        .prop_map(
            move |(title, last_read, progress, read_ranges, sessions, last_updated, annotations)| {
                BookEntry {
                    metadata: BookMetadata {
                        id: Some(id.clone()),
                        title,
                        last_read,
                        progress,
                        ..BookMetadata::default()
                    },
                    history: ReadingHistory {
                        book_id: id.clone(),
                        read_ranges,
                        sessions,
                        last_updated,
                    },
                    annotations,
                }
            },
        )
}

fn books_strategy() -> impl Strategy<Value = BTreeMap<String, BookEntry>> {
    prop::collection::btree_set(book_id_strategy(), 0..4).prop_flat_map(|ids| {
        ids.into_iter()
            .map(|id| book_entry_strategy(id.clone()).prop_map(move |entry| (id.clone(), entry)))
            .collect::<Vec<_>>()
            .prop_map(|entries| entries.into_iter().collect())
    })
}

fn lexicon_strategy() -> impl Strategy<Value = Vec<LexiconRule>> {
    prop::collection::btree_map(uuid_strategy(), ("[a-z]{1,6}", "[a-z]{0,6}"), 0..3).prop_map(
        |rules| {
            rules
                .into_iter()
                .map(|(id, (original, replacement))| LexiconRule {
                    id,
                    original,
                    replacement,
                    created: 1,
                    is_regex: None,
                    book_id: None,
                })
                .collect()
        },
    )
}

/// Strategy for one reading-list entry.
pub fn reading_entry_strategy(filename: String) -> impl Strategy<Value = ReadingListEntry> {
    (0.0f64..=1.0, prop::option::of(1u8..=5), timestamp_strategy()).prop_map(
        move |(percentage, rating, last_updated)| ReadingListEntry {
            filename: filename.clone(),
            title: filename.trim_end_matches(".epub").to_string(),
            author: "Author".to_string(),
            status: Some(ReadingStatus::ToRead),
            percentage,
            rating,
            last_updated,
            isbn: None,
        },
    )
}

fn reading_list_strategy() -> impl Strategy<Value = BTreeMap<String, ReadingListEntry>> {
    prop::collection::btree_set((0u8..5).prop_map(|n| format!("file-{n}.epub")), 0..3)
        .prop_flat_map(|names| {
            names
                .into_iter()
                .map(|name| {
                    reading_entry_strategy(name.clone()).prop_map(move |entry| (name.clone(), entry))
                })
                .collect::<Vec<_>>()
                .prop_map(|entries| entries.into_iter().collect())
        })
}

fn transient_strategy() -> impl Strategy<Value = TransientState> {
    prop::collection::btree_map(
        book_id_strategy(),
        (cfi_range_strategy(), timestamp_strategy()),
        0..3,
    )
    .prop_map(|positions| TransientState {
        tts_positions: positions
            .into_iter()
            .map(|(id, (cfi, updated_at))| {
                (
                    id,
                    TtsPosition {
                        cfi: Some(cfi),
                        section_index: None,
                        queue_index: None,
                        updated_at,
                    },
                )
            })
            .collect(),
        extra: BTreeMap::new(),
    })
}

fn devices_strategy() -> impl Strategy<Value = BTreeMap<String, DeviceInfo>> {
    prop::collection::btree_map(
        (0u8..4).prop_map(|n| format!("device-{n}")),
        ("[A-Z][a-z]{2,8}", timestamp_strategy()),
        0..3,
    )
    .prop_map(|devices| {
        devices
            .into_iter()
            .map(|(id, (name, last_active))| {
                (
                    id,
                    DeviceInfo {
                        name,
                        platform: "test".to_string(),
                        user_agent: None,
                        last_active,
                    },
                )
            })
            .collect()
    })
}

fn extra_strategy() -> impl Strategy<Value = BTreeMap<String, serde_json::Value>> {
    prop::collection::btree_map(
        "x[A-Z][a-z]{1,6}",
        any::<i32>().prop_map(serde_json::Value::from),
        0..2,
    )
}

/// Strategy for a whole manifest.
pub fn manifest_strategy() -> impl Strategy<Value = Manifest> {
    (
        0u64..20,
        timestamp_strategy(),
        (0u8..4).prop_map(|n| format!("device-{n}")),
        books_strategy(),
        lexicon_strategy(),
        reading_list_strategy(),
        transient_strategy(),
        devices_strategy(),
        extra_strategy(),
    )
        .prop_map(
            |(
                version,
                last_updated,
                device_id,
                books,
                lexicon,
                reading_list,
                transient_state,
                device_registry,
                extra,
            )| Manifest {
                version,
                last_updated,
                device_id,
                books,
                lexicon,
                reading_list,
                transient_state,
                device_registry,
                extra,
            },
        )
}

/// Strategy for two manifests of the same library written on different
/// devices.
pub fn manifest_pair_strategy() -> impl Strategy<Value = (Manifest, Manifest)> {
    (manifest_strategy(), manifest_strategy())
}
