//! # Folio Protocol
//!
//! The syncable data model of a Folio library and the pure functions that
//! operate on it.
//!
//! This crate provides:
//! - [`Manifest`] and its records (books, history, annotations, lexicon,
//!   reading list, TTS positions, device registry)
//! - CFI range parsing and normalization
//! - The manifest merge engine ([`merge`], [`merge_at`])
//! - Record validators used as a schema gate before writes
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Conflict directions
//!
//! Each field has its own collision rule. Annotations, lexicon rules and
//! unknown top-level keys keep the **local** value; the device registry
//! takes the **remote** value. See [`merge`] for the full table.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cfi;
mod error;
pub mod manifest;
pub mod merge;
pub mod validate;

pub use cfi::{normalize_ranges, union_ranges, CfiPoint, CfiRange};
pub use error::{ProtocolError, ProtocolResult, ValidationError};
pub use manifest::{
    Annotation, AnnotationKind, BookEntry, BookMetadata, DeviceInfo, LexiconRule, Manifest,
    ReadingHistory, ReadingListEntry, ReadingStatus, Session, TransientState, TtsPosition,
};
pub use merge::{merge, merge_at, now_millis};
pub use validate::{changed_records, Record, RecordKind, RecordValidator, SchemaValidator};
