//! # Folio Storage
//!
//! Byte-store backends used by Folio for the persisted document replica and
//! the checkpoint log.
//!
//! Backends are **opaque byte stores**: they never interpret what they hold.
//! Framing, checksums and record layout belong to `folio_core`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral sessions
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use folio_storage::{StorageBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.replace(b"snapshot v1").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"snapshot v1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
