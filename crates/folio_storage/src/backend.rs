//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store.
///
/// Callers own the data format. A backend only guarantees that bytes read
/// back are the bytes that were written.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `sync` makes every appended byte durable
/// - `truncate(0)` followed by `sync` leaves nothing recoverable
/// - `replace` is all or nothing: on error the previous content is intact
///
/// Methods take `&self`; backends use interior locking so a single instance
/// can be shared between a replica store and test instrumentation.
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends past
    /// the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the store and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the backend is closed.
    fn append(&self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current size in bytes (the offset of the next append).
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes all data and metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&self) -> StorageResult<()>;

    /// Truncates the store to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is larger than the current size.
    fn truncate(&self, new_size: u64) -> StorageResult<()>;

    /// Reads the whole store.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).unwrap_or(usize::MAX);
        self.read_at(0, len)
    }

    /// Replaces the whole content with `data` and makes it durable.
    ///
    /// Either the new content or the previous content is readable
    /// afterwards, never an empty or partial store.
    ///
    /// # Errors
    ///
    /// Returns an error if the new content could not be made durable. The
    /// previous content is left in place.
    fn replace(&self, data: &[u8]) -> StorageResult<()>;

    /// Checks that the backend can currently serve requests.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Closed`] or an I/O error when the
    /// backend is unusable.
    fn probe(&self) -> StorageResult<()> {
        self.size().map(|_| ())
    }
}
