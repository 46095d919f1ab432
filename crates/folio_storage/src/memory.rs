//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory storage backend.
///
/// Suitable for tests and for sessions that do not need to survive a
/// process restart. The backend can be switched offline with
/// [`InMemoryBackend::set_available`] to exercise the code paths that run
/// when persistence is unavailable.
///
/// # Example
///
/// ```rust
/// use folio_storage::{StorageBackend, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// let offset = backend.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
    available: AtomicBool,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self {
            data: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with pre-existing data.
    ///
    /// Useful for recovery tests (torn tails, corrupt frames).
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
            available: AtomicBool::new(true),
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Switches the backend on or off. While off every call fails with
    /// [`StorageError::Closed`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.ensure_available()?;
        let data = self.data.read();
        let size = data.len() as u64;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&self, new_data: &[u8]) -> StorageResult<u64> {
        self.ensure_available()?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        self.ensure_available()?;
        Ok(self.data.read().len() as u64)
    }

    fn sync(&self) -> StorageResult<()> {
        self.ensure_available()
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        self.ensure_available()?;
        let mut data = self.data.write();
        let size = data.len() as u64;

        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&self, new_data: &[u8]) -> StorageResult<()> {
        self.ensure_available()?;
        *self.data.write() = new_data.to_vec();
        Ok(())
    }
}
