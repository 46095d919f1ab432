//! Recording test doubles.
//!
//! An [`EventLog`] is shared between several doubles so a test can assert
//! the global order of side effects, e.g. that sync was disconnected before
//! the replica was wiped.

use folio_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered, shared list of event names.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    /// All events so far.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Forgets all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Position of the first event equal to `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == name)
    }
}

/// An in-memory backend that logs every mutation.
///
/// Events are `"<prefix>.truncate(<n>)"`, `"<prefix>.append"`,
/// `"<prefix>.replace"` and `"<prefix>.sync"`. Reads are not logged.
#[derive(Debug)]
pub struct RecordingBackend {
    inner: InMemoryBackend,
    prefix: String,
    log: EventLog,
    fail_appends: Mutex<usize>,
}

impl RecordingBackend {
    /// Creates an empty backend logging into `log` under `prefix`.
    pub fn new(prefix: &str, log: EventLog) -> Self {
        Self {
            inner: InMemoryBackend::new(),
            prefix: prefix.to_string(),
            log,
            fail_appends: Mutex::new(0),
        }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }

    /// Makes the next `count` writes (appends or replaces) fail with an
    /// I/O error. A failed write leaves the content untouched.
    pub fn fail_next_appends(&self, count: usize) {
        *self.fail_appends.lock() = count;
    }

    fn injected_failure(&self, operation: &str) -> StorageResult<()> {
        let mut failures = self.fail_appends.lock();
        if *failures == 0 {
            return Ok(());
        }
        *failures -= 1;
        self.log.push(format!("{}.{operation}-failed", self.prefix));
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("injected {operation} failure"),
        )))
    }

    /// Switches the backend on or off.
    pub fn set_available(&self, available: bool) {
        self.inner.set_available(available);
    }
}

impl StorageBackend for RecordingBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        self.injected_failure("append")?;
        let offset = self.inner.append(data)?;
        self.log.push(format!("{}.append", self.prefix));
        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&self) -> StorageResult<()> {
        self.inner.sync()?;
        self.log.push(format!("{}.sync", self.prefix));
        Ok(())
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)?;
        self.log.push(format!("{}.truncate({new_size})", self.prefix));
        Ok(())
    }

    fn replace(&self, data: &[u8]) -> StorageResult<()> {
        self.injected_failure("replace")?;
        self.inner.replace(data)?;
        self.log.push(format!("{}.replace", self.prefix));
        Ok(())
    }
}
