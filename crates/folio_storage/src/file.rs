//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based storage backend.
///
/// Data survives process restarts once [`StorageBackend::sync`] returns.
/// `truncate` syncs on its own so a wiped replica cannot reappear after a
/// crash. `replace` writes a sibling temp file and renames it over the
/// store, so a failed or interrupted replace leaves the old content.
///
/// # Example
///
/// ```no_run
/// use folio_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("replica.bin")).unwrap();
/// backend.replace(b"persistent state").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    size: u64,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileState { file, size }),
        })
    }

    /// Opens or creates a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.inner.lock();
        let size = state.size;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        state.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        state.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.inner.lock();
        let offset = state.size;

        if data.is_empty() {
            return Ok(offset);
        }

        state.file.seek(SeekFrom::End(0))?;
        state.file.write_all(data)?;
        state.size += data.len() as u64;

        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn sync(&self) -> StorageResult<()> {
        let mut state = self.inner.lock();
        state.file.flush()?;
        state.file.sync_all()?;
        Ok(())
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let mut state = self.inner.lock();

        if new_size > state.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: state.size,
            });
        }

        state.file.set_len(new_size)?;
        state.file.sync_all()?;
        state.size = new_size;

        Ok(())
    }

    fn replace(&self, data: &[u8]) -> StorageResult<()> {
        let mut state = self.inner.lock();
        let temp_path = self.temp_path();

        let mut temp = File::create(&temp_path)?;
        if let Err(err) = temp.write_all(data).and_then(|()| temp.sync_all()) {
            drop(temp);
            let _ = std::fs::remove_file(&temp_path);
            return Err(err.into());
        }
        drop(temp);

        std::fs::rename(&temp_path, &self.path)?;
        self.sync_directory()?;

        state.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        state.size = data.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.bin");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("log.bin")).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
        assert!(matches!(
            backend.read_at(10, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn replace_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.bin");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.append(b"first generation of the replica").unwrap();
            backend.replace(b"second").unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"second");
    }

    #[test]
    fn replace_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.bin");

        let backend = FileBackend::open(&path).unwrap();
        backend.replace(b"one").unwrap();
        backend.replace(b"two").unwrap();
        backend.append(b"+").unwrap();

        assert_eq!(backend.read_all().unwrap(), b"two+");
        assert!(!dir.path().join("replica.bin.tmp").exists());
    }

    #[test]
    fn failed_replace_keeps_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.bin");

        let backend = FileBackend::open(&path).unwrap();
        backend.replace(b"kept").unwrap();
        // A directory squatting on the temp path makes the write fail.
        std::fs::create_dir(dir.path().join("replica.bin.tmp")).unwrap();

        assert!(backend.replace(b"lost").is_err());
        assert_eq!(backend.read_all().unwrap(), b"kept");
        drop(backend);
        assert_eq!(std::fs::read(&path).unwrap(), b"kept");
    }

    #[test]
    fn wipe_leaves_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.bin");

        let backend = FileBackend::open(&path).unwrap();
        backend.append(b"stale history").unwrap();
        backend.truncate(0).unwrap();
        drop(backend);

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("folio").join("replica.bin");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }
}
