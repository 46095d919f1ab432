//! Folder-backed provider.
//!
//! Layout of the remote folder:
//!
//! ```text
//! <root>/
//! ├─ manifest.json      # The shared manifest
//! ├─ manifest.json.tmp  # Staging file for atomic replacement
//! └─ LOCK               # Advisory lock held while an upload is checked and written
//! ```
//!
//! The folder may live on a synced or network drive; the lock only guards
//! writers on hosts that honor advisory locks.

use super::auth::{AuthSession, AuthStrategy, Credentials};
use super::{check_version, RemoteStorageProvider};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use folio_protocol::Manifest;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_TEMP: &str = "manifest.json.tmp";
const LOCK_FILE: &str = "LOCK";

/// A provider storing `manifest.json` in a directory.
#[derive(Debug)]
pub struct DirectoryProvider {
    root: PathBuf,
    auth: AuthStrategy,
    credentials: Credentials,
    session: Mutex<Option<AuthSession>>,
}

impl DirectoryProvider {
    /// Creates a provider for `root`. Nothing is touched until
    /// [`initialize`](RemoteStorageProvider::initialize).
    pub fn new(root: impl Into<PathBuf>, auth: AuthStrategy, credentials: Credentials) -> Self {
        Self {
            root: root.into(),
            auth,
            credentials,
            session: Mutex::new(None),
        }
    }

    /// A provider for `root` that needs no sign-in.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::new(root, AuthStrategy::Mock, Credentials::default())
    }

    /// Root folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn ensure_session(&self) -> SyncResult<()> {
        if self.session.lock().is_some() {
            Ok(())
        } else {
            Err(SyncError::auth(format!(
                "not connected to {}",
                self.root.display()
            )))
        }
    }

    async fn blocking<T, F>(&self, op: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> SyncResult<T> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || op(root))
            .await
            .map_err(|e| SyncError::network_fatal(format!("provider task failed: {e}")))?
    }
}

fn read_manifest(root: &Path) -> SyncResult<Option<Manifest>> {
    match fs::read(root.join(MANIFEST_FILE)) {
        Ok(bytes) => Ok(Some(Manifest::from_slice(&bytes).map_err(|e| {
            SyncError::Corruption(format!("remote manifest: {e}"))
        })?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_manifest(root: &Path, json: &str) -> io::Result<()> {
    let temp = root.join(MANIFEST_TEMP);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&temp, root.join(MANIFEST_FILE))
}

fn upload_locked(root: &Path, json: &str, previous_version: Option<u64>) -> SyncResult<()> {
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(root.join(LOCK_FILE))?;
    if lock_file.try_lock_exclusive().is_err() {
        return Err(SyncError::network_retryable("remote folder is locked by another writer"));
    }

    let current = read_manifest(root)?.map(|m| m.version);
    let result = check_version(previous_version, current)
        .and_then(|()| write_manifest(root, json).map_err(SyncError::from));
    let _ = FileExt::unlock(&lock_file);
    result
}

#[async_trait]
impl RemoteStorageProvider for DirectoryProvider {
    async fn initialize(&self) -> SyncResult<()> {
        let session = self.auth.sign_in(&self.credentials)?;
        self.blocking(|root| {
            fs::create_dir_all(&root).map_err(|e| {
                SyncError::network_fatal(format!("cannot create {}: {e}", root.display()))
            })
        })
        .await?;
        debug!(root = %self.root.display(), strategy = ?session.strategy, "directory provider connected");
        *self.session.lock() = Some(session);
        Ok(())
    }

    async fn is_authenticated(&self) -> bool {
        self.session.lock().is_some()
    }

    async fn get_manifest(&self) -> SyncResult<Option<Manifest>> {
        self.ensure_session()?;
        self.blocking(|root| read_manifest(&root)).await
    }

    async fn upload_manifest(
        &self,
        manifest: &Manifest,
        previous_version: Option<u64>,
    ) -> SyncResult<()> {
        self.ensure_session()?;
        let json = manifest.to_json_pretty().map_err(|e| SyncError::Corruption(e.to_string()))?;
        self.blocking(move |root| upload_locked(&root, &json, previous_version))
            .await
    }

    async fn get_last_modified(&self) -> SyncResult<Option<u64>> {
        self.ensure_session()?;
        self.blocking(|root| match fs::metadata(root.join(MANIFEST_FILE)) {
            Ok(meta) => {
                let modified = meta.modified()?;
                let millis = modified
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                Ok(Some(millis))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn disconnect(&self) {
        *self.session.lock() = None;
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}
