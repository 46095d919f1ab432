//! Application hooks the orchestrator calls out to.

use crate::error::{SyncError, SyncResult};
use crate::provider::RemoteStorageProvider;
use async_trait::async_trait;
use folio_core::RestoreHooks;
use folio_protocol::{now_millis, Manifest};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Out-of-band copy of the manifest written before every forced push.
#[async_trait]
pub trait BackupHook: Send + Sync {
    /// Writes `manifest` somewhere outside the replicated store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup could not be written. The caller logs
    /// it and carries on.
    async fn write_backup_payload(&self, manifest: &Manifest) -> SyncResult<()>;
}

/// A backup hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackupHook;

#[async_trait]
impl BackupHook for NoopBackupHook {
    async fn write_backup_payload(&self, _manifest: &Manifest) -> SyncResult<()> {
        Ok(())
    }
}

/// Writes `backup-<millis>.json` files into a folder, keeping the newest
/// few.
#[derive(Debug, Clone)]
pub struct DirectoryBackupHook {
    dir: PathBuf,
    keep: usize,
}

impl DirectoryBackupHook {
    /// Creates a hook writing into `dir`, keeping five backups.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            keep: 5,
        }
    }

    /// Sets how many backups are kept.
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    /// Backup files currently in the folder, oldest first.
    pub fn backups(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("backup-") && n.ends_with(".json"))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl BackupHook for DirectoryBackupHook {
    async fn write_backup_payload(&self, manifest: &Manifest) -> SyncResult<()> {
        let json = manifest
            .to_json_pretty()
            .map_err(|e| SyncError::Corruption(e.to_string()))?;
        let hook = self.clone();
        tokio::task::spawn_blocking(move || -> SyncResult<()> {
            fs::create_dir_all(&hook.dir)?;
            // Zero-padded so lexical order is chronological.
            let path = hook.dir.join(format!("backup-{:016}.json", now_millis()));
            fs::write(&path, json)?;
            debug!(path = %path.display(), "wrote backup payload");

            let files = hook.backups()?;
            let excess = files.len().saturating_sub(hook.keep);
            for old in &files[..excess] {
                fs::remove_file(old)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| SyncError::network_fatal(format!("backup task failed: {e}")))?
    }
}

/// Asks the application to reload after a restore.
#[async_trait]
pub trait ReloadHook: Send + Sync {
    /// Requests a full reload of the application state.
    async fn request_reload(&self);
}

/// Records reload requests; for hosts that poll instead of being called
/// back.
#[derive(Debug, Default)]
pub struct ReloadFlag {
    requested: AtomicBool,
    count: AtomicU64,
}

impl ReloadFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a reload was requested since the last
    /// [`take`](Self::take).
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Clears the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    /// Total reload requests.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReloadHook for ReloadFlag {
    async fn request_reload(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.count.fetch_add(1, Ordering::SeqCst);
        info!("reload requested");
    }
}

/// Restore side effects wired to a provider and a reload hook.
pub(crate) struct SyncRestoreHooks {
    pub(crate) provider: Arc<dyn RemoteStorageProvider>,
    pub(crate) reload: Arc<dyn ReloadHook>,
    pub(crate) initialized: Arc<AtomicBool>,
}

#[async_trait]
impl RestoreHooks for SyncRestoreHooks {
    async fn disconnect_sync(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.provider.disconnect().await;
        debug!(provider = self.provider.name(), "provider disconnected for restore");
    }

    async fn request_reload(&self) {
        self.reload.request_reload().await;
    }
}
