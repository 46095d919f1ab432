//! Remote storage providers.
//!
//! A provider stores exactly one manifest and offers a version check on
//! upload. There is no merge logic on the remote side.

mod auth;
mod directory;
mod memory;

pub use auth::{AuthSession, AuthStrategy, Credentials, Platform};
pub use directory::DirectoryProvider;
pub use memory::{Fault, MemoryProvider, Operation};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use folio_protocol::Manifest;

/// A remote blob store holding the shared manifest.
#[async_trait]
pub trait RemoteStorageProvider: Send + Sync {
    /// Authenticates and connects.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Auth`] if sign-in fails.
    async fn initialize(&self) -> SyncResult<()>;

    /// Returns true once [`initialize`](Self::initialize) succeeded and the
    /// provider has not been disconnected since.
    async fn is_authenticated(&self) -> bool;

    /// Fetches the remote manifest. `None` means nothing was uploaded yet.
    ///
    /// # Errors
    ///
    /// Returns an auth, network or corruption error.
    async fn get_manifest(&self) -> SyncResult<Option<Manifest>>;

    /// Uploads `manifest` if the remote still holds `previous_version`
    /// (`None`: the remote must be empty).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when the remote version moved, or an
    /// auth or network error.
    async fn upload_manifest(
        &self,
        manifest: &Manifest,
        previous_version: Option<u64>,
    ) -> SyncResult<()>;

    /// Last modification time of the remote manifest (ms), if any.
    ///
    /// # Errors
    ///
    /// Returns an auth or network error.
    async fn get_last_modified(&self) -> SyncResult<Option<u64>>;

    /// Drops the connection. Later calls fail with [`SyncError::Auth`] until
    /// the provider is initialized again.
    async fn disconnect(&self);

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}

/// The closed set of providers shipped with Folio.
#[derive(Debug)]
pub enum AnyProvider {
    /// In-process provider.
    Memory(MemoryProvider),
    /// Folder-backed provider.
    Directory(DirectoryProvider),
}

impl AnyProvider {
    /// Builds the provider `config` selects.
    pub fn from_config(config: &ProviderConfig, credentials: Credentials) -> Self {
        match &config.kind {
            ProviderKind::Memory => AnyProvider::Memory(MemoryProvider::new()),
            ProviderKind::Directory(root) => AnyProvider::Directory(DirectoryProvider::new(
                root.clone(),
                config.auth,
                credentials,
            )),
        }
    }

    fn inner(&self) -> &dyn RemoteStorageProvider {
        match self {
            AnyProvider::Memory(p) => p,
            AnyProvider::Directory(p) => p,
        }
    }
}

#[async_trait]
impl RemoteStorageProvider for AnyProvider {
    async fn initialize(&self) -> SyncResult<()> {
        self.inner().initialize().await
    }

    async fn is_authenticated(&self) -> bool {
        self.inner().is_authenticated().await
    }

    async fn get_manifest(&self) -> SyncResult<Option<Manifest>> {
        self.inner().get_manifest().await
    }

    async fn upload_manifest(
        &self,
        manifest: &Manifest,
        previous_version: Option<u64>,
    ) -> SyncResult<()> {
        self.inner().upload_manifest(manifest, previous_version).await
    }

    async fn get_last_modified(&self) -> SyncResult<Option<u64>> {
        self.inner().get_last_modified().await
    }

    async fn disconnect(&self) {
        self.inner().disconnect().await
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }
}

/// Rejects an upload whose base version is not what the remote holds.
pub(crate) fn check_version(
    previous_version: Option<u64>,
    current: Option<u64>,
) -> SyncResult<()> {
    if previous_version == current {
        Ok(())
    } else {
        Err(SyncError::Conflict {
            expected: previous_version,
            actual: current,
        })
    }
}
