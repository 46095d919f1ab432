//! In-process provider with fault injection.

use super::{check_version, RemoteStorageProvider};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use folio_protocol::{now_millis, Manifest};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Provider call a [`Fault`] is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `get_manifest`.
    Get,
    /// `upload_manifest`.
    Upload,
    /// `get_last_modified`.
    LastModified,
}

/// A failure injected into the next matching call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Transient network failure.
    Network,
    /// Permanent network failure.
    Offline,
    /// Credentials rejected.
    Auth,
    /// Another device uploads this manifest just before the call runs.
    ConcurrentWrite(Manifest),
}

#[derive(Debug, Default)]
struct MemoryState {
    manifest: Option<Manifest>,
    last_modified: Option<u64>,
    connected: bool,
    faults: VecDeque<(Operation, Fault)>,
    fetches: u64,
    uploads: u64,
}

/// A provider holding the manifest in memory.
///
/// Cloning is not supported; share it behind an `Arc` to inspect it from a
/// test while an orchestrator owns it.
#[derive(Debug)]
pub struct MemoryProvider {
    state: Mutex<MemoryState>,
    sign_in_allowed: Mutex<bool>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            sign_in_allowed: Mutex::new(true),
        }
    }

    /// Creates a provider already holding `manifest`.
    pub fn with_manifest(manifest: Manifest) -> Self {
        let provider = Self::new();
        provider.put(manifest);
        provider
    }

    /// The stored manifest.
    pub fn manifest(&self) -> Option<Manifest> {
        self.state.lock().manifest.clone()
    }

    /// Overwrites the stored manifest, bypassing the version check.
    pub fn put(&self, manifest: Manifest) {
        let mut state = self.state.lock();
        Self::store(&mut state, manifest);
    }

    /// Allows or refuses future sign-ins.
    pub fn set_sign_in_allowed(&self, allowed: bool) {
        *self.sign_in_allowed.lock() = allowed;
    }

    /// Queues `fault` for the next call of `operation`.
    pub fn inject(&self, operation: Operation, fault: Fault) {
        self.state.lock().faults.push_back((operation, fault));
    }

    /// Number of `get_manifest` calls that reached the store.
    pub fn fetch_count(&self) -> u64 {
        self.state.lock().fetches
    }

    /// Number of accepted uploads.
    pub fn upload_count(&self) -> u64 {
        self.state.lock().uploads
    }

    fn store(state: &mut MemoryState, manifest: Manifest) {
        let now = now_millis();
        let stamp = state.last_modified.map_or(now, |prev| now.max(prev + 1));
        state.manifest = Some(manifest);
        state.last_modified = Some(stamp);
    }

    /// Checks the connection and fires the first fault queued for `op`.
    fn enter(state: &mut MemoryState, op: Operation) -> SyncResult<()> {
        if !state.connected {
            return Err(SyncError::auth("memory provider is not connected"));
        }
        let Some(pos) = state.faults.iter().position(|(o, _)| *o == op) else {
            return Ok(());
        };
        let Some((_, fault)) = state.faults.remove(pos) else {
            return Ok(());
        };
        match fault {
            Fault::Network => Err(SyncError::network_retryable("injected network failure")),
            Fault::Offline => Err(SyncError::network_fatal("injected outage")),
            Fault::Auth => Err(SyncError::auth("injected credential rejection")),
            Fault::ConcurrentWrite(manifest) => {
                Self::store(state, manifest);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RemoteStorageProvider for MemoryProvider {
    async fn initialize(&self) -> SyncResult<()> {
        if !*self.sign_in_allowed.lock() {
            return Err(SyncError::auth("sign-in refused"));
        }
        self.state.lock().connected = true;
        Ok(())
    }

    async fn is_authenticated(&self) -> bool {
        self.state.lock().connected
    }

    async fn get_manifest(&self) -> SyncResult<Option<Manifest>> {
        let mut state = self.state.lock();
        Self::enter(&mut state, Operation::Get)?;
        state.fetches += 1;
        Ok(state.manifest.clone())
    }

    async fn upload_manifest(
        &self,
        manifest: &Manifest,
        previous_version: Option<u64>,
    ) -> SyncResult<()> {
        let mut state = self.state.lock();
        Self::enter(&mut state, Operation::Upload)?;
        check_version(previous_version, state.manifest.as_ref().map(|m| m.version))?;
        Self::store(&mut state, manifest.clone());
        state.uploads += 1;
        Ok(())
    }

    async fn get_last_modified(&self) -> SyncResult<Option<u64>> {
        let mut state = self.state.lock();
        Self::enter(&mut state, Operation::LastModified)?;
        Ok(state.last_modified)
    }

    async fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
