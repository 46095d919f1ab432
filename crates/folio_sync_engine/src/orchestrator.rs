//! The sync orchestrator.
//!
//! One cycle is: checkpoint, backup, fetch, merge, commit locally, upload.
//! Cycles are serialized by the lock around the live [`SyncState`]; holding
//! that lock is what "syncing" means. A failed cycle rolls the local state
//! back to what it was before the cycle started.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::hooks::{BackupHook, NoopBackupHook, ReloadFlag, ReloadHook, SyncRestoreHooks};
use crate::provider::RemoteStorageProvider;
use folio_core::{
    CheckpointConfig, CheckpointDiff, CheckpointId, CheckpointInfo, CheckpointStore,
    ReplicatedDocument, RestoreOutcome, SyncState,
};
use folio_protocol::{merge, now_millis, Manifest};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the orchestrator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing pending.
    Idle,
    /// A debounced cycle is armed.
    Scheduled,
    /// A cycle holds the state lock.
    Syncing,
    /// The last cycle failed. The next trigger starts over.
    Error,
}

impl SyncPhase {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncPhase::Syncing)
    }

    /// Returns true if a new cycle would start right away.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that uploaded successfully.
    pub cycles_completed: u64,
    /// Cycles that ended in an error.
    pub cycles_failed: u64,
    /// Uploads rejected because the remote moved.
    pub conflicts_encountered: u64,
    /// Provider calls retried after a transient network failure.
    pub retries: u64,
    /// End of the last successful cycle (ms).
    pub last_sync_time: Option<u64>,
    /// Remote modification time observed after the last successful upload.
    pub last_remote_modified: Option<u64>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Checkpoint taken before the cycle, if one was.
    pub checkpoint: Option<CheckpointId>,
    /// Remote version the successful upload was based on.
    pub remote_version: Option<u64>,
    /// Version now stored locally and remotely.
    pub uploaded_version: u64,
    /// Records that were new or changed in the local commit.
    pub records_changed: usize,
    /// Fetch-merge-upload rounds, conflicts included.
    pub attempts: u32,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    /// Returns true if the remote held no manifest before this cycle.
    pub fn was_first_upload(&self) -> bool {
        self.remote_version.is_none()
    }
}

#[derive(Clone, Copy)]
enum CheckpointPolicy<'a> {
    /// Always checkpoint, tagged with this reason.
    Tagged(&'a str),
    /// Throttled pre-sync checkpoint.
    Automatic,
}

#[derive(Default)]
struct DebounceSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

struct Shared<D> {
    config: SyncConfig,
    provider: Arc<dyn RemoteStorageProvider>,
    checkpoints: CheckpointStore,
    state: tokio::sync::Mutex<SyncState<D>>,
    backup: Arc<dyn BackupHook>,
    reload: Arc<dyn ReloadHook>,
    initialized: Arc<AtomicBool>,
    phase: RwLock<SyncPhase>,
    stats: RwLock<SyncStats>,
    debounce: Mutex<DebounceSlot>,
}

/// Builds a [`SyncOrchestrator`].
pub struct OrchestratorBuilder<D> {
    config: SyncConfig,
    state: SyncState<D>,
    provider: Arc<dyn RemoteStorageProvider>,
    checkpoints: Option<CheckpointStore>,
    backup: Arc<dyn BackupHook>,
    reload: Arc<dyn ReloadHook>,
}

impl<D: ReplicatedDocument> OrchestratorBuilder<D> {
    /// Uses `checkpoints` instead of an in-memory store sized by
    /// [`SyncConfig::checkpoint_retention`].
    pub fn with_checkpoint_store(mut self, checkpoints: CheckpointStore) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    /// Sets the backup hook called before every cycle.
    pub fn with_backup_hook(mut self, backup: Arc<dyn BackupHook>) -> Self {
        self.backup = backup;
        self
    }

    /// Sets the hook called after a restore.
    pub fn with_reload_hook(mut self, reload: Arc<dyn ReloadHook>) -> Self {
        self.reload = reload;
        self
    }

    /// Builds the orchestrator. It starts uninitialized.
    pub fn build(self) -> SyncOrchestrator<D> {
        let checkpoints = self.checkpoints.unwrap_or_else(|| {
            CheckpointStore::in_memory(CheckpointConfig::new(self.config.checkpoint_retention))
        });
        SyncOrchestrator {
            shared: Arc::new(Shared {
                config: self.config,
                provider: self.provider,
                checkpoints,
                state: tokio::sync::Mutex::new(self.state),
                backup: self.backup,
                reload: self.reload,
                initialized: Arc::new(AtomicBool::new(false)),
                phase: RwLock::new(SyncPhase::Idle),
                stats: RwLock::new(SyncStats::default()),
                debounce: Mutex::new(DebounceSlot::default()),
            }),
        }
    }
}

/// Drives sync between the live [`SyncState`] and a remote provider.
///
/// Cloning yields another handle to the same orchestrator.
pub struct SyncOrchestrator<D> {
    shared: Arc<Shared<D>>,
}

impl<D> Clone for SyncOrchestrator<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: ReplicatedDocument> SyncOrchestrator<D> {
    /// Starts building an orchestrator that owns `state`.
    pub fn builder(
        config: SyncConfig,
        state: SyncState<D>,
        provider: Arc<dyn RemoteStorageProvider>,
    ) -> OrchestratorBuilder<D> {
        OrchestratorBuilder {
            config,
            state,
            provider,
            checkpoints: None,
            backup: Arc::new(NoopBackupHook),
            reload: Arc::new(ReloadFlag::new()),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.shared.phase.read()
    }

    /// Current stats.
    pub fn stats(&self) -> SyncStats {
        self.shared.stats.read().clone()
    }

    /// Returns true between a successful [`initialize`](Self::initialize)
    /// and the next restore or [`shutdown`](Self::shutdown).
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    /// The checkpoint store.
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.shared.checkpoints
    }

    /// Connects the provider and runs the first cycle.
    ///
    /// With no remote manifest, the local state is uploaded as the first
    /// one. Otherwise this is a full fetch-merge-upload cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Auth`] if the provider cannot sign in, or any
    /// cycle error.
    pub async fn initialize(&self) -> SyncResult<SyncCycleResult> {
        self.cancel_pending();
        let mut state = self.shared.state.lock().await;

        let connected = match self.shared.provider.initialize().await {
            Ok(()) if self.shared.provider.is_authenticated().await => Ok(()),
            Ok(()) => Err(SyncError::auth("provider did not authenticate")),
            Err(err) => Err(err),
        };
        if let Err(err) = connected {
            self.shared.record_failure(&err);
            return Err(err);
        }

        self.shared.initialized.store(true, Ordering::SeqCst);
        info!(
            provider = self.shared.provider.name(),
            device = %self.shared.config.device_id,
            "sync initialized"
        );
        self.shared
            .run_locked(&mut state, CheckpointPolicy::Automatic)
            .await
    }

    /// Runs a cycle now, checkpointing first with `reason` as the trigger.
    ///
    /// Any pending debounced cycle is canceled. Waits for a running cycle
    /// to finish first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotInitialized`] before
    /// [`initialize`](Self::initialize), [`SyncError::Conflict`] once the
    /// retry budget is spent, or any provider or local error. Local state is
    /// unchanged on error.
    pub async fn force_push(&self, reason: &str) -> SyncResult<SyncCycleResult> {
        self.cancel_pending();
        self.shared.run(CheckpointPolicy::Tagged(reason)).await
    }

    /// Arms (or re-arms) the debounce timer. When it fires, a cycle runs in
    /// the background; its failure is logged and recorded in the stats.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn schedule_sync(&self) {
        let mut slot = self.shared.debounce.lock();
        slot.generation += 1;
        let generation = slot.generation;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }

        let shared = Arc::clone(&self.shared);
        let delay = self.shared.config.debounce;
        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !shared.claim_timer(generation) {
                return;
            }
            if let Err(err) = shared.run(CheckpointPolicy::Automatic).await {
                warn!(error = %err, "scheduled sync failed");
            }
        }));
        drop(slot);

        let mut phase = self.shared.phase.write();
        if *phase != SyncPhase::Syncing {
            *phase = SyncPhase::Scheduled;
        }
        debug!(delay_ms = delay.as_millis() as u64, generation, "sync scheduled");
    }

    /// Cancels the debounce timer, if armed. A cycle that already started
    /// is not affected.
    pub fn cancel_pending(&self) {
        let mut slot = self.shared.debounce.lock();
        slot.generation += 1;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
            debug!("pending sync canceled");
        }
        drop(slot);

        let mut phase = self.shared.phase.write();
        if *phase == SyncPhase::Scheduled {
            *phase = SyncPhase::Idle;
        }
    }

    /// Returns true if a debounced cycle is armed.
    pub fn has_pending_sync(&self) -> bool {
        self.shared.debounce.lock().handle.is_some()
    }

    /// Applies `change` to the live manifest, persists it and schedules a
    /// sync. Returns the committed manifest.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if a changed record is rejected,
    /// in which case nothing is written and no sync is scheduled.
    pub async fn apply_local_change<F>(&self, change: F) -> SyncResult<Manifest>
    where
        F: FnOnce(&mut Manifest),
    {
        let manifest = {
            let mut state = self.shared.state.lock().await;
            state.update(change)?
        };
        self.schedule_sync();
        Ok(manifest)
    }

    /// Reads the live manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not hold a valid manifest.
    pub async fn manifest(&self) -> SyncResult<Manifest> {
        Ok(self.shared.state.lock().await.manifest()?)
    }

    /// Runs `f` with shared access to the live state, between cycles.
    pub async fn with_state<R>(&self, f: impl FnOnce(&SyncState<D>) -> R) -> R {
        let state = self.shared.state.lock().await;
        f(&state)
    }

    /// Cheap probe: has the remote changed since the last successful
    /// cycle?
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotInitialized`] before initialization, or a
    /// provider error.
    pub async fn has_remote_changed(&self) -> SyncResult<bool> {
        if !self.is_initialized() {
            return Err(SyncError::NotInitialized);
        }
        let remote = self.shared.provider.get_last_modified().await?;
        let seen = self.shared.stats.read().last_remote_modified;
        Ok(match (remote, seen) {
            (Some(remote), Some(seen)) => remote > seen,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    /// Creates a checkpoint of the live state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be encoded or the log write
    /// fails.
    pub async fn create_checkpoint(&self, trigger: &str) -> SyncResult<CheckpointId> {
        let state = self.shared.state.lock().await;
        Ok(self.shared.checkpoints.create_checkpoint(&*state, trigger)?)
    }

    /// All checkpoints, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn list_checkpoints(&self) -> SyncResult<Vec<CheckpointInfo>> {
        Ok(self.shared.checkpoints.list_checkpoints()?)
    }

    /// Compares a checkpoint with the live state without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Corruption`] for a damaged blob, or
    /// [`SyncError::Core`] if the checkpoint does not exist.
    pub async fn inspect_checkpoint(&self, id: CheckpointId) -> SyncResult<CheckpointDiff> {
        let state = self.shared.state.lock().await;
        Ok(self.shared.checkpoints.inspect_checkpoint(id, &*state)?)
    }

    /// Replaces the live state with checkpoint `id`.
    ///
    /// Cancels any pending cycle and waits for a running one. The provider
    /// is disconnected before anything is wiped, and the reload hook is
    /// called at the end. The orchestrator is uninitialized afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint is missing or damaged (nothing is
    /// touched), or if the replica cannot be rewritten.
    pub async fn restore_checkpoint(&self, id: CheckpointId) -> SyncResult<RestoreOutcome> {
        self.cancel_pending();
        let mut state = self.shared.state.lock().await;
        let hooks = SyncRestoreHooks {
            provider: Arc::clone(&self.shared.provider),
            reload: Arc::clone(&self.shared.reload),
            initialized: Arc::clone(&self.shared.initialized),
        };
        let outcome = self
            .shared
            .checkpoints
            .restore_checkpoint(id, &mut *state, &hooks)
            .await?;
        self.shared.set_phase(SyncPhase::Idle);
        info!(id, mode = ?outcome.mode, "checkpoint restored");
        Ok(outcome)
    }

    /// Cancels pending work and disconnects the provider.
    pub async fn shutdown(&self) {
        self.cancel_pending();
        let _state = self.shared.state.lock().await;
        self.shared.initialized.store(false, Ordering::SeqCst);
        self.shared.provider.disconnect().await;
        info!("sync shut down");
    }
}

impl<D: ReplicatedDocument> Shared<D> {
    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write() = phase;
    }

    /// Takes a fired timer out of the slot. False if it was superseded.
    fn claim_timer(&self, generation: u64) -> bool {
        let mut slot = self.debounce.lock();
        if slot.generation != generation {
            return false;
        }
        slot.handle = None;
        true
    }

    async fn run(&self, policy: CheckpointPolicy<'_>) -> SyncResult<SyncCycleResult> {
        let mut state = self.state.lock().await;
        if !self.initialized.load(Ordering::SeqCst) {
            let err = SyncError::NotInitialized;
            self.record_failure(&err);
            return Err(err);
        }
        self.run_locked(&mut state, policy).await
    }

    async fn run_locked(
        &self,
        state: &mut SyncState<D>,
        policy: CheckpointPolicy<'_>,
    ) -> SyncResult<SyncCycleResult> {
        self.set_phase(SyncPhase::Syncing);
        match self.cycle(state, policy).await {
            Ok(result) => {
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.last_sync_time = Some(now_millis());
                    stats.last_error = None;
                }
                let pending = self.debounce.lock().handle.is_some();
                self.set_phase(if pending {
                    SyncPhase::Scheduled
                } else {
                    SyncPhase::Idle
                });
                info!(
                    version = result.uploaded_version,
                    attempts = result.attempts,
                    changed = result.records_changed,
                    duration_ms = result.duration.as_millis() as u64,
                    "sync cycle complete"
                );
                Ok(result)
            }
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    fn record_failure(&self, err: &SyncError) {
        self.set_phase(SyncPhase::Error);
        let mut stats = self.stats.write();
        stats.cycles_failed += 1;
        stats.last_error = Some(err.to_string());
        warn!(error = %err, "sync cycle failed");
    }

    async fn cycle(
        &self,
        state: &mut SyncState<D>,
        policy: CheckpointPolicy<'_>,
    ) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();
        let checkpoint = match policy {
            CheckpointPolicy::Tagged(reason) => {
                Some(self.checkpoints.create_checkpoint(state, reason)?)
            }
            CheckpointPolicy::Automatic => self.checkpoints.create_automatic_checkpoint(
                state,
                &self.config.pre_sync_trigger,
                self.config.auto_checkpoint_interval,
            )?,
        };

        let local = state.manifest()?;
        if let Err(err) = self.backup.write_backup_payload(&local).await {
            warn!(error = %err, "backup hook failed, continuing");
        }

        let before = state.snapshot()?;
        let mut applied = false;
        match self.exchange(state, &mut applied).await {
            Ok(mut result) => {
                result.checkpoint = checkpoint;
                result.duration = start.elapsed();
                Ok(result)
            }
            Err(err) => {
                if applied {
                    match state.rollback(&before) {
                        Ok(()) => debug!("local state rolled back"),
                        Err(rollback) => warn!(error = %rollback, "rollback failed"),
                    }
                }
                Err(err)
            }
        }
    }

    /// Fetch, merge, commit and upload until the upload is accepted or the
    /// attempt budget runs out.
    async fn exchange(
        &self,
        state: &mut SyncState<D>,
        applied: &mut bool,
    ) -> SyncResult<SyncCycleResult> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let remote = self
                .with_retry("get_manifest", || self.provider.get_manifest())
                .await?;
            let remote_version = remote.as_ref().map(|m| m.version);

            let local = state.manifest()?;
            let mut merged = match &remote {
                Some(remote) => merge(&local, remote),
                None => {
                    info!("no remote manifest, uploading local state");
                    local
                }
            };
            let now = now_millis();
            merged.device_id = self.config.device_id.clone();
            merged.last_updated = merged.last_updated.max(now);
            merged.register_device(
                &self.config.device_id,
                &self.config.device_name,
                &self.config.platform,
                now,
            );
            merged.version += 1;

            let records_changed = state.commit(&merged)?;
            *applied = true;

            let uploaded = self
                .with_retry("upload_manifest", || {
                    self.provider.upload_manifest(&merged, remote_version)
                })
                .await;
            match uploaded {
                Ok(()) => {
                    self.observe_remote().await;
                    return Ok(SyncCycleResult {
                        checkpoint: None,
                        remote_version,
                        uploaded_version: merged.version,
                        records_changed,
                        attempts,
                        duration: Duration::ZERO,
                    });
                }
                Err(err) if err.is_conflict() => {
                    self.stats.write().conflicts_encountered += 1;
                    if attempts >= max_attempts {
                        return Err(err);
                    }
                    warn!(attempt = attempts, error = %err, "remote moved during sync, merging again");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn observe_remote(&self) {
        match self.provider.get_last_modified().await {
            Ok(modified) => self.stats.write().last_remote_modified = modified,
            Err(err) => debug!(error = %err, "could not read remote modification time"),
        }
    }

    /// Retries `call` on transient network errors with backoff.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match call().await {
                Err(SyncError::Network {
                    message,
                    retryable: true,
                }) if attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    self.stats.write().retries += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(op, attempt, delay_ms = delay.as_millis() as u64, error = %message, "provider call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::provider::{Fault, MemoryProvider, Operation};
    use folio_core::MemoryDocument;

    fn orchestrator(provider: Arc<MemoryProvider>) -> SyncOrchestrator<MemoryDocument> {
        let config = SyncConfig::new("dev-a")
            .with_device_name("Laptop")
            .with_retry(RetryConfig::new(3).with_jitter(false));
        SyncOrchestrator::builder(config, SyncState::new(MemoryDocument::new()), provider).build()
    }

    #[test]
    fn phase_predicates() {
        assert!(SyncPhase::Syncing.is_active());
        assert!(SyncPhase::Error.can_start_sync());
        assert!(!SyncPhase::Syncing.can_start_sync());
    }

    #[tokio::test]
    async fn first_run_uploads_local_state() {
        let provider = Arc::new(MemoryProvider::new());
        let sync = orchestrator(provider.clone());

        let result = sync.initialize().await.unwrap();
        assert!(result.was_first_upload());
        assert_eq!(result.uploaded_version, 1);

        let remote = provider.manifest().unwrap();
        assert_eq!(remote.version, 1);
        assert!(remote.device_registry.contains_key("dev-a"));
        assert_eq!(sync.phase(), SyncPhase::Idle);
        assert_eq!(sync.stats().cycles_completed, 1);
    }

    #[tokio::test]
    async fn force_push_needs_initialize() {
        let sync = orchestrator(Arc::new(MemoryProvider::new()));
        assert!(matches!(
            sync.force_push("manual").await,
            Err(SyncError::NotInitialized)
        ));
        assert_eq!(sync.phase(), SyncPhase::Error);
    }

    #[tokio::test]
    async fn auth_failure_leaves_state_alone() {
        let provider = Arc::new(MemoryProvider::new());
        provider.set_sign_in_allowed(false);
        let sync = orchestrator(provider.clone());

        assert!(matches!(sync.initialize().await, Err(SyncError::Auth(_))));
        assert!(!sync.is_initialized());
        assert!(provider.manifest().is_none());
        assert_eq!(sync.manifest().await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn transient_network_errors_are_retried() {
        let provider = Arc::new(MemoryProvider::new());
        let sync = orchestrator(provider.clone());
        sync.initialize().await.unwrap();

        provider.inject(Operation::Get, Fault::Network);
        provider.inject(Operation::Upload, Fault::Network);
        let result = sync.force_push("manual").await.unwrap();

        assert_eq!(result.uploaded_version, 2);
        assert_eq!(sync.stats().retries, 2);
    }

    #[tokio::test]
    async fn fatal_network_error_rolls_back() {
        let provider = Arc::new(MemoryProvider::new());
        let sync = orchestrator(provider.clone());
        sync.initialize().await.unwrap();
        let before = sync.manifest().await.unwrap();

        provider.inject(Operation::Upload, Fault::Offline);
        let err = sync.force_push("manual").await.unwrap_err();
        assert!(!err.is_retryable());

        assert_eq!(sync.manifest().await.unwrap(), before);
        assert_eq!(sync.phase(), SyncPhase::Error);
        assert!(sync.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn has_remote_changed_tracks_other_writers() {
        let provider = Arc::new(MemoryProvider::new());
        let sync = orchestrator(provider.clone());
        assert!(matches!(
            sync.has_remote_changed().await,
            Err(SyncError::NotInitialized)
        ));

        sync.initialize().await.unwrap();
        assert!(!sync.has_remote_changed().await.unwrap());

        let mut other = provider.manifest().unwrap();
        other.version += 1;
        provider.put(other);
        assert!(sync.has_remote_changed().await.unwrap());
    }

    #[tokio::test]
    async fn force_push_checkpoints_with_reason() {
        let provider = Arc::new(MemoryProvider::new());
        let sync = orchestrator(provider);
        sync.initialize().await.unwrap();

        let result = sync.force_push("before-import").await.unwrap();
        let id = result.checkpoint.unwrap();
        let info = sync.list_checkpoints().unwrap();
        assert_eq!(info[0].id, id);
        assert_eq!(info[0].trigger, "before-import");
    }
}
