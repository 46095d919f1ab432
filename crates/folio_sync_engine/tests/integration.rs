//! Integration tests for the orchestrator against real providers.

use async_trait::async_trait;
use folio_core::{MemoryDocument, ReplicaStore, RestoreMode, SyncState};
use folio_protocol::Manifest;
use folio_sync_engine::{
    DirectoryBackupHook, DirectoryProvider, Fault, MemoryProvider, Operation, ReloadFlag,
    ReloadHook, RemoteStorageProvider, RetryConfig, SyncConfig, SyncError, SyncOrchestrator,
    SyncPhase, SyncResult,
};
use folio_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn config(device: &str) -> SyncConfig {
    SyncConfig::new(device)
        .with_device_name(format!("{device} name"))
        .with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
}

fn device(
    id: &str,
    provider: Arc<dyn RemoteStorageProvider>,
) -> SyncOrchestrator<MemoryDocument> {
    SyncOrchestrator::builder(config(id), SyncState::new(MemoryDocument::new()), provider).build()
}

/// Delegates to a [`MemoryProvider`] and logs disconnects.
struct LoggedProvider {
    inner: Arc<MemoryProvider>,
    log: EventLog,
}

#[async_trait]
impl RemoteStorageProvider for LoggedProvider {
    async fn initialize(&self) -> SyncResult<()> {
        self.inner.initialize().await
    }

    async fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated().await
    }

    async fn get_manifest(&self) -> SyncResult<Option<Manifest>> {
        self.inner.get_manifest().await
    }

    async fn upload_manifest(
        &self,
        manifest: &Manifest,
        previous_version: Option<u64>,
    ) -> SyncResult<()> {
        self.inner.upload_manifest(manifest, previous_version).await
    }

    async fn get_last_modified(&self) -> SyncResult<Option<u64>> {
        self.inner.get_last_modified().await
    }

    async fn disconnect(&self) {
        self.log.push("provider.disconnect");
        self.inner.disconnect().await;
    }

    fn name(&self) -> &'static str {
        "logged"
    }
}

struct LoggedReload {
    log: EventLog,
}

#[async_trait]
impl ReloadHook for LoggedReload {
    async fn request_reload(&self) {
        self.log.push("reload");
    }
}

#[tokio::test]
async fn two_devices_converge_through_memory_remote() {
    let remote = Arc::new(MemoryProvider::new());
    let laptop = device("laptop", remote.clone());
    let phone = device("phone", remote.clone());

    laptop.initialize().await.unwrap();
    laptop
        .apply_local_change(|m| {
            m.books.insert("b1".into(), book("b1", "Dune", 10));
        })
        .await
        .unwrap();
    laptop.cancel_pending();
    laptop.force_push("manual").await.unwrap();

    let first = phone.initialize().await.unwrap();
    assert_eq!(first.remote_version, Some(2));
    assert_eq!(first.uploaded_version, 3);
    assert!(phone.manifest().await.unwrap().books.contains_key("b1"));

    phone
        .apply_local_change(|m| {
            m.reading_list
                .insert("dune.epub".into(), reading_entry("dune.epub", 0.4, 20));
        })
        .await
        .unwrap();
    phone.force_push("manual").await.unwrap();
    laptop.force_push("manual").await.unwrap();

    let laptop_view = laptop.manifest().await.unwrap();
    assert_eq!(laptop_view.reading_list["dune.epub"].percentage, 0.4);
    assert!(laptop_view.device_registry.contains_key("laptop"));
    assert!(laptop_view.device_registry.contains_key("phone"));
    assert_eq!(laptop_view.device_id, "laptop");

    let stored = remote.manifest().unwrap();
    assert_eq!(stored.version, 5);
    assert_eq!(stored.version, laptop_view.version);
    assert_eq!(remote.upload_count(), 5);
}

#[tokio::test]
async fn two_devices_converge_through_directory_remote() {
    let shared = TestLibrary::new();
    let laptop_library = TestLibrary::new();
    let phone_library = TestLibrary::new();
    let backups = laptop_library.remote_dir().join("backups");

    let laptop = SyncOrchestrator::builder(
        config("laptop"),
        laptop_library.open_state(),
        Arc::new(DirectoryProvider::local(shared.remote_dir())),
    )
    .with_checkpoint_store(laptop_library.open_checkpoints(5))
    .with_backup_hook(Arc::new(DirectoryBackupHook::new(&backups)))
    .build();
    let phone = SyncOrchestrator::builder(
        config("phone"),
        phone_library.open_state(),
        Arc::new(DirectoryProvider::local(shared.remote_dir())),
    )
    .build();

    laptop.initialize().await.unwrap();
    laptop
        .apply_local_change(|m| {
            m.books.insert("b1".into(), book("b1", "Dune", 10));
            m.books
                .get_mut("b1")
                .unwrap()
                .annotations
                .push(highlight("b1", "spice"));
        })
        .await
        .unwrap();
    laptop.force_push("manual").await.unwrap();

    phone.initialize().await.unwrap();
    let phone_view = phone.manifest().await.unwrap();
    assert_eq!(phone_view.books["b1"].annotations.len(), 1);

    phone
        .apply_local_change(|m| {
            m.lexicon.push(lexicon_rule("Mr.", "Mister"));
        })
        .await
        .unwrap();
    phone.force_push("manual").await.unwrap();
    laptop.force_push("manual").await.unwrap();

    let on_disk = Manifest::from_slice(
        &std::fs::read(shared.remote_dir().join("manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(on_disk, laptop.manifest().await.unwrap());
    assert_eq!(on_disk.lexicon.len(), 1);

    // The laptop's local state survives a restart.
    drop(laptop);
    let reopened = laptop_library.open_state().manifest().unwrap();
    assert_eq!(reopened, on_disk);
    assert!(!laptop_library.open_checkpoints(5).list_checkpoints().unwrap().is_empty());

    let written = DirectoryBackupHook::new(&backups).backups().unwrap();
    assert!(!written.is_empty());
}

#[tokio::test]
async fn concurrent_writer_triggers_a_remerge() {
    let remote = Arc::new(MemoryProvider::new());
    let laptop = device("laptop", remote.clone());
    laptop.initialize().await.unwrap();

    let other = ManifestBuilder::new("phone")
        .version(2)
        .book("b2", book("b2", "Emma", 5))
        .device("phone", "Phone", 5)
        .build();
    remote.inject(Operation::Upload, Fault::ConcurrentWrite(other));

    let result = laptop.force_push("manual").await.unwrap();
    assert_eq!(result.attempts, 2);
    assert_eq!(result.remote_version, Some(2));
    assert_eq!(result.uploaded_version, 3);
    assert_eq!(laptop.stats().conflicts_encountered, 1);

    let local = laptop.manifest().await.unwrap();
    assert!(local.books.contains_key("b2"));
    assert!(local.device_registry.contains_key("phone"));
    assert_eq!(remote.manifest().unwrap(), local);
}

#[tokio::test]
async fn exhausted_conflicts_roll_back() {
    let remote = Arc::new(MemoryProvider::new());
    let config = config("laptop").with_retry(
        RetryConfig::new(2)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false),
    );
    let laptop =
        SyncOrchestrator::builder(config, SyncState::new(MemoryDocument::new()), remote.clone())
            .build();
    laptop.initialize().await.unwrap();
    let before = laptop.manifest().await.unwrap();

    remote.inject(
        Operation::Upload,
        Fault::ConcurrentWrite(ManifestBuilder::new("phone").version(5).build()),
    );
    remote.inject(
        Operation::Upload,
        Fault::ConcurrentWrite(ManifestBuilder::new("phone").version(6).build()),
    );

    let err = laptop.force_push("manual").await.unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(
        err,
        SyncError::Conflict {
            expected: Some(5),
            actual: Some(6)
        }
    ));
    assert_eq!(laptop.manifest().await.unwrap(), before);
    assert_eq!(laptop.phase(), SyncPhase::Error);
    assert_eq!(laptop.stats().conflicts_encountered, 2);
    assert_eq!(remote.manifest().unwrap().version, 6);
}

#[tokio::test(start_paused = true)]
async fn local_changes_are_debounced_into_one_cycle() {
    let remote = Arc::new(MemoryProvider::new());
    let sync = SyncOrchestrator::builder(
        config("laptop").with_debounce(Duration::from_secs(60)),
        SyncState::new(MemoryDocument::new()),
        remote.clone(),
    )
    .build();
    sync.initialize().await.unwrap();
    assert_eq!(remote.upload_count(), 1);

    for (i, title) in ["A", "B", "C"].into_iter().enumerate() {
        let id = format!("b{i}");
        sync.apply_local_change(|m| {
            m.books.insert(id.clone(), book(&id, title, 10));
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    assert!(sync.has_pending_sync());
    assert_eq!(sync.phase(), SyncPhase::Scheduled);
    assert_eq!(remote.upload_count(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    for _ in 0..100 {
        if remote.upload_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(remote.upload_count(), 2);
    assert_eq!(remote.manifest().unwrap().books.len(), 3);
    assert!(!sync.has_pending_sync());
    assert_eq!(sync.phase(), SyncPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn force_push_cancels_the_pending_timer() {
    let remote = Arc::new(MemoryProvider::new());
    let sync = device("laptop", remote.clone());
    sync.initialize().await.unwrap();

    sync.apply_local_change(|m| {
        m.books.insert("b1".into(), book("b1", "Dune", 1));
    })
    .await
    .unwrap();
    assert!(sync.has_pending_sync());

    sync.force_push("manual").await.unwrap();
    assert!(!sync.has_pending_sync());

    tokio::time::sleep(sync.config().debounce * 2).await;
    assert_eq!(remote.upload_count(), 2);
}

#[tokio::test]
async fn rejected_local_change_writes_nothing() {
    let remote = Arc::new(MemoryProvider::new());
    let sync = device("laptop", remote);
    sync.initialize().await.unwrap();
    let before = sync.manifest().await.unwrap();

    let mut bad = lexicon_rule("a", "b");
    bad.id = "not-a-uuid".into();
    let err = sync
        .apply_local_change(move |m| m.lexicon.push(bad))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Validation(_)));
    assert!(!sync.has_pending_sync());
    assert_eq!(sync.manifest().await.unwrap(), before);
}

#[tokio::test]
async fn restore_disconnects_before_wiping_and_reloads_last() {
    let log = EventLog::new();
    let backend = Arc::new(RecordingBackend::new("replica", log.clone()));
    let state =
        SyncState::with_replica(MemoryDocument::new(), ReplicaStore::new(backend.clone())).unwrap();
    let remote = Arc::new(MemoryProvider::new());
    let provider = Arc::new(LoggedProvider {
        inner: remote.clone(),
        log: log.clone(),
    });

    let sync = SyncOrchestrator::builder(config("laptop"), state, provider)
        .with_reload_hook(Arc::new(LoggedReload { log: log.clone() }))
        .build();
    sync.initialize().await.unwrap();

    sync.apply_local_change(|m| {
        m.books.insert("b1".into(), book("b1", "Dune", 1));
    })
    .await
    .unwrap();
    let checkpoint = sync.create_checkpoint("manual").await.unwrap();
    sync.apply_local_change(|m| {
        m.books.remove("b1");
    })
    .await
    .unwrap();

    let diff = sync.inspect_checkpoint(checkpoint).await.unwrap();
    assert_eq!(diff.checkpoint_counts.books, 1);
    assert_eq!(diff.live_counts.books, 0);
    assert_eq!(diff.books_restored, vec!["b1".to_string()]);

    log.clear();
    let outcome = sync.restore_checkpoint(checkpoint).await.unwrap();
    assert_eq!(outcome.mode, RestoreMode::Replica);

    let disconnect = log.position("provider.disconnect").unwrap();
    let wipe = log.position("replica.truncate(0)").unwrap();
    let reload = log.position("reload").unwrap();
    assert!(disconnect < wipe, "events: {:?}", log.events());
    assert!(wipe < reload, "events: {:?}", log.events());

    assert!(!sync.is_initialized());
    assert!(!sync.has_pending_sync());
    assert!(sync.manifest().await.unwrap().books.contains_key("b1"));
    assert!(matches!(
        sync.force_push("manual").await,
        Err(SyncError::NotInitialized)
    ));

    sync.initialize().await.unwrap();
    assert!(remote.manifest().unwrap().books.contains_key("b1"));
}

#[tokio::test]
async fn restore_of_unknown_checkpoint_touches_nothing() {
    let reload = Arc::new(ReloadFlag::new());
    let sync = SyncOrchestrator::builder(
        config("laptop"),
        SyncState::new(MemoryDocument::new()),
        Arc::new(MemoryProvider::new()),
    )
    .with_reload_hook(reload.clone())
    .build();
    sync.initialize().await.unwrap();

    assert!(sync.restore_checkpoint(999).await.is_err());
    assert!(sync.is_initialized());
    assert!(!reload.is_requested());
}

#[tokio::test]
async fn failed_replica_write_leaves_local_state_untouched() {
    let log = EventLog::new();
    let backend = Arc::new(RecordingBackend::new("replica", log.clone()));
    let replica = ReplicaStore::new(backend.clone());
    let state = SyncState::with_replica(MemoryDocument::new(), replica.clone()).unwrap();
    let remote = Arc::new(MemoryProvider::new());
    let sync = SyncOrchestrator::builder(config("laptop"), state, remote.clone()).build();
    sync.initialize().await.unwrap();

    let before = sync.manifest().await.unwrap();
    let persisted = replica.load().unwrap();
    assert!(persisted.is_some());

    let mut moved = remote.manifest().unwrap();
    moved.version += 1;
    moved.books.insert("remote-book".into(), book("remote-book", "Emma", 5));
    remote.put(moved);
    let uploads = remote.upload_count();

    backend.fail_next_appends(1);
    assert!(sync.force_push("manual").await.is_err());
    assert!(log.position("replica.replace-failed").is_some());

    let after = sync.manifest().await.unwrap();
    assert_eq!(after, before);
    assert!(!after.books.contains_key("remote-book"));
    assert_eq!(replica.load().unwrap(), persisted);
    assert_eq!(remote.upload_count(), uploads);

    // The next cycle picks the remote change up normally.
    let result = sync.force_push("manual").await.unwrap();
    assert_eq!(result.uploaded_version, before.version + 2);
    assert!(sync.manifest().await.unwrap().books.contains_key("remote-book"));
}
