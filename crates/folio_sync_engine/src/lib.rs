//! # Folio Sync Engine
//!
//! Keeps a library in sync across devices through a single remote
//! manifest.
//!
//! This crate provides:
//! - The [`SyncOrchestrator`] (debounce, single in-flight cycle, bounded
//!   retries on conflict and transient network errors)
//! - The [`RemoteStorageProvider`] interface and two providers
//! - Auth strategies chosen once per platform
//! - Backup and reload hooks
//!
//! ## Architecture
//!
//! A cycle is **fetch → merge → commit → upload**:
//! 1. Checkpoint the live state and write an out-of-band backup
//! 2. Fetch the remote manifest
//! 3. Merge it with the local one and commit the result locally
//! 4. Upload with the fetched version as the concurrency token
//!
//! ## Key Invariants
//!
//! - At most one cycle runs at a time; restore excludes sync
//! - The remote holds no merge logic; a stale upload is rejected
//! - A failed cycle leaves the local state as it found it
//! - The manifest version grows by one per accepted upload

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod hooks;
mod orchestrator;
mod provider;

pub use config::{
    ProviderConfig, ProviderKind, RetryConfig, SyncConfig, DEFAULT_DEBOUNCE, PRE_SYNC_TRIGGER,
};
pub use error::{SyncError, SyncResult};
pub use hooks::{BackupHook, DirectoryBackupHook, NoopBackupHook, ReloadFlag, ReloadHook};
pub use orchestrator::{
    OrchestratorBuilder, SyncCycleResult, SyncOrchestrator, SyncPhase, SyncStats,
};
pub use provider::{
    AnyProvider, AuthSession, AuthStrategy, Credentials, DirectoryProvider, Fault, MemoryProvider,
    Operation, Platform, RemoteStorageProvider,
};
