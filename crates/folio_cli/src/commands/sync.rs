//! Sync command implementation.

use super::{open_checkpoints, open_state, CliError, DEVICE_FILE};
use folio_sync_engine::{
    AnyProvider, AuthStrategy, Credentials, DirectoryBackupHook, ProviderConfig, SyncConfig,
    SyncCycleResult, SyncOrchestrator,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Options of one `sync` run.
#[derive(Debug)]
pub struct SyncOptions {
    /// Remote folder.
    pub remote: PathBuf,
    /// Device id override.
    pub device: Option<String>,
    /// Sign-in strategy.
    pub auth: AuthStrategy,
    /// Backup folder.
    pub backup_dir: Option<PathBuf>,
}

/// Outcome as printed.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    device: String,
    remote_version: Option<u64>,
    uploaded_version: u64,
    records_changed: usize,
    attempts: u32,
    checkpoint: Option<u64>,
    duration_ms: u64,
}

impl SyncReport {
    fn new(device: &str, result: &SyncCycleResult) -> Self {
        Self {
            device: device.to_string(),
            remote_version: result.remote_version,
            uploaded_version: result.uploaded_version,
            records_changed: result.records_changed,
            attempts: result.attempts,
            checkpoint: result.checkpoint,
            duration_ms: result.duration.as_millis() as u64,
        }
    }
}

/// Parses a `--auth` value.
pub fn parse_auth(value: &str) -> Result<AuthStrategy, CliError> {
    match value {
        "mock" => Ok(AuthStrategy::Mock),
        "web" => Ok(AuthStrategy::WebOAuth),
        "native" => Ok(AuthStrategy::NativeSocial),
        other => Err(CliError::InvalidOption {
            option: "auth",
            value: other.to_string(),
        }),
    }
}

/// The device id stored in the library, created on first use.
fn device_id(path: &Path) -> std::io::Result<String> {
    let file = path.join(DEVICE_FILE);
    match fs::read_to_string(&file) {
        Ok(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        Ok(_) => write_device_id(&file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => write_device_id(&file),
        Err(e) => Err(e),
    }
}

fn write_device_id(file: &Path) -> std::io::Result<String> {
    let id = SyncConfig::with_random_device().device_id;
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(file, &id)?;
    info!(device = %id, "generated device id");
    Ok(id)
}

/// Runs one cycle between the library at `path` and a folder remote.
pub fn run(path: &Path, options: SyncOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let device = match options.device {
        Some(device) => device,
        None => device_id(path)?,
    };
    let config = SyncConfig::new(device.clone());
    let provider = AnyProvider::from_config(
        &ProviderConfig::directory(&options.remote).with_auth(options.auth),
        Credentials::from_env(),
    );

    let mut builder = SyncOrchestrator::builder(config, open_state(path)?, Arc::new(provider))
        .with_checkpoint_store(open_checkpoints(path)?);
    if let Some(dir) = options.backup_dir {
        builder = builder.with_backup_hook(Arc::new(DirectoryBackupHook::new(dir)));
    }
    let orchestrator = builder.build();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let result = orchestrator.initialize().await;
        orchestrator.shutdown().await;
        result
    })?;

    let report = SyncReport::new(&device, &result);
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            if result.was_first_upload() {
                println!("✓ First upload from {}", report.device);
            } else {
                println!("✓ Synced {}", report.device);
            }
            println!(
                "  Version: {:?} -> {}",
                report.remote_version, report.uploaded_version
            );
            println!("  Records changed: {}", report.records_changed);
            println!("  Attempts: {}", report.attempts);
            println!("  Duration: {} ms", report.duration_ms);
        }
    }
    Ok(())
}
