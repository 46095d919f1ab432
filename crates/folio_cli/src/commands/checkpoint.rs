//! Checkpoint commands.
//!
//! These run against a library that no app is syncing. A restore still goes
//! through the full sequence; its hooks only log, since there is no sync
//! connection to drop and no view to reload.

use super::{format_timestamp, open_checkpoints, open_state, require_library};
use async_trait::async_trait;
use folio_core::{CheckpointDiff, CheckpointInfo, CollectionCounts, RestoreHooks};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Checkpoint metadata as printed.
#[derive(Debug, Serialize)]
pub struct CheckpointRow {
    /// Id.
    pub id: u64,
    /// Creation time (ms).
    pub timestamp: u64,
    /// Trigger.
    pub trigger: String,
    /// Blob size in bytes.
    pub size: usize,
}

impl From<&CheckpointInfo> for CheckpointRow {
    fn from(info: &CheckpointInfo) -> Self {
        Self {
            id: info.id,
            timestamp: info.timestamp,
            trigger: info.trigger.clone(),
            size: info.size,
        }
    }
}

/// Record counts as printed.
#[derive(Debug, Serialize)]
pub struct Counts {
    books: usize,
    annotations: usize,
    lexicon: usize,
    reading_list: usize,
    tts_positions: usize,
    devices: usize,
}

impl From<CollectionCounts> for Counts {
    fn from(c: CollectionCounts) -> Self {
        Self {
            books: c.books,
            annotations: c.annotations,
            lexicon: c.lexicon,
            reading_list: c.reading_list,
            tts_positions: c.tts_positions,
            devices: c.devices,
        }
    }
}

/// Inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    checkpoint: CheckpointRow,
    checkpoint_version: u64,
    live_version: u64,
    checkpoint_counts: Counts,
    live_counts: Counts,
    books_restored: Vec<String>,
    books_dropped: Vec<String>,
}

impl From<CheckpointDiff> for InspectResult {
    fn from(diff: CheckpointDiff) -> Self {
        Self {
            checkpoint: CheckpointRow::from(&diff.checkpoint),
            checkpoint_version: diff.checkpoint_version,
            live_version: diff.live_version,
            checkpoint_counts: diff.checkpoint_counts.into(),
            live_counts: diff.live_counts.into(),
            books_restored: diff.books_restored,
            books_dropped: diff.books_dropped,
        }
    }
}

struct LoggingHooks;

#[async_trait]
impl RestoreHooks for LoggingHooks {
    async fn disconnect_sync(&self) {
        info!("no sync connection to drop");
    }

    async fn request_reload(&self) {
        info!("library restored, restart the app to reload it");
    }
}

/// Lists checkpoints, newest first.
pub fn list(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_checkpoints(path)?;
    let rows: Vec<CheckpointRow> = store.list_checkpoints()?.iter().map(Into::into).collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
        _ => {
            if rows.is_empty() {
                println!("No checkpoints");
            }
            for row in &rows {
                println!(
                    "{:>6}  {}  {:<12}  {} bytes",
                    row.id,
                    format_timestamp(row.timestamp),
                    row.trigger,
                    row.size
                );
            }
        }
    }
    Ok(())
}

/// Checkpoints the library now.
pub fn create(path: &Path, trigger: &str) -> Result<(), Box<dyn std::error::Error>> {
    require_library(path)?;
    let state = open_state(path)?;
    let id = open_checkpoints(path)?.create_checkpoint(&state, trigger)?;
    println!("✓ Checkpoint {id} created ({trigger})");
    Ok(())
}

/// Compares a checkpoint with the library.
pub fn inspect(path: &Path, id: u64, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    require_library(path)?;
    let state = open_state(path)?;
    let result = InspectResult::from(open_checkpoints(path)?.inspect_checkpoint(id, &state)?);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!(
                "Checkpoint {} ({}) at {}",
                result.checkpoint.id,
                result.checkpoint.trigger,
                format_timestamp(result.checkpoint.timestamp)
            );
            println!(
                "  Version:     {} (live {})",
                result.checkpoint_version, result.live_version
            );
            println!(
                "  Books:       {} (live {})",
                result.checkpoint_counts.books, result.live_counts.books
            );
            println!(
                "  Annotations: {} (live {})",
                result.checkpoint_counts.annotations, result.live_counts.annotations
            );
            println!(
                "  Lexicon:     {} (live {})",
                result.checkpoint_counts.lexicon, result.live_counts.lexicon
            );
            if !result.books_restored.is_empty() {
                println!("  Would restore: {}", result.books_restored.join(", "));
            }
            if !result.books_dropped.is_empty() {
                println!("  Would drop:    {}", result.books_dropped.join(", "));
            }
        }
    }
    Ok(())
}

/// Replaces the library with checkpoint `id`.
pub fn restore(path: &Path, id: u64) -> Result<(), Box<dyn std::error::Error>> {
    require_library(path)?;
    let mut state = open_state(path)?;
    let store = open_checkpoints(path)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(store.restore_checkpoint(id, &mut state, &LoggingHooks))?;

    println!(
        "✓ Restored checkpoint {} ({:?})",
        outcome.checkpoint.id, outcome.mode
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_testkit::book;
    use tempfile::tempdir;

    #[test]
    fn create_then_restore_round_trip() {
        let dir = tempdir().unwrap();
        {
            let mut state = open_state(dir.path()).unwrap();
            state
                .update(|m| {
                    m.books.insert("b1".into(), book("b1", "Dune", 1));
                })
                .unwrap();
        }
        create(dir.path(), "manual").unwrap();
        let id = open_checkpoints(dir.path()).unwrap().list_checkpoints().unwrap()[0].id;

        {
            let mut state = open_state(dir.path()).unwrap();
            state.update(|m| m.books.clear()).unwrap();
        }
        inspect(dir.path(), id, "json").unwrap();
        restore(dir.path(), id).unwrap();

        let restored = open_state(dir.path()).unwrap().manifest().unwrap();
        assert!(restored.books.contains_key("b1"));
    }

    #[test]
    fn commands_need_a_library() {
        let dir = tempdir().unwrap();
        assert!(create(dir.path(), "manual").is_err());
        assert!(restore(dir.path(), 1).is_err());
    }
}
