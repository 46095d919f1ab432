//! Merge command implementation.

use super::read_manifest;
use folio_protocol::merge;
use std::fs;
use std::path::Path;
use tracing::info;

/// Merges `local` with `remote` and prints or writes the result.
pub fn run(
    local_path: &Path,
    remote_path: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let local = read_manifest(local_path)?;
    let remote = read_manifest(remote_path)?;

    let merged = merge(&local, &remote);
    info!(
        local = local.version,
        remote = remote.version,
        books = merged.books.len(),
        "merged manifests"
    );

    let json = merged.to_json_pretty()?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            println!("✓ Merged manifest written to {:?}", path);
        }
        None => println!("{json}"),
    }
    Ok(())
}
