//! Validate command implementation.

use super::{read_manifest, CliError};
use folio_protocol::{changed_records, Manifest, RecordValidator, SchemaValidator};
use serde::Serialize;
use std::path::Path;

/// One rejected record.
#[derive(Debug, Serialize)]
pub struct Rejection {
    /// Record kind.
    pub kind: String,
    /// Record key.
    pub key: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Validation result.
#[derive(Debug, Serialize)]
pub struct ValidateResult {
    /// Manifest file.
    pub path: String,
    /// Manifest version.
    pub version: u64,
    /// Records checked.
    pub checked: usize,
    /// Records rejected.
    pub rejected: Vec<Rejection>,
}

/// Checks every record of a manifest file against the schema.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = read_manifest(path)?;
    let result = check(path, &manifest);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }

    if result.rejected.is_empty() {
        Ok(())
    } else {
        Err(CliError::InvalidRecords(result.rejected.len()).into())
    }
}

fn check(path: &Path, manifest: &Manifest) -> ValidateResult {
    let empty = Manifest::new(manifest.device_id.clone());
    let records = changed_records(&empty, manifest);
    let rejected = records
        .iter()
        .filter_map(|record| SchemaValidator.validate(record).err())
        .map(|err| Rejection {
            kind: err.kind.to_string(),
            key: err.key.clone(),
            reason: err.reason.clone(),
        })
        .collect();

    ValidateResult {
        path: path.display().to_string(),
        version: manifest.version,
        checked: records.len(),
        rejected,
    }
}

fn print_text_output(result: &ValidateResult) {
    println!("Manifest: {}", result.path);
    println!("Version:  {}", result.version);
    println!("Records:  {}", result.checked);
    if result.rejected.is_empty() {
        println!("✓ All records valid");
        return;
    }
    println!("✗ {} rejected:", result.rejected.len());
    for rejection in &result.rejected {
        println!("  {} {}: {}", rejection.kind, rejection.key, rejection.reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_testkit::{book, highlight, ManifestBuilder};

    #[test]
    fn reports_bad_annotation_ids() {
        let mut bad = highlight("b1", "spice");
        bad.id = "not-a-uuid".into();
        let manifest = ManifestBuilder::new("d1")
            .book("b1", book("b1", "Dune", 1))
            .annotation("b1", highlight("b1", "fine"))
            .annotation("b1", bad)
            .build();

        let result = check(Path::new("m.json"), &manifest);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].key, "not-a-uuid");
        assert!(result.checked >= 3);
    }
}
