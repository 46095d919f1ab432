//! The replicated document holding live library state.
//!
//! [`ReplicatedDocument`] is the seam to the replication engine. The sync
//! and checkpoint code only needs to read and write the manifest view,
//! encode the whole state as one update blob and apply such blobs back.
//!
//! [`MemoryDocument`] is the in-process implementation: a set of named
//! containers (maps, arrays, text and markup fragments) encoded as CBOR.

use crate::error::{CoreError, CoreResult};
use folio_protocol::{Manifest, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A document whose state can be exported and re-imported as update blobs.
pub trait ReplicatedDocument: Send + Sync + 'static {
    /// Reads the manifest view of the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored state does not form a manifest.
    fn read_manifest(&self) -> CoreResult<Manifest>;

    /// Replaces the manifest view of the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be encoded.
    fn write_manifest(&mut self, manifest: &Manifest) -> CoreResult<()>;

    /// Drops the manifest view and empties every other container.
    fn clear_all(&mut self);

    /// Encodes the entire state as one update blob.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    fn encode_state(&self) -> CoreResult<Vec<u8>>;

    /// Merges an update blob into the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be decoded. The document is left
    /// unchanged in that case.
    fn apply_update(&mut self, update: &[u8]) -> CoreResult<()>;

    /// Clears all containers and applies `update` as one atomic step.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be decoded. The document is left
    /// unchanged in that case.
    fn replace_with_update(&mut self, update: &[u8]) -> CoreResult<()>;

    /// Creates an empty, isolated instance of the same kind.
    fn fresh(&self) -> Self
    where
        Self: Sized;
}

/// A named piece of document state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// Key-value map.
    Map(BTreeMap<String, Value>),
    /// Ordered list.
    Array(Vec<Value>),
    /// Plain text.
    Text(String),
    /// A markup fragment.
    Fragment(String),
}

impl Container {
    fn clear(&mut self) {
        match self {
            Container::Map(map) => map.clear(),
            Container::Array(items) => items.clear(),
            Container::Text(text) | Container::Fragment(text) => text.clear(),
        }
    }
}

/// Name of the container holding manifest scalars and unknown keys.
const MANIFEST_ROOT: &str = "manifest";
/// Prefix of the containers holding manifest collections.
const MANIFEST_PREFIX: &str = "manifest/";

#[derive(Serialize, Deserialize)]
struct EncodedState {
    containers: BTreeMap<String, Container>,
}

/// An in-memory replicated document.
///
/// The manifest is stored as one map container per top-level collection
/// (`manifest/books`, `manifest/readingList`, ...), one array container for
/// the lexicon, and the scalars in the `manifest` map. Other containers
/// belong to the application and are never touched by manifest writes.
///
/// Updates merge container by container: map entries are overwritten key by
/// key, the other container kinds are replaced whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryDocument {
    containers: BTreeMap<String, Container>,
}

impl MemoryDocument {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document holding `manifest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be encoded.
    pub fn from_manifest(manifest: &Manifest) -> CoreResult<Self> {
        let mut document = Self::new();
        document.write_manifest(manifest)?;
        Ok(document)
    }

    /// Returns the container called `name`.
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.get(name)
    }

    /// Names of all containers.
    pub fn container_names(&self) -> impl Iterator<Item = &str> {
        self.containers.keys().map(String::as_str)
    }

    /// Sets a text container.
    pub fn set_text(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.containers
            .insert(name.into(), Container::Text(text.into()));
    }

    /// Reads a text container.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.containers.get(name) {
            Some(Container::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Sets a fragment container.
    pub fn set_fragment(&mut self, name: impl Into<String>, markup: impl Into<String>) {
        self.containers
            .insert(name.into(), Container::Fragment(markup.into()));
    }

    /// Returns true if no container holds any data.
    pub fn is_empty(&self) -> bool {
        self.containers.values().all(|c| match c {
            Container::Map(map) => map.is_empty(),
            Container::Array(items) => items.is_empty(),
            Container::Text(text) | Container::Fragment(text) => text.is_empty(),
        })
    }

    fn decode(update: &[u8]) -> CoreResult<BTreeMap<String, Container>> {
        let state: EncodedState = ciborium::from_reader(update)
            .map_err(|e| CoreError::invalid_format(format!("document update: {e}")))?;
        Ok(state.containers)
    }
}

impl ReplicatedDocument for MemoryDocument {
    fn read_manifest(&self) -> CoreResult<Manifest> {
        let mut fields = serde_json::Map::new();

        if let Some(Container::Map(root)) = self.containers.get(MANIFEST_ROOT) {
            for (key, value) in root {
                fields.insert(key.clone(), value.clone());
            }
        }

        for (name, container) in self.containers.range(MANIFEST_PREFIX.to_string()..) {
            let Some(key) = name.strip_prefix(MANIFEST_PREFIX) else {
                break;
            };
            let value = match container {
                Container::Map(map) => {
                    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                }
                Container::Array(items) => Value::Array(items.clone()),
                Container::Text(_) | Container::Fragment(_) => continue,
            };
            fields.insert(key.to_string(), value);
        }

        serde_json::from_value(Value::Object(fields))
            .map_err(|e| CoreError::Manifest(ProtocolError::from(e)))
    }

    fn write_manifest(&mut self, manifest: &Manifest) -> CoreResult<()> {
        let value =
            serde_json::to_value(manifest).map_err(|e| CoreError::Manifest(ProtocolError::from(e)))?;
        let Value::Object(fields) = value else {
            return Err(CoreError::invalid_format("manifest is not a JSON object"));
        };

        let mut containers = BTreeMap::new();
        let mut root = BTreeMap::new();
        for (key, value) in fields {
            match value {
                Value::Object(map) => {
                    containers.insert(
                        format!("{MANIFEST_PREFIX}{key}"),
                        Container::Map(map.into_iter().collect()),
                    );
                }
                Value::Array(items) => {
                    containers.insert(format!("{MANIFEST_PREFIX}{key}"), Container::Array(items));
                }
                scalar => {
                    root.insert(key, scalar);
                }
            }
        }
        containers.insert(MANIFEST_ROOT.to_string(), Container::Map(root));

        self.containers
            .retain(|name, _| name != MANIFEST_ROOT && !name.starts_with(MANIFEST_PREFIX));
        self.containers.extend(containers);
        Ok(())
    }

    fn clear_all(&mut self) {
        self.containers
            .retain(|name, _| name != MANIFEST_ROOT && !name.starts_with(MANIFEST_PREFIX));
        for container in self.containers.values_mut() {
            container.clear();
        }
    }

    fn encode_state(&self) -> CoreResult<Vec<u8>> {
        let state = EncodedState {
            containers: self.containers.clone(),
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&state, &mut buf)
            .map_err(|e| CoreError::invalid_format(format!("document encode: {e}")))?;
        Ok(buf)
    }

    fn apply_update(&mut self, update: &[u8]) -> CoreResult<()> {
        for (name, incoming) in Self::decode(update)? {
            match incoming {
                Container::Map(entries) => match self.containers.get_mut(&name) {
                    Some(Container::Map(current)) => current.extend(entries),
                    _ => {
                        self.containers.insert(name, Container::Map(entries));
                    }
                },
                other => {
                    self.containers.insert(name, other);
                }
            }
        }
        Ok(())
    }

    fn replace_with_update(&mut self, update: &[u8]) -> CoreResult<()> {
        self.containers = Self::decode(update)?;
        Ok(())
    }

    fn fresh(&self) -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_protocol::{BookEntry, LexiconRule};
    use serde_json::json;

    fn sample_manifest() -> Manifest {
        let mut manifest = Manifest::new("device-a");
        manifest.version = 5;
        manifest.last_updated = 1_000;
        manifest.books.insert("b1".into(), BookEntry::default());
        manifest.lexicon.push(LexiconRule {
            id: "0b6f3f0e-6a38-4f5e-9d43-1c9a1c6b2f10".into(),
            original: "Dr.".into(),
            replacement: "Doctor".into(),
            created: 1,
            is_regex: None,
            book_id: None,
        });
        manifest.extra.insert("newFeatureField".into(), json!({"on": true}));
        manifest.extra.insert("schemaHint".into(), json!("v9"));
        manifest
    }

    #[test]
    fn manifest_view_round_trips() {
        let manifest = sample_manifest();
        let document = MemoryDocument::from_manifest(&manifest).unwrap();
        assert_eq!(document.read_manifest().unwrap(), manifest);
        assert!(document.container("manifest/books").is_some());
        assert!(matches!(
            document.container("manifest/lexicon"),
            Some(Container::Array(_))
        ));
    }

    #[test]
    fn empty_document_reads_empty_manifest() {
        let manifest = MemoryDocument::new().read_manifest().unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest.version, 0);
    }

    #[test]
    fn manifest_writes_leave_application_containers_alone() {
        let mut document = MemoryDocument::new();
        document.set_text("notes", "scratch");
        document.write_manifest(&sample_manifest()).unwrap();
        document.write_manifest(&Manifest::new("device-b")).unwrap();

        assert_eq!(document.text("notes"), Some("scratch"));
        assert_eq!(document.read_manifest().unwrap().device_id, "device-b");
        assert!(document.read_manifest().unwrap().books.is_empty());
    }

    #[test]
    fn encoded_state_rebuilds_an_equal_document() {
        let mut document = MemoryDocument::from_manifest(&sample_manifest()).unwrap();
        document.set_fragment("layout", "<p>hi</p>");

        let mut copy = document.fresh();
        copy.apply_update(&document.encode_state().unwrap()).unwrap();
        assert_eq!(copy, document);
    }

    #[test]
    fn apply_update_merges_map_entries() {
        let mut a = MemoryDocument::new();
        let mut with_b1 = Manifest::new("d");
        with_b1.books.insert("b1".into(), BookEntry::default());
        a.write_manifest(&with_b1).unwrap();

        let mut b = MemoryDocument::new();
        let mut with_b2 = Manifest::new("d");
        with_b2.books.insert("b2".into(), BookEntry::default());
        b.write_manifest(&with_b2).unwrap();

        a.apply_update(&b.encode_state().unwrap()).unwrap();
        let books = a.read_manifest().unwrap().books;
        assert!(books.contains_key("b1"));
        assert!(books.contains_key("b2"));
    }

    #[test]
    fn replace_with_update_drops_previous_state() {
        let mut document = MemoryDocument::from_manifest(&sample_manifest()).unwrap();
        document.set_text("notes", "old");
        let replacement = MemoryDocument::from_manifest(&Manifest::new("other")).unwrap();

        document
            .replace_with_update(&replacement.encode_state().unwrap())
            .unwrap();
        assert_eq!(document, replacement);
        assert_eq!(document.text("notes"), None);
    }

    #[test]
    fn bad_update_leaves_document_untouched() {
        let mut document = MemoryDocument::from_manifest(&sample_manifest()).unwrap();
        let before = document.clone();

        assert!(document.replace_with_update(b"\xff\x00garbage").is_err());
        assert!(document.apply_update(b"\xff\x00garbage").is_err());
        assert_eq!(document, before);
    }

    #[test]
    fn clear_all_empties_every_container() {
        let mut document = MemoryDocument::from_manifest(&sample_manifest()).unwrap();
        document.set_text("notes", "text");
        document.set_fragment("layout", "<p/>");
        document.clear_all();
        assert!(document.is_empty());
        assert!(document.read_manifest().unwrap().is_empty());
    }

    #[test]
    fn clear_all_drops_unknown_manifest_keys() {
        let mut document = MemoryDocument::from_manifest(&sample_manifest()).unwrap();
        document.set_text("notes", "text");
        document.clear_all();

        let manifest = document.read_manifest().unwrap();
        assert!(manifest.extra.is_empty());
        assert!(document.container("manifest/newFeatureField").is_none());
        assert_eq!(document.text("notes"), Some(""));
    }
}
