//! Consolidated metadata: every `.zarray`, `.zgroup` and `.zattrs` below a
//! group gathered into one `.zmetadata` document.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::error::{ZarrError, ZarrResult};
use crate::metadata::{self, ArrayMetadata, Attributes, ZARRAY, ZATTRS, ZGROUP, ZMETADATA};
use crate::path;
use crate::store::StorageBackend;

/// The consolidated format version written and accepted.
pub const CONSOLIDATED_FORMAT: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedMetadata {
    /// Metadata documents keyed by their store key relative to the
    /// consolidated group, e.g. `"a/b/.zarray"`.
    pub metadata: Map<String, Value>,
}

impl ConsolidatedMetadata {
    pub fn to_json(&self) -> Value {
        json!({
            "zarr_consolidated_format": CONSOLIDATED_FORMAT,
            "metadata": self.metadata,
        })
    }

    pub fn from_json(obj: &Map<String, Value>, key: &str) -> ZarrResult<Self> {
        let format = obj
            .get("zarr_consolidated_format")
            .ok_or_else(|| ZarrError::MissingField {
                key: key.to_string(),
                field: "zarr_consolidated_format".to_string(),
            })?;
        if format.as_u64() != Some(CONSOLIDATED_FORMAT) {
            return Err(ZarrError::InvalidMetadata(format!(
                "{key}: unsupported zarr_consolidated_format {format}"
            )));
        }
        let metadata = match obj.get("metadata") {
            Some(Value::Object(m)) => m.clone(),
            Some(other) => {
                return Err(ZarrError::InvalidMetadata(format!(
                    "{key}: metadata must be an object, found {}",
                    metadata::json_kind(other)
                )));
            }
            None => {
                return Err(ZarrError::MissingField {
                    key: key.to_string(),
                    field: "metadata".to_string(),
                });
            }
        };
        Ok(Self { metadata })
    }

    /// Array metadata by relative path. Entries that do not parse are
    /// skipped with a warning.
    pub fn arrays(&self) -> BTreeMap<String, ArrayMetadata> {
        let mut arrays = BTreeMap::new();
        for (key, value) in &self.metadata {
            let Some(node) = node_path(key, ZARRAY) else {
                continue;
            };
            let parsed = match value {
                Value::Object(obj) => ArrayMetadata::from_json(obj, key),
                other => Err(ZarrError::InvalidMetadata(format!(
                    "{key}: expected an object, found {}",
                    metadata::json_kind(other)
                ))),
            };
            match parsed {
                Ok(md) => {
                    arrays.insert(node.to_string(), md);
                }
                Err(e) => log::warn!("skipping consolidated entry {key}: {e}"),
            }
        }
        arrays
    }

    /// Relative paths of every group recorded, the consolidated group itself
    /// being `""`.
    pub fn groups(&self) -> Vec<String> {
        self.metadata
            .keys()
            .filter_map(|key| node_path(key, ZGROUP))
            .map(str::to_string)
            .collect()
    }

    /// Recorded attributes of the node at relative `path`; empty if none.
    pub fn attrs(&self, path: &str) -> ZarrResult<Attributes> {
        let key = format!("{}{ZATTRS}", path::key_prefix(path)?);
        match self.metadata.get(&key) {
            Some(Value::Object(attrs)) => Ok(attrs.clone()),
            Some(other) => Err(ZarrError::InvalidMetadata(format!(
                "{key}: expected an object, found {}",
                metadata::json_kind(other)
            ))),
            None => Ok(Attributes::new()),
        }
    }
}

/// `"a/b/.zarray"` -> `"a/b"`, `".zarray"` -> `""` for the given document
/// name; `None` for other keys.
fn node_path<'a>(key: &'a str, document: &str) -> Option<&'a str> {
    if key == document {
        return Some("");
    }
    key.strip_suffix(document)?.strip_suffix('/')
}

fn is_metadata_document(key: &str) -> bool {
    [ZARRAY, ZGROUP, ZATTRS]
        .iter()
        .any(|doc| node_path(key, doc).is_some())
}

/// Gather the metadata documents under `path` and write them to
/// `<prefix>.zmetadata`.
pub async fn consolidate_metadata<S: StorageBackend + ?Sized>(
    store: &S,
    path: &str,
) -> ZarrResult<ConsolidatedMetadata> {
    let prefix = path::key_prefix(path)?;
    let mut documents = Map::new();
    for key in store.list(&prefix).await? {
        let relative = &key[prefix.len()..];
        if !is_metadata_document(relative) {
            continue;
        }
        let Some(bytes) = store.get(&key).await? else {
            // Deleted between list and get.
            continue;
        };
        let value: Value = serde_json::from_slice(&bytes)?;
        documents.insert(relative.to_string(), value);
    }

    let consolidated = ConsolidatedMetadata {
        metadata: documents,
    };
    let key = format!("{prefix}{ZMETADATA}");
    store
        .put(&key, metadata::to_json_bytes(&consolidated.to_json())?)
        .await?;
    log::debug!(
        "consolidated {} documents into {key}",
        consolidated.metadata.len()
    );
    Ok(consolidated)
}

/// Read `<prefix>.zmetadata`, if present.
pub async fn read_consolidated<S: StorageBackend + ?Sized>(
    store: &S,
    path: &str,
) -> ZarrResult<Option<ConsolidatedMetadata>> {
    let key = format!("{}{ZMETADATA}", path::key_prefix(path)?);
    match store.get(&key).await? {
        Some(bytes) => {
            let obj = metadata::parse_object(&bytes, &key)?;
            Ok(Some(ConsolidatedMetadata::from_json(&obj, &key)?))
        }
        None => Ok(None),
    }
}
