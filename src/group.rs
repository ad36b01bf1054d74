use std::collections::BTreeMap;
use std::sync::Arc;

use crate::array::ZarrArray;
use crate::codecs::CodecRegistry;
use crate::error::{ZarrError, ZarrResult};
use crate::metadata::{
    self, ArrayMetadata, Attributes, GroupMetadata, ZARRAY, ZATTRS, ZGROUP, ZMETADATA,
};
use crate::path;
use crate::store::StorageBackend;

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Array,
    Group,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Array => write!(f, "array"),
            NodeKind::Group => write!(f, "group"),
        }
    }
}

// ---------------------------------------------------------------------------
// Attribute helpers
// ---------------------------------------------------------------------------

/// Read `<prefix>.zattrs`; a missing document is an empty mapping.
pub(crate) async fn read_attributes<S: StorageBackend + ?Sized>(
    store: &S,
    prefix: &str,
) -> ZarrResult<Attributes> {
    let key = format!("{prefix}{ZATTRS}");
    match store.get(&key).await? {
        Some(bytes) => metadata::parse_object(&bytes, &key),
        None => Ok(Attributes::new()),
    }
}

/// Overwrite `<prefix>.zattrs` with `attrs`.
pub(crate) async fn write_attributes<S: StorageBackend + ?Sized>(
    store: &S,
    prefix: &str,
    attrs: &Attributes,
) -> ZarrResult<()> {
    let key = format!("{prefix}{ZATTRS}");
    let doc = metadata::to_json_bytes(&serde_json::Value::Object(attrs.clone()))?;
    store.put(&key, doc).await?;
    log::debug!("wrote attributes {key}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// Groups, arrays and attributes over one store.
///
/// Nothing is cached: every call looks at the store's keys, so membership
/// is whatever the key set says it is.
pub struct Hierarchy<S: StorageBackend + ?Sized> {
    store: Arc<S>,
    registry: Arc<CodecRegistry>,
}

impl<S: StorageBackend + ?Sized> Clone for Hierarchy<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<S: StorageBackend + ?Sized> std::fmt::Debug for Hierarchy<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hierarchy")
            .field("registry", &self.registry)
            .finish()
    }
}

impl<S: StorageBackend + ?Sized> Hierarchy<S> {
    /// A hierarchy using the built-in codecs.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_registry(store, CodecRegistry::default())
    }

    pub fn with_registry(store: Arc<S>, registry: CodecRegistry) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    async fn kind_of_normalized(&self, normalized: &str) -> ZarrResult<Option<NodeKind>> {
        let prefix = path::prefix_of_normalized(normalized);
        if self.store.get(&format!("{prefix}{ZARRAY}")).await?.is_some() {
            return Ok(Some(NodeKind::Array));
        }
        if self.store.get(&format!("{prefix}{ZGROUP}")).await?.is_some() {
            return Ok(Some(NodeKind::Group));
        }
        Ok(None)
    }

    /// What lives at `path`, if anything.
    pub async fn node_kind(&self, path: &str) -> ZarrResult<Option<NodeKind>> {
        self.kind_of_normalized(&path::normalize(path)?).await
    }

    /// Make sure `normalized` is a group, writing `.zgroup` if nothing is
    /// there yet.
    async fn ensure_group_node(&self, normalized: &str) -> ZarrResult<()> {
        match self.kind_of_normalized(normalized).await? {
            Some(NodeKind::Group) => Ok(()),
            Some(NodeKind::Array) => Err(ZarrError::PathConflict {
                path: normalized.to_string(),
                reason: "an array already exists here".to_string(),
            }),
            None => {
                let key = format!("{}{ZGROUP}", path::prefix_of_normalized(normalized));
                let doc = metadata::to_json_bytes(&GroupMetadata.to_json())?;
                self.store.put(&key, doc).await?;
                log::debug!("created group {key}");
                Ok(())
            }
        }
    }

    /// Ensure `path` and each of its ancestors is a group, root first.
    /// Existing groups are left alone; an array on the way is a
    /// [`ZarrError::PathConflict`].
    pub async fn ensure_group(&self, path: &str) -> ZarrResult<()> {
        let normalized = path::normalize(path)?;
        for ancestor in path::ancestors(&normalized) {
            self.ensure_group_node(&ancestor).await?;
        }
        self.ensure_group_node(&normalized).await
    }

    pub async fn create_group(&self, path: &str) -> ZarrResult<ZarrGroup<S>> {
        self.ensure_group(path).await?;
        Ok(ZarrGroup {
            hierarchy: self.clone(),
            path: path::normalize(path)?,
        })
    }

    /// Open an existing group, validating its `.zgroup`.
    pub async fn open_group(&self, path: &str) -> ZarrResult<ZarrGroup<S>> {
        let normalized = path::normalize(path)?;
        let key = format!("{}{ZGROUP}", path::prefix_of_normalized(&normalized));
        let bytes = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| ZarrError::NotFound(format!("no group at {normalized:?} ({key})")))?;
        GroupMetadata::from_json(&metadata::parse_object(&bytes, &key)?, &key)?;
        Ok(ZarrGroup {
            hierarchy: self.clone(),
            path: normalized,
        })
    }

    /// Create an array at `path`, implicitly creating every ancestor group.
    /// An existing array at `path` has its metadata replaced; an existing
    /// group is a [`ZarrError::PathConflict`].
    pub async fn create_array_at(
        &self,
        path: &str,
        metadata: ArrayMetadata,
    ) -> ZarrResult<ZarrArray<S>> {
        let normalized = path::normalize(path)?;
        metadata.validate()?;
        if self.kind_of_normalized(&normalized).await? == Some(NodeKind::Group) {
            return Err(ZarrError::PathConflict {
                path: normalized,
                reason: "a group already exists here".to_string(),
            });
        }
        for ancestor in path::ancestors(&normalized) {
            self.ensure_group_node(&ancestor).await?;
        }
        ZarrArray::create(self.store.clone(), &normalized, metadata, &self.registry).await
    }

    pub async fn open_array(&self, path: &str) -> ZarrResult<ZarrArray<S>> {
        ZarrArray::open(self.store.clone(), path, &self.registry).await
    }

    /// Direct children of `path` that are arrays or groups, sorted by name.
    pub async fn list_children(&self, path: &str) -> ZarrResult<Vec<(String, NodeKind)>> {
        let prefix = path::key_prefix(path)?;
        let keys = self.store.list(&prefix).await?;

        let mut children: BTreeMap<String, NodeKind> = BTreeMap::new();
        for key in &keys {
            let rest = &key[prefix.len()..];
            let Some((name, tail)) = rest.split_once('/') else {
                continue;
            };
            let kind = match tail {
                ZARRAY => NodeKind::Array,
                ZGROUP => NodeKind::Group,
                _ => continue,
            };
            // An array and a group at one path: the array wins.
            children
                .entry(name.to_string())
                .and_modify(|k| {
                    if kind == NodeKind::Array {
                        *k = kind;
                    }
                })
                .or_insert(kind);
        }

        for key in &keys {
            let rest = &key[prefix.len()..];
            let stray = match rest.split_once('/') {
                None => ![ZARRAY, ZGROUP, ZATTRS, ZMETADATA].contains(&rest),
                Some((name, _)) => {
                    !children.contains_key(name) && !is_inside_node(&keys, &prefix, name)
                }
            };
            if stray {
                log::warn!("ignoring {key:?}: not part of the hierarchy under {prefix:?}");
            }
        }

        Ok(children.into_iter().collect())
    }

    pub async fn get_attrs(&self, path: &str) -> ZarrResult<Attributes> {
        read_attributes(self.store.as_ref(), &path::key_prefix(path)?).await
    }

    /// Replace the node's `.zattrs` wholesale. There is no merging.
    pub async fn set_attrs(&self, path: &str, attrs: &Attributes) -> ZarrResult<()> {
        write_attributes(self.store.as_ref(), &path::key_prefix(path)?, attrs).await
    }

    /// Delete every key belonging to the node at `path` and its
    /// descendants. Erasing the root clears the store.
    pub async fn erase_node(&self, path: &str) -> ZarrResult<()> {
        let prefix = path::key_prefix(path)?;
        let keys = self.store.list(&prefix).await?;
        for key in &keys {
            self.store.delete(key).await?;
        }
        log::debug!("erased {} keys under {prefix:?}", keys.len());
        Ok(())
    }
}

/// Whether any key below `<prefix><name>/` lives inside a deeper array or
/// group, i.e. `name` is an intermediate directory of a nested node.
fn is_inside_node(keys: &[String], prefix: &str, name: &str) -> bool {
    let below = format!("{prefix}{name}/");
    keys.iter().any(|k| {
        k.strip_prefix(&below).is_some_and(|rest| {
            rest.ends_with(&format!("/{ZARRAY}")) || rest.ends_with(&format!("/{ZGROUP}"))
        })
    })
}

// ---------------------------------------------------------------------------
// ZarrGroup
// ---------------------------------------------------------------------------

/// Handle to a group node. Holds no member list; every call consults the
/// store.
pub struct ZarrGroup<S: StorageBackend + ?Sized> {
    hierarchy: Hierarchy<S>,
    path: String,
}

impl<S: StorageBackend + ?Sized> Clone for ZarrGroup<S> {
    fn clone(&self) -> Self {
        Self {
            hierarchy: self.hierarchy.clone(),
            path: self.path.clone(),
        }
    }
}

impl<S: StorageBackend + ?Sized> std::fmt::Debug for ZarrGroup<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZarrGroup").field("path", &self.path).finish()
    }
}

impl<S: StorageBackend + ?Sized> ZarrGroup<S> {
    pub fn path(&self) -> &str {
        &self.path
    }

    fn child_path(&self, name: &str) -> ZarrResult<String> {
        Ok(path::join(&self.path, &path::normalize(name)?))
    }

    pub async fn children(&self) -> ZarrResult<Vec<(String, NodeKind)>> {
        self.hierarchy.list_children(&self.path).await
    }

    pub async fn attrs(&self) -> ZarrResult<Attributes> {
        self.hierarchy.get_attrs(&self.path).await
    }

    pub async fn set_attrs(&self, attrs: &Attributes) -> ZarrResult<()> {
        self.hierarchy.set_attrs(&self.path, attrs).await
    }

    pub async fn create_group(&self, name: &str) -> ZarrResult<ZarrGroup<S>> {
        self.hierarchy.create_group(&self.child_path(name)?).await
    }

    pub async fn open_group(&self, name: &str) -> ZarrResult<ZarrGroup<S>> {
        self.hierarchy.open_group(&self.child_path(name)?).await
    }

    pub async fn create_array(
        &self,
        name: &str,
        metadata: ArrayMetadata,
    ) -> ZarrResult<ZarrArray<S>> {
        self.hierarchy
            .create_array_at(&self.child_path(name)?, metadata)
            .await
    }

    pub async fn open_array(&self, name: &str) -> ZarrResult<ZarrArray<S>> {
        self.hierarchy.open_array(&self.child_path(name)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use crate::types::PrimitiveType;
    use bytes::Bytes;
    use serde_json::json;

    fn f4_array() -> ArrayMetadata {
        let dtype: PrimitiveType = "<f4".parse().unwrap();
        ArrayMetadata::new(vec![4], vec![2], dtype.into())
    }

    #[tokio::test]
    async fn create_array_creates_ancestors() {
        let store = Arc::new(MemoryBackend::new());
        let hierarchy = Hierarchy::new(store.clone());
        hierarchy.create_array_at("a/b/c", f4_array()).await.unwrap();
        assert_eq!(
            store.keys().unwrap(),
            vec![".zgroup", "a/.zgroup", "a/b/.zgroup", "a/b/c/.zarray"]
        );
        assert_eq!(hierarchy.node_kind("a/b").await.unwrap(), Some(NodeKind::Group));
        assert_eq!(hierarchy.node_kind("/a/b/c/").await.unwrap(), Some(NodeKind::Array));
        assert_eq!(hierarchy.node_kind("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn kinds_never_change() {
        let store = Arc::new(MemoryBackend::new());
        let hierarchy = Hierarchy::new(store);
        hierarchy.create_array_at("x", f4_array()).await.unwrap();
        assert!(matches!(
            hierarchy.ensure_group("x/y").await,
            Err(ZarrError::PathConflict { .. })
        ));
        assert!(matches!(
            hierarchy.create_group("x").await,
            Err(ZarrError::PathConflict { .. })
        ));
        hierarchy.ensure_group("g").await.unwrap();
        assert!(matches!(
            hierarchy.create_array_at("g", f4_array()).await,
            Err(ZarrError::PathConflict { .. })
        ));
        // Replacing an array's metadata is allowed.
        hierarchy.create_array_at("x", f4_array()).await.unwrap();
    }

    #[tokio::test]
    async fn children_are_derived_from_keys() {
        let store = Arc::new(MemoryBackend::new());
        let hierarchy = Hierarchy::new(store.clone());
        hierarchy.create_array_at("g/arr", f4_array()).await.unwrap();
        hierarchy.ensure_group("g/sub/deeper").await.unwrap();
        hierarchy.create_array_at("other", f4_array()).await.unwrap();
        store.put("g/notes.txt", Bytes::from_static(b"hi")).await.unwrap();

        assert_eq!(
            hierarchy.list_children("g").await.unwrap(),
            vec![
                ("arr".to_string(), NodeKind::Array),
                ("sub".to_string(), NodeKind::Group)
            ]
        );
        assert_eq!(
            hierarchy.list_children("").await.unwrap(),
            vec![
                ("g".to_string(), NodeKind::Group),
                ("other".to_string(), NodeKind::Array)
            ]
        );
        assert!(hierarchy.list_children("g/arr").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attributes_overwrite_whole_document() {
        let store = Arc::new(MemoryBackend::new());
        let hierarchy = Hierarchy::new(store);
        let group = hierarchy.create_group("g").await.unwrap();
        assert!(group.attrs().await.unwrap().is_empty());

        let first = json!({"a": 1, "b": [1, 2]}).as_object().cloned().unwrap();
        let second = json!({"c": null}).as_object().cloned().unwrap();
        group.set_attrs(&first).await.unwrap();
        assert_eq!(hierarchy.get_attrs("/g").await.unwrap(), first);
        hierarchy.set_attrs("g", &second).await.unwrap();
        assert_eq!(group.attrs().await.unwrap(), second);
    }

    #[tokio::test]
    async fn open_group_validates_document() {
        let store = Arc::new(MemoryBackend::new());
        let hierarchy = Hierarchy::new(store.clone());
        assert!(matches!(
            hierarchy.open_group("g").await,
            Err(ZarrError::NotFound(_))
        ));
        store
            .put("g/.zgroup", Bytes::from_static(br#"{"zarr_format": 2, "extra": 1}"#))
            .await
            .unwrap();
        assert!(matches!(
            hierarchy.open_group("g").await,
            Err(ZarrError::UnexpectedField { .. })
        ));
    }

    #[tokio::test]
    async fn erase_node_removes_descendants_only() {
        let store = Arc::new(MemoryBackend::new());
        let hierarchy = Hierarchy::new(store.clone());
        let array = hierarchy.create_array_at("a/x", f4_array()).await.unwrap();
        array.write_chunk(&[0], &[0; 8]).await.unwrap();
        hierarchy.create_array_at("ab", f4_array()).await.unwrap();

        hierarchy.erase_node("a").await.unwrap();
        assert_eq!(store.keys().unwrap(), vec![".zgroup", "ab/.zarray"]);
        assert_eq!(hierarchy.node_kind("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn group_handles_resolve_relative_names() {
        let store = Arc::new(MemoryBackend::new());
        let hierarchy = Hierarchy::new(store);
        let root = hierarchy.create_group("").await.unwrap();
        let inner = root.create_group("inner").await.unwrap();
        assert_eq!(inner.path(), "inner");
        let array = inner.create_array("data", f4_array()).await.unwrap();
        assert_eq!(array.path(), "inner/data");
        assert_eq!(inner.open_array("data").await.unwrap().path(), "inner/data");
        assert_eq!(root.open_group("inner").await.unwrap().path(), "inner");
        assert!(inner.create_group("../escape").await.is_err());
    }
}
