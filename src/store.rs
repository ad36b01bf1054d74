use crate::error::{ZarrError, ZarrResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// StorageBackend trait
// ---------------------------------------------------------------------------

/// Async key/value abstraction the Zarr layout is written onto.
///
/// Keys are `/`-separated strings without a leading slash. Implementations
/// can target a local directory, an object store, or memory.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch the value stored under `key`.
    /// Returns `Ok(None)` when the key does not exist (rather than an error).
    async fn get(&self, key: &str) -> ZarrResult<Option<Bytes>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Bytes) -> ZarrResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> ZarrResult<()>;

    /// Every key that starts with `prefix`, at any depth.
    async fn list(&self, prefix: &str) -> ZarrResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// In-memory backend, mostly useful for tests and scratch hierarchies.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: Mutex<BTreeMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> ZarrResult<std::sync::MutexGuard<'_, BTreeMap<String, Bytes>>> {
        self.data
            .lock()
            .map_err(|e| ZarrError::Storage(format!("Memory backend lock poisoned: {e}")))
    }

    /// Snapshot of all keys currently stored, in sorted order.
    pub fn keys(&self) -> ZarrResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> ZarrResult<Option<Bytes>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> ZarrResult<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ZarrResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> ZarrResult<Vec<String>> {
        let data = self.lock()?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// LocalBackend  (tokio::fs)
// ---------------------------------------------------------------------------

/// Local-filesystem backend using `tokio::fs`. Each key is a file below
/// `root`; `/` in a key maps to a directory level.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new backend rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn get(&self, key: &str) -> ZarrResult<Option<Bytes>> {
        let full = self.resolve(key);
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            // A directory sitting where a key was asked for is still "no value".
            Err(_) if full.is_dir() => Ok(None),
            Err(e) => Err(ZarrError::Storage(format!(
                "Failed to read {}: {e}",
                full.display()
            ))),
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> ZarrResult<()> {
        let full = self.resolve(key);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ZarrError::Storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&full, &value).await.map_err(|e| {
            ZarrError::Storage(format!("Failed to write {}: {e}", full.display()))
        })
    }

    async fn delete(&self, key: &str) -> ZarrResult<()> {
        let full = self.resolve(key);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ZarrError::Storage(format!(
                "Failed to delete {}: {e}",
                full.display()
            ))),
        }
    }

    async fn list(&self, prefix: &str) -> ZarrResult<Vec<String>> {
        // Start walking at the deepest directory the prefix names.
        let start = match prefix.rfind('/') {
            Some(pos) => prefix[..pos].to_string(),
            None => String::new(),
        };
        let mut pending = vec![start];
        let mut keys = Vec::new();
        while let Some(rel_dir) = pending.pop() {
            let dir = self.resolve(&rel_dir);
            let mut reader = match tokio::fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ZarrError::Storage(format!(
                        "Failed to list {}: {e}",
                        dir.display()
                    )));
                }
            };
            while let Some(entry) = reader.next_entry().await.map_err(|e| {
                ZarrError::Storage(format!("Failed to read entry in {}: {e}", dir.display()))
            })? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let rel = crate::path::join(&rel_dir, &name);
                let file_type = entry.file_type().await.map_err(|e| {
                    ZarrError::Storage(format!("Failed to stat {rel}: {e}"))
                })?;
                if file_type.is_dir() {
                    pending.push(rel);
                } else if rel.starts_with(prefix) {
                    keys.push(rel);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// ObjectStoreBackend  (wraps object_store crate)
// ---------------------------------------------------------------------------

/// Zarr keys on an [`object_store::ObjectStore`] (S3, GCS, Azure, local or
/// in-memory), optionally nested under a path prefix inside the bucket.
pub struct ObjectStoreBackend {
    store: Box<dyn object_store::ObjectStore>,
    prefix: String,
}

impl ObjectStoreBackend {
    pub fn new(store: Box<dyn object_store::ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    fn full_path(&self, key: &str) -> object_store::path::Path {
        if self.prefix.is_empty() {
            object_store::path::Path::from(key)
        } else {
            object_store::path::Path::from(format!("{}/{}", self.prefix, key))
        }
    }

    fn strip_prefix<'a>(&self, location: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            location
        } else {
            location
                .strip_prefix(self.prefix.as_str())
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(location)
        }
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn get(&self, key: &str) -> ZarrResult<Option<Bytes>> {
        let location = self.full_path(key);
        match self
            .store
            .get_opts(&location, object_store::GetOptions::default())
            .await
        {
            Ok(result) => {
                let data = result.bytes().await.map_err(|e| {
                    ZarrError::Storage(format!("Failed to read bytes from {key}: {e}"))
                })?;
                Ok(Some(data))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(ZarrError::Storage(format!(
                "Object store error for {key}: {e}"
            ))),
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> ZarrResult<()> {
        let location = self.full_path(key);
        self.store
            .put_opts(
                &location,
                object_store::PutPayload::from(value),
                object_store::PutOptions::default(),
            )
            .await
            .map_err(|e| ZarrError::Storage(format!("Object store put error for {key}: {e}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> ZarrResult<()> {
        use futures::{StreamExt, TryStreamExt, stream};
        let location = self.full_path(key);
        let request = stream::once(async move { Ok::<_, object_store::Error>(location) }).boxed();
        match self.store.delete_stream(request).try_next().await {
            Ok(_) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(ZarrError::Storage(format!(
                "Object store delete error for {key}: {e}"
            ))),
        }
    }

    async fn list(&self, prefix: &str) -> ZarrResult<Vec<String>> {
        use futures::TryStreamExt;
        // object_store lists by whole path segments, so list the enclosing
        // directory and filter on the raw string prefix afterwards.
        let dir = match prefix.rfind('/') {
            Some(pos) => &prefix[..pos],
            None => "",
        };
        let location = self.full_path(dir);
        let mut keys = Vec::new();
        let mut stream = self.store.list(Some(&location));
        while let Some(meta) = stream.try_next().await.map_err(|e| {
            ZarrError::Storage(format!("Object store list error for {prefix}: {e}"))
        })? {
            let location = meta.location.to_string();
            let key = self.strip_prefix(&location);
            if key.starts_with(prefix) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
