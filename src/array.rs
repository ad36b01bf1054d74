use std::sync::Arc;

use bytes::Bytes;

use crate::chunk_grid::ChunkGrid;
use crate::codecs::{CodecPipeline, CodecRegistry};
use crate::error::{ZarrError, ZarrResult};
use crate::fill_value;
use crate::group::{read_attributes, write_attributes};
use crate::metadata::{self, ArrayMetadata, Attributes, ZARRAY};
use crate::path;
use crate::store::StorageBackend;

// ---------------------------------------------------------------------------
// ZarrArray
// ---------------------------------------------------------------------------

/// Handle to one array in a store: its parsed `.zarray`, the chunk grid and
/// the resolved codec pipeline.
///
/// Chunks are exchanged as raw bytes of exactly [`ZarrArray::chunk_byte_len`]
/// bytes, laid out in the array's `order` and dtype byte order. Edge chunks
/// are full size.
pub struct ZarrArray<S: StorageBackend + ?Sized> {
    store: Arc<S>,
    path: String,
    prefix: String,
    metadata: ArrayMetadata,
    grid: ChunkGrid,
    pipeline: Arc<CodecPipeline>,
}

impl<S: StorageBackend + ?Sized> Clone for ZarrArray<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            path: self.path.clone(),
            prefix: self.prefix.clone(),
            metadata: self.metadata.clone(),
            grid: self.grid.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<S: StorageBackend + ?Sized> std::fmt::Debug for ZarrArray<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZarrArray")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<S: StorageBackend + ?Sized> ZarrArray<S> {
    /// Write `.zarray` at `path`, replacing any previous array metadata there.
    ///
    /// Ancestor groups are not touched; see
    /// [`Hierarchy::create_array_at`](crate::group::Hierarchy::create_array_at).
    pub async fn create(
        store: Arc<S>,
        path: &str,
        metadata: ArrayMetadata,
        registry: &CodecRegistry,
    ) -> ZarrResult<Self> {
        let normalized = path::normalize(path)?;
        metadata.validate()?;
        let array = Self::from_metadata(store, normalized, metadata, registry)?;
        let key = array.metadata_key();
        let doc = metadata::to_json_bytes(&array.metadata.to_json()?)?;
        array.store.put(&key, doc).await?;
        log::debug!("wrote array metadata {key}");
        Ok(array)
    }

    /// Read and validate the `.zarray` at `path`.
    pub async fn open(store: Arc<S>, path: &str, registry: &CodecRegistry) -> ZarrResult<Self> {
        let normalized = path::normalize(path)?;
        let key = format!("{}{ZARRAY}", path::prefix_of_normalized(&normalized));
        let bytes = store
            .get(&key)
            .await?
            .ok_or_else(|| ZarrError::NotFound(format!("no array at {normalized:?} ({key})")))?;
        let obj = metadata::parse_object(&bytes, &key)?;
        let metadata = ArrayMetadata::from_json(&obj, &key)?;
        Self::from_metadata(store, normalized, metadata, registry)
    }

    fn from_metadata(
        store: Arc<S>,
        normalized: String,
        metadata: ArrayMetadata,
        registry: &CodecRegistry,
    ) -> ZarrResult<Self> {
        let grid = metadata.chunk_grid()?;
        let pipeline = CodecPipeline::from_specs(
            metadata.filters.as_deref(),
            metadata.compressor.as_ref(),
            metadata.dtype.item_size(),
            registry,
        )?;
        Ok(Self {
            store,
            prefix: path::prefix_of_normalized(&normalized),
            path: normalized,
            metadata,
            grid,
            pipeline: Arc::new(pipeline),
        })
    }

    /// Normalised logical path of the array.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub fn chunk_grid(&self) -> &ChunkGrid {
        &self.grid
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn metadata_key(&self) -> String {
        format!("{}{ZARRAY}", self.prefix)
    }

    /// Decoded size of every chunk, edge chunks included.
    pub fn chunk_byte_len(&self) -> usize {
        self.metadata.chunk_byte_len()
    }

    pub fn chunk_key(&self, coord: &[usize]) -> ZarrResult<String> {
        self.grid
            .key_for(coord, &self.prefix, self.metadata.separator())
    }

    /// Encode `raw` through the codec pipeline and store it at the chunk's
    /// key.
    pub async fn write_chunk(&self, coord: &[usize], raw: &[u8]) -> ZarrResult<()> {
        let key = self.chunk_key(coord)?;
        let expected = self.chunk_byte_len();
        if raw.len() != expected {
            return Err(ZarrError::ChunkSize {
                expected,
                actual: raw.len(),
            });
        }
        let pipeline = self.pipeline.clone();
        let raw = raw.to_vec();
        let encoded = tokio::task::spawn_blocking(move || pipeline.encode_chunk(&raw)).await??;
        log::debug!("writing chunk {key} ({} -> {} bytes)", expected, encoded.len());
        self.store.put(&key, Bytes::from(encoded)).await
    }

    /// Decoded chunk bytes, or `None` if the chunk was never written.
    pub async fn read_chunk_if_exists(&self, coord: &[usize]) -> ZarrResult<Option<Vec<u8>>> {
        let key = self.chunk_key(coord)?;
        let Some(stored) = self.store.get(&key).await? else {
            return Ok(None);
        };
        log::trace!("decoding chunk {key} ({} bytes)", stored.len());
        let pipeline = self.pipeline.clone();
        let decoded = tokio::task::spawn_blocking(move || pipeline.decode_chunk(&stored)).await??;
        let expected = self.chunk_byte_len();
        if decoded.len() != expected {
            return Err(ZarrError::codec(
                self.pipeline_id(),
                format!(
                    "chunk {key} decoded to {} bytes, expected {expected}",
                    decoded.len()
                ),
            ));
        }
        Ok(Some(decoded))
    }

    /// Decoded chunk bytes; a chunk that was never written reads as the fill
    /// value repeated over the whole chunk.
    pub async fn read_chunk(&self, coord: &[usize]) -> ZarrResult<Vec<u8>> {
        match self.read_chunk_if_exists(coord).await? {
            Some(decoded) => Ok(decoded),
            None => {
                log::trace!("chunk {coord:?} of {:?} not stored, synthesising fill", self.path);
                self.fill_chunk()
            }
        }
    }

    /// A whole chunk of fill value. A `null` fill value yields zeros.
    pub fn fill_chunk(&self) -> ZarrResult<Vec<u8>> {
        match &self.metadata.fill_value {
            Some(value) => {
                let element = fill_value::element_bytes(value, &self.metadata.dtype)?;
                Ok(element.repeat(self.grid.chunk_num_elements()))
            }
            None => Ok(vec![0; self.chunk_byte_len()]),
        }
    }

    /// Delete one chunk. Erasing a chunk that is not stored is a no-op.
    pub async fn erase_chunk(&self, coord: &[usize]) -> ZarrResult<()> {
        let key = self.chunk_key(coord)?;
        log::debug!("erasing chunk {key}");
        self.store.delete(&key).await
    }

    /// Coordinates of every chunk currently stored, in key order.
    pub async fn stored_chunks(&self) -> ZarrResult<Vec<Vec<usize>>> {
        let separator = self.metadata.separator();
        let mut coords: Vec<Vec<usize>> = self
            .store
            .list(&self.prefix)
            .await?
            .iter()
            .filter_map(|key| {
                let coord = self.grid.coord_for(key, &self.prefix, separator).ok()?;
                self.grid.check_coord(&coord).ok()?;
                Some(coord)
            })
            .collect();
        coords.sort();
        Ok(coords)
    }

    pub async fn attrs(&self) -> ZarrResult<Attributes> {
        read_attributes(self.store.as_ref(), &self.prefix).await
    }

    /// Replace the array's `.zattrs` wholesale.
    pub async fn set_attrs(&self, attrs: &Attributes) -> ZarrResult<()> {
        write_attributes(self.store.as_ref(), &self.prefix, attrs).await
    }

    fn pipeline_id(&self) -> &str {
        self.metadata
            .compressor
            .as_ref()
            .map(|c| c.id.as_str())
            .unwrap_or("filters")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_grid::DimensionSeparator;
    use crate::codecs::CodecSpec;
    use crate::fill_value::FillValue;
    use crate::store::MemoryBackend;
    use crate::types::PrimitiveType;

    fn i2_array(shape: Vec<usize>, chunks: Vec<usize>) -> ArrayMetadata {
        let dtype: PrimitiveType = "<i2".parse().unwrap();
        ArrayMetadata::new(shape, chunks, dtype.into())
    }

    #[tokio::test]
    async fn write_then_read_through_compressor() {
        let store = Arc::new(MemoryBackend::new());
        let md = i2_array(vec![5, 4], vec![2, 2])
            .with_compressor(Some(CodecSpec::new("zlib")))
            .with_fill_value(Some(FillValue::Int(-1)));
        let array = ZarrArray::create(store.clone(), "/x/", md, &CodecRegistry::default())
            .await
            .unwrap();
        assert_eq!(array.path(), "x");
        assert_eq!(array.chunk_byte_len(), 8);

        let raw: Vec<u8> = [1i16, 2, 3, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
        array.write_chunk(&[2, 1], &raw).await.unwrap();
        assert_eq!(array.read_chunk(&[2, 1]).await.unwrap(), raw);
        assert_eq!(
            store.keys().unwrap(),
            vec!["x/.zarray".to_string(), "x/2.1".to_string()]
        );

        let fill = array.read_chunk(&[0, 0]).await.unwrap();
        assert_eq!(fill, [0xff; 8]);
        assert_eq!(array.read_chunk_if_exists(&[0, 0]).await.unwrap(), None);
        assert_eq!(array.stored_chunks().await.unwrap(), vec![vec![2, 1]]);

        array.erase_chunk(&[2, 1]).await.unwrap();
        array.erase_chunk(&[2, 1]).await.unwrap();
        assert!(array.stored_chunks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_wrong_sized_buffers_and_coordinates() {
        let store = Arc::new(MemoryBackend::new());
        let registry = CodecRegistry::default();
        let array = ZarrArray::create(store, "a", i2_array(vec![4], vec![2]), &registry)
            .await
            .unwrap();
        assert!(matches!(
            array.write_chunk(&[0], &[0; 3]).await,
            Err(ZarrError::ChunkSize { expected: 4, actual: 3 })
        ));
        assert!(matches!(
            array.write_chunk(&[2], &[0; 4]).await,
            Err(ZarrError::InvalidChunkCoordinate { .. })
        ));
        // A null fill value reads back as zeros.
        assert_eq!(array.read_chunk(&[1]).await.unwrap(), vec![0; 4]);
    }

    #[tokio::test]
    async fn truncated_chunk_is_a_codec_failure() {
        let store = Arc::new(MemoryBackend::new());
        let md = i2_array(vec![4], vec![4]);
        let array = ZarrArray::create(store.clone(), "", md, &CodecRegistry::default())
            .await
            .unwrap();
        store.put("0", Bytes::from_static(&[1, 2, 3])).await.unwrap();
        assert!(matches!(
            array.read_chunk(&[0]).await,
            Err(ZarrError::CodecFailure { .. })
        ));
    }

    #[tokio::test]
    async fn open_reads_back_created_metadata() {
        let store = Arc::new(MemoryBackend::new());
        let registry = CodecRegistry::default();
        let md = i2_array(vec![3, 3], vec![2, 2])
            .with_dimension_separator(DimensionSeparator::Slash)
            .with_filters(Some(vec![CodecSpec::new("delta").with_param("dtype", "<i2")]));
        ZarrArray::create(store.clone(), "g/arr", md.clone(), &registry)
            .await
            .unwrap();

        let opened = ZarrArray::open(store.clone(), "g/arr", &registry).await.unwrap();
        assert_eq!(opened.metadata(), &md);
        assert_eq!(opened.chunk_key(&[1, 0]).unwrap(), "g/arr/1/0");

        let raw: Vec<u8> = [7i16, 8, 9, 10].iter().flat_map(|v| v.to_le_bytes()).collect();
        opened.write_chunk(&[1, 1], &raw).await.unwrap();
        // Slash-separated keys nest, but still list as chunks.
        assert_eq!(opened.stored_chunks().await.unwrap(), vec![vec![1, 1]]);
        assert_eq!(opened.read_chunk(&[1, 1]).await.unwrap(), raw);

        assert!(matches!(
            ZarrArray::open(store, "g/missing", &registry).await,
            Err(ZarrError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_codec_fails_at_open() {
        let store = Arc::new(MemoryBackend::new());
        let md = i2_array(vec![2], vec![2]).with_compressor(Some(CodecSpec::new("mystery")));
        let err = ZarrArray::create(store, "a", md, &CodecRegistry::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ZarrError::UnknownCodec(id) if id == "mystery"));
    }
}
