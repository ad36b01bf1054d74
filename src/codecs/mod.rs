pub mod blosc;
pub mod delta;
pub mod fixedscaleoffset;
pub mod gzip;
pub mod lz4;
mod numeric;
pub mod zlib;
pub mod zstd;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ZarrError, ZarrResult};

// ---------------------------------------------------------------------------
// CodecSpec
// ---------------------------------------------------------------------------

/// A compressor or filter as it appears in `.zarray`:
/// `{"id": "...", ...params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecSpec {
    pub id: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl CodecSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: serde_json::Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Deserialize the params into a codec's configuration struct.
    pub fn config<T: DeserializeOwned>(&self) -> ZarrResult<T> {
        serde_json::from_value(serde_json::Value::Object(self.params.clone()))
            .map_err(|e| ZarrError::codec(&self.id, format!("invalid configuration: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// A reversible bytes-to-bytes transform.
pub trait Codec: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>>;

    fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>>;
}

/// Builds a codec from its spec. `item_size` is the byte size of one
/// element of the array the codec is attached to.
pub type CodecConstructor = fn(&CodecSpec, usize) -> ZarrResult<Arc<dyn Codec>>;

// ---------------------------------------------------------------------------
// CodecRegistry
// ---------------------------------------------------------------------------

/// Lookup table from codec `id` to constructor.
#[derive(Clone)]
pub struct CodecRegistry {
    constructors: HashMap<String, CodecConstructor>,
}

impl CodecRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for `id`.
    pub fn register(&mut self, id: impl Into<String>, constructor: CodecConstructor) {
        self.constructors.insert(id.into(), constructor);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    pub fn build(&self, spec: &CodecSpec, item_size: usize) -> ZarrResult<Arc<dyn Codec>> {
        let constructor = self
            .constructors
            .get(&spec.id)
            .ok_or_else(|| ZarrError::UnknownCodec(spec.id.clone()))?;
        constructor(spec, item_size)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(blosc::IDENTIFIER, blosc::create);
        registry.register(delta::IDENTIFIER, delta::create);
        registry.register(fixedscaleoffset::IDENTIFIER, fixedscaleoffset::create);
        registry.register(gzip::IDENTIFIER, gzip::create);
        registry.register(lz4::IDENTIFIER, lz4::create);
        registry.register(zlib::IDENTIFIER, zlib::create);
        registry.register(zstd::IDENTIFIER, zstd::create);
        registry
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.constructors.keys().collect();
        ids.sort();
        f.debug_struct("CodecRegistry").field("ids", &ids).finish()
    }
}

// ---------------------------------------------------------------------------
// Codec pipeline
// ---------------------------------------------------------------------------

/// Filters (applied in order) followed by an optional compressor.
#[derive(Debug, Clone, Default)]
pub struct CodecPipeline {
    filters: Vec<Arc<dyn Codec>>,
    compressor: Option<Arc<dyn Codec>>,
}

impl CodecPipeline {
    pub fn new(filters: Vec<Arc<dyn Codec>>, compressor: Option<Arc<dyn Codec>>) -> Self {
        Self {
            filters,
            compressor,
        }
    }

    /// Resolve the `filters` and `compressor` fields of `.zarray` through
    /// `registry`.
    pub fn from_specs(
        filters: Option<&[CodecSpec]>,
        compressor: Option<&CodecSpec>,
        item_size: usize,
        registry: &CodecRegistry,
    ) -> ZarrResult<Self> {
        let filters = filters
            .unwrap_or_default()
            .iter()
            .map(|spec| registry.build(spec, item_size))
            .collect::<ZarrResult<Vec<_>>>()?;
        let compressor = compressor
            .map(|spec| registry.build(spec, item_size))
            .transpose()?;
        Ok(Self::new(filters, compressor))
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.compressor.is_none()
    }

    /// Raw chunk bytes to stored bytes.
    pub fn encode_chunk(&self, raw: &[u8]) -> ZarrResult<Vec<u8>> {
        let mut buf = raw.to_vec();
        for filter in &self.filters {
            buf = filter.encode(&buf)?;
        }
        if let Some(compressor) = &self.compressor {
            buf = compressor.encode(&buf)?;
        }
        Ok(buf)
    }

    /// Stored bytes back to raw chunk bytes: decompress, then undo the
    /// filters in reverse order.
    pub fn decode_chunk(&self, stored: &[u8]) -> ZarrResult<Vec<u8>> {
        let mut buf = match &self.compressor {
            Some(compressor) => compressor.decode(stored)?,
            None => stored.to_vec(),
        };
        for filter in self.filters.iter().rev() {
            buf = filter.decode(&buf)?;
        }
        Ok(buf)
    }
}
