use serde_json::{Map, Value, json};

use crate::chunk_grid::{ChunkGrid, DimensionSeparator};
use crate::codecs::CodecSpec;
use crate::error::{ZarrError, ZarrResult};
use crate::fill_value::{self, FillValue};
use crate::metadata::{ZARR_FORMAT, json_kind};
use crate::types::{ArrayOrder, DTypeDescriptor};

/// Keys every `.zarray` must carry. `dimension_separator` is optional.
const REQUIRED_ARRAY_FIELDS: [&str; 8] = [
    "zarr_format",
    "shape",
    "chunks",
    "dtype",
    "compressor",
    "fill_value",
    "order",
    "filters",
];

// ---------------------------------------------------------------------------
// ArrayMetadata
// ---------------------------------------------------------------------------

/// Contents of a `.zarray` document.
///
/// `compressor`, `fill_value` and `filters` are required keys whose value
/// may be `null`, represented here as `None`. `dimension_separator` may be
/// left out entirely, in which case it is not written and `"."` applies.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMetadata {
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    pub dtype: DTypeDescriptor,
    pub compressor: Option<CodecSpec>,
    pub fill_value: Option<FillValue>,
    pub order: ArrayOrder,
    pub filters: Option<Vec<CodecSpec>>,
    pub dimension_separator: Option<DimensionSeparator>,
}

impl ArrayMetadata {
    /// Metadata with no compressor, no filters, a `null` fill value and C
    /// order.
    pub fn new(shape: Vec<usize>, chunks: Vec<usize>, dtype: DTypeDescriptor) -> Self {
        Self {
            shape,
            chunks,
            dtype,
            compressor: None,
            fill_value: None,
            order: ArrayOrder::C,
            filters: None,
            dimension_separator: None,
        }
    }

    pub fn with_compressor(mut self, compressor: Option<CodecSpec>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_filters(mut self, filters: Option<Vec<CodecSpec>>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_fill_value(mut self, fill_value: Option<FillValue>) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn with_order(mut self, order: ArrayOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_dimension_separator(mut self, separator: DimensionSeparator) -> Self {
        self.dimension_separator = Some(separator);
        self
    }

    /// The separator in effect, defaulting to `"."`.
    pub fn separator(&self) -> DimensionSeparator {
        self.dimension_separator.unwrap_or_default()
    }

    pub fn chunk_grid(&self) -> ZarrResult<ChunkGrid> {
        ChunkGrid::new(&self.shape, &self.chunks)
    }

    /// Byte length of one decoded chunk.
    pub fn chunk_byte_len(&self) -> usize {
        self.chunks
            .iter()
            .fold(self.dtype.item_size(), |acc, c| acc.saturating_mul(*c))
    }

    /// Byte length of one chunk, failing if it does not fit in `usize`.
    fn checked_chunk_byte_len(&self) -> ZarrResult<usize> {
        let elements = self.chunk_grid()?.chunk_num_elements();
        self.dtype
            .checked_item_size()
            .and_then(|size| size.checked_mul(elements))
            .ok_or_else(|| {
                ZarrError::InvalidMetadata(format!(
                    "chunks {:?} of {} overflow usize bytes",
                    self.chunks,
                    self.dtype.to_json()
                ))
            })
    }

    /// Check the invariants that hold for any valid `.zarray`.
    pub fn validate(&self) -> ZarrResult<()> {
        self.checked_chunk_byte_len()?;
        fill_value::encode(self.fill_value.as_ref(), &self.dtype)?;
        Ok(())
    }

    pub fn to_json(&self) -> ZarrResult<Value> {
        let mut obj = Map::new();
        obj.insert("zarr_format".into(), json!(ZARR_FORMAT));
        obj.insert("shape".into(), json!(self.shape));
        obj.insert("chunks".into(), json!(self.chunks));
        obj.insert("dtype".into(), self.dtype.to_json());
        obj.insert("compressor".into(), serde_json::to_value(&self.compressor)?);
        obj.insert(
            "fill_value".into(),
            fill_value::encode(self.fill_value.as_ref(), &self.dtype)?,
        );
        obj.insert("order".into(), serde_json::to_value(self.order)?);
        obj.insert("filters".into(), serde_json::to_value(&self.filters)?);
        if let Some(separator) = self.dimension_separator {
            obj.insert("dimension_separator".into(), json!(separator.as_str()));
        }
        Ok(Value::Object(obj))
    }

    /// Parse a `.zarray` object read from `key`. Unknown keys are ignored.
    pub fn from_json(obj: &Map<String, Value>, key: &str) -> ZarrResult<Self> {
        for field in REQUIRED_ARRAY_FIELDS {
            if !obj.contains_key(field) {
                return Err(ZarrError::MissingField {
                    key: key.to_string(),
                    field: field.to_string(),
                });
            }
        }
        check_zarr_format(&obj["zarr_format"], key)?;
        let shape = parse_extents(&obj["shape"], "shape", key)?;
        let chunks = parse_extents(&obj["chunks"], "chunks", key)?;
        let dtype = DTypeDescriptor::parse(&obj["dtype"])?;
        let compressor = match &obj["compressor"] {
            Value::Null => None,
            value => Some(parse_codec(value, "compressor", key)?),
        };
        let fill_value = fill_value::decode(&obj["fill_value"], &dtype)?;
        let order = serde_json::from_value(obj["order"].clone()).map_err(|e| {
            ZarrError::InvalidMetadata(format!("{key}: invalid order: {e}"))
        })?;
        let filters = match &obj["filters"] {
            Value::Null => None,
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|item| parse_codec(item, "filters", key))
                    .collect::<ZarrResult<Vec<_>>>()?,
            ),
            other => {
                return Err(ZarrError::InvalidMetadata(format!(
                    "{key}: filters must be null or an array, found {}",
                    json_kind(other)
                )));
            }
        };
        let dimension_separator = match obj.get("dimension_separator") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(DimensionSeparator::parse(s)?),
            Some(other) => {
                return Err(ZarrError::InvalidMetadata(format!(
                    "{key}: dimension_separator must be a string, found {}",
                    json_kind(other)
                )));
            }
        };

        let metadata = Self {
            shape,
            chunks,
            dtype,
            compressor,
            fill_value,
            order,
            filters,
            dimension_separator,
        };
        metadata.checked_chunk_byte_len()?;
        Ok(metadata)
    }
}

fn check_zarr_format(value: &Value, key: &str) -> ZarrResult<()> {
    match value.as_u64() {
        Some(ZARR_FORMAT) => Ok(()),
        _ => Err(ZarrError::InvalidMetadata(format!(
            "{key}: unsupported zarr_format {value}, expected {ZARR_FORMAT}"
        ))),
    }
}

fn parse_extents(value: &Value, name: &str, key: &str) -> ZarrResult<Vec<usize>> {
    let bad = || {
        ZarrError::InvalidMetadata(format!(
            "{key}: {name} must be an array of non-negative integers, found {value}"
        ))
    };
    value
        .as_array()
        .ok_or_else(bad)?
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(bad)
        })
        .collect()
}

fn parse_codec(value: &Value, name: &str, key: &str) -> ZarrResult<CodecSpec> {
    if !value.get("id").is_some_and(Value::is_string) {
        return Err(ZarrError::InvalidMetadata(format!(
            "{key}: every {name} entry needs a string \"id\", found {value}"
        )));
    }
    Ok(serde_json::from_value(value.clone())?)
}

// ---------------------------------------------------------------------------
// GroupMetadata
// ---------------------------------------------------------------------------

/// Contents of a `.zgroup` document: the format version and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupMetadata;

impl GroupMetadata {
    pub fn to_json(&self) -> Value {
        json!({ "zarr_format": ZARR_FORMAT })
    }

    pub fn from_json(obj: &Map<String, Value>, key: &str) -> ZarrResult<Self> {
        if let Some(extra) = obj.keys().find(|k| k.as_str() != "zarr_format") {
            return Err(ZarrError::UnexpectedField {
                key: key.to_string(),
                field: extra.clone(),
            });
        }
        let format = obj.get("zarr_format").ok_or_else(|| ZarrError::MissingField {
            key: key.to_string(),
            field: "zarr_format".to_string(),
        })?;
        check_zarr_format(format, key)?;
        Ok(GroupMetadata)
    }
}
