pub mod v2;

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::{ZarrError, ZarrResult};

pub use v2::{ArrayMetadata, GroupMetadata};

/// The only format version this crate reads or writes.
pub const ZARR_FORMAT: u64 = 2;

pub const ZARRAY: &str = ".zarray";
pub const ZGROUP: &str = ".zgroup";
pub const ZATTRS: &str = ".zattrs";
pub const ZMETADATA: &str = ".zmetadata";

/// User attributes stored at `.zattrs`.
pub type Attributes = Map<String, Value>;

/// Parse a metadata document that must be a JSON object.
pub(crate) fn parse_object(bytes: &[u8], key: &str) -> ZarrResult<Map<String, Value>> {
    let value: Value = serde_json::from_slice(bytes)?;
    match value {
        Value::Object(obj) => Ok(obj),
        other => Err(ZarrError::InvalidMetadata(format!(
            "{key} must hold a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

/// Serialize a metadata document the way it is written to the store.
pub(crate) fn to_json_bytes(value: &Value) -> ZarrResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec_pretty(value)?))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
