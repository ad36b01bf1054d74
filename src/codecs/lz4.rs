use crate::codecs::{Codec, CodecSpec};
use crate::error::{ZarrError, ZarrResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const IDENTIFIER: &str = "lz4";

const LZ4_SIZE_PREFIX_BYTES: usize = 4;

/// Upper bound on the LZ4 block expansion ratio, used to reject corrupt
/// size prefixes before allocating.
const LZ4_MAX_RATIO: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lz4Codec {
    /// Stored for round-tripping metadata; the block encoder has a single
    /// speed setting.
    #[serde(default = "default_acceleration")]
    pub acceleration: i32,
}

fn default_acceleration() -> i32 {
    1
}

impl Default for Lz4Codec {
    fn default() -> Self {
        Self {
            acceleration: default_acceleration(),
        }
    }
}

pub(crate) fn create(spec: &CodecSpec, _item_size: usize) -> ZarrResult<Arc<dyn Codec>> {
    let codec: Lz4Codec = spec.config()?;
    Ok(Arc::new(codec))
}

impl Codec for Lz4Codec {
    fn id(&self) -> &str {
        IDENTIFIER
    }

    /// Decode an LZ4 block that has a 4-byte little-endian size prefix.
    fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let Some((prefix, payload)) = data.split_first_chunk::<LZ4_SIZE_PREFIX_BYTES>() else {
            return Err(ZarrError::codec(
                IDENTIFIER,
                "compressed buffer missing 4-byte size prefix",
            ));
        };
        let dest_size = u32::from_le_bytes(*prefix) as usize;
        if dest_size > payload.len().saturating_mul(LZ4_MAX_RATIO) + 16 {
            return Err(ZarrError::codec(
                IDENTIFIER,
                format!(
                    "size prefix {dest_size} is impossible for a {} byte block",
                    payload.len()
                ),
            ));
        }

        let decompressed = lz4_flex::block::decompress(payload, dest_size)
            .map_err(|e| ZarrError::codec(IDENTIFIER, format!("decompress failed: {e}")))?;

        if decompressed.len() != dest_size {
            return Err(ZarrError::codec(
                IDENTIFIER,
                format!(
                    "expected {dest_size} bytes, got {}",
                    decompressed.len()
                ),
            ));
        }
        Ok(decompressed)
    }

    /// Encode an LZ4 block, prepending a 4-byte little-endian size prefix.
    fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let orig_size = u32::try_from(data.len()).map_err(|_| {
            ZarrError::codec(IDENTIFIER, "input larger than 4 GiB cannot be size-prefixed")
        })?;
        let compressed = lz4_flex::block::compress(data);
        let mut out = Vec::with_capacity(LZ4_SIZE_PREFIX_BYTES + compressed.len());
        out.extend_from_slice(&orig_size.to_le_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }
}
