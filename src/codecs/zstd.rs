use crate::codecs::{Codec, CodecSpec};
use crate::error::{ZarrError, ZarrResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const IDENTIFIER: &str = "zstd";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZstdCodec {
    #[serde(default = "default_level")]
    pub level: i32,
}

fn default_level() -> i32 {
    1
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

pub(crate) fn create(spec: &CodecSpec, _item_size: usize) -> ZarrResult<Arc<dyn Codec>> {
    let codec: ZstdCodec = spec.config()?;
    Ok(Arc::new(codec))
}

impl Codec for ZstdCodec {
    fn id(&self) -> &str {
        IDENTIFIER
    }

    fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        // Streaming decode: frames written without a content size are fine.
        zstd::stream::decode_all(data)
            .map_err(|e| ZarrError::codec(IDENTIFIER, format!("decompress failed: {e}")))
    }

    fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        zstd::bulk::compress(data, self.level)
            .map_err(|e| ZarrError::codec(IDENTIFIER, format!("compress failed: {e}")))
    }
}
