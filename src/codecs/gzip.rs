use crate::codecs::{Codec, CodecSpec};
use crate::error::{ZarrError, ZarrResult};
use flate2::Compression;
use flate2::read::{GzDecoder, GzEncoder};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::Arc;

pub const IDENTIFIER: &str = "gzip";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GzipCodec {
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    1
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

pub(crate) fn create(spec: &CodecSpec, _item_size: usize) -> ZarrResult<Arc<dyn Codec>> {
    let codec: GzipCodec = spec.config()?;
    if codec.level > 9 {
        return Err(ZarrError::codec(
            IDENTIFIER,
            format!("level must be 0..=9, got {}", codec.level),
        ));
    }
    Ok(Arc::new(codec))
}

impl Codec for GzipCodec {
    fn id(&self) -> &str {
        IDENTIFIER
    }

    fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| ZarrError::codec(IDENTIFIER, format!("decompress failed: {e}")))?;
        Ok(out)
    }

    fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(data, Compression::new(self.level));
        let mut out = Vec::new();
        encoder
            .read_to_end(&mut out)
            .map_err(|e| ZarrError::codec(IDENTIFIER, format!("compress failed: {e}")))?;
        Ok(out)
    }
}
