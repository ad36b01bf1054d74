use crate::codecs::numeric::{NumericType, Scalar};
use crate::codecs::{Codec, CodecSpec};
use crate::error::{ZarrError, ZarrResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const IDENTIFIER: &str = "fixedscaleoffset";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FixedScaleOffsetConfig {
    scale: f64,
    offset: f64,
    dtype: String,
    #[serde(default)]
    astype: Option<String>,
}

/// Lossy quantization: `encode(x) = round((x - offset) * scale)` stored as
/// `astype`, `decode(y) = y / scale + offset` restored as `dtype`.
#[derive(Debug, Clone)]
pub struct FixedScaleOffsetCodec {
    scale: f64,
    offset: f64,
    dtype: NumericType,
    astype: NumericType,
}

impl FixedScaleOffsetCodec {
    pub fn new(scale: f64, offset: f64, dtype: &str, astype: Option<&str>) -> ZarrResult<Self> {
        if !scale.is_finite() || scale == 0.0 {
            return Err(ZarrError::codec(
                IDENTIFIER,
                format!("scale must be finite and non-zero, got {scale}"),
            ));
        }
        if !offset.is_finite() {
            return Err(ZarrError::codec(
                IDENTIFIER,
                format!("offset must be finite, got {offset}"),
            ));
        }
        let dtype = NumericType::parse(dtype)?;
        let astype = astype.map(NumericType::parse).transpose()?.unwrap_or(dtype);
        Ok(Self {
            scale,
            offset,
            dtype,
            astype,
        })
    }
}

pub(crate) fn create(spec: &CodecSpec, _item_size: usize) -> ZarrResult<Arc<dyn Codec>> {
    let config: FixedScaleOffsetConfig = spec.config()?;
    Ok(Arc::new(FixedScaleOffsetCodec::new(
        config.scale,
        config.offset,
        &config.dtype,
        config.astype.as_deref(),
    )?))
}

impl Codec for FixedScaleOffsetCodec {
    fn id(&self) -> &str {
        IDENTIFIER
    }

    fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let encoded: Vec<Scalar> = self
            .dtype
            .read_all(data, IDENTIFIER)?
            .into_iter()
            .map(|x| Scalar::Float(((x.as_f64() - self.offset) * self.scale).round_ties_even()))
            .collect();
        Ok(self.astype.write_all(&encoded))
    }

    fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let decoded: Vec<Scalar> = self
            .astype
            .read_all(data, IDENTIFIER)?
            .into_iter()
            .map(|y| Scalar::Float(y.as_f64() / self.scale + self.offset))
            .collect();
        Ok(self.dtype.write_all(&decoded))
    }
}
