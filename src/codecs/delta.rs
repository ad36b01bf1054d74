//! Delta filter: stores the first element followed by successive
//! differences, optionally in a different (usually wider) type.

use crate::codecs::numeric::{NumericType, Scalar};
use crate::codecs::{Codec, CodecSpec};
use crate::error::ZarrResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const IDENTIFIER: &str = "delta";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeltaConfig {
    dtype: String,
    #[serde(default)]
    astype: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeltaCodec {
    dtype: NumericType,
    astype: NumericType,
}

impl DeltaCodec {
    pub fn new(dtype: &str, astype: Option<&str>) -> ZarrResult<Self> {
        let dtype = NumericType::parse(dtype)?;
        let astype = astype.map(NumericType::parse).transpose()?.unwrap_or(dtype);
        Ok(Self { dtype, astype })
    }
}

pub(crate) fn create(spec: &CodecSpec, _item_size: usize) -> ZarrResult<Arc<dyn Codec>> {
    let config: DeltaConfig = spec.config()?;
    Ok(Arc::new(DeltaCodec::new(
        &config.dtype,
        config.astype.as_deref(),
    )?))
}

impl Codec for DeltaCodec {
    fn id(&self) -> &str {
        IDENTIFIER
    }

    fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let values = self.dtype.read_all(data, IDENTIFIER)?;
        let mut out = Vec::with_capacity(values.len());
        let mut previous: Option<Scalar> = None;
        for value in values {
            let delta = match (previous, value) {
                (None, v) => v,
                (Some(Scalar::Int(p)), Scalar::Int(v)) => Scalar::Int(self.dtype.wrap(v - p)),
                (Some(p), v) => Scalar::Float(v.as_f64() - p.as_f64()),
            };
            out.push(delta);
            previous = Some(value);
        }
        Ok(self.astype.write_all(&out))
    }

    fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let deltas = self.astype.read_all(data, IDENTIFIER)?;
        let mut out = Vec::with_capacity(deltas.len());
        let mut running: Option<Scalar> = None;
        for delta in deltas {
            let next = match (running, delta) {
                (None, d) if self.dtype.is_float() => Scalar::Float(d.as_f64()),
                (None, Scalar::Float(d)) => Scalar::Int(self.dtype.wrap(d as i128)),
                (None, d) => d,
                (Some(Scalar::Int(r)), Scalar::Int(d)) => Scalar::Int(self.dtype.wrap(r + d)),
                (Some(Scalar::Int(r)), Scalar::Float(d)) => {
                    Scalar::Int(self.dtype.wrap(r + d as i128))
                }
                (Some(Scalar::Float(r)), d) => Scalar::Float(r + d.as_f64()),
            };
            out.push(next);
            running = Some(next);
        }
        Ok(self.dtype.write_all(&out))
    }
}
