use std::ffi::CStr;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codecs::{Codec, CodecSpec};
use crate::error::{ZarrError, ZarrResult};

pub const IDENTIFIER: &str = "blosc";

/// Every blosc frame starts with a header of this many bytes.
const HEADER_LEN: usize = 16;

/// The internal compressor blosc runs on each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloscCname {
    Lz4,
    Lz4hc,
    Blosclz,
    Zstd,
    Snappy,
    Zlib,
}

impl BloscCname {
    fn as_cstr(self) -> &'static CStr {
        match self {
            BloscCname::Lz4 => c"lz4",
            BloscCname::Lz4hc => c"lz4hc",
            BloscCname::Blosclz => c"blosclz",
            BloscCname::Zstd => c"zstd",
            BloscCname::Snappy => c"snappy",
            BloscCname::Zlib => c"zlib",
        }
    }
}

impl std::fmt::Display for BloscCname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_cstr().to_str().unwrap_or("?"))
    }
}

/// Pre-compression byte rearrangement. Stored in `.zarray` as `-1`, `0`,
/// `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloscShuffle {
    /// Bit shuffle for 1-byte items, byte shuffle otherwise.
    Auto,
    NoShuffle,
    Shuffle,
    BitShuffle,
}

impl BloscShuffle {
    fn code(self) -> i8 {
        match self {
            BloscShuffle::Auto => -1,
            BloscShuffle::NoShuffle => 0,
            BloscShuffle::Shuffle => 1,
            BloscShuffle::BitShuffle => 2,
        }
    }

    fn from_code(code: i64) -> Option<Self> {
        [
            BloscShuffle::Auto,
            BloscShuffle::NoShuffle,
            BloscShuffle::Shuffle,
            BloscShuffle::BitShuffle,
        ]
        .into_iter()
        .find(|s| i64::from(s.code()) == code)
    }

    fn resolve(self, typesize: usize) -> BloscShuffle {
        match self {
            BloscShuffle::Auto if typesize == 1 => BloscShuffle::BitShuffle,
            BloscShuffle::Auto => BloscShuffle::Shuffle,
            other => other,
        }
    }

    /// The `doshuffle` flag handed to the C library.
    fn flag(self, typesize: usize) -> i32 {
        let raw = match self.resolve(typesize) {
            BloscShuffle::Shuffle => blosc_src::BLOSC_SHUFFLE,
            BloscShuffle::BitShuffle => blosc_src::BLOSC_BITSHUFFLE,
            BloscShuffle::NoShuffle | BloscShuffle::Auto => blosc_src::BLOSC_NOSHUFFLE,
        };
        raw as i32
    }
}

impl FromStr for BloscShuffle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(BloscShuffle::Auto),
            "noshuffle" => Ok(BloscShuffle::NoShuffle),
            "shuffle" => Ok(BloscShuffle::Shuffle),
            "bitshuffle" => Ok(BloscShuffle::BitShuffle),
            other => other
                .parse::<i64>()
                .ok()
                .and_then(BloscShuffle::from_code)
                .ok_or_else(|| format!("unknown blosc shuffle {s:?}")),
        }
    }
}

impl Serialize for BloscShuffle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}

impl<'de> Deserialize<'de> for BloscShuffle {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_i64()
                .and_then(BloscShuffle::from_code)
                .ok_or_else(|| D::Error::custom(format!("unknown blosc shuffle {n}"))),
            Value::String(s) => s.parse().map_err(D::Error::custom),
            other => Err(D::Error::custom(format!(
                "blosc shuffle must be an integer or a name, got {other}"
            ))),
        }
    }
}

/// numcodecs `Blosc`. Defaults match numcodecs: lz4, level 5, byte shuffle,
/// automatic block size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BloscCodec {
    /// Element size used for shuffling. Filled in from the array's dtype
    /// when the metadata leaves it out.
    pub typesize: Option<usize>,
    pub cname: BloscCname,
    pub clevel: i32,
    pub shuffle: BloscShuffle,
    pub blocksize: usize,
}

impl Default for BloscCodec {
    fn default() -> Self {
        Self {
            typesize: None,
            cname: BloscCname::Lz4,
            clevel: 5,
            shuffle: BloscShuffle::Shuffle,
            blocksize: 0,
        }
    }
}

pub(crate) fn create(spec: &CodecSpec, item_size: usize) -> ZarrResult<Arc<dyn Codec>> {
    let mut codec: BloscCodec = spec.config()?;
    if !(0..=9).contains(&codec.clevel) {
        return Err(ZarrError::codec(
            IDENTIFIER,
            format!("clevel must be 0..=9, got {}", codec.clevel),
        ));
    }
    codec.typesize.get_or_insert(item_size.max(1));
    Ok(Arc::new(codec))
}

/// Uncompressed length recorded in a frame header, once the library has
/// checked the frame is consistent.
fn frame_len(frame: &[u8]) -> Option<usize> {
    if frame.len() < HEADER_LEN {
        return None;
    }
    let mut nbytes = 0usize;
    // SAFETY: `frame` is a live slice and its exact length is passed.
    let status =
        unsafe { blosc_src::blosc_cbuffer_validate(frame.as_ptr().cast(), frame.len(), &mut nbytes) };
    (status == 0).then_some(nbytes)
}

impl Codec for BloscCodec {
    fn id(&self) -> &str {
        IDENTIFIER
    }

    // The `_ctx` entry points carry their own state, so no global
    // `blosc_init` is needed and calls may run on any thread.
    fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let typesize = self.typesize.unwrap_or(1);
        let capacity = data.len() + blosc_src::BLOSC_MAX_OVERHEAD as usize;
        let mut frame = vec![0u8; capacity];
        // SAFETY: input and output buffers are valid for the lengths given.
        let written = unsafe {
            blosc_src::blosc_compress_ctx(
                self.clevel,
                self.shuffle.flag(typesize),
                typesize,
                data.len(),
                data.as_ptr().cast(),
                frame.as_mut_ptr().cast(),
                capacity,
                self.cname.as_cstr().as_ptr(),
                self.blocksize,
                1,
            )
        };
        let written = usize::try_from(written)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| ZarrError::codec(IDENTIFIER, format!("compression failed ({written})")))?;
        frame.truncate(written);
        Ok(frame)
    }

    fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let len = frame_len(data)
            .ok_or_else(|| ZarrError::codec(IDENTIFIER, "not a valid blosc frame"))?;
        let mut out = vec![0u8; len];
        if len == 0 {
            return Ok(out);
        }
        // SAFETY: `out` holds exactly the size the validated header declares.
        let status = unsafe {
            blosc_src::blosc_decompress_ctx(data.as_ptr().cast(), out.as_mut_ptr().cast(), len, 1)
        };
        if status < 0 {
            return Err(ZarrError::codec(
                IDENTIFIER,
                format!("decompression failed ({status})"),
            ));
        }
        Ok(out)
    }
}
