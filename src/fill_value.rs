//! The `fill_value` field of `.zarray`: JSON encoding per dtype and the raw
//! element bytes used to synthesise chunks that were never written.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use half::f16;
use num_complex::Complex;
use serde_json::{Number, Value};

use crate::error::{ZarrError, ZarrResult};
use crate::types::{DTypeDescriptor, Endian, PrimitiveType, TypeKind};

/// A fill value, typed loosely; which variants are valid depends on the
/// array's dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum FillValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    NaN,
    Infinity,
    NegativeInfinity,
    Complex(Complex<f64>),
    /// Raw fixed-size element bytes (`S`, `V` and structured dtypes).
    Bytes(Vec<u8>),
    /// Text for `U` dtypes.
    Text(String),
}

impl FillValue {
    /// Convert to `f64`, with NaN / Infinity mapped accordingly.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            FillValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FillValue::Int(v) => Some(*v as f64),
            FillValue::UInt(v) => Some(*v as f64),
            FillValue::Float(v) => Some(*v),
            FillValue::NaN => Some(f64::NAN),
            FillValue::Infinity => Some(f64::INFINITY),
            FillValue::NegativeInfinity => Some(f64::NEG_INFINITY),
            FillValue::Complex(c) => Some(c.re),
            FillValue::Bytes(_) | FillValue::Text(_) => None,
        }
    }

    fn from_f64(v: f64) -> Self {
        if v.is_nan() {
            FillValue::NaN
        } else if v == f64::INFINITY {
            FillValue::Infinity
        } else if v == f64::NEG_INFINITY {
            FillValue::NegativeInfinity
        } else {
            FillValue::Float(v)
        }
    }
}

fn invalid(msg: impl Into<String>) -> ZarrError {
    ZarrError::InvalidFillValue(msg.into())
}

// ---------------------------------------------------------------------------
// JSON encoding
// ---------------------------------------------------------------------------

/// Encode a fill value for `.zarray`. `None` encodes as JSON `null`.
pub fn encode(value: Option<&FillValue>, dtype: &DTypeDescriptor) -> ZarrResult<Value> {
    let Some(value) = value else {
        return Ok(Value::Null);
    };
    let prim = match dtype {
        DTypeDescriptor::Structured(_) => return encode_blob(value, dtype),
        DTypeDescriptor::Primitive(p) => p,
    };
    match prim.kind {
        TypeKind::Bool => match value {
            FillValue::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(invalid(format!("{other:?} is not a bool"))),
        },
        TypeKind::Int | TypeKind::UInt | TypeKind::TimeDelta | TypeKind::DateTime => {
            let n = integer_number(value)
                .ok_or_else(|| invalid(format!("{value:?} is not an integer")))?;
            check_integer_range(&n, prim)?;
            Ok(Value::Number(n))
        }
        TypeKind::Float => {
            let f = value
                .to_f64()
                .filter(|_| !matches!(value, FillValue::Bool(_) | FillValue::Complex(_)))
                .ok_or_else(|| invalid(format!("{value:?} is not a float")))?;
            Ok(encode_float(f))
        }
        TypeKind::Complex => {
            let c = match value {
                FillValue::Complex(c) => *c,
                other => match other.to_f64() {
                    Some(re) if !matches!(other, FillValue::Bool(_)) => Complex::new(re, 0.0),
                    _ => return Err(invalid(format!("{other:?} is not complex"))),
                },
            };
            Ok(Value::Array(vec![encode_float(c.re), encode_float(c.im)]))
        }
        TypeKind::Unicode => match value {
            FillValue::Text(s) if s.chars().count() <= prim.item_size => Ok(Value::String(s.clone())),
            FillValue::Text(s) => Err(invalid(format!(
                "{s:?} is longer than {} characters",
                prim.item_size
            ))),
            other => Err(invalid(format!("{other:?} is not text"))),
        },
        TypeKind::Bytes | TypeKind::Void => encode_blob(value, dtype),
    }
}

fn encode_float(f: f64) -> Value {
    if f.is_nan() {
        Value::String("NaN".into())
    } else if f == f64::INFINITY {
        Value::String("Infinity".into())
    } else if f == f64::NEG_INFINITY {
        Value::String("-Infinity".into())
    } else {
        // Finite, so `from_f64` always succeeds.
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn encode_blob(value: &FillValue, dtype: &DTypeDescriptor) -> ZarrResult<Value> {
    match value {
        FillValue::Bytes(bytes) if bytes.len() == dtype.item_size() => {
            Ok(Value::String(BASE64_STANDARD.encode(bytes)))
        }
        FillValue::Bytes(bytes) => Err(invalid(format!(
            "expected {} bytes, got {}",
            dtype.item_size(),
            bytes.len()
        ))),
        other => Err(invalid(format!("{other:?} is not a byte blob"))),
    }
}

fn integer_number(value: &FillValue) -> Option<Number> {
    match value {
        FillValue::Int(v) => Some(Number::from(*v)),
        FillValue::UInt(v) => Some(Number::from(*v)),
        _ => None,
    }
}

fn check_integer_range(n: &Number, prim: &PrimitiveType) -> ZarrResult<()> {
    let bits = (prim.item_size * 8) as u32;
    let ok = if prim.kind == TypeKind::UInt {
        n.as_u64()
            .is_some_and(|v| bits >= 64 || v < (1u64 << bits))
    } else if let Some(v) = n.as_i64() {
        bits >= 64 || (v >= -(1i64 << (bits - 1)) && v < (1i64 << (bits - 1)))
    } else {
        false
    };
    if ok {
        Ok(())
    } else {
        Err(invalid(format!("{n} out of range for {prim}")))
    }
}

// ---------------------------------------------------------------------------
// JSON decoding
// ---------------------------------------------------------------------------

/// Decode `fill_value` for `dtype`. JSON `null` decodes to `None`, meaning
/// uninitialised chunks have undefined contents.
pub fn decode(json: &Value, dtype: &DTypeDescriptor) -> ZarrResult<Option<FillValue>> {
    if json.is_null() {
        return Ok(None);
    }
    let prim = match dtype {
        DTypeDescriptor::Structured(_) => return decode_blob(json, dtype).map(Some),
        DTypeDescriptor::Primitive(p) => p,
    };
    let value = match prim.kind {
        TypeKind::Bool => match json {
            Value::Bool(b) => FillValue::Bool(*b),
            Value::Number(n) if n.as_u64() == Some(0) => FillValue::Bool(false),
            Value::Number(n) if n.as_u64() == Some(1) => FillValue::Bool(true),
            other => return Err(invalid(format!("expected bool, got {other}"))),
        },
        TypeKind::Int | TypeKind::UInt | TypeKind::TimeDelta | TypeKind::DateTime => {
            let Value::Number(n) = json else {
                return Err(invalid(format!("expected integer, got {json}")));
            };
            check_integer_range(n, prim)?;
            match n.as_i64() {
                Some(v) => FillValue::Int(v),
                None => FillValue::UInt(n.as_u64().ok_or_else(|| invalid(format!("{n}")))?),
            }
        }
        TypeKind::Float => FillValue::from_f64(decode_float(json)?),
        TypeKind::Complex => match json {
            Value::Array(parts) if parts.len() == 2 => FillValue::Complex(Complex::new(
                decode_float(&parts[0])?,
                decode_float(&parts[1])?,
            )),
            other => FillValue::Complex(Complex::new(decode_float(other)?, 0.0)),
        },
        TypeKind::Unicode => match json {
            Value::String(s) if s.chars().count() <= prim.item_size => FillValue::Text(s.clone()),
            other => return Err(invalid(format!("expected text for {prim}, got {other}"))),
        },
        TypeKind::Bytes | TypeKind::Void => decode_blob(json, dtype)?,
    };
    Ok(Some(value))
}

fn decode_float(json: &Value) -> ZarrResult<f64> {
    match json {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| invalid(format!("{n} is not representable as f64"))),
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => Err(invalid(format!("unknown float literal {other:?}"))),
        },
        other => Err(invalid(format!("expected number, got {other}"))),
    }
}

fn decode_blob(json: &Value, dtype: &DTypeDescriptor) -> ZarrResult<FillValue> {
    let s = json
        .as_str()
        .ok_or_else(|| invalid(format!("expected base64 string, got {json}")))?;
    let bytes = BASE64_STANDARD
        .decode(s)
        .map_err(|e| invalid(format!("bad base64 {s:?}: {e}")))?;
    if bytes.len() != dtype.item_size() {
        return Err(invalid(format!(
            "base64 payload decodes to {} bytes, dtype needs {}",
            bytes.len(),
            dtype.item_size()
        )));
    }
    Ok(FillValue::Bytes(bytes))
}

// ---------------------------------------------------------------------------
// Raw element bytes
// ---------------------------------------------------------------------------

/// The raw bytes of one element holding `value`, laid out as `dtype`
/// would store it.
pub fn element_bytes(value: &FillValue, dtype: &DTypeDescriptor) -> ZarrResult<Vec<u8>> {
    let prim = match dtype {
        DTypeDescriptor::Structured(_) => {
            return match value {
                FillValue::Bytes(b) if b.len() == dtype.item_size() => Ok(b.clone()),
                other => Err(invalid(format!("{other:?} does not fit {}", dtype.to_json()))),
            };
        }
        DTypeDescriptor::Primitive(p) => p,
    };
    let size = prim.byte_size();
    let mut buf = vec![0u8; size];
    let big = prim.byte_order == Endian::Big;
    match (prim.kind, value) {
        (TypeKind::Bool, FillValue::Bool(b)) => buf[0] = u8::from(*b),
        (
            TypeKind::Int | TypeKind::UInt | TypeKind::TimeDelta | TypeKind::DateTime,
            FillValue::Int(_) | FillValue::UInt(_),
        ) => {
            let n = integer_number(value)
                .ok_or_else(|| invalid(format!("{value:?} is not an integer")))?;
            check_integer_range(&n, prim)?;
            let out_of_range = || invalid(format!("{n} out of range for {prim}"));
            if prim.kind == TypeKind::UInt {
                write_uint(&mut buf, n.as_u64().ok_or_else(out_of_range)?, big);
            } else {
                write_int(&mut buf, n.as_i64().ok_or_else(out_of_range)?, big);
            }
        }
        (TypeKind::Float, v) => {
            let f = v
                .to_f64()
                .ok_or_else(|| invalid(format!("{v:?} is not a float")))?;
            write_float(&mut buf, f, big)?;
        }
        (TypeKind::Complex, FillValue::Complex(c)) => {
            let half = size / 2;
            write_float(&mut buf[..half], c.re, big)?;
            write_float(&mut buf[half..], c.im, big)?;
        }
        (TypeKind::Unicode, FillValue::Text(s)) => {
            for (i, ch) in s.chars().take(prim.item_size).enumerate() {
                let slot = &mut buf[i * 4..i * 4 + 4];
                if big {
                    BigEndian::write_u32(slot, ch as u32);
                } else {
                    LittleEndian::write_u32(slot, ch as u32);
                }
            }
        }
        (TypeKind::Bytes | TypeKind::Void, FillValue::Bytes(b)) if b.len() == size => {
            buf.copy_from_slice(b)
        }
        (_, other) => return Err(invalid(format!("{other:?} does not fit {prim}"))),
    }
    Ok(buf)
}

fn write_int(buf: &mut [u8], v: i64, big: bool) {
    let n = buf.len();
    if big {
        BigEndian::write_int(buf, v, n);
    } else {
        LittleEndian::write_int(buf, v, n);
    }
}

fn write_uint(buf: &mut [u8], v: u64, big: bool) {
    let n = buf.len();
    if big {
        BigEndian::write_uint(buf, v, n);
    } else {
        LittleEndian::write_uint(buf, v, n);
    }
}

fn write_float(buf: &mut [u8], f: f64, big: bool) -> ZarrResult<()> {
    match (buf.len(), big) {
        (2, false) => LittleEndian::write_u16(buf, f16::from_f64(f).to_bits()),
        (2, true) => BigEndian::write_u16(buf, f16::from_f64(f).to_bits()),
        (4, false) => LittleEndian::write_f32(buf, f as f32),
        (4, true) => BigEndian::write_f32(buf, f as f32),
        (8, false) => LittleEndian::write_f64(buf, f),
        (8, true) => BigEndian::write_f64(buf, f),
        (n, _) => return Err(invalid(format!("no {n}-byte float representation"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dtype(v: Value) -> DTypeDescriptor {
        DTypeDescriptor::parse(&v).unwrap()
    }

    #[test]
    fn float_sentinels_round_trip() {
        for d in ["<f2", "<f4", ">f8"] {
            let dt = dtype(json!(d));
            let enc = encode(Some(&FillValue::NaN), &dt).unwrap();
            assert_eq!(enc, json!("NaN"));
            let dec = decode(&enc, &dt).unwrap().unwrap();
            assert!(dec.to_f64().unwrap().is_nan());

            let enc = encode(Some(&FillValue::Infinity), &dt).unwrap();
            assert_eq!(enc, json!("Infinity"));
            assert_eq!(decode(&enc, &dt).unwrap(), Some(FillValue::Infinity));

            let enc = encode(Some(&FillValue::NegativeInfinity), &dt).unwrap();
            assert_eq!(enc, json!("-Infinity"));
            assert_eq!(decode(&enc, &dt).unwrap(), Some(FillValue::NegativeInfinity));
        }
        // A raw NaN float is written as the sentinel too.
        let dt = dtype(json!("<f8"));
        assert_eq!(encode(Some(&FillValue::Float(f64::NAN)), &dt).unwrap(), json!("NaN"));
    }

    #[test]
    fn scalars_are_plain_json() {
        let dt = dtype(json!("<f8"));
        assert_eq!(encode(Some(&FillValue::Float(1.5)), &dt).unwrap(), json!(1.5));
        assert_eq!(decode(&json!(0), &dt).unwrap(), Some(FillValue::Float(0.0)));

        let dt = dtype(json!("<i2"));
        assert_eq!(encode(Some(&FillValue::Int(-7)), &dt).unwrap(), json!(-7));
        assert_eq!(decode(&json!(-7), &dt).unwrap(), Some(FillValue::Int(-7)));
        assert!(decode(&json!(40000), &dt).is_err());
        assert!(decode(&json!(1.5), &dt).is_err());

        let dt = dtype(json!("<u8"));
        let big = json!(u64::MAX);
        assert_eq!(decode(&big, &dt).unwrap(), Some(FillValue::UInt(u64::MAX)));
        assert!(decode(&json!(-1), &dt).is_err());

        let dt = dtype(json!("|b1"));
        assert_eq!(encode(Some(&FillValue::Bool(true)), &dt).unwrap(), json!(true));
        assert_eq!(decode(&json!(false), &dt).unwrap(), Some(FillValue::Bool(false)));
    }

    #[test]
    fn null_means_undefined() {
        let dt = dtype(json!("<i4"));
        assert_eq!(encode(None, &dt).unwrap(), Value::Null);
        assert_eq!(decode(&Value::Null, &dt).unwrap(), None);
    }

    #[test]
    fn structured_fill_is_base64() {
        let dt = dtype(json!([["r", "|u1"], ["g", "|u1"], ["b", "|u1"]]));
        let fill = FillValue::Bytes(vec![10, 20, 30]);
        let enc = encode(Some(&fill), &dt).unwrap();
        assert_eq!(enc, json!(BASE64_STANDARD.encode([10u8, 20, 30])));
        assert_eq!(enc, json!("ChQe"));
        assert_eq!(decode(&enc, &dt).unwrap(), Some(fill.clone()));
        assert_eq!(element_bytes(&fill, &dt).unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn blob_length_must_match_item_size() {
        let dt = dtype(json!("|S4"));
        let short = json!(BASE64_STANDARD.encode(b"abc"));
        assert!(matches!(
            decode(&short, &dt),
            Err(ZarrError::InvalidFillValue(_))
        ));
        assert!(decode(&json!("not base64!"), &dt).is_err());
        let ok = json!(BASE64_STANDARD.encode(b"abcd"));
        assert_eq!(
            decode(&ok, &dt).unwrap(),
            Some(FillValue::Bytes(b"abcd".to_vec()))
        );
        assert!(encode(Some(&FillValue::Bytes(vec![1])), &dt).is_err());
    }

    #[test]
    fn complex_fill() {
        let dt = dtype(json!("<c16"));
        let fill = FillValue::Complex(Complex::new(1.0, f64::NEG_INFINITY));
        let enc = encode(Some(&fill), &dt).unwrap();
        assert_eq!(enc, json!([1.0, "-Infinity"]));
        assert_eq!(decode(&enc, &dt).unwrap(), Some(fill.clone()));
        let bytes = element_bytes(&fill, &dt).unwrap();
        assert_eq!(&bytes[..8], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[8..], &f64::NEG_INFINITY.to_le_bytes());
    }

    #[test]
    fn integer_fill_either_signedness() {
        assert_eq!(
            element_bytes(&FillValue::UInt(5), &dtype(json!("<i4"))).unwrap(),
            5i32.to_le_bytes().to_vec()
        );
        assert_eq!(
            element_bytes(&FillValue::UInt(7), &dtype(json!(">m8[s]"))).unwrap(),
            7i64.to_be_bytes().to_vec()
        );
        assert_eq!(
            element_bytes(&FillValue::Int(7), &dtype(json!(">u2"))).unwrap(),
            vec![0, 7]
        );
        for (value, dt) in [
            (FillValue::UInt(u64::MAX), "<i8"),
            (FillValue::Int(300), "|u1"),
            (FillValue::Int(-1), "<u4"),
            (FillValue::UInt(128), "|i1"),
        ] {
            assert!(
                matches!(
                    element_bytes(&value, &dtype(json!(dt))),
                    Err(ZarrError::InvalidFillValue(_))
                ),
                "{value:?} for {dt}"
            );
        }
    }

    #[test]
    fn element_bytes_respect_byte_order() {
        let dt = dtype(json!(">i4"));
        assert_eq!(
            element_bytes(&FillValue::Int(-2), &dt).unwrap(),
            (-2i32).to_be_bytes().to_vec()
        );
        let dt = dtype(json!("<u2"));
        assert_eq!(
            element_bytes(&FillValue::UInt(513), &dt).unwrap(),
            vec![1, 2]
        );
        let dt = dtype(json!("<f2"));
        assert_eq!(
            element_bytes(&FillValue::Float(1.0), &dt).unwrap(),
            f16::from_f64(1.0).to_le_bytes().to_vec()
        );
        let dt = dtype(json!("<U2"));
        assert_eq!(
            element_bytes(&FillValue::Text("a".into()), &dt).unwrap(),
            vec![b'a', 0, 0, 0, 0, 0, 0, 0]
        );
    }
}
