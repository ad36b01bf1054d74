//! NumPy-style data type descriptors as stored in the `dtype` field of
//! `.zarray`, plus the small enums shared by metadata.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{ZarrError, ZarrResult};

// ---------------------------------------------------------------------------
// Endian
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
    NotApplicable,
}

impl Endian {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '<' => Some(Endian::Little),
            '>' => Some(Endian::Big),
            '|' => Some(Endian::NotApplicable),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Endian::Little => '<',
            Endian::Big => '>',
            Endian::NotApplicable => '|',
        }
    }
}

// ---------------------------------------------------------------------------
// ArrayOrder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArrayOrder {
    #[default]
    C,
    F,
}

impl Serialize for ArrayOrder {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ArrayOrder::C => serializer.serialize_str("C"),
            ArrayOrder::F => serializer.serialize_str("F"),
        }
    }
}

impl<'de> Deserialize<'de> for ArrayOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "C" => Ok(ArrayOrder::C),
            "F" => Ok(ArrayOrder::F),
            _ => Err(serde::de::Error::custom(format!("Unknown order: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// TypeKind
// ---------------------------------------------------------------------------

/// The NumPy kind character of a primitive dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Bool,
    Int,
    UInt,
    Float,
    Complex,
    TimeDelta,
    DateTime,
    Bytes,
    Unicode,
    Void,
}

impl TypeKind {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'b' => TypeKind::Bool,
            'i' => TypeKind::Int,
            'u' => TypeKind::UInt,
            'f' => TypeKind::Float,
            'c' => TypeKind::Complex,
            'm' => TypeKind::TimeDelta,
            'M' => TypeKind::DateTime,
            'S' => TypeKind::Bytes,
            'U' => TypeKind::Unicode,
            'V' => TypeKind::Void,
            _ => return None,
        })
    }

    fn as_char(self) -> char {
        match self {
            TypeKind::Bool => 'b',
            TypeKind::Int => 'i',
            TypeKind::UInt => 'u',
            TypeKind::Float => 'f',
            TypeKind::Complex => 'c',
            TypeKind::TimeDelta => 'm',
            TypeKind::DateTime => 'M',
            TypeKind::Bytes => 'S',
            TypeKind::Unicode => 'U',
            TypeKind::Void => 'V',
        }
    }

    fn is_temporal(self) -> bool {
        matches!(self, TypeKind::TimeDelta | TypeKind::DateTime)
    }

    fn valid_item_size(self, size: usize) -> bool {
        match self {
            TypeKind::Bool => size == 1,
            TypeKind::Int | TypeKind::UInt => matches!(size, 1 | 2 | 4 | 8),
            TypeKind::Float => matches!(size, 2 | 4 | 8),
            TypeKind::Complex => matches!(size, 8 | 16),
            TypeKind::TimeDelta | TypeKind::DateTime => size == 8,
            TypeKind::Bytes | TypeKind::Unicode | TypeKind::Void => size >= 1,
        }
    }
}

const TIME_UNITS: &[&str] = &[
    "Y", "M", "W", "D", "h", "m", "s", "ms", "us", "ns", "ps", "fs", "as",
];

fn valid_time_unit(unit: &str) -> bool {
    let base = unit.trim_start_matches(|c: char| c.is_ascii_digit());
    let multiplier = &unit[..unit.len() - base.len()];
    if multiplier.starts_with('0') {
        return false;
    }
    TIME_UNITS.contains(&base)
}

// ---------------------------------------------------------------------------
// PrimitiveType
// ---------------------------------------------------------------------------

/// A single NumPy type string such as `"<f8"`, `"|S12"` or `"<M8[ns]"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimitiveType {
    pub byte_order: Endian,
    pub kind: TypeKind,
    /// The number after the kind character. For `U` this counts code
    /// points, not bytes.
    pub item_size: usize,
    pub time_unit: Option<String>,
}

impl PrimitiveType {
    pub fn new(byte_order: Endian, kind: TypeKind, item_size: usize) -> Self {
        Self {
            byte_order,
            kind,
            item_size,
            time_unit: None,
        }
    }

    /// Bytes occupied by one element.
    pub fn byte_size(&self) -> usize {
        self.checked_byte_size().unwrap_or(usize::MAX)
    }

    fn checked_byte_size(&self) -> Option<usize> {
        match self.kind {
            TypeKind::Unicode => self.item_size.checked_mul(4),
            _ => Some(self.item_size),
        }
    }
}

impl FromStr for PrimitiveType {
    type Err = ZarrError;

    fn from_str(s: &str) -> ZarrResult<Self> {
        let invalid = |reason: &str| ZarrError::InvalidDType(format!("{s:?}: {reason}"));

        let mut chars = s.chars();
        let byte_order = chars
            .next()
            .and_then(Endian::from_char)
            .ok_or_else(|| invalid("byte order must be one of '<', '>', '|'"))?;
        let kind = chars
            .next()
            .and_then(TypeKind::from_char)
            .ok_or_else(|| invalid("unknown type kind"))?;
        let rest = chars.as_str();

        let (size_str, time_unit) = match rest.find('[') {
            Some(pos) => {
                let unit = rest[pos + 1..]
                    .strip_suffix(']')
                    .ok_or_else(|| invalid("unterminated time unit"))?;
                (&rest[..pos], Some(unit.to_string()))
            }
            None => (rest, None),
        };

        if size_str.is_empty() || !size_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("item size must be a decimal number"));
        }
        if size_str.len() > 1 && size_str.starts_with('0') {
            return Err(invalid("item size has leading zeros"));
        }
        let item_size: usize = size_str
            .parse()
            .map_err(|_| invalid("item size out of range"))?;
        if !kind.valid_item_size(item_size) {
            return Err(invalid("item size not valid for this kind"));
        }
        if kind == TypeKind::Unicode && item_size.checked_mul(4).is_none() {
            return Err(invalid("item size out of range"));
        }

        match (&time_unit, kind.is_temporal()) {
            (None, true) => return Err(invalid("datetime/timedelta requires a [unit]")),
            (Some(_), false) => return Err(invalid("only datetime/timedelta take a unit")),
            (Some(unit), true) if !valid_time_unit(unit) => {
                return Err(invalid("unknown time unit"));
            }
            _ => {}
        }

        Ok(PrimitiveType {
            byte_order,
            kind,
            item_size,
            time_unit,
        })
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.byte_order.as_char(),
            self.kind.as_char(),
            self.item_size
        )?;
        if let Some(unit) = &self.time_unit {
            write!(f, "[{unit}]")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DTypeDescriptor
// ---------------------------------------------------------------------------

/// One named member of a structured dtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub dtype: DTypeDescriptor,
    pub subshape: Option<Vec<usize>>,
}

impl StructField {
    pub fn new(name: impl Into<String>, dtype: DTypeDescriptor) -> Self {
        Self {
            name: name.into(),
            dtype,
            subshape: None,
        }
    }

    pub fn with_subshape(mut self, subshape: Vec<usize>) -> Self {
        self.subshape = Some(subshape);
        self
    }

    /// Bytes occupied by this field in one record.
    pub fn byte_size(&self) -> usize {
        self.checked_byte_size().unwrap_or(usize::MAX)
    }

    fn checked_byte_size(&self) -> Option<usize> {
        let element = self.dtype.checked_item_size()?;
        self.subshape
            .iter()
            .flatten()
            .try_fold(element, |acc, d| acc.checked_mul(*d))
    }
}

/// Either a primitive NumPy type string or a (possibly nested) record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DTypeDescriptor {
    Primitive(PrimitiveType),
    Structured(Vec<StructField>),
}

impl DTypeDescriptor {
    /// Parse the JSON form found in `.zarray`.
    pub fn parse(json: &Value) -> ZarrResult<Self> {
        match json {
            Value::String(s) => Ok(DTypeDescriptor::Primitive(s.parse()?)),
            Value::Array(items) => parse_structured(items),
            other => Err(ZarrError::InvalidDType(format!(
                "expected a string or a list of fields, got {other}"
            ))),
        }
    }

    /// Serialise back to the JSON form. Field order is preserved.
    pub fn to_json(&self) -> Value {
        match self {
            DTypeDescriptor::Primitive(p) => Value::String(p.to_string()),
            DTypeDescriptor::Structured(fields) => Value::Array(
                fields
                    .iter()
                    .map(|field| {
                        let mut entry = vec![Value::String(field.name.clone()), field.dtype.to_json()];
                        if let Some(subshape) = &field.subshape {
                            entry.push(Value::Array(
                                subshape.iter().map(|d| Value::from(*d as u64)).collect(),
                            ));
                        }
                        Value::Array(entry)
                    })
                    .collect(),
            ),
        }
    }

    /// Bytes occupied by one element. Saturates at `usize::MAX` for
    /// hand-built descriptors whose size does not fit; parsing rejects those.
    pub fn item_size(&self) -> usize {
        self.checked_item_size().unwrap_or(usize::MAX)
    }

    /// Bytes occupied by one element, or `None` on overflow.
    pub fn checked_item_size(&self) -> Option<usize> {
        match self {
            DTypeDescriptor::Primitive(p) => p.checked_byte_size(),
            DTypeDescriptor::Structured(fields) => fields
                .iter()
                .try_fold(0usize, |acc, f| acc.checked_add(f.checked_byte_size()?)),
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveType> {
        match self {
            DTypeDescriptor::Primitive(p) => Some(p),
            DTypeDescriptor::Structured(_) => None,
        }
    }

    fn kind(&self) -> Option<TypeKind> {
        self.as_primitive().map(|p| p.kind)
    }

    pub fn is_float(&self) -> bool {
        self.kind() == Some(TypeKind::Float)
    }

    pub fn is_complex(&self) -> bool {
        self.kind() == Some(TypeKind::Complex)
    }

    pub fn is_bool(&self) -> bool {
        self.kind() == Some(TypeKind::Bool)
    }

    /// Signed/unsigned integers and the integer-backed datetime kinds.
    pub fn is_integer(&self) -> bool {
        matches!(
            self.kind(),
            Some(TypeKind::Int | TypeKind::UInt | TypeKind::TimeDelta | TypeKind::DateTime)
        )
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, DTypeDescriptor::Structured(_))
    }
}

fn parse_structured(items: &[Value]) -> ZarrResult<DTypeDescriptor> {
    if items.is_empty() {
        return Err(ZarrError::InvalidDType(
            "structured dtype needs at least one field".into(),
        ));
    }
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(items.len());
    for item in items {
        let entry = item
            .as_array()
            .filter(|e| e.len() == 2 || e.len() == 3)
            .ok_or_else(|| {
                ZarrError::InvalidDType(format!(
                    "structured field must be [name, dtype] or [name, dtype, shape], got {item}"
                ))
            })?;
        let name = entry[0]
            .as_str()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                ZarrError::InvalidDType(format!("field name must be a non-empty string: {item}"))
            })?;
        if !seen.insert(name) {
            return Err(ZarrError::InvalidDType(format!("duplicate field name {name:?}")));
        }
        let dtype = DTypeDescriptor::parse(&entry[1])?;
        let subshape = entry.get(2).map(parse_subshape).transpose()?;
        fields.push(StructField {
            name: name.to_string(),
            dtype,
            subshape,
        });
    }
    let dtype = DTypeDescriptor::Structured(fields);
    if dtype.checked_item_size().is_none() {
        return Err(ZarrError::InvalidDType(
            "structured record size overflows".into(),
        ));
    }
    Ok(dtype)
}

fn parse_subshape(value: &Value) -> ZarrResult<Vec<usize>> {
    let dims = value
        .as_array()
        .ok_or_else(|| ZarrError::InvalidDType(format!("field shape must be a list: {value}")))?;
    dims.iter()
        .map(|d| {
            d.as_u64()
                .filter(|n| *n >= 1)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    ZarrError::InvalidDType(format!(
                        "field shape entries must be integers >= 1: {value}"
                    ))
                })
        })
        .collect()
}

impl From<PrimitiveType> for DTypeDescriptor {
    fn from(p: PrimitiveType) -> Self {
        DTypeDescriptor::Primitive(p)
    }
}

impl Serialize for DTypeDescriptor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DTypeDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        DTypeDescriptor::parse(&v).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitive_round_trip() {
        for s in [
            "|b1", "<i1", "|u1", "<i2", ">u4", "<i8", "<f2", ">f4", "<f8", "<c8", ">c16",
            "|S1", "|S255", "<U12", "|V7", "<M8[ns]", ">m8[10s]", "<M8[D]",
        ] {
            let value = json!(s);
            let parsed = DTypeDescriptor::parse(&value).unwrap();
            assert_eq!(parsed.to_json(), value, "{s}");
        }
    }

    #[test]
    fn primitive_rejections() {
        for s in [
            "", "f8", "=f8", "<x4", "<f", "<f3", "<i16", "|b2", "<M8", "<i4[s]", "<M8[ns",
            "<M8[parsec]", "<f08", "<S0", "<fa", "<f16", "<c32",
        ] {
            assert!(
                matches!(DTypeDescriptor::parse(&json!(s)), Err(ZarrError::InvalidDType(_))),
                "{s} should be rejected"
            );
        }
        assert!(DTypeDescriptor::parse(&json!(8)).is_err());
    }

    #[test]
    fn item_sizes() {
        let d = DTypeDescriptor::parse(&json!("<U3")).unwrap();
        assert_eq!(d.item_size(), 12);
        let d = DTypeDescriptor::parse(&json!("|S5")).unwrap();
        assert_eq!(d.item_size(), 5);
        let d = DTypeDescriptor::parse(&json!([
            ["x", "<f8"],
            ["rgb", "|u1", [3]],
            ["inner", [["a", "<i2"], ["b", "<i4", [2, 2]]]]
        ]))
        .unwrap();
        assert_eq!(d.item_size(), 8 + 3 + (2 + 16));
    }

    #[test]
    fn oversized_records_are_rejected() {
        let huge = 1u64 << 32;
        let err = DTypeDescriptor::parse(&json!([["a", "<f8", [huge, huge]]])).unwrap_err();
        assert!(matches!(err, ZarrError::InvalidDType(_)));
        let err = DTypeDescriptor::parse(&json!([
            ["a", [["b", "|u1", [huge, huge]]]],
            ["c", "<i4"]
        ]))
        .unwrap_err();
        assert!(matches!(err, ZarrError::InvalidDType(_)));
        assert!(DTypeDescriptor::parse(&json!(format!("<U{}", usize::MAX / 2))).is_err());

        let by_hand = DTypeDescriptor::Structured(vec![
            StructField::new("a", "<f8".parse::<PrimitiveType>().unwrap().into())
                .with_subshape(vec![usize::MAX, 2]),
        ]);
        assert_eq!(by_hand.checked_item_size(), None);
        assert_eq!(by_hand.item_size(), usize::MAX);
    }

    #[test]
    fn structured_round_trip_preserves_order() {
        let value = json!([
            ["z", "<f4"],
            ["a", "|u1", [2, 3]],
            ["nested", [["q", ">i8"], ["p", "|S4"]]],
            ["when", "<M8[us]"]
        ]);
        let parsed = DTypeDescriptor::parse(&value).unwrap();
        assert!(parsed.is_structured());
        assert_eq!(parsed.to_json(), value);

        let text = serde_json::to_string(&parsed).unwrap();
        let back: DTypeDescriptor = serde_json::from_str(&text).unwrap();
        assert_eq!(back, parsed);
    }

    #[test]
    fn structured_rejections() {
        for value in [
            json!([]),
            json!([["a"]]),
            json!([["a", "<f8", [2], 1]]),
            json!([[1, "<f8"]]),
            json!([["", "<f8"]]),
            json!([["a", "<f8"], ["a", "<i4"]]),
            json!([["a", "<f8", [0]]]),
            json!([["a", "<f8", 3]]),
            json!([["a", "<q8"]]),
            json!(["<f8"]),
        ] {
            assert!(DTypeDescriptor::parse(&value).is_err(), "{value} should be rejected");
        }
    }

    #[test]
    fn classification() {
        let f = DTypeDescriptor::parse(&json!("<f4")).unwrap();
        assert!(f.is_float() && !f.is_integer());
        let m = DTypeDescriptor::parse(&json!("<m8[s]")).unwrap();
        assert!(m.is_integer());
        let b = DTypeDescriptor::parse(&json!("|b1")).unwrap();
        assert!(b.is_bool());
        let c = DTypeDescriptor::parse(&json!("<c16")).unwrap();
        assert!(c.is_complex());
    }
}
