//! Element access shared by the numeric filters.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use half::f16;

use crate::error::{ZarrError, ZarrResult};
use crate::types::{Endian, PrimitiveType, TypeKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Scalar {
    Int(i128),
    Float(f64),
}

impl Scalar {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Signed,
    Unsigned,
    Float,
}

/// A fixed-width integer or float element type a filter can operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NumericType {
    kind: Kind,
    size: usize,
    big_endian: bool,
}

impl NumericType {
    /// Parse a dtype string such as `"<i4"`.
    pub(crate) fn parse(s: &str) -> ZarrResult<Self> {
        let dtype: PrimitiveType = s.parse()?;
        let kind = match (dtype.kind, dtype.item_size) {
            (TypeKind::Int, 1 | 2 | 4 | 8) => Kind::Signed,
            (TypeKind::UInt, 1 | 2 | 4 | 8) => Kind::Unsigned,
            (TypeKind::Float, 2 | 4 | 8) => Kind::Float,
            _ => {
                return Err(ZarrError::InvalidDType(format!(
                    "{s} is not a numeric type usable by a filter"
                )));
            }
        };
        Ok(Self {
            kind,
            size: dtype.item_size,
            big_endian: dtype.byte_order == Endian::Big,
        })
    }

    pub(crate) fn is_float(&self) -> bool {
        self.kind == Kind::Float
    }

    /// Reduce an integer to this type's range with two's-complement
    /// wrap-around.
    pub(crate) fn wrap(&self, v: i128) -> i128 {
        let bits = self.size * 8;
        let modulus = 1u128 << bits;
        let u = (v as u128) & (modulus - 1);
        if self.kind == Kind::Signed && u >= modulus >> 1 {
            u as i128 - modulus as i128
        } else {
            u as i128
        }
    }

    pub(crate) fn read_all(&self, data: &[u8], codec: &str) -> ZarrResult<Vec<Scalar>> {
        if data.len() % self.size != 0 {
            return Err(ZarrError::codec(
                codec,
                format!(
                    "buffer of {} bytes is not a whole number of {}-byte elements",
                    data.len(),
                    self.size
                ),
            ));
        }
        Ok(data.chunks_exact(self.size).map(|e| self.read(e)).collect())
    }

    pub(crate) fn write_all(&self, values: &[Scalar]) -> Vec<u8> {
        let mut out = vec![0u8; values.len() * self.size];
        for (slot, value) in out.chunks_exact_mut(self.size).zip(values) {
            self.write(slot, *value);
        }
        out
    }

    fn read(&self, e: &[u8]) -> Scalar {
        if self.big_endian {
            self.read_with::<BigEndian>(e)
        } else {
            self.read_with::<LittleEndian>(e)
        }
    }

    fn read_with<B: ByteOrder>(&self, e: &[u8]) -> Scalar {
        match (self.kind, self.size) {
            (Kind::Signed, n) => Scalar::Int(B::read_int(e, n) as i128),
            (Kind::Unsigned, n) => Scalar::Int(B::read_uint(e, n) as i128),
            (Kind::Float, 2) => Scalar::Float(f16::from_bits(B::read_u16(e)).to_f64()),
            (Kind::Float, 4) => Scalar::Float(B::read_f32(e) as f64),
            (Kind::Float, _) => Scalar::Float(B::read_f64(e)),
        }
    }

    fn write(&self, slot: &mut [u8], value: Scalar) {
        if self.big_endian {
            self.write_with::<BigEndian>(slot, value)
        } else {
            self.write_with::<LittleEndian>(slot, value)
        }
    }

    fn write_with<B: ByteOrder>(&self, slot: &mut [u8], value: Scalar) {
        let n = slot.len();
        match self.kind {
            Kind::Signed | Kind::Unsigned => {
                // Floats are truncated toward zero before wrapping.
                let v = match value {
                    Scalar::Int(v) => v,
                    Scalar::Float(f) => f as i128,
                };
                let wrapped = self.wrap(v);
                if self.kind == Kind::Signed {
                    B::write_int(slot, wrapped as i64, n);
                } else {
                    B::write_uint(slot, wrapped as u64, n);
                }
            }
            Kind::Float => {
                let f = value.as_f64();
                match n {
                    2 => B::write_u16(slot, f16::from_f64(f).to_bits()),
                    4 => B::write_f32(slot, f as f32),
                    _ => B::write_f64(slot, f),
                }
            }
        }
    }
}
