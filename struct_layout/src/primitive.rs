//! Primitive type registry and endian-aware scalar codecs.
//!
//! The set of primitives is closed. 128-bit values are accessed as two
//! 64-bit halves; `float128` only keeps an `f64` in its high half.

use crate::errors::{check_bounds, LayoutError, LayoutResult};
use serde_derive::{Deserialize, Serialize};
use std::fmt;

macro_rules! read_int {
    ($ty:ty, $buf:expr, $offset:expr, $le:expr) => {{
        let mut bytes = [0u8; std::mem::size_of::<$ty>()];
        bytes.copy_from_slice(&$buf[$offset..$offset + std::mem::size_of::<$ty>()]);
        if $le {
            <$ty>::from_le_bytes(bytes)
        } else {
            <$ty>::from_be_bytes(bytes)
        }
    }};
}

macro_rules! write_int {
    ($value:expr, $buf:expr, $offset:expr, $le:expr) => {{
        let value = $value;
        let bytes = if $le {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        };
        $buf[$offset..$offset + bytes.len()].copy_from_slice(&bytes);
    }};
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PrimitiveType {
    Int8,
    Uint8,
    /// Single character code unit, stored as an unsigned byte.
    Char,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Int128,
    Uint128,
    Float32,
    Float64,
    Float128,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 14] = [
        PrimitiveType::Int8,
        PrimitiveType::Uint8,
        PrimitiveType::Char,
        PrimitiveType::Int16,
        PrimitiveType::Uint16,
        PrimitiveType::Int32,
        PrimitiveType::Uint32,
        PrimitiveType::Int64,
        PrimitiveType::Uint64,
        PrimitiveType::Int128,
        PrimitiveType::Uint128,
        PrimitiveType::Float32,
        PrimitiveType::Float64,
        PrimitiveType::Float128,
    ];

    /// Looks a primitive up by name, accepting capitalized and short spellings.
    pub fn lookup(name: &str) -> LayoutResult<Self> {
        Self::find(name).ok_or_else(|| LayoutError::invalid_type(name))
    }

    /// Same as [`PrimitiveType::lookup`] but `None` for unknown names.
    pub fn find(name: &str) -> Option<Self> {
        let prim = match name.to_ascii_lowercase().as_str() {
            "int8" | "i8" => PrimitiveType::Int8,
            "uint8" | "u8" => PrimitiveType::Uint8,
            "char" => PrimitiveType::Char,
            "int16" | "i16" => PrimitiveType::Int16,
            "uint16" | "u16" => PrimitiveType::Uint16,
            "int32" | "i32" => PrimitiveType::Int32,
            "uint32" | "u32" => PrimitiveType::Uint32,
            "int64" | "i64" => PrimitiveType::Int64,
            "uint64" | "u64" => PrimitiveType::Uint64,
            "int128" | "i128" => PrimitiveType::Int128,
            "uint128" | "u128" => PrimitiveType::Uint128,
            "float32" | "f32" | "float" => PrimitiveType::Float32,
            "float64" | "f64" | "double" => PrimitiveType::Float64,
            "float128" | "f128" => PrimitiveType::Float128,
            _ => return None,
        };
        Some(prim)
    }

    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveType::Int8 => "int8",
            PrimitiveType::Uint8 => "uint8",
            PrimitiveType::Char => "char",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::Uint16 => "uint16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::Uint32 => "uint32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::Uint64 => "uint64",
            PrimitiveType::Int128 => "int128",
            PrimitiveType::Uint128 => "uint128",
            PrimitiveType::Float32 => "float32",
            PrimitiveType::Float64 => "float64",
            PrimitiveType::Float128 => "float128",
        }
    }

    pub const fn byte_width(self) -> usize {
        match self {
            PrimitiveType::Int8 | PrimitiveType::Uint8 | PrimitiveType::Char => 1,
            PrimitiveType::Int16 | PrimitiveType::Uint16 => 2,
            PrimitiveType::Int32 | PrimitiveType::Uint32 | PrimitiveType::Float32 => 4,
            PrimitiveType::Int64 | PrimitiveType::Uint64 | PrimitiveType::Float64 => 8,
            PrimitiveType::Int128 | PrimitiveType::Uint128 | PrimitiveType::Float128 => 16,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(
            self,
            PrimitiveType::Float32 | PrimitiveType::Float64 | PrimitiveType::Float128
        )
    }

    pub const fn is_integer(self) -> bool {
        !self.is_float()
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            PrimitiveType::Int8
                | PrimitiveType::Int16
                | PrimitiveType::Int32
                | PrimitiveType::Int64
                | PrimitiveType::Int128
        )
    }

    /// Reads one value at `offset`.
    pub fn read(self, buf: &[u8], offset: usize, little_endian: bool) -> LayoutResult<Scalar> {
        check_bounds(buf.len(), offset, self.byte_width())?;
        let value = match self {
            PrimitiveType::Uint8 | PrimitiveType::Char => Scalar::Unsigned(buf[offset] as u128),
            PrimitiveType::Int8 => Scalar::Signed(buf[offset] as i8 as i128),
            PrimitiveType::Uint16 => Scalar::Unsigned(read_int!(u16, buf, offset, little_endian) as u128),
            PrimitiveType::Int16 => Scalar::Signed(read_int!(i16, buf, offset, little_endian) as i128),
            PrimitiveType::Uint32 => Scalar::Unsigned(read_int!(u32, buf, offset, little_endian) as u128),
            PrimitiveType::Int32 => Scalar::Signed(read_int!(i32, buf, offset, little_endian) as i128),
            PrimitiveType::Uint64 => Scalar::Unsigned(read_int!(u64, buf, offset, little_endian) as u128),
            PrimitiveType::Int64 => Scalar::Signed(read_int!(i64, buf, offset, little_endian) as i128),
            PrimitiveType::Uint128 => Scalar::Unsigned(read_wide(buf, offset, little_endian)),
            PrimitiveType::Int128 => Scalar::Signed(read_wide(buf, offset, little_endian) as i128),
            PrimitiveType::Float32 => Scalar::Float(read_int!(f32, buf, offset, little_endian) as f64),
            PrimitiveType::Float64 => Scalar::Float(read_int!(f64, buf, offset, little_endian)),
            PrimitiveType::Float128 => {
                let high = if little_endian { offset + 8 } else { offset };
                Scalar::Float(read_int!(f64, buf, high, little_endian))
            }
        };
        Ok(value)
    }

    /// Writes one value at `offset`, wrapping integers to the type's width.
    pub fn write(
        self,
        buf: &mut [u8],
        offset: usize,
        little_endian: bool,
        value: Scalar,
    ) -> LayoutResult<()> {
        check_bounds(buf.len(), offset, self.byte_width())?;
        match self {
            PrimitiveType::Uint8 | PrimitiveType::Char => buf[offset] = value.as_u128() as u8,
            PrimitiveType::Int8 => buf[offset] = value.as_i128() as i8 as u8,
            PrimitiveType::Uint16 => write_int!(value.as_u128() as u16, buf, offset, little_endian),
            PrimitiveType::Int16 => write_int!(value.as_i128() as i16, buf, offset, little_endian),
            PrimitiveType::Uint32 => write_int!(value.as_u128() as u32, buf, offset, little_endian),
            PrimitiveType::Int32 => write_int!(value.as_i128() as i32, buf, offset, little_endian),
            PrimitiveType::Uint64 => write_int!(value.as_u128() as u64, buf, offset, little_endian),
            PrimitiveType::Int64 => write_int!(value.as_i128() as i64, buf, offset, little_endian),
            PrimitiveType::Uint128 | PrimitiveType::Int128 => {
                write_wide(buf, offset, little_endian, value.as_u128())
            }
            PrimitiveType::Float32 => write_int!(value.as_f64() as f32, buf, offset, little_endian),
            PrimitiveType::Float64 => write_int!(value.as_f64(), buf, offset, little_endian),
            PrimitiveType::Float128 => {
                let (high, low) = if little_endian {
                    (offset + 8, offset)
                } else {
                    (offset, offset + 8)
                };
                write_int!(value.as_f64(), buf, high, little_endian);
                buf[low..low + 8].fill(0);
            }
        }
        Ok(())
    }

    /// Bulk form: copies `count` consecutive values out of the buffer.
    pub fn read_array(
        self,
        buf: &[u8],
        offset: usize,
        count: usize,
        little_endian: bool,
    ) -> LayoutResult<Vec<Scalar>> {
        let width = self.byte_width();
        check_bounds(buf.len(), offset, width.saturating_mul(count))?;
        (0..count)
            .map(|i| self.read(buf, offset + i * width, little_endian))
            .collect()
    }

    /// The value this type would hand back after storing `value`.
    pub fn normalize(self, value: Scalar) -> Scalar {
        match self {
            PrimitiveType::Uint8 | PrimitiveType::Char => Scalar::Unsigned(value.as_u128() as u8 as u128),
            PrimitiveType::Int8 => Scalar::Signed(value.as_i128() as i8 as i128),
            PrimitiveType::Uint16 => Scalar::Unsigned(value.as_u128() as u16 as u128),
            PrimitiveType::Int16 => Scalar::Signed(value.as_i128() as i16 as i128),
            PrimitiveType::Uint32 => Scalar::Unsigned(value.as_u128() as u32 as u128),
            PrimitiveType::Int32 => Scalar::Signed(value.as_i128() as i32 as i128),
            PrimitiveType::Uint64 => Scalar::Unsigned(value.as_u128() as u64 as u128),
            PrimitiveType::Int64 => Scalar::Signed(value.as_i128() as i64 as i128),
            PrimitiveType::Uint128 => Scalar::Unsigned(value.as_u128()),
            PrimitiveType::Int128 => Scalar::Signed(value.as_i128()),
            PrimitiveType::Float32 => Scalar::Float(value.as_f64() as f32 as f64),
            PrimitiveType::Float64 | PrimitiveType::Float128 => Scalar::Float(value.as_f64()),
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn read_wide(buf: &[u8], offset: usize, little_endian: bool) -> u128 {
    let first = read_int!(u64, buf, offset, little_endian);
    let second = read_int!(u64, buf, offset + 8, little_endian);
    let (low, high) = if little_endian {
        (first, second)
    } else {
        (second, first)
    };
    ((high as u128) << 64) | low as u128
}

fn write_wide(buf: &mut [u8], offset: usize, little_endian: bool, value: u128) {
    let low = value as u64;
    let high = (value >> 64) as u64;
    let (first, second) = if little_endian {
        (low, high)
    } else {
        (high, low)
    };
    write_int!(first, buf, offset, little_endian);
    write_int!(second, buf, offset + 8, little_endian);
}

/// A decoded primitive value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Unsigned(u128),
    Signed(i128),
    Float(f64),
}

impl Scalar {
    pub fn as_u128(self) -> u128 {
        match self {
            Scalar::Unsigned(v) => v,
            Scalar::Signed(v) => v as u128,
            Scalar::Float(v) => v as i128 as u128,
        }
    }

    pub fn as_i128(self) -> i128 {
        match self {
            Scalar::Unsigned(v) => v as i128,
            Scalar::Signed(v) => v,
            Scalar::Float(v) => v as i128,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Unsigned(v) => v as f64,
            Scalar::Signed(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }

    /// Element count carried by a counter field; negative counts use their magnitude.
    pub fn as_count(self) -> usize {
        let magnitude = match self {
            Scalar::Unsigned(v) => v,
            Scalar::Signed(v) => v.unsigned_abs(),
            Scalar::Float(v) => v.abs() as u128,
        };
        usize::try_from(magnitude).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Unsigned(v) => write!(f, "{v}"),
            Scalar::Signed(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Native Rust numerics with a matching primitive type.
pub trait Primitive: Copy + Into<Scalar> {
    const TYPE: PrimitiveType;

    fn from_scalar(value: Scalar) -> Self;
}

macro_rules! impl_primitive {
    ($($ty:ty => $prim:ident, $variant:ident, $wide:ty, $conv:ident;)*) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$variant(value as $wide)
                }
            }

            impl Primitive for $ty {
                const TYPE: PrimitiveType = PrimitiveType::$prim;

                fn from_scalar(value: Scalar) -> Self {
                    value.$conv() as $ty
                }
            }
        )*
    };
}

impl_primitive! {
    u8 => Uint8, Unsigned, u128, as_u128;
    u16 => Uint16, Unsigned, u128, as_u128;
    u32 => Uint32, Unsigned, u128, as_u128;
    u64 => Uint64, Unsigned, u128, as_u128;
    u128 => Uint128, Unsigned, u128, as_u128;
    i8 => Int8, Signed, i128, as_i128;
    i16 => Int16, Signed, i128, as_i128;
    i32 => Int32, Signed, i128, as_i128;
    i64 => Int64, Signed, i128, as_i128;
    i128 => Int128, Signed, i128, as_i128;
    f32 => Float32, Float, f64, as_f64;
    f64 => Float64, Float, f64, as_f64;
}
