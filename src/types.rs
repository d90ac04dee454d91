use std::fmt::{Display, Formatter};

use crate::errors::{PointError, Result};

/// Primitive number types a level field may hold.
///
/// Discriminants are the HDF `DFNT_*` codes so that type codes written by
/// other HDF-EOS producers map one-to-one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(i32)]
pub enum NumberType {
    UChar8 = 3,
    Char8 = 4,
    Float32 = 5,
    Float64 = 6,
    Int8 = 20,
    UInt8 = 21,
    Int16 = 22,
    UInt16 = 23,
    Int32 = 24,
    UInt32 = 25,
}

impl NumberType {
    /// Get the type size in **bytes**.
    pub fn size(&self) -> usize {
        match self {
            NumberType::UChar8 | NumberType::Char8 | NumberType::Int8 | NumberType::UInt8 => 1,
            NumberType::Int16 | NumberType::UInt16 => 2,
            NumberType::Int32 | NumberType::UInt32 | NumberType::Float32 => 4,
            NumberType::Float64 => 8,
        }
    }

    /// The HDF type code.
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Returns `true` if data type is floating point (non-integral)
    pub fn is_floating(&self) -> bool {
        matches!(self, NumberType::Float32 | NumberType::Float64)
    }

    /// Returns `true` if data type supports negative values.
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            NumberType::Char8
                | NumberType::Int8
                | NumberType::Int16
                | NumberType::Int32
                | NumberType::Float32
                | NumberType::Float64
        )
    }

    /// The `DFNT_*` name used in structural metadata.
    pub fn name(&self) -> &'static str {
        match self {
            NumberType::UChar8 => "DFNT_UCHAR8",
            NumberType::Char8 => "DFNT_CHAR8",
            NumberType::Float32 => "DFNT_FLOAT32",
            NumberType::Float64 => "DFNT_FLOAT64",
            NumberType::Int8 => "DFNT_INT8",
            NumberType::UInt8 => "DFNT_UINT8",
            NumberType::Int16 => "DFNT_INT16",
            NumberType::UInt16 => "DFNT_UINT16",
            NumberType::Int32 => "DFNT_INT32",
            NumberType::UInt32 => "DFNT_UINT32",
        }
    }

    /// Decodes one little-endian scalar of this type as `f64`.
    ///
    /// `bytes` must hold at least [`size`](Self::size) bytes.
    pub(crate) fn decode_f64(&self, bytes: &[u8]) -> f64 {
        match self {
            NumberType::UChar8 | NumberType::UInt8 => bytes[0] as f64,
            NumberType::Char8 | NumberType::Int8 => bytes[0] as i8 as f64,
            NumberType::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            NumberType::UInt16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            NumberType::Int32 => i32::from_le_bytes(le4(bytes)) as f64,
            NumberType::UInt32 => u32::from_le_bytes(le4(bytes)) as f64,
            NumberType::Float32 => f32::from_le_bytes(le4(bytes)) as f64,
            NumberType::Float64 => f64::from_le_bytes(le8(bytes)),
        }
    }
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

fn le8(bytes: &[u8]) -> [u8; 8] {
    [
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]
}

impl Display for NumberType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for NumberType {
    type Error = PointError;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        let t = match value {
            3 => NumberType::UChar8,
            4 => NumberType::Char8,
            5 => NumberType::Float32,
            6 => NumberType::Float64,
            20 => NumberType::Int8,
            21 => NumberType::UInt8,
            22 => NumberType::Int16,
            23 => NumberType::UInt16,
            24 => NumberType::Int32,
            25 => NumberType::UInt32,
            _ => {
                return Err(PointError::BadArgument(format!(
                    "unknown number type code {value}"
                )))
            }
        };
        Ok(t)
    }
}

/// Type-level constraint for limiting which primitive numeric values can be
/// read from or written to level fields and attributes.
///
/// Values are stored little-endian.
pub trait PointType: Copy + Default {
    fn number_type() -> NumberType;
    fn write_le(&self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_point_type {
    ($t:ty, $nt:expr) => {
        impl PointType for $t {
            fn number_type() -> NumberType {
                $nt
            }

            fn write_le(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_le_bytes(raw)
            }
        }
    };
}

impl_point_type!(u8, NumberType::UInt8);
impl_point_type!(i8, NumberType::Int8);
impl_point_type!(i16, NumberType::Int16);
impl_point_type!(u16, NumberType::UInt16);
impl_point_type!(i32, NumberType::Int32);
impl_point_type!(u32, NumberType::UInt32);
impl_point_type!(f32, NumberType::Float32);
impl_point_type!(f64, NumberType::Float64);

/// Whether values of `T` can be stored in a field declared as `declared`.
/// Character types share the representation of the 8-bit integers.
pub(crate) fn is_compatible<T: PointType>(declared: NumberType) -> bool {
    match (T::number_type(), declared) {
        (NumberType::UInt8, NumberType::UChar8) | (NumberType::Int8, NumberType::Char8) => true,
        (requested, declared) => requested == declared,
    }
}

/// Checks that `T` matches the declared type of a field or attribute.
pub(crate) fn check_type<T: PointType>(name: &str, declared: NumberType) -> Result<()> {
    if !is_compatible::<T>(declared) {
        return Err(PointError::BadArgument(format!(
            "\"{name}\" holds {declared}, requested {}",
            T::number_type()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_match_codes() {
        for code in [3, 4, 5, 6, 20, 21, 22, 23, 24, 25] {
            let t = NumberType::try_from(code).unwrap();
            assert_eq!(t.code(), code);
        }
        assert_eq!(NumberType::Float64.size(), 8);
        assert_eq!(NumberType::UInt16.size(), 2);
        assert!(NumberType::try_from(7).is_err());
    }

    #[test]
    fn test_decode_f64() {
        assert_eq!(NumberType::Int16.decode_f64(&(-7i16).to_le_bytes()), -7.0);
        assert_eq!(NumberType::UInt16.decode_f64(&65535u16.to_le_bytes()), 65535.0);
        assert_eq!(NumberType::Float32.decode_f64(&1.5f32.to_le_bytes()), 1.5);
    }

    #[test]
    fn test_point_type_bytes() {
        let mut out = Vec::new();
        (-2.25f64).write_le(&mut out);
        17i32.write_le(&mut out);
        assert_eq!(out.len(), 12);
        assert_eq!(f64::read_le(&out[..8]), -2.25);
        assert_eq!(i32::read_le(&out[8..]), 17);
        assert!(check_type::<f64>("Time", NumberType::Float64).is_ok());
        assert!(check_type::<f32>("Time", NumberType::Float64).is_err());
        assert!(check_type::<u8>("Flag", NumberType::UChar8).is_ok());
        assert!(check_type::<i8>("Name", NumberType::Char8).is_ok());
        assert!(check_type::<u8>("Name", NumberType::Char8).is_err());
    }
}
