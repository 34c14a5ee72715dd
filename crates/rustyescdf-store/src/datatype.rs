//! Datatype tags and typed element buffers.
//!
//! Every attribute and dataset carries a disk-side [`Datatype`]. Callers read
//! and write through a memory-side tag of their choosing; values are converted
//! between the two the same way HDF5 converts between native types.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, StoreError};

/// Element type of an attribute or dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float64,
    /// NUL-padded fixed-width byte string.
    FixedString { size: usize },
}

impl Datatype {
    /// Encoded size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            Datatype::UInt32 | Datatype::Int32 => 4,
            Datatype::UInt64 | Datatype::Int64 | Datatype::Float64 => 8,
            Datatype::FixedString { size } => *size,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Datatype::FixedString { .. })
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::UInt32 => write!(f, "u32"),
            Datatype::Int32 => write!(f, "i32"),
            Datatype::UInt64 => write!(f, "u64"),
            Datatype::Int64 => write!(f, "i64"),
            Datatype::Float64 => write!(f, "f64"),
            Datatype::FixedString { size } => write!(f, "string[{size}]"),
        }
    }
}

/// A flat buffer of elements of a single datatype.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    UInt32(Vec<u32>),
    Int32(Vec<i32>),
    UInt64(Vec<u64>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    /// `data.len()` is a multiple of `width`.
    Chars { width: usize, data: Vec<u8> },
}

/// Intermediate form used for numeric conversion.
enum Numeric {
    Int(Vec<i128>),
    Float(Vec<f64>),
}

/// 2^64; any truncated float at or beyond this magnitude fits no integer tag.
const FLOAT_INT_LIMIT: f64 = 18_446_744_073_709_551_616.0;

impl Elements {
    /// The datatype tag describing these elements.
    pub fn datatype(&self) -> Datatype {
        match self {
            Elements::UInt32(_) => Datatype::UInt32,
            Elements::Int32(_) => Datatype::Int32,
            Elements::UInt64(_) => Datatype::UInt64,
            Elements::Int64(_) => Datatype::Int64,
            Elements::Float64(_) => Datatype::Float64,
            Elements::Chars { width, .. } => Datatype::FixedString { size: *width },
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Elements::UInt32(v) => v.len(),
            Elements::Int32(v) => v.len(),
            Elements::UInt64(v) => v.len(),
            Elements::Int64(v) => v.len(),
            Elements::Float64(v) => v.len(),
            Elements::Chars { width, data } => {
                if *width == 0 {
                    0
                } else {
                    data.len() / width
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject string buffers that are not a whole number of elements.
    pub fn check(&self) -> Result<()> {
        if let Elements::Chars { width, data } = self {
            if *width == 0 {
                return Err(StoreError::ZeroWidthString);
            }
            if data.len() % width != 0 {
                return Err(StoreError::RaggedStrings {
                    width: *width,
                    len: data.len(),
                });
            }
        }
        Ok(())
    }

    /// Encode as little-endian bytes in this buffer's own datatype.
    ///
    /// A trailing partial string element is dropped; see [`Elements::check`].
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len() * self.datatype().size()];
        match self {
            Elements::UInt32(v) => LittleEndian::write_u32_into(v, &mut out),
            Elements::Int32(v) => LittleEndian::write_i32_into(v, &mut out),
            Elements::UInt64(v) => LittleEndian::write_u64_into(v, &mut out),
            Elements::Int64(v) => LittleEndian::write_i64_into(v, &mut out),
            Elements::Float64(v) => LittleEndian::write_f64_into(v, &mut out),
            Elements::Chars { data, .. } => {
                let n = out.len();
                out.copy_from_slice(&data[..n]);
            }
        }
        out
    }

    /// Decode little-endian bytes holding elements of `dtype`.
    pub fn decode(dtype: Datatype, bytes: &[u8]) -> Result<Elements> {
        let size = dtype.size();
        if size == 0 || bytes.len() % size != 0 {
            return Err(StoreError::Truncated("element data"));
        }
        let n = bytes.len() / size;
        Ok(match dtype {
            Datatype::UInt32 => {
                let mut v = vec![0u32; n];
                LittleEndian::read_u32_into(bytes, &mut v);
                Elements::UInt32(v)
            }
            Datatype::Int32 => {
                let mut v = vec![0i32; n];
                LittleEndian::read_i32_into(bytes, &mut v);
                Elements::Int32(v)
            }
            Datatype::UInt64 => {
                let mut v = vec![0u64; n];
                LittleEndian::read_u64_into(bytes, &mut v);
                Elements::UInt64(v)
            }
            Datatype::Int64 => {
                let mut v = vec![0i64; n];
                LittleEndian::read_i64_into(bytes, &mut v);
                Elements::Int64(v)
            }
            Datatype::Float64 => {
                let mut v = vec![0f64; n];
                LittleEndian::read_f64_into(bytes, &mut v);
                Elements::Float64(v)
            }
            Datatype::FixedString { size } => Elements::Chars {
                width: size,
                data: bytes.to_vec(),
            },
        })
    }

    /// Convert to `target`, element by element.
    ///
    /// Integer conversions are exact and fail on overflow; floats truncate
    /// toward zero when converted to integers; strings are truncated or
    /// NUL-padded to the new width. Strings never convert to numbers.
    pub fn convert(self, target: Datatype) -> Result<Elements> {
        self.check()?;
        let from = self.datatype();
        if from == target {
            return Ok(self);
        }
        if let Elements::Chars { width, data } = self {
            let Datatype::FixedString { size } = target else {
                return Err(StoreError::TypeMismatch { from, to: target });
            };
            return Ok(Elements::Chars {
                width: size,
                data: resize_strings(&data, width, size),
            });
        }
        match self.into_numeric() {
            Some(Numeric::Int(values)) => from_ints(values, target, from),
            Some(Numeric::Float(values)) => match target {
                Datatype::Float64 => Ok(Elements::Float64(values)),
                Datatype::FixedString { .. } => Err(StoreError::TypeMismatch { from, to: target }),
                _ => {
                    let mut ints = Vec::with_capacity(values.len());
                    for (index, v) in values.into_iter().enumerate() {
                        let t = v.trunc();
                        if !t.is_finite() || t.abs() >= FLOAT_INT_LIMIT {
                            return Err(StoreError::ConversionOverflow { index, to: target });
                        }
                        ints.push(t as i128);
                    }
                    from_ints(ints, target, from)
                }
            },
            None => Err(StoreError::TypeMismatch { from, to: target }),
        }
    }

    fn into_numeric(self) -> Option<Numeric> {
        Some(match self {
            Elements::UInt32(v) => Numeric::Int(v.into_iter().map(i128::from).collect()),
            Elements::Int32(v) => Numeric::Int(v.into_iter().map(i128::from).collect()),
            Elements::UInt64(v) => Numeric::Int(v.into_iter().map(i128::from).collect()),
            Elements::Int64(v) => Numeric::Int(v.into_iter().map(i128::from).collect()),
            Elements::Float64(v) => Numeric::Float(v),
            Elements::Chars { .. } => return None,
        })
    }
}

fn from_ints(values: Vec<i128>, target: Datatype, from: Datatype) -> Result<Elements> {
    fn narrow<T: TryFrom<i128>>(values: Vec<i128>, to: Datatype) -> Result<Vec<T>> {
        values
            .into_iter()
            .enumerate()
            .map(|(index, v)| T::try_from(v).map_err(|_| StoreError::ConversionOverflow { index, to }))
            .collect()
    }

    Ok(match target {
        Datatype::UInt32 => Elements::UInt32(narrow(values, target)?),
        Datatype::Int32 => Elements::Int32(narrow(values, target)?),
        Datatype::UInt64 => Elements::UInt64(narrow(values, target)?),
        Datatype::Int64 => Elements::Int64(narrow(values, target)?),
        Datatype::Float64 => Elements::Float64(values.into_iter().map(|v| v as f64).collect()),
        Datatype::FixedString { .. } => return Err(StoreError::TypeMismatch { from, to: target }),
    })
}

fn resize_strings(data: &[u8], width: usize, size: usize) -> Vec<u8> {
    if width == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(data.len() / width * size);
    for chunk in data.chunks(width) {
        let keep = chunk.len().min(size);
        out.extend_from_slice(&chunk[..keep]);
        out.resize(out.len() + (size - keep), 0);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datatype_sizes() {
        assert_eq!(Datatype::UInt32.size(), 4);
        assert_eq!(Datatype::Int64.size(), 8);
        assert_eq!(Datatype::FixedString { size: 7 }.size(), 7);
    }

    #[test]
    fn encode_decode_f64() {
        let e = Elements::Float64(vec![1.5, -2.25]);
        let bytes = e.encode();
        assert_eq!(bytes.len(), 16);
        assert_eq!(Elements::decode(Datatype::Float64, &bytes).unwrap(), e);
    }

    #[test]
    fn decode_rejects_partial_element() {
        let err = Elements::decode(Datatype::UInt32, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, StoreError::Truncated(_)));
    }

    #[test]
    fn u64_to_u32_in_range() {
        let e = Elements::UInt64(vec![2, 3]).convert(Datatype::UInt32).unwrap();
        assert_eq!(e, Elements::UInt32(vec![2, 3]));
    }

    #[test]
    fn negative_to_unsigned_overflows() {
        let err = Elements::Int32(vec![1, -1]).convert(Datatype::UInt32).unwrap_err();
        assert!(matches!(err, StoreError::ConversionOverflow { index: 1, .. }));
    }

    #[test]
    fn float_to_int_truncates() {
        let e = Elements::Float64(vec![2.9, -1.5]).convert(Datatype::Int32).unwrap();
        assert_eq!(e, Elements::Int32(vec![2, -1]));
    }

    #[test]
    fn nan_to_int_overflows() {
        let err = Elements::Float64(vec![f64::NAN]).convert(Datatype::Int64).unwrap_err();
        assert!(matches!(err, StoreError::ConversionOverflow { index: 0, .. }));
    }

    #[test]
    fn string_widths_are_adjusted() {
        let e = Elements::Chars { width: 3, data: b"abcxy\0".to_vec() };
        let wide = e.clone().convert(Datatype::FixedString { size: 4 }).unwrap();
        assert_eq!(wide, Elements::Chars { width: 4, data: b"abc\0xy\0\0".to_vec() });
        let narrow = e.convert(Datatype::FixedString { size: 2 }).unwrap();
        assert_eq!(narrow, Elements::Chars { width: 2, data: b"abxy".to_vec() });
    }

    #[test]
    fn ragged_string_buffers_are_rejected() {
        let ragged = Elements::Chars { width: 4, data: b"abcdef".to_vec() };
        assert!(matches!(
            ragged.check(),
            Err(StoreError::RaggedStrings { width: 4, len: 6 })
        ));
        assert!(matches!(
            ragged.clone().convert(Datatype::FixedString { size: 8 }),
            Err(StoreError::RaggedStrings { .. })
        ));
        assert_eq!(ragged.encode(), b"abcd".to_vec());

        let zero = Elements::Chars { width: 0, data: b"x".to_vec() };
        assert!(matches!(zero.check(), Err(StoreError::ZeroWidthString)));
        assert!(zero.encode().is_empty());
    }

    #[test]
    fn string_to_number_is_a_type_mismatch() {
        let e = Elements::Chars { width: 1, data: b"T".to_vec() };
        assert!(matches!(
            e.convert(Datatype::Int32),
            Err(StoreError::TypeMismatch { .. })
        ));
    }
}
