//! Schema datatypes and the typed values they describe.
//!
//! A [`DataType`] names what a schema entry holds. The pure mapping functions
//! [`size_of`], [`disk_type`] and [`mem_type`] give its element size and the
//! backend datatype tags used on each side of a read or write. [`Value`] is
//! the in-memory form of a populated attribute or dataset.

use std::fmt;

use rustyescdf_store::{Datatype, Elements};

use crate::error::{Error, Result};

/// Datatype of an attribute or dataset in a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Placeholder with no storage.
    None,
    Bool,
    UInt,
    Int,
    Double,
    /// Fixed-length string; the length lives on the schema entry.
    String,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::None => write!(f, "none"),
            DataType::Bool => write!(f, "bool"),
            DataType::UInt => write!(f, "uint"),
            DataType::Int => write!(f, "int"),
            DataType::Double => write!(f, "double"),
            DataType::String => write!(f, "string"),
        }
    }
}

/// Size in bytes of one element of `datatype`.
pub fn size_of(datatype: DataType, string_length: usize) -> usize {
    match datatype {
        DataType::None => 0,
        DataType::Bool => std::mem::size_of::<bool>(),
        DataType::UInt => std::mem::size_of::<u32>(),
        DataType::Int => std::mem::size_of::<i32>(),
        DataType::Double => std::mem::size_of::<f64>(),
        DataType::String => string_length,
    }
}

/// Backend datatype used to store `datatype`.
///
/// Booleans are stored as one-character strings (`'T'` / `'F'`); the
/// backend has no boolean type.
pub fn disk_type(datatype: DataType, string_length: usize) -> Option<Datatype> {
    match datatype {
        DataType::None => None,
        DataType::Bool => Some(Datatype::FixedString { size: 1 }),
        DataType::UInt => Some(Datatype::UInt32),
        DataType::Int => Some(Datatype::Int32),
        DataType::Double => Some(Datatype::Float64),
        DataType::String => Some(Datatype::FixedString {
            size: string_length,
        }),
    }
}

/// Backend datatype values are converted to when read into memory.
///
/// Identical to [`disk_type`]: numbers use their native encodings and
/// booleans stay single characters until they reach [`Value`].
pub fn mem_type(datatype: DataType, string_length: usize) -> Option<Datatype> {
    disk_type(datatype, string_length)
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A flat, row-major buffer of typed values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(Vec<bool>),
    UInt(Vec<u32>),
    Int(Vec<i32>),
    Double(Vec<f64>),
    String(Vec<String>),
}

impl Value {
    pub fn datatype(&self) -> DataType {
        match self {
            Value::Bool(_) => DataType::Bool,
            Value::UInt(_) => DataType::UInt,
            Value::Int(_) => DataType::Int,
            Value::Double(_) => DataType::Double,
            Value::String(_) => DataType::String,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Value::Bool(v) => v.len(),
            Value::UInt(v) => v.len(),
            Value::Int(v) => v.len(),
            Value::Double(v) => v.len(),
            Value::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode in the memory datatype of `self.datatype()`.
    pub(crate) fn to_elements(&self, string_length: usize) -> Result<Elements> {
        Ok(match self {
            Value::Bool(v) => Elements::Chars {
                width: 1,
                data: v.iter().map(|&b| if b { b'T' } else { b'F' }).collect(),
            },
            Value::UInt(v) => Elements::UInt32(v.clone()),
            Value::Int(v) => Elements::Int32(v.clone()),
            Value::Double(v) => Elements::Float64(v.clone()),
            Value::String(v) => {
                let mut data = Vec::with_capacity(v.len() * string_length);
                for s in v {
                    check_fixed_string(s, string_length)?;
                    let bytes = s.as_bytes();
                    data.extend_from_slice(bytes);
                    data.resize(data.len() + string_length - bytes.len(), 0);
                }
                Elements::Chars {
                    width: string_length,
                    data,
                }
            }
        })
    }

    /// Decode elements read with the memory datatype of `datatype`.
    pub(crate) fn from_elements(datatype: DataType, elements: Elements) -> Result<Value> {
        match (datatype, elements) {
            (DataType::Bool, Elements::Chars { width, data }) => {
                let flags = chunks(&data, width)?
                    .map(|c| match c.first() {
                        Some(b'T') => Ok(true),
                        Some(b'F') => Ok(false),
                        other => Err(Error::OutOfRange(format!(
                            "boolean flag {other:?} is neither 'T' nor 'F'"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Bool(flags))
            }
            (DataType::UInt, Elements::UInt32(v)) => Ok(Value::UInt(v)),
            (DataType::Int, Elements::Int32(v)) => Ok(Value::Int(v)),
            (DataType::Double, Elements::Float64(v)) => Ok(Value::Double(v)),
            // Stored strings are NUL padded: the value ends at the first NUL.
            (DataType::String, Elements::Chars { width, data }) => {
                let strings = chunks(&data, width)?
                    .map(|c| {
                        let end = c.iter().position(|&b| b == 0).unwrap_or(c.len());
                        String::from_utf8(c[..end].to_vec())
                            .map_err(|_| Error::Generic("stored string is not valid UTF-8".into()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::String(strings))
            }
            (dt, e) => Err(Error::Generic(format!(
                "cannot decode {} elements as {dt}",
                e.datatype()
            ))),
        }
    }
}

/// A string fits a fixed-length element of `length` bytes when it is no
/// longer than that and holds no NUL, which would end it early on read.
pub(crate) fn check_fixed_string(s: &str, length: usize) -> Result<()> {
    if s.len() > length {
        return Err(Error::Argument(format!(
            "string of {} bytes exceeds declared length {length}",
            s.len()
        )));
    }
    if s.contains('\0') {
        return Err(Error::Argument(format!("string {s:?} contains a NUL byte")));
    }
    Ok(())
}

fn chunks(data: &[u8], width: usize) -> Result<std::slice::Chunks<'_, u8>> {
    if width == 0 {
        return Err(Error::Generic("zero-width string elements".into()));
    }
    Ok(data.chunks(width))
}

/// Extraction of a Rust value from a [`Value`].
///
/// Scalars require exactly one element; vectors take the whole buffer.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! value_conversions {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(vec![v])
            }
        }

        impl From<Vec<$t>> for Value {
            fn from(v: Vec<$t>) -> Self {
                Value::$variant(v)
            }
        }

        impl From<&[$t]> for Value {
            fn from(v: &[$t]) -> Self {
                Value::$variant(v.to_vec())
            }
        }

        impl<const N: usize> From<[$t; N]> for Value {
            fn from(v: [$t; N]) -> Self {
                Value::$variant(v.to_vec())
            }
        }

        impl FromValue for $t {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) if v.len() == 1 => v.first().cloned(),
                    _ => None,
                }
            }
        }

        impl FromValue for Vec<$t> {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    )*};
}

value_conversions!(
    bool => Bool,
    u32 => UInt,
    i32 => Int,
    f64 => Double,
    String => String,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(vec![v.to_string()])
    }
}

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Inclusive lower and upper bounds for numeric values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bounds {
    UInt(u32, u32),
    Int(i32, i32),
    Double(f64, f64),
}

impl Bounds {
    /// Check every element of `value`. Fails with `OutOfRange` on the first
    /// element outside the bounds, and with `Argument` when the bounds do not
    /// apply to the value's datatype.
    pub fn check(&self, value: &Value) -> Result<()> {
        fn scan<T: PartialOrd + fmt::Display + Copy>(values: &[T], lo: T, hi: T) -> Result<()> {
            match values.iter().position(|&v| !(lo <= v && v <= hi)) {
                Some(i) => Err(Error::OutOfRange(format!(
                    "element {i} = {} outside [{lo}, {hi}]",
                    values[i]
                ))),
                None => Ok(()),
            }
        }

        match (self, value) {
            (Bounds::UInt(lo, hi), Value::UInt(v)) => scan(v, *lo, *hi),
            (Bounds::Int(lo, hi), Value::Int(v)) => scan(v, *lo, *hi),
            (Bounds::Double(lo, hi), Value::Double(v)) => scan(v, *lo, *hi),
            (b, v) => Err(Error::Argument(format!(
                "{b:?} cannot bound a {} value",
                v.datatype()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn sizes() {
        assert_eq!(size_of(DataType::None, 9), 0);
        assert_eq!(size_of(DataType::Bool, 9), std::mem::size_of::<bool>());
        assert_eq!(size_of(DataType::UInt, 9), 4);
        assert_eq!(size_of(DataType::Int, 9), 4);
        assert_eq!(size_of(DataType::Double, 9), 8);
        assert_eq!(size_of(DataType::String, 9), 9);
    }

    #[test]
    fn bool_is_a_character_on_both_sides() {
        let one = Some(Datatype::FixedString { size: 1 });
        assert_eq!(disk_type(DataType::Bool, 0), one);
        assert_eq!(mem_type(DataType::Bool, 0), one);
        assert_eq!(disk_type(DataType::None, 0), None);
        assert_eq!(
            mem_type(DataType::String, 12),
            Some(Datatype::FixedString { size: 12 })
        );
    }

    #[test]
    fn bool_elements_are_t_and_f() {
        let e = Value::Bool(vec![true, false]).to_elements(0).unwrap();
        assert_eq!(
            e,
            Elements::Chars {
                width: 1,
                data: b"TF".to_vec()
            }
        );
        assert_eq!(
            Value::from_elements(DataType::Bool, e).unwrap(),
            Value::Bool(vec![true, false])
        );
    }

    #[test]
    fn bad_bool_flag_rejected() {
        let e = Elements::Chars {
            width: 1,
            data: b"X".to_vec(),
        };
        let err = Value::from_elements(DataType::Bool, e).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn strings_pad_and_trim() {
        let v = Value::from(vec!["ab".to_string(), "çé".to_string()]);
        let e = v.to_elements(4).unwrap();
        assert_eq!(e.len(), 2);
        assert_eq!(Value::from_elements(DataType::String, e).unwrap(), v);
    }

    #[test]
    fn overlong_string_rejected() {
        let err = Value::from("toolong").to_elements(3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }

    #[test]
    fn strings_with_nul_rejected() {
        for s in ["ab\0", "\0", "a\0b"] {
            let err = Value::from(s).to_elements(8).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Argument);
        }
    }

    #[test]
    fn stored_string_ends_at_first_nul() {
        let e = Elements::Chars {
            width: 4,
            data: b"ab\0c".to_vec(),
        };
        assert_eq!(Value::from_elements(DataType::String, e).unwrap(), Value::from("ab"));
    }

    #[test]
    fn mismatched_elements_rejected() {
        let err = Value::from_elements(DataType::UInt, Elements::Float64(vec![1.0])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generic);
    }

    #[test]
    fn from_value_scalars_and_vectors() {
        assert_eq!(u32::from_value(&Value::from(3u32)), Some(3));
        assert_eq!(u32::from_value(&Value::from(vec![1u32, 2])), None);
        assert_eq!(u32::from_value(&Value::from(3i32)), None);
        assert_eq!(
            Vec::<f64>::from_value(&Value::from([1.0, 2.0])),
            Some(vec![1.0, 2.0])
        );
        assert_eq!(String::from_value(&Value::from("no")), Some("no".to_string()));
    }

    #[test]
    fn bounds_check() {
        assert!(Bounds::UInt(1, 3).check(&Value::from(vec![1u32, 3])).is_ok());
        let err = Bounds::Int(-1, 1).check(&Value::from(vec![0i32, 2])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        let err = Bounds::Double(0.0, 1.0)
            .check(&Value::from(f64::NAN))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        let err = Bounds::UInt(0, 1).check(&Value::from(0.5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }
}
