//! Error types for the container backend.

use crate::datatype::Datatype;

/// Errors that can occur when reading, writing, or navigating a container.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HDF5 signature not found")]
    BadMagic,

    #[error("unsupported superblock version: {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported HDF5 feature: {0}")]
    Unsupported(String),

    #[error("container truncated while decoding {0}")]
    Truncated(&'static str),

    #[error("corrupt container: {0}")]
    Corrupt(&'static str),

    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("header message for {name:?} needs {size} bytes, the limit is 65535")]
    MessageTooLarge { name: String, size: usize },

    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    #[error("not a group: {0}")]
    NotAGroup(String),

    #[error("not a dataset: {0}")]
    NotADataset(String),

    #[error("link does not resolve to an object: {0}")]
    DanglingLink(String),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("string datatype must be at least one byte wide")]
    ZeroWidthString,

    #[error("string buffer of {len} bytes is not a whole number of {width}-byte elements")]
    RaggedStrings { width: usize, len: usize },

    #[error("cannot convert {from} to {to}")]
    TypeMismatch { from: Datatype, to: Datatype },

    #[error("value at element {index} does not fit in {to}")]
    ConversionOverflow { index: usize, to: Datatype },

    #[error("selection out of bounds for extent {dims:?}")]
    SelectionOutOfBounds { dims: Vec<u64> },

    #[error("buffer holds {actual} elements, selection needs {expected}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("container opened read-only")]
    ReadOnly,

    #[error("invalid object handle")]
    InvalidHandle,
}

pub type Result<T> = std::result::Result<T, StoreError>;
