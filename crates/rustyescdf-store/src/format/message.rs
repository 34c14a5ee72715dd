//! Object header message bodies.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{utf8, Reader, UNDEF};
use crate::dataspace::{Dataspace, DataspaceType};
use crate::datatype::Datatype;
use crate::error::{Result, StoreError};
use crate::file::StoredAttribute;

// Message type ids.
pub(crate) const NIL: u16 = 0x00;
pub(crate) const DATASPACE: u16 = 0x01;
pub(crate) const LINK_INFO: u16 = 0x02;
pub(crate) const DATATYPE: u16 = 0x03;
pub(crate) const FILL_VALUE_OLD: u16 = 0x04;
pub(crate) const FILL_VALUE: u16 = 0x05;
pub(crate) const LINK: u16 = 0x06;
pub(crate) const LAYOUT: u16 = 0x08;
pub(crate) const GROUP_INFO: u16 = 0x0A;
pub(crate) const FILTER_PIPELINE: u16 = 0x0B;
pub(crate) const ATTRIBUTE: u16 = 0x0C;
pub(crate) const COMMENT: u16 = 0x0D;
pub(crate) const MTIME_OLD: u16 = 0x0E;
pub(crate) const CONTINUATION: u16 = 0x10;
pub(crate) const SYMBOL_TABLE: u16 = 0x11;
pub(crate) const MTIME: u16 = 0x12;
pub(crate) const ATTRIBUTE_INFO: u16 = 0x15;
pub(crate) const REF_COUNT: u16 = 0x16;

/// Message flag: the body lives in a shared object.
pub(crate) const FLAG_SHARED: u8 = 0x02;
/// Message flag: the body never changes.
pub(crate) const FLAG_CONSTANT: u8 = 0x01;

/// Whether this reader knows what a message of type `kind` means.
pub(crate) fn is_known(kind: u16) -> bool {
    matches!(
        kind,
        NIL | DATASPACE
            | LINK_INFO
            | DATATYPE
            | FILL_VALUE_OLD
            | FILL_VALUE
            | LINK
            | LAYOUT
            | GROUP_INFO
            | FILTER_PIPELINE
            | ATTRIBUTE
            | COMMENT
            | MTIME_OLD
            | CONTINUATION
            | SYMBOL_TABLE
            | MTIME
            | ATTRIBUTE_INFO
            | REF_COUNT
    )
}

const MAX_RANK: u8 = 32;

// ---------------------------------------------------------------------------
// Datatype
// ---------------------------------------------------------------------------

const CLASS_FIXED: u8 = 0;
const CLASS_FLOAT: u8 = 1;
const CLASS_STRING: u8 = 3;
const DATATYPE_VERSION: u8 = 1;
/// String padding: NUL padded, ASCII.
const STR_NULLPAD: u8 = 0x01;

pub(crate) fn encode_datatype(dt: Datatype, buf: &mut Vec<u8>) {
    fn head(class: u8, bits: [u8; 3], size: usize, buf: &mut Vec<u8>) {
        buf.push(DATATYPE_VERSION << 4 | class);
        buf.extend_from_slice(&bits);
        buf.extend_from_slice(&(size as u32).to_le_bytes());
    }
    match dt {
        Datatype::UInt32 | Datatype::Int32 | Datatype::UInt64 | Datatype::Int64 => {
            let signed = matches!(dt, Datatype::Int32 | Datatype::Int64);
            head(CLASS_FIXED, [if signed { 0x08 } else { 0x00 }, 0, 0], dt.size(), buf);
            buf.extend_from_slice(&0u16.to_le_bytes());
            buf.extend_from_slice(&((dt.size() * 8) as u16).to_le_bytes());
        }
        Datatype::Float64 => {
            // Implied mantissa MSB, sign at bit 63.
            head(CLASS_FLOAT, [0x20, 63, 0], 8, buf);
            buf.extend_from_slice(&0u16.to_le_bytes());
            buf.extend_from_slice(&64u16.to_le_bytes());
            buf.extend_from_slice(&[52, 11, 0, 52]);
            buf.extend_from_slice(&1023u32.to_le_bytes());
        }
        Datatype::FixedString { size } => head(CLASS_STRING, [STR_NULLPAD, 0, 0], size, buf),
    }
}

/// How elements are laid out in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repr {
    Int { signed: bool, big_endian: bool },
    Float { big_endian: bool },
    Bytes,
}

/// A file datatype mapped onto the nearest [`Datatype`] that holds it
/// without loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DiskType {
    pub datatype: Datatype,
    /// Bytes per element in the file.
    pub size: usize,
    repr: Repr,
}

impl DiskType {
    /// File bytes occupied by `n` elements.
    pub fn bytes_for(&self, n: u64) -> Result<usize> {
        n.checked_mul(self.size as u64)
            .and_then(|b| usize::try_from(b).ok())
            .ok_or(StoreError::Corrupt("element count overflows"))
    }

    /// Rewrite file elements into the little-endian layout of `datatype`.
    pub fn normalize(&self, raw: &[u8]) -> Vec<u8> {
        let target = self.datatype.size();
        match self.repr {
            Repr::Bytes => raw.to_vec(),
            Repr::Int { signed, big_endian } => {
                let mut out = Vec::with_capacity(raw.len() / self.size * target);
                for chunk in raw.chunks_exact(self.size) {
                    let v = match (signed, big_endian) {
                        (true, false) => LittleEndian::read_int(chunk, self.size) as u64,
                        (true, true) => BigEndian::read_int(chunk, self.size) as u64,
                        (false, false) => LittleEndian::read_uint(chunk, self.size),
                        (false, true) => BigEndian::read_uint(chunk, self.size),
                    };
                    out.extend_from_slice(&v.to_le_bytes()[..target]);
                }
                out
            }
            Repr::Float { big_endian } => {
                let mut out = Vec::with_capacity(raw.len() / self.size * 8);
                for chunk in raw.chunks_exact(self.size) {
                    let v = match (self.size, big_endian) {
                        (4, false) => f64::from(LittleEndian::read_f32(chunk)),
                        (4, true) => f64::from(BigEndian::read_f32(chunk)),
                        (_, false) => LittleEndian::read_f64(chunk),
                        (_, true) => BigEndian::read_f64(chunk),
                    };
                    out.extend_from_slice(&v.to_le_bytes());
                }
                out
            }
        }
    }
}

/// Decode a datatype message. Narrow integers widen to 32 bits and
/// single-precision floats widen to double.
pub(crate) fn decode_datatype(data: &[u8]) -> Result<DiskType> {
    let mut r = Reader::new(data);
    let class_version = r.u8("datatype class")?;
    let bits = r.take(3, "datatype bit field")?;
    let size = r.u32("datatype size")? as usize;
    let class = class_version & 0x0f;
    let version = class_version >> 4;
    if !(1..=4).contains(&version) {
        return Err(StoreError::Corrupt("invalid datatype version"));
    }
    match class {
        CLASS_FIXED => {
            let signed = bits[0] & 0x08 != 0;
            let big_endian = bits[0] & 0x01 != 0;
            let datatype = match (size, signed) {
                (1 | 2 | 4, true) => Datatype::Int32,
                (1 | 2 | 4, false) => Datatype::UInt32,
                (8, true) => Datatype::Int64,
                (8, false) => Datatype::UInt64,
                _ => return Err(StoreError::Unsupported(format!("{size}-byte integer"))),
            };
            Ok(DiskType {
                datatype,
                size,
                repr: Repr::Int { signed, big_endian },
            })
        }
        CLASS_FLOAT => {
            let big_endian = match (bits[0] & 0x01, bits[0] & 0x40) {
                (0, 0) => false,
                (1, 0) => true,
                _ => return Err(StoreError::Unsupported("VAX-ordered float".into())),
            };
            if size != 4 && size != 8 {
                return Err(StoreError::Unsupported(format!("{size}-byte float")));
            }
            Ok(DiskType {
                datatype: Datatype::Float64,
                size,
                repr: Repr::Float { big_endian },
            })
        }
        CLASS_STRING => {
            if size == 0 {
                return Err(StoreError::ZeroWidthString);
            }
            Ok(DiskType {
                datatype: Datatype::FixedString { size },
                size,
                repr: Repr::Bytes,
            })
        }
        other => Err(StoreError::Unsupported(format!("datatype class {other}"))),
    }
}

// ---------------------------------------------------------------------------
// Dataspace
// ---------------------------------------------------------------------------

pub(crate) fn encode_dataspace(ds: &Dataspace, buf: &mut Vec<u8>) {
    buf.push(2);
    buf.push(ds.rank() as u8);
    buf.push(if ds.max_dimensions.is_some() { 0x01 } else { 0x00 });
    buf.push(match ds.space_type {
        DataspaceType::Scalar => 0,
        DataspaceType::Simple => 1,
        DataspaceType::Null => 2,
    });
    for &d in &ds.dimensions {
        buf.extend_from_slice(&d.to_le_bytes());
    }
    if let Some(max) = &ds.max_dimensions {
        for &d in max {
            buf.extend_from_slice(&d.to_le_bytes());
        }
    }
}

pub(crate) fn decode_dataspace(data: &[u8], length_size: u8) -> Result<Dataspace> {
    let mut r = Reader::new(data);
    let version = r.u8("dataspace version")?;
    let rank = r.u8("dataspace rank")?;
    let flags = r.u8("dataspace flags")?;
    let space_type = match version {
        1 => {
            r.skip(5, "dataspace reserved")?;
            if rank == 0 {
                DataspaceType::Scalar
            } else {
                DataspaceType::Simple
            }
        }
        2 => match r.u8("dataspace type")? {
            0 => DataspaceType::Scalar,
            1 => DataspaceType::Simple,
            2 => DataspaceType::Null,
            _ => return Err(StoreError::Corrupt("unknown dataspace type")),
        },
        _ => return Err(StoreError::Corrupt("invalid dataspace version")),
    };
    if rank > MAX_RANK || (space_type != DataspaceType::Simple && rank != 0) {
        return Err(StoreError::Corrupt("invalid dataspace rank"));
    }
    let mut dimensions = Vec::with_capacity(rank as usize);
    for _ in 0..rank {
        dimensions.push(r.uint(length_size, "dimension")?);
    }
    let max_dimensions = if flags & 0x01 != 0 {
        let mut max = Vec::with_capacity(rank as usize);
        for _ in 0..rank {
            max.push(r.uint(length_size, "max dimension")?);
        }
        Some(max)
    } else {
        None
    };
    Ok(Dataspace {
        space_type,
        dimensions,
        max_dimensions,
    })
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

const LINK_VERSION: u8 = 1;
const LINK_HAS_CREATION_ORDER: u8 = 0x04;
const LINK_HAS_TYPE: u8 = 0x08;
const LINK_HAS_CHARSET: u8 = 0x10;
const LINK_TYPE_HARD: u8 = 0;
const LINK_TYPE_SOFT: u8 = 1;
const CHARSET_UTF8: u8 = 1;

/// Target of a link message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkTarget {
    Hard(u64),
    Soft(String),
    /// External and user-defined links.
    Other(u8),
}

pub(crate) fn encode_link(name: &str, target: &LinkTarget, buf: &mut Vec<u8>) {
    let name_width: u8 = if name.len() <= 0xff { 0 } else { 1 };
    let mut flags = name_width;
    if !matches!(target, LinkTarget::Hard(_)) {
        flags |= LINK_HAS_TYPE;
    }
    if !name.is_ascii() {
        flags |= LINK_HAS_CHARSET;
    }
    buf.push(LINK_VERSION);
    buf.push(flags);
    if let LinkTarget::Soft(_) = target {
        buf.push(LINK_TYPE_SOFT);
    }
    if flags & LINK_HAS_CHARSET != 0 {
        buf.push(CHARSET_UTF8);
    }
    if name_width == 0 {
        buf.push(name.len() as u8);
    } else {
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    }
    buf.extend_from_slice(name.as_bytes());
    match target {
        LinkTarget::Hard(addr) => buf.extend_from_slice(&addr.to_le_bytes()),
        LinkTarget::Soft(path) => {
            buf.extend_from_slice(&(path.len() as u16).to_le_bytes());
            buf.extend_from_slice(path.as_bytes());
        }
        LinkTarget::Other(_) => {}
    }
}

pub(crate) fn decode_link(data: &[u8], offset_size: u8) -> Result<(String, LinkTarget)> {
    let mut r = Reader::new(data);
    if r.u8("link version")? != LINK_VERSION {
        return Err(StoreError::Corrupt("invalid link message version"));
    }
    let flags = r.u8("link flags")?;
    let link_type = if flags & LINK_HAS_TYPE != 0 {
        r.u8("link type")?
    } else {
        LINK_TYPE_HARD
    };
    if flags & LINK_HAS_CREATION_ORDER != 0 {
        r.skip(8, "link creation order")?;
    }
    if flags & LINK_HAS_CHARSET != 0 {
        r.skip(1, "link charset")?;
    }
    let name_len = r.uint(1 << (flags & 0x03), "link name length")? as usize;
    let name = utf8(r.take(name_len, "link name")?)?;
    let target = match link_type {
        LINK_TYPE_HARD => LinkTarget::Hard(r.address(offset_size, "link address")?),
        LINK_TYPE_SOFT => {
            let len = r.u16("soft link length")? as usize;
            LinkTarget::Soft(utf8(r.take(len, "soft link target")?)?)
        }
        other => LinkTarget::Other(other),
    };
    Ok((name, target))
}

/// Decode a link info message; true when links live in dense storage.
pub(crate) fn decode_link_info_is_dense(data: &[u8], offset_size: u8) -> Result<bool> {
    let mut r = Reader::new(data);
    r.skip(1, "link info version")?;
    let flags = r.u8("link info flags")?;
    if flags & 0x01 != 0 {
        r.skip(8, "max creation index")?;
    }
    Ok(r.address(offset_size, "fractal heap address")? != UNDEF)
}

/// Decode an attribute info message; true when attributes live in dense
/// storage.
pub(crate) fn decode_attribute_info_is_dense(data: &[u8], offset_size: u8) -> Result<bool> {
    let mut r = Reader::new(data);
    r.skip(1, "attribute info version")?;
    let flags = r.u8("attribute info flags")?;
    if flags & 0x01 != 0 {
        r.skip(2, "max creation index")?;
    }
    Ok(r.address(offset_size, "fractal heap address")? != UNDEF)
}

/// B-tree and local heap addresses of a symbol-table group.
pub(crate) fn decode_symbol_table(data: &[u8], offset_size: u8) -> Result<(u64, u64)> {
    let mut r = Reader::new(data);
    let btree = r.address(offset_size, "symbol table b-tree")?;
    let heap = r.address(offset_size, "symbol table heap")?;
    Ok((btree, heap))
}

pub(crate) fn decode_continuation(data: &[u8], offset_size: u8, length_size: u8) -> Result<(u64, u64)> {
    let mut r = Reader::new(data);
    let addr = r.address(offset_size, "continuation address")?;
    let len = r.uint(length_size, "continuation length")?;
    Ok((addr, len))
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

const ATTRIBUTE_VERSION: u8 = 3;

pub(crate) fn encode_attribute(name: &str, attr: &StoredAttribute, buf: &mut Vec<u8>) {
    let mut dt = Vec::new();
    encode_datatype(attr.datatype, &mut dt);
    let mut ds = Vec::new();
    encode_dataspace(&attr.dataspace, &mut ds);
    buf.push(ATTRIBUTE_VERSION);
    buf.push(0);
    buf.extend_from_slice(&((name.len() + 1) as u16).to_le_bytes());
    buf.extend_from_slice(&(dt.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(ds.len() as u16).to_le_bytes());
    buf.push(if name.is_ascii() { 0 } else { CHARSET_UTF8 });
    buf.extend_from_slice(name.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&dt);
    buf.extend_from_slice(&ds);
    buf.extend_from_slice(&attr.data);
}

fn pad8(n: usize) -> usize {
    (n + 7) & !7
}

pub(crate) fn decode_attribute(data: &[u8], length_size: u8) -> Result<(String, StoredAttribute)> {
    let mut r = Reader::new(data);
    let version = r.u8("attribute version")?;
    let flags = r.u8("attribute flags")?;
    let name_size = r.u16("attribute name size")? as usize;
    let dt_size = r.u16("attribute datatype size")? as usize;
    let ds_size = r.u16("attribute dataspace size")? as usize;
    let pad: fn(usize) -> usize = match version {
        1 => pad8,
        2 => |n| n,
        3 => {
            r.skip(1, "attribute charset")?;
            |n| n
        }
        _ => return Err(StoreError::Corrupt("invalid attribute message version")),
    };
    if version > 1 && flags & 0x03 != 0 {
        return Err(StoreError::Unsupported("shared attribute datatype or dataspace".into()));
    }
    let raw_name = r.take(name_size, "attribute name")?;
    r.skip(pad(name_size) - name_size, "attribute name padding")?;
    let name_end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
    let name = utf8(&raw_name[..name_end])?;

    let disk = decode_datatype(r.take(dt_size, "attribute datatype")?)?;
    r.skip(pad(dt_size) - dt_size, "attribute datatype padding")?;
    let dataspace = decode_dataspace(r.take(ds_size, "attribute dataspace")?, length_size)?;
    r.skip(pad(ds_size) - ds_size, "attribute dataspace padding")?;

    let raw = r.take(disk.bytes_for(dataspace.num_elements())?, "attribute data")?;
    Ok((
        name,
        StoredAttribute {
            datatype: disk.datatype,
            dataspace,
            data: disk.normalize(raw),
        },
    ))
}

// ---------------------------------------------------------------------------
// Data layout and fill value
// ---------------------------------------------------------------------------

const LAYOUT_VERSION: u8 = 3;
const LAYOUT_COMPACT: u8 = 0;
const LAYOUT_CONTIGUOUS: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Layout<'a> {
    Compact(&'a [u8]),
    Contiguous { address: u64, size: u64 },
}

pub(crate) fn encode_contiguous_layout(address: u64, size: u64, buf: &mut Vec<u8>) {
    buf.push(LAYOUT_VERSION);
    buf.push(LAYOUT_CONTIGUOUS);
    buf.extend_from_slice(&address.to_le_bytes());
    buf.extend_from_slice(&size.to_le_bytes());
}

pub(crate) fn decode_layout(data: &[u8], offset_size: u8, length_size: u8) -> Result<Layout<'_>> {
    let mut r = Reader::new(data);
    let version = r.u8("layout version")?;
    if version != 3 && version != 4 {
        return Err(StoreError::Unsupported(format!("data layout version {version}")));
    }
    match r.u8("layout class")? {
        LAYOUT_COMPACT => {
            let size = r.u16("compact size")? as usize;
            Ok(Layout::Compact(r.take(size, "compact data")?))
        }
        LAYOUT_CONTIGUOUS => Ok(Layout::Contiguous {
            address: r.address(offset_size, "contiguous address")?,
            size: r.uint(length_size, "contiguous size")?,
        }),
        2 => Err(StoreError::Unsupported("chunked storage".into())),
        other => Err(StoreError::Unsupported(format!("layout class {other}"))),
    }
}

/// Fill value message, allocation late, fill written only if set.
pub(crate) const FILL_VALUE_DEFAULT: [u8; 2] = [3, 0x0a];

/// The user-defined fill value, if the message holds one.
pub(crate) fn decode_fill_value(data: &[u8]) -> Result<Option<&[u8]>> {
    let mut r = Reader::new(data);
    let defined = match r.u8("fill value version")? {
        1 | 2 => {
            r.skip(2, "fill value times")?;
            r.u8("fill value defined")? != 0
        }
        3 => r.u8("fill value flags")? & 0x20 != 0,
        _ => return Ok(None),
    };
    if !defined {
        return Ok(None);
    }
    let size = r.u32("fill value size")? as usize;
    Ok(Some(r.take(size, "fill value")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_datatype_bytes() {
        let mut buf = Vec::new();
        encode_datatype(Datatype::Float64, &mut buf);
        assert_eq!(
            buf,
            [
                0x11, 0x20, 0x3f, 0x00, 8, 0, 0, 0, 0, 0, 64, 0, 52, 11, 0, 52, 0xff, 0x03, 0, 0
            ]
        );
        assert_eq!(decode_datatype(&buf).unwrap().datatype, Datatype::Float64);
    }

    #[test]
    fn integer_datatypes_keep_sign_and_width() {
        for dt in [Datatype::UInt32, Datatype::Int32, Datatype::UInt64, Datatype::Int64] {
            let mut buf = Vec::new();
            encode_datatype(dt, &mut buf);
            let disk = decode_datatype(&buf).unwrap();
            assert_eq!(disk.datatype, dt);
            assert_eq!(disk.size, dt.size());
        }
    }

    #[test]
    fn narrow_big_endian_integers_widen() {
        // 2-byte signed big-endian.
        let dt = [0x10, 0x09, 0, 0, 2, 0, 0, 0, 0, 0, 16, 0];
        let disk = decode_datatype(&dt).unwrap();
        assert_eq!(disk.datatype, Datatype::Int32);
        let out = disk.normalize(&[0xff, 0xfe, 0x01, 0x00]);
        assert_eq!(out, [(-2i32).to_le_bytes(), 256i32.to_le_bytes()].concat());
    }

    #[test]
    fn single_precision_widens() {
        let dt = [0x11, 0x20, 31, 0, 4, 0, 0, 0, 0, 0, 32, 0, 23, 8, 0, 23, 127, 0, 0, 0];
        let disk = decode_datatype(&dt).unwrap();
        assert_eq!(disk.datatype, Datatype::Float64);
        assert_eq!(disk.normalize(&1.5f32.to_le_bytes()), 1.5f64.to_le_bytes());
    }

    #[test]
    fn variable_length_is_unsupported() {
        let dt = [0x19, 0x01, 0, 0, 16, 0, 0, 0];
        assert!(matches!(decode_datatype(&dt), Err(StoreError::Unsupported(_))));
    }

    #[test]
    fn dataspace_versions() {
        let mut buf = Vec::new();
        encode_dataspace(&Dataspace::simple(&[3, 4]), &mut buf);
        assert_eq!(decode_dataspace(&buf, 8).unwrap(), Dataspace::simple(&[3, 4]));

        let v1_scalar = [1, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(decode_dataspace(&v1_scalar, 8).unwrap(), Dataspace::scalar());

        let mut null = Vec::new();
        encode_dataspace(&Dataspace::null(), &mut null);
        assert_eq!(decode_dataspace(&null, 8).unwrap(), Dataspace::null());
    }

    #[test]
    fn soft_and_hard_links() {
        let mut buf = Vec::new();
        encode_link("latest", &LinkTarget::Soft("/a/b".into()), &mut buf);
        assert_eq!(buf[1] & LINK_HAS_TYPE, LINK_HAS_TYPE);
        assert_eq!(
            decode_link(&buf, 8).unwrap(),
            ("latest".to_string(), LinkTarget::Soft("/a/b".into()))
        );

        let mut buf = Vec::new();
        encode_link("x", &LinkTarget::Hard(0x30), &mut buf);
        assert_eq!(buf, [1, 0, 1, b'x', 0x30, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode_link(&buf, 8).unwrap().1, LinkTarget::Hard(0x30));
    }

    #[test]
    fn version_one_attribute_is_padded() {
        // name "ab\0" padded to 8, 4-byte unsigned datatype padded to 16,
        // scalar v1 dataspace of 8 bytes, one element.
        let mut msg = vec![1, 0, 3, 0, 12, 0, 8, 0];
        msg.extend_from_slice(b"ab\0\0\0\0\0\0");
        msg.extend_from_slice(&[0x10, 0, 0, 0, 4, 0, 0, 0, 0, 0, 32, 0, 0, 0, 0, 0]);
        msg.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);
        msg.extend_from_slice(&7u32.to_le_bytes());
        let (name, attr) = decode_attribute(&msg, 8).unwrap();
        assert_eq!(name, "ab");
        assert_eq!(attr.datatype, Datatype::UInt32);
        assert_eq!(attr.dataspace, Dataspace::scalar());
        assert_eq!(attr.data, 7u32.to_le_bytes());
    }

    #[test]
    fn chunked_layout_is_unsupported() {
        let msg = [3, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0];
        assert!(matches!(decode_layout(&msg, 8, 8), Err(StoreError::Unsupported(_))));
        let mut contiguous = Vec::new();
        encode_contiguous_layout(UNDEF, 0, &mut contiguous);
        assert_eq!(
            decode_layout(&contiguous, 8, 8).unwrap(),
            Layout::Contiguous { address: UNDEF, size: 0 }
        );
    }

    #[test]
    fn fill_value_defined_only_when_flagged() {
        assert_eq!(decode_fill_value(&FILL_VALUE_DEFAULT).unwrap(), None);
        let defined = [3, 0x2a, 4, 0, 0, 0, 1, 2, 3, 4];
        assert_eq!(decode_fill_value(&defined).unwrap(), Some(&[1u8, 2, 3, 4][..]));
    }
}
