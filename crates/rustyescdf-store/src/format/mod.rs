//! HDF5 file images.
//!
//! [`encode`] writes a version 2 superblock followed by one version 2 object
//! header per reachable object and then the raw dataset bytes. Groups use
//! compact link storage, attributes live in their object's header, and
//! datasets use contiguous storage. Every metadata block carries a lookup3
//! checksum.
//!
//! [`decode`] reads that layout back, and also what older HDF5 libraries
//! write by default: version 0 and 1 superblocks, version 1 object headers
//! with continuation blocks, and groups indexed by a symbol table. Dense
//! link or attribute storage, chunked layouts and variable-length types are
//! reported as [`StoreError::Unsupported`].

mod message;
mod reader;
mod writer;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, StoreError};

pub(crate) use reader::decode;
pub(crate) use writer::{check_attribute, encode};

/// File signature at the start of the superblock.
pub(crate) const SIGNATURE: [u8; 8] = *b"\x89HDF\r\n\x1a\n";

/// The undefined address.
pub(crate) const UNDEF: u64 = u64::MAX;

/// Address and length width of the images this crate writes.
pub(crate) const OFFSET_SIZE: u8 = 8;
pub(crate) const LENGTH_SIZE: u8 = 8;

/// Bounds-checked little-endian reads over a byte slice.
#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(StoreError::Truncated(what));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize, what: &'static str) -> Result<()> {
        self.take(len, what).map(|_| ())
    }

    pub fn u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn u16(&mut self, what: &'static str) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2, what)?))
    }

    pub fn u32(&mut self, what: &'static str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4, what)?))
    }

    /// An unsigned integer `width` bytes wide (1 to 8).
    pub fn uint(&mut self, width: u8, what: &'static str) -> Result<u64> {
        if !(1..=8).contains(&width) {
            return Err(StoreError::Corrupt("field width outside 1..=8 bytes"));
        }
        Ok(LittleEndian::read_uint(self.take(width as usize, what)?, width as usize))
    }

    /// A file address; the all-ones pattern of any width reads as [`UNDEF`].
    pub fn address(&mut self, width: u8, what: &'static str) -> Result<u64> {
        let raw = self.uint(width, what)?;
        let all_ones = u64::MAX >> (64 - 8 * u32::from(width));
        Ok(if raw == all_ones { UNDEF } else { raw })
    }

    /// A NUL-terminated string, consuming the terminator.
    pub fn c_string(&mut self, what: &'static str) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(StoreError::Truncated(what))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }
}

/// Decode a name stored in the file.
pub(crate) fn utf8(raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_vec()).map_err(|_| StoreError::Corrupt("name is not UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_bounds() {
        let mut r = Reader::new(&[1, 2, 0, 0xff]);
        assert_eq!(r.u8("a").unwrap(), 1);
        assert_eq!(r.u16("b").unwrap(), 2);
        assert!(matches!(r.u16("c"), Err(StoreError::Truncated("c"))));
        assert_eq!(r.position(), 3);
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn undefined_addresses_of_any_width() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0x10, 0, 0, 0];
        let mut r = Reader::new(&bytes);
        assert_eq!(r.address(4, "a").unwrap(), UNDEF);
        assert_eq!(r.address(4, "b").unwrap(), 0x10);
    }

    #[test]
    fn c_strings() {
        let mut r = Reader::new(b"ab\0c");
        assert_eq!(r.c_string("s").unwrap(), b"ab");
        assert!(r.c_string("t").is_err());
    }
}
