//! Loading an HDF5 file image into an object arena.
//!
//! Objects are loaded depth-first from the root object header. An object
//! reached through several hard links, or through a cycle, is loaded once
//! and shared.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, trace, warn};

use super::message::{self, DiskType, Layout, LinkTarget};
use super::{utf8, Reader, SIGNATURE, UNDEF};
use crate::checksum::lookup3;
use crate::dataspace::Dataspace;
use crate::error::{Result, StoreError};
use crate::file::{Link, Object, ObjectId, ObjectKind};
use crate::props::FileAccessProps;

const MAX_DEPTH: usize = 256;
const MAX_CONTINUATIONS: usize = 4096;
/// Symbol table entry cache type holding a soft link.
const CACHE_SOFT_LINK: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Superblock {
    version: u8,
    offset_size: u8,
    length_size: u8,
    base: u64,
    root: u64,
}

pub(crate) fn decode(bytes: &[u8], props: &FileAccessProps) -> Result<Vec<Object>> {
    let sb = find_superblock(bytes, props.verify_checksum)?;
    let mut loader = Loader {
        bytes,
        sb,
        verify: props.verify_checksum,
        writable: !props.read_only,
        objects: Vec::new(),
        seen: HashMap::new(),
    };
    let root = loader.load(sb.root, 0)?;
    if !matches!(loader.objects[root.index()].kind, ObjectKind::Group { .. }) {
        return Err(StoreError::Corrupt("root object is not a group"));
    }
    debug!(
        superblock = sb.version,
        objects = loader.objects.len(),
        "decoded file image"
    );
    Ok(loader.objects)
}

/// The superblock sits at offset 0 or at a power of two from 512 on.
fn find_superblock(bytes: &[u8], verify: bool) -> Result<Superblock> {
    let mut offset = 0usize;
    while offset + SIGNATURE.len() <= bytes.len() {
        if bytes[offset..offset + SIGNATURE.len()] == SIGNATURE {
            return parse_superblock(bytes, offset, verify);
        }
        offset = if offset == 0 { 512 } else { offset * 2 };
    }
    Err(StoreError::BadMagic)
}

fn parse_superblock(bytes: &[u8], start: usize, verify: bool) -> Result<Superblock> {
    let mut r = Reader::at(bytes, start + SIGNATURE.len());
    let version = r.u8("superblock version")?;
    let (offset_size, length_size, base, root) = match version {
        0 | 1 => {
            r.skip(4, "superblock component versions")?;
            let offset_size = r.u8("offset size")?;
            let length_size = r.u8("length size")?;
            check_widths(offset_size, length_size)?;
            r.skip(9, "superblock tree parameters")?;
            if version == 1 {
                r.skip(4, "indexed storage parameter")?;
            }
            let base = r.uint(offset_size, "base address")?;
            r.skip(3 * offset_size as usize, "superblock addresses")?;
            r.skip(offset_size as usize, "root link name offset")?;
            let root = r.address(offset_size, "root object header address")?;
            (offset_size, length_size, base, root)
        }
        2 | 3 => {
            let offset_size = r.u8("offset size")?;
            let length_size = r.u8("length size")?;
            check_widths(offset_size, length_size)?;
            r.skip(1, "consistency flags")?;
            let base = r.uint(offset_size, "base address")?;
            r.skip(2 * offset_size as usize, "superblock addresses")?;
            let root = r.address(offset_size, "root object header address")?;
            let end = r.position();
            let stored = r.u32("superblock checksum")?;
            if verify {
                let computed = lookup3(&bytes[start..end]);
                if computed != stored {
                    return Err(StoreError::ChecksumMismatch {
                        expected: stored,
                        computed,
                    });
                }
            }
            (offset_size, length_size, base, root)
        }
        other => return Err(StoreError::UnsupportedVersion(other)),
    };
    if root == UNDEF {
        return Err(StoreError::Corrupt("superblock has no root group"));
    }
    Ok(Superblock {
        version,
        offset_size,
        length_size,
        base,
        root,
    })
}

fn check_widths(offset_size: u8, length_size: u8) -> Result<()> {
    let ok = |w: u8| matches!(w, 2 | 4 | 8);
    if !ok(offset_size) || !ok(length_size) {
        return Err(StoreError::Corrupt("invalid offset or length size"));
    }
    Ok(())
}

/// One header message, borrowed from the file image.
#[derive(Debug, Clone, Copy)]
struct Message<'a> {
    kind: u16,
    flags: u8,
    data: &'a [u8],
}

struct SymbolEntry<'a> {
    name_offset: u64,
    header: u64,
    cache_type: u32,
    scratch: &'a [u8],
}

struct Loader<'a> {
    bytes: &'a [u8],
    sb: Superblock,
    verify: bool,
    writable: bool,
    objects: Vec<Object>,
    seen: HashMap<u64, ObjectId>,
}

impl<'a> Loader<'a> {
    /// Byte offset of a file address.
    fn position(&self, addr: u64) -> Result<usize> {
        if addr == UNDEF {
            return Err(StoreError::Corrupt("undefined address"));
        }
        self.sb
            .base
            .checked_add(addr)
            .and_then(|a| usize::try_from(a).ok())
            .filter(|&a| a < self.bytes.len())
            .ok_or(StoreError::Truncated("address beyond end of file"))
    }

    fn verify_checksum(&self, covered: &[u8], stored: u32) -> Result<()> {
        if !self.verify {
            return Ok(());
        }
        let computed = lookup3(covered);
        if computed != stored {
            return Err(StoreError::ChecksumMismatch {
                expected: stored,
                computed,
            });
        }
        Ok(())
    }

    fn load(&mut self, addr: u64, depth: usize) -> Result<ObjectId> {
        if let Some(&id) = self.seen.get(&addr) {
            return Ok(id);
        }
        if depth > MAX_DEPTH {
            return Err(StoreError::Corrupt("group nesting too deep"));
        }
        let id = ObjectId::from_index(self.objects.len());
        self.objects.push(Object::empty_group());
        self.seen.insert(addr, id);

        let messages = self.header_messages(addr)?;
        let object = self.build(addr, &messages, depth)?;
        trace!(address = addr, attributes = object.attrs.len(), "loaded object");
        self.objects[id.index()] = object;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Object headers
    // -----------------------------------------------------------------------

    fn header_messages(&self, addr: u64) -> Result<Vec<Message<'a>>> {
        let bytes: &'a [u8] = self.bytes;
        let start = self.position(addr)?;
        let mut out = Vec::new();
        let mut continuations = VecDeque::new();

        let version2 = bytes[start..].starts_with(b"OHDR");
        let mut creation_order = false;
        if version2 {
            let mut r = Reader::at(bytes, start + 4);
            if r.u8("object header version")? != 2 {
                return Err(StoreError::Corrupt("invalid object header version"));
            }
            let flags = r.u8("object header flags")?;
            creation_order = flags & 0x04 != 0;
            if flags & 0x20 != 0 {
                r.skip(16, "object header times")?;
            }
            if flags & 0x10 != 0 {
                r.skip(4, "attribute phase change")?;
            }
            let size = r.uint(1 << (flags & 0x03), "object header chunk size")?;
            let chunk = r.take(to_usize(size)?, "object header chunk")?;
            let end = r.position();
            let stored = r.u32("object header checksum")?;
            self.verify_checksum(&bytes[start..end], stored)?;
            self.v2_messages(chunk, creation_order, &mut out, &mut continuations)?;
        } else {
            let mut r = Reader::at(bytes, start);
            if r.u8("object header version")? != 1 {
                return Err(StoreError::Corrupt("invalid object header version"));
            }
            r.skip(1, "object header reserved")?;
            r.skip(2, "object header message count")?;
            r.skip(4, "object reference count")?;
            let size = r.u32("object header size")?;
            r.skip(4, "object header padding")?;
            let chunk = r.take(size as usize, "object header messages")?;
            self.v1_messages(chunk, &mut out, &mut continuations)?;
        }

        let mut followed = 0;
        while let Some((caddr, clen)) = continuations.pop_front() {
            followed += 1;
            if followed > MAX_CONTINUATIONS {
                return Err(StoreError::Corrupt("too many continuation blocks"));
            }
            let block = Reader::at(bytes, self.position(caddr)?)
                .take(to_usize(clen)?, "continuation block")?;
            if version2 {
                if block.len() < 8 || !block.starts_with(b"OCHK") {
                    return Err(StoreError::Corrupt("continuation block signature"));
                }
                let (body, tail) = block.split_at(block.len() - 4);
                let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
                self.verify_checksum(body, stored)?;
                self.v2_messages(&body[4..], creation_order, &mut out, &mut continuations)?;
            } else {
                self.v1_messages(block, &mut out, &mut continuations)?;
            }
        }
        Ok(out)
    }

    fn v2_messages(
        &self,
        chunk: &'a [u8],
        creation_order: bool,
        out: &mut Vec<Message<'a>>,
        continuations: &mut VecDeque<(u64, u64)>,
    ) -> Result<()> {
        let prefix = if creation_order { 6 } else { 4 };
        let mut r = Reader::new(chunk);
        // Anything shorter than a message prefix at the end is a gap.
        while r.remaining() >= prefix {
            let kind = u16::from(r.u8("message type")?);
            let size = r.u16("message size")? as usize;
            let flags = r.u8("message flags")?;
            if creation_order {
                r.skip(2, "message creation order")?;
            }
            let data = r.take(size, "message body")?;
            self.accept(Message { kind, flags, data }, out, continuations)?;
        }
        Ok(())
    }

    fn v1_messages(
        &self,
        chunk: &'a [u8],
        out: &mut Vec<Message<'a>>,
        continuations: &mut VecDeque<(u64, u64)>,
    ) -> Result<()> {
        let mut r = Reader::new(chunk);
        while r.remaining() >= 8 {
            let kind = r.u16("message type")?;
            let size = r.u16("message size")? as usize;
            let flags = r.u8("message flags")?;
            r.skip(3, "message reserved")?;
            let data = r.take(size, "message body")?;
            self.accept(Message { kind, flags, data }, out, continuations)?;
        }
        Ok(())
    }

    fn accept(
        &self,
        m: Message<'a>,
        out: &mut Vec<Message<'a>>,
        continuations: &mut VecDeque<(u64, u64)>,
    ) -> Result<()> {
        match m.kind {
            message::NIL => {}
            message::CONTINUATION => continuations.push_back(message::decode_continuation(
                m.data,
                self.sb.offset_size,
                self.sb.length_size,
            )?),
            kind if !message::is_known(kind) => {
                // Bit 7: always fail if unknown. Bit 3: fail if unknown and writable.
                if m.flags & 0x80 != 0 || (m.flags & 0x08 != 0 && self.writable) {
                    return Err(StoreError::Unsupported(format!("header message type {kind:#06x}")));
                }
                trace!(kind, "skipping unknown header message");
            }
            _ => out.push(m),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    fn build(&mut self, addr: u64, messages: &[Message<'a>], depth: usize) -> Result<Object> {
        let (os, ls) = (self.sb.offset_size, self.sb.length_size);
        let mut attrs = BTreeMap::new();
        let mut disk = None;
        let mut dataspace = None;
        let mut layout = None;
        let mut fill = None;
        let mut group = false;
        let mut links = Vec::new();
        let mut symbol_table = None;

        for m in messages {
            match m.kind {
                message::DATATYPE => {
                    if m.flags & message::FLAG_SHARED != 0 {
                        return Err(StoreError::Unsupported("committed datatype".into()));
                    }
                    disk = Some(message::decode_datatype(m.data)?);
                }
                message::DATASPACE => dataspace = Some(message::decode_dataspace(m.data, ls)?),
                message::LAYOUT => layout = Some(message::decode_layout(m.data, os, ls)?),
                message::FILL_VALUE => fill = message::decode_fill_value(m.data)?,
                message::ATTRIBUTE => {
                    if m.flags & message::FLAG_SHARED != 0 {
                        return Err(StoreError::Unsupported("shared attribute".into()));
                    }
                    let (name, attr) = message::decode_attribute(m.data, ls)?;
                    attrs.insert(name, attr);
                }
                message::ATTRIBUTE_INFO => {
                    if message::decode_attribute_info_is_dense(m.data, os)? {
                        return Err(StoreError::Unsupported("dense attribute storage".into()));
                    }
                }
                message::LINK_INFO => {
                    group = true;
                    if message::decode_link_info_is_dense(m.data, os)? {
                        return Err(StoreError::Unsupported("dense link storage".into()));
                    }
                }
                message::LINK => {
                    group = true;
                    links.push(message::decode_link(m.data, os)?);
                }
                message::SYMBOL_TABLE => {
                    group = true;
                    symbol_table = Some(message::decode_symbol_table(m.data, os)?);
                }
                _ => {}
            }
        }

        let kind = if let Some(layout) = layout {
            let disk = disk.ok_or(StoreError::Corrupt("dataset without a datatype"))?;
            let dataspace = dataspace.ok_or(StoreError::Corrupt("dataset without a dataspace"))?;
            let data = self.dataset_data(&disk, &dataspace, &layout, fill)?;
            ObjectKind::Dataset {
                datatype: disk.datatype,
                dataspace,
                data,
            }
        } else if group {
            let mut table = BTreeMap::new();
            for (name, target) in links {
                let link = match target {
                    LinkTarget::Hard(child) => Link::Hard(self.load(child, depth + 1)?),
                    LinkTarget::Soft(path) => Link::Soft(path),
                    LinkTarget::Other(kind) => {
                        warn!(link = %name, kind, "skipping external or user-defined link");
                        continue;
                    }
                };
                table.insert(name, link);
            }
            if let Some((btree, heap)) = symbol_table {
                self.symbol_table_links(btree, heap, depth, &mut table)?;
            }
            ObjectKind::Group { links: table }
        } else {
            return Err(StoreError::Unsupported(format!(
                "object at {addr:#x} is neither a group nor a dataset"
            )));
        };
        Ok(Object { kind, attrs })
    }

    fn dataset_data(
        &self,
        disk: &DiskType,
        dataspace: &Dataspace,
        layout: &Layout<'a>,
        fill: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let count = dataspace.num_elements();
        let needed = disk.bytes_for(count)?;
        if needed == 0 {
            return Ok(Vec::new());
        }
        let raw: &[u8] = match *layout {
            Layout::Compact(data) => data,
            Layout::Contiguous { address: UNDEF, .. } => {
                // Never written: every element holds the fill value.
                let element = match fill {
                    Some(v) if v.len() == disk.size => v.to_vec(),
                    _ => vec![0; disk.size],
                };
                return Ok(disk.normalize(&element.repeat(to_usize(count)?)));
            }
            Layout::Contiguous { address, size } => Reader::at(self.bytes, self.position(address)?)
                .take(to_usize(size)?, "contiguous data")?,
        };
        if raw.len() < needed {
            return Err(StoreError::Truncated("dataset data"));
        }
        Ok(disk.normalize(&raw[..needed]))
    }

    // -----------------------------------------------------------------------
    // Symbol-table groups
    // -----------------------------------------------------------------------

    fn symbol_table_links(
        &mut self,
        btree: u64,
        heap: u64,
        depth: usize,
        table: &mut BTreeMap<String, Link>,
    ) -> Result<()> {
        let heap = self.local_heap(heap)?;
        let mut nodes = Vec::new();
        self.collect_symbol_nodes(btree, 0, &mut nodes)?;
        for node in nodes {
            for entry in self.symbol_node_entries(node)? {
                let name = utf8(Reader::at(heap, to_usize(entry.name_offset)?).c_string("link name")?)?;
                let link = if entry.cache_type == CACHE_SOFT_LINK {
                    let s = entry.scratch;
                    let value = u32::from_le_bytes([s[0], s[1], s[2], s[3]]) as usize;
                    Link::Soft(utf8(Reader::at(heap, value).c_string("soft link value")?)?)
                } else {
                    Link::Hard(self.load(entry.header, depth + 1)?)
                };
                table.insert(name, link);
            }
        }
        Ok(())
    }

    /// The data segment of a local heap.
    fn local_heap(&self, addr: u64) -> Result<&'a [u8]> {
        let (os, ls) = (self.sb.offset_size, self.sb.length_size);
        let mut r = Reader::at(self.bytes, self.position(addr)?);
        if r.take(4, "local heap signature")? != b"HEAP" {
            return Err(StoreError::Corrupt("local heap signature"));
        }
        r.skip(4, "local heap version")?;
        let size = r.uint(ls, "local heap size")?;
        r.skip(ls as usize, "local heap free list")?;
        let data = r.address(os, "local heap data address")?;
        Reader::at(self.bytes, self.position(data)?).take(to_usize(size)?, "local heap data")
    }

    /// Leaf children (symbol table nodes) of a group B-tree.
    fn collect_symbol_nodes(&self, addr: u64, depth: usize, out: &mut Vec<u64>) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(StoreError::Corrupt("group b-tree too deep"));
        }
        let (os, ls) = (self.sb.offset_size, self.sb.length_size);
        let mut r = Reader::at(self.bytes, self.position(addr)?);
        if r.take(4, "b-tree signature")? != b"TREE" {
            return Err(StoreError::Corrupt("b-tree signature"));
        }
        if r.u8("b-tree node type")? != 0 {
            return Err(StoreError::Corrupt("b-tree does not index a group"));
        }
        let level = r.u8("b-tree level")?;
        let entries = r.u16("b-tree entries")?;
        r.skip(2 * os as usize, "b-tree siblings")?;
        for _ in 0..entries {
            r.skip(ls as usize, "b-tree key")?;
            let child = r.address(os, "b-tree child")?;
            if level == 0 {
                out.push(child);
            } else {
                self.collect_symbol_nodes(child, depth + 1, out)?;
            }
        }
        Ok(())
    }

    fn symbol_node_entries(&self, addr: u64) -> Result<Vec<SymbolEntry<'a>>> {
        let os = self.sb.offset_size;
        let mut r = Reader::at(self.bytes, self.position(addr)?);
        if r.take(4, "symbol node signature")? != b"SNOD" {
            return Err(StoreError::Corrupt("symbol node signature"));
        }
        r.skip(2, "symbol node version")?;
        let count = r.u16("symbol count")?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_offset = r.uint(os, "symbol name offset")?;
            let header = r.address(os, "symbol object header")?;
            let cache_type = r.u32("symbol cache type")?;
            r.skip(4, "symbol reserved")?;
            let scratch = r.take(16, "symbol scratch pad")?;
            entries.push(SymbolEntry {
                name_offset,
                header,
                cache_type,
                scratch,
            });
        }
        Ok(entries)
    }
}

fn to_usize(n: u64) -> Result<usize> {
    usize::try_from(n).map_err(|_| StoreError::Corrupt("length does not fit in memory"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
