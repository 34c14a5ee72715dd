//! Laying out an object arena as an HDF5 file image.
//!
//! Layout: superblock, then the object headers of every object reachable
//! from the root in breadth-first order, then the contiguous data of each
//! non-empty dataset in the same order. Addresses are assigned in a sizing
//! pass before the real bytes are written; header sizes never depend on
//! the address values.

use std::collections::VecDeque;

use super::message::{self, LinkTarget};
use super::{LENGTH_SIZE, OFFSET_SIZE, SIGNATURE, UNDEF};
use crate::checksum::lookup3;
use crate::error::{Result, StoreError};
use crate::file::{Link, Object, ObjectId, ObjectKind, StoredAttribute};

const SUPERBLOCK_VERSION: u8 = 2;
pub(crate) const SUPERBLOCK_SIZE: u64 = 48;
const OHDR: &[u8; 4] = b"OHDR";
const OBJECT_HEADER_VERSION: u8 = 2;
/// Type, size and flags in front of every version 2 message body.
const MESSAGE_PREFIX: usize = 4;

pub(crate) fn encode(objects: &[Object]) -> Result<Vec<u8>> {
    let order = reachable(objects);

    let zeros = vec![0u64; objects.len()];
    let mut header_addrs = vec![UNDEF; objects.len()];
    let mut cursor = SUPERBLOCK_SIZE;
    for &id in &order {
        header_addrs[id.index()] = cursor;
        cursor += object_header(&objects[id.index()], &zeros, 0)?.len() as u64;
    }
    let mut data_addrs = vec![UNDEF; objects.len()];
    for &id in &order {
        let len = dataset_bytes(&objects[id.index()]).len() as u64;
        if len > 0 {
            data_addrs[id.index()] = cursor;
            cursor += len;
        }
    }
    let eof = cursor;

    let mut buf = Vec::with_capacity(eof as usize);
    superblock(header_addrs[0], eof, &mut buf);
    for &id in &order {
        buf.extend_from_slice(&object_header(
            &objects[id.index()],
            &header_addrs,
            data_addrs[id.index()],
        )?);
    }
    for &id in &order {
        buf.extend_from_slice(dataset_bytes(&objects[id.index()]));
    }
    if buf.len() as u64 != eof {
        return Err(StoreError::Corrupt("file image size differs from its layout"));
    }
    Ok(buf)
}

/// Fail if the attribute cannot be stored in its object's header.
pub(crate) fn check_attribute(name: &str, attr: &StoredAttribute) -> Result<()> {
    let mut body = Vec::new();
    message::encode_attribute(name, attr, &mut body);
    check_message_size(name, &body)
}

fn check_message_size(name: &str, body: &[u8]) -> Result<()> {
    if body.len() > u16::MAX as usize {
        return Err(StoreError::MessageTooLarge {
            name: name.to_string(),
            size: body.len(),
        });
    }
    Ok(())
}

/// Objects reachable from the root through hard links, each listed once.
fn reachable(objects: &[Object]) -> Vec<ObjectId> {
    let mut seen = vec![false; objects.len()];
    let mut order = Vec::new();
    let mut queue = VecDeque::from([ObjectId::from_index(0)]);
    seen[0] = true;
    while let Some(id) = queue.pop_front() {
        order.push(id);
        if let ObjectKind::Group { links } = &objects[id.index()].kind {
            for link in links.values() {
                if let Link::Hard(child) = link {
                    if !seen[child.index()] {
                        seen[child.index()] = true;
                        queue.push_back(*child);
                    }
                }
            }
        }
    }
    order
}

fn dataset_bytes(object: &Object) -> &[u8] {
    match &object.kind {
        ObjectKind::Dataset { data, .. } => data,
        ObjectKind::Group { .. } => &[],
    }
}

fn superblock(root: u64, eof: u64, buf: &mut Vec<u8>) {
    let start = buf.len();
    buf.extend_from_slice(&SIGNATURE);
    buf.push(SUPERBLOCK_VERSION);
    buf.push(OFFSET_SIZE);
    buf.push(LENGTH_SIZE);
    buf.push(0);
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&UNDEF.to_le_bytes());
    buf.extend_from_slice(&eof.to_le_bytes());
    buf.extend_from_slice(&root.to_le_bytes());
    let checksum = lookup3(&buf[start..]);
    buf.extend_from_slice(&checksum.to_le_bytes());
}

/// Message bodies of one object header.
#[derive(Default)]
struct HeaderBuilder {
    messages: Vec<u8>,
}

impl HeaderBuilder {
    fn push(&mut self, kind: u16, flags: u8, name: &str, body: &[u8]) -> Result<()> {
        check_message_size(name, body)?;
        self.messages.push(kind as u8);
        self.messages.extend_from_slice(&(body.len() as u16).to_le_bytes());
        self.messages.push(flags);
        self.messages.extend_from_slice(body);
        Ok(())
    }

    fn finish(self) -> Vec<u8> {
        let size = self.messages.len();
        let (width_flag, width) = match size {
            0..=0xff => (0u8, 1usize),
            0x100..=0xffff => (1, 2),
            _ => (2, 4),
        };
        let mut buf = Vec::with_capacity(6 + width + size + 4);
        buf.extend_from_slice(OHDR);
        buf.push(OBJECT_HEADER_VERSION);
        buf.push(width_flag);
        buf.extend_from_slice(&(size as u64).to_le_bytes()[..width]);
        buf.extend_from_slice(&self.messages);
        let checksum = lookup3(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }
}

fn object_header(object: &Object, header_addrs: &[u64], data_addr: u64) -> Result<Vec<u8>> {
    let mut h = HeaderBuilder::default();
    let mut body = Vec::new();
    match &object.kind {
        ObjectKind::Group { links } => {
            // Compact storage: no fractal heap, no name index.
            body.extend_from_slice(&[0, 0]);
            body.extend_from_slice(&UNDEF.to_le_bytes());
            body.extend_from_slice(&UNDEF.to_le_bytes());
            h.push(message::LINK_INFO, 0, "link info", &body)?;
            h.push(message::GROUP_INFO, 0, "group info", &[0, 0])?;
            for (name, link) in links {
                let target = match link {
                    Link::Hard(child) => LinkTarget::Hard(header_addrs[child.index()]),
                    Link::Soft(path) => LinkTarget::Soft(path.clone()),
                };
                body.clear();
                message::encode_link(name, &target, &mut body);
                h.push(message::LINK, 0, name, &body)?;
            }
        }
        ObjectKind::Dataset {
            datatype,
            dataspace,
            data,
        } => {
            message::encode_datatype(*datatype, &mut body);
            h.push(message::DATATYPE, message::FLAG_CONSTANT, "datatype", &body)?;
            body.clear();
            message::encode_dataspace(dataspace, &mut body);
            h.push(message::DATASPACE, 0, "dataspace", &body)?;
            h.push(
                message::FILL_VALUE,
                message::FLAG_CONSTANT,
                "fill value",
                &message::FILL_VALUE_DEFAULT,
            )?;
            body.clear();
            message::encode_contiguous_layout(data_addr, data.len() as u64, &mut body);
            h.push(message::LAYOUT, 0, "layout", &body)?;
        }
    }
    for (name, attr) in &object.attrs {
        body.clear();
        message::encode_attribute(name, attr, &mut body);
        h.push(message::ATTRIBUTE, 0, name, &body)?;
    }
    Ok(h.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataspace::Dataspace;
    use crate::datatype::Datatype;

    #[test]
    fn empty_root_layout() {
        let bytes = encode(&[Object::empty_group()]).unwrap();
        assert_eq!(&bytes[..8], &SIGNATURE);
        assert_eq!(bytes[8], SUPERBLOCK_VERSION);
        // Root header right after the superblock.
        assert_eq!(u64::from_le_bytes(bytes[36..44].try_into().unwrap()), SUPERBLOCK_SIZE);
        assert_eq!(&bytes[48..52], OHDR);
        // End-of-file address matches the image length.
        assert_eq!(
            u64::from_le_bytes(bytes[28..36].try_into().unwrap()),
            bytes.len() as u64
        );
        let stored = u32::from_le_bytes(bytes[44..48].try_into().unwrap());
        assert_eq!(stored, lookup3(&bytes[..44]));
    }

    #[test]
    fn long_headers_use_wider_size_field() {
        let mut h = HeaderBuilder::default();
        h.push(message::COMMENT, 0, "comment", &[b'x'; 300]).unwrap();
        let bytes = h.finish();
        assert_eq!(bytes[5], 1);
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 304);
        assert_eq!(bytes.len(), 6 + 2 + 304 + 4);
    }

    #[test]
    fn oversized_attribute_is_rejected() {
        let attr = StoredAttribute {
            datatype: Datatype::Float64,
            dataspace: Dataspace::simple(&[10_000]),
            data: vec![0; 80_000],
        };
        assert!(matches!(
            check_attribute("big", &attr),
            Err(StoreError::MessageTooLarge { .. })
        ));
    }
}
