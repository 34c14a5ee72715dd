//! Metadata checksum: Jenkins lookup3 `hashlittle` with an initial value of 0.
//!
//! HDF5 uses it for the superblock, object headers and continuation blocks.

use byteorder::{ByteOrder, LittleEndian};

/// Compute the lookup3 checksum of a byte slice.
pub fn lookup3(data: &[u8]) -> u32 {
    let seed = 0xdead_beef_u32.wrapping_add(data.len() as u32);
    let (mut a, mut b, mut c) = (seed, seed, seed);

    let mut rest = data;
    while rest.len() > 12 {
        let (block, tail) = rest.split_at(12);
        add_block(block, &mut a, &mut b, &mut c);
        mix(&mut a, &mut b, &mut c);
        rest = tail;
    }
    if rest.is_empty() {
        return c;
    }

    // Missing tail bytes read as zero, which matches the byte-wise tail switch.
    let mut last = [0u8; 12];
    last[..rest.len()].copy_from_slice(rest);
    add_block(&last, &mut a, &mut b, &mut c);
    final_mix(&mut a, &mut b, &mut c);
    c
}

fn add_block(block: &[u8], a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_add(LittleEndian::read_u32(&block[0..4]));
    *b = b.wrapping_add(LittleEndian::read_u32(&block[4..8]));
    *c = c.wrapping_add(LittleEndian::read_u32(&block[8..12]));
}

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c) ^ c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a) ^ a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b) ^ b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c) ^ c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a) ^ a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b) ^ b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(14));
    *a = (*a ^ *c).wrapping_sub(c.rotate_left(11));
    *b = (*b ^ *a).wrapping_sub(a.rotate_left(25));
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(16));
    *a = (*a ^ *c).wrapping_sub(c.rotate_left(4));
    *b = (*b ^ *a).wrapping_sub(a.rotate_left(14));
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(24));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(lookup3(b""), 0xdead_beef);
    }

    #[test]
    fn reference_vector() {
        assert_eq!(lookup3(b"Four score and seven years ago"), 0x1777_0551);
    }

    #[test]
    fn detects_single_bit_flip() {
        let mut data = b"group/attribute payload".to_vec();
        let before = lookup3(&data);
        data[5] ^= 0x01;
        assert_ne!(lookup3(&data), before);
    }
}
