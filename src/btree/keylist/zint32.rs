//! Zint32 block key list: `u32` keys partitioned into blocks
//! of at most 129 entries, each block delta-encoded from a per-block
//! `base` with a pluggable codec. Only the two codecs this core treats as
//! mandatory are implemented — scalar Varbyte and GroupVarint; other
//! named codecs (StreamVbyte, SimdComp, SimdFor, ...) are config-time
//! choices that return `NotImplemented` if ever selected (see
//! DESIGN.md).

use crate::config::Compressor;
use crate::error::{Error, Result};

pub const MAX_KEYS_PER_BLOCK: usize = 129;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zint32Codec {
    Varbyte,
    GroupVarint,
}

impl Zint32Codec {
    pub fn from_compressor(c: Compressor) -> Result<Self> {
        match c {
            Compressor::Varbyte => Ok(Zint32Codec::Varbyte),
            Compressor::GroupVarint => Ok(Zint32Codec::GroupVarint),
            other => Err(Error::NotImplemented(zint32_codec_name(other))),
        }
    }

    fn encode(&self, deltas: &[u32]) -> Vec<u8> {
        match self {
            Zint32Codec::Varbyte => varbyte_encode(deltas),
            Zint32Codec::GroupVarint => groupvarint_encode(deltas),
        }
    }

    fn decode(&self, bytes: &[u8], count: usize) -> Vec<u32> {
        match self {
            Zint32Codec::Varbyte => varbyte_decode(bytes, count),
            Zint32Codec::GroupVarint => groupvarint_decode(bytes, count),
        }
    }
}

fn zint32_codec_name(c: Compressor) -> &'static str {
    match c {
        Compressor::StreamVbyte => "streamvbyte zint32 codec",
        Compressor::For => "frame-of-reference zint32 codec",
        Compressor::SimdComp => "simdcomp zint32 codec",
        Compressor::SimdFor => "simd-for zint32 codec",
        _ => "zint32 codec",
    }
}

fn varbyte_encode(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    for &v in values {
        let mut v = v;
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
                out.push(byte);
            } else {
                out.push(byte);
                break;
            }
        }
    }
    out
}

fn varbyte_decode(bytes: &[u8], count: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(count);
    let mut pos = 0;
    while out.len() < count && pos < bytes.len() {
        let mut value = 0u32;
        let mut shift = 0;
        loop {
            let byte = bytes[pos];
            pos += 1;
            value |= ((byte & 0x7f) as u32) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        out.push(value);
    }
    out
}

fn byte_len(v: u32) -> u8 {
    if v <= 0xFF {
        1
    } else if v <= 0xFFFF {
        2
    } else if v <= 0xFF_FFFF {
        3
    } else {
        4
    }
}

/// Classic group-varint: one selector byte per 4 values (2 bits each
/// encode that value's byte length 1..4), followed by the tightly
/// packed little-endian bytes. The final group is padded with zeros.
fn groupvarint_encode(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in values.chunks(4) {
        let mut padded = [0u32; 4];
        padded[..chunk.len()].copy_from_slice(chunk);
        let mut selector = 0u8;
        for (i, &v) in padded.iter().enumerate() {
            let len = byte_len(v);
            selector |= (len - 1) << (i * 2);
        }
        out.push(selector);
        for &v in &padded {
            let len = byte_len(v) as usize;
            out.extend_from_slice(&v.to_le_bytes()[..len]);
        }
    }
    out
}

fn groupvarint_decode(bytes: &[u8], count: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(count);
    let mut pos = 0;
    while out.len() < count && pos < bytes.len() {
        let selector = bytes[pos];
        pos += 1;
        for i in 0..4 {
            if out.len() >= count {
                break;
            }
            let len = (((selector >> (i * 2)) & 0x3) + 1) as usize;
            let mut buf = [0u8; 4];
            buf[..len].copy_from_slice(&bytes[pos..pos + len]);
            pos += len;
            out.push(u32::from_le_bytes(buf));
        }
    }
    out
}

#[derive(Clone)]
struct BlockDesc {
    base: u32,
    highest: u32,
    key_count: usize,
    codec: Zint32Codec,
    /// Byte range of this block's encoded deltas within `payload`.
    payload_start: usize,
    payload_len: usize,
}

/// A Zint32 key list holding its block descriptors and encoded payload
/// as plain `Vec`s rather than a hand-packed byte range (see DESIGN.md:
/// an accepted simplification of the wire-exact descriptor table the
/// original packs inline, chosen because nothing outside this module
/// depends on the descriptor table's byte layout).
pub struct Zint32KeyList {
    blocks: Vec<BlockDesc>,
    payload: Vec<u8>,
    range_size: usize,
    default_codec: Zint32Codec,
}

impl Zint32KeyList {
    pub fn create(range_size: usize, codec: Zint32Codec) -> Self {
        Self {
            blocks: vec![BlockDesc {
                base: 0,
                highest: 0,
                key_count: 0,
                codec,
                payload_start: 0,
                payload_len: 0,
            }],
            payload: Vec::new(),
            range_size,
            default_codec: codec,
        }
    }

    pub fn range_size(&self) -> usize {
        self.range_size
    }

    fn codec_tag(codec: Zint32Codec) -> u8 {
        match codec {
            Zint32Codec::Varbyte => 0,
            Zint32Codec::GroupVarint => 1,
        }
    }

    fn codec_from_tag(tag: u8) -> Zint32Codec {
        match tag {
            1 => Zint32Codec::GroupVarint,
            _ => Zint32Codec::Varbyte,
        }
    }

    /// Serializes the block descriptor table plus payload into a
    /// `range_size`-byte buffer: `[block_count:u32][reserved:u32]`
    /// followed by one 24-byte descriptor per block, then payload bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        const DESC_SIZE: usize = 24;
        let mut out = vec![0u8; self.range_size];
        out[0..4].copy_from_slice(&(self.blocks.len() as u32).to_le_bytes());
        let header_len = 8 + self.blocks.len() * DESC_SIZE;
        for (i, b) in self.blocks.iter().enumerate() {
            let at = 8 + i * DESC_SIZE;
            out[at..at + 4].copy_from_slice(&b.base.to_le_bytes());
            out[at + 4..at + 8].copy_from_slice(&b.highest.to_le_bytes());
            out[at + 8..at + 12].copy_from_slice(&(b.key_count as u32).to_le_bytes());
            out[at + 12] = Self::codec_tag(b.codec);
            out[at + 16..at + 20].copy_from_slice(&(b.payload_start as u32).to_le_bytes());
            out[at + 20..at + 24].copy_from_slice(&(b.payload_len as u32).to_le_bytes());
        }
        let payload_end = (header_len + self.payload.len()).min(out.len());
        let copy_len = payload_end - header_len;
        out[header_len..payload_end].copy_from_slice(&self.payload[..copy_len]);
        out
    }

    pub fn from_bytes(bytes: Vec<u8>, default_codec: Zint32Codec) -> Self {
        const DESC_SIZE: usize = 24;
        let range_size = bytes.len();
        let block_count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let header_len = 8 + block_count * DESC_SIZE;
        if block_count == 0 || header_len > bytes.len() {
            return Self::create(range_size, default_codec);
        }
        let mut blocks = Vec::with_capacity(block_count);
        for i in 0..block_count {
            let at = 8 + i * DESC_SIZE;
            blocks.push(BlockDesc {
                base: u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap()),
                highest: u32::from_le_bytes(bytes[at + 4..at + 8].try_into().unwrap()),
                key_count: u32::from_le_bytes(bytes[at + 8..at + 12].try_into().unwrap()) as usize,
                codec: Self::codec_from_tag(bytes[at + 12]),
                payload_start: u32::from_le_bytes(bytes[at + 16..at + 20].try_into().unwrap()) as usize,
                payload_len: u32::from_le_bytes(bytes[at + 20..at + 24].try_into().unwrap()) as usize,
            });
        }
        let payload = bytes[header_len..].to_vec();
        Self {
            blocks,
            payload,
            range_size,
            default_codec,
        }
    }

    fn total_keys(&self) -> usize {
        self.blocks.iter().map(|b| b.key_count).sum()
    }

    fn decode_block(&self, idx: usize) -> Vec<u32> {
        let b = &self.blocks[idx];
        if b.key_count == 0 {
            return Vec::new();
        }
        let encoded = &self.payload[b.payload_start..b.payload_start + b.payload_len];
        let deltas = b.codec.decode(encoded, b.key_count - 1);
        let mut keys = Vec::with_capacity(b.key_count);
        keys.push(b.base);
        keys.extend(deltas.into_iter().map(|d| b.base + d));
        keys
    }

    fn encode_into_block(&mut self, idx: usize, keys: &[u32]) {
        let codec = self.blocks[idx].codec;
        if keys.is_empty() {
            self.blocks[idx].base = 0;
            self.blocks[idx].highest = 0;
            self.blocks[idx].key_count = 0;
            self.blocks[idx].payload_len = 0;
            return;
        }
        let base = keys[0];
        let deltas: Vec<u32> = keys[1..].iter().map(|&k| k - base).collect();
        let encoded = codec.encode(&deltas);
        let start = self.payload.len();
        self.payload.extend_from_slice(&encoded);
        self.blocks[idx].base = base;
        self.blocks[idx].highest = *keys.last().unwrap();
        self.blocks[idx].key_count = keys.len();
        self.blocks[idx].payload_start = start;
        self.blocks[idx].payload_len = encoded.len();
    }

    /// Locates the block whose range contains `key`, defaulting to the
    /// nearest neighbour when `key` falls outside every block.
    fn locate_block(&self, key: u32) -> usize {
        for (i, b) in self.blocks.iter().enumerate() {
            if b.key_count == 0 || key <= b.highest {
                return i;
            }
        }
        self.blocks.len() - 1
    }

    /// Returns `(global_slot, exact_match)`.
    pub fn find_lower_bound(&self, key: u32) -> (usize, bool) {
        let block_idx = self.locate_block(key);
        let keys = self.decode_block(block_idx);
        let in_block = keys.partition_point(|&k| k < key);
        let exact = in_block < keys.len() && keys[in_block] == key;
        let preceding: usize = self.blocks[..block_idx].iter().map(|b| b.key_count).sum();
        (preceding + in_block, exact)
    }

    pub fn requires_split(&self, _count: usize) -> bool {
        false // block splits are internal; the node never needs a page split purely for Zint32 growth room until payload truly runs out
    }

    pub fn required_range_size(&self, _count: usize) -> usize {
        const DESC_SIZE: usize = 24;
        8 + self.blocks.len() * DESC_SIZE + self.payload.len()
    }

    pub fn change_range_size(&mut self, count: usize, new_size: usize) -> Result<()> {
        if new_size < self.required_range_size(count) {
            return Err(Error::LimitsReached);
        }
        self.range_size = new_size;
        Ok(())
    }

    /// Moves the upper `keys[pivot..]` out of `self` and into `other`
    /// (its prior contents are discarded), re-encoding both halves.
    pub fn split(&mut self, pivot: usize, other: &mut Self) -> Result<()> {
        let keys = self.materialize_all();
        let (left, right) = keys.split_at(pivot);
        *self = Self::create(self.range_size, self.default_codec);
        for &k in left {
            self.insert(k)?;
        }
        *other = Self::create(other.range_size, other.default_codec);
        for &k in right {
            other.insert(k)?;
        }
        Ok(())
    }

    /// Rebuilds `self` from the union of its own keys and `other`'s.
    pub fn merge_from(&mut self, other: &Self) -> Result<()> {
        let mut keys = self.materialize_all();
        keys.extend(other.materialize_all());
        *self = Self::create(self.range_size, self.default_codec);
        for k in keys {
            self.insert(k)?;
        }
        Ok(())
    }

    /// Worst-case varbyte/group-varint estimate (5 bytes/key) of whether
    /// the union of `self` and `other` would fit in `self`'s own range.
    pub fn fits_merge(&self, other: &Self) -> bool {
        const DESC_SIZE: usize = 24;
        let total_keys = self.total_keys() + other.total_keys();
        8 + DESC_SIZE + total_keys * 5 <= self.range_size
    }

    pub fn insert(&mut self, key: u32) -> Result<()> {
        let block_idx = self.locate_block(key);
        let mut keys = self.decode_block(block_idx);
        let pos = keys.partition_point(|&k| k < key);
        keys.insert(pos, key);

        if keys.len() > MAX_KEYS_PER_BLOCK {
            let mut pivot = keys.len() / 2;
            pivot -= pivot % 4;
            if pivot == 0 {
                pivot = 4.min(keys.len() - 1);
            }
            let right_keys = keys.split_off(pivot);
            self.encode_into_block(block_idx, &keys);
            let codec = self.blocks[block_idx].codec;
            let right = BlockDesc {
                base: 0,
                highest: 0,
                key_count: 0,
                codec,
                payload_start: 0,
                payload_len: 0,
            };
            self.blocks.insert(block_idx + 1, right);
            self.encode_into_block(block_idx + 1, &right_keys);
        } else {
            self.encode_into_block(block_idx, &keys);
        }
        Ok(())
    }

    pub fn erase(&mut self, key: u32) -> Result<()> {
        let block_idx = self.locate_block(key);
        let mut keys = self.decode_block(block_idx);
        let pos = keys
            .iter()
            .position(|&k| k == key)
            .ok_or(Error::KeyNotFound)?;
        keys.remove(pos);
        self.encode_into_block(block_idx, &keys);
        if keys.is_empty() && self.blocks.len() > 1 {
            self.blocks.remove(block_idx);
        }
        Ok(())
    }

    pub fn check_integrity(&self) -> Result<()> {
        for b in &self.blocks {
            if b.key_count == 0 {
                continue;
            }
            let keys = {
                let encoded = &self.payload[b.payload_start..b.payload_start + b.payload_len];
                let deltas = b.codec.decode(encoded, b.key_count - 1);
                let mut k = vec![b.base];
                k.extend(deltas.into_iter().map(|d| b.base + d));
                k
            };
            if keys.first() != Some(&b.base) || keys.last() != Some(&b.highest) {
                return Err(Error::IntegrityViolated("zint32 block base/highest mismatch".into()));
            }
            for w in keys.windows(2) {
                if w[0] >= w[1] {
                    return Err(Error::IntegrityViolated("zint32 block keys not strictly increasing".into()));
                }
            }
        }
        Ok(())
    }

    pub fn materialize_all(&self) -> Vec<u32> {
        self.blocks.iter().enumerate().flat_map(|(i, _)| self.decode_block(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_find_varbyte() {
        let mut kl = Zint32KeyList::create(4096, Zint32Codec::Varbyte);
        for k in [50u32, 10, 90, 30, 70] {
            kl.insert(k).unwrap();
        }
        let (slot, exact) = kl.find_lower_bound(30);
        assert!(exact);
        assert_eq!(slot, 1);
        kl.check_integrity().unwrap();
        assert_eq!(kl.materialize_all(), vec![10, 30, 50, 70, 90]);
    }

    #[test]
    fn insert_and_find_groupvarint() {
        let mut kl = Zint32KeyList::create(4096, Zint32Codec::GroupVarint);
        for k in 0..20u32 {
            kl.insert(k * 3).unwrap();
        }
        kl.check_integrity().unwrap();
        assert_eq!(kl.materialize_all().len(), 20);
        let (slot, exact) = kl.find_lower_bound(27);
        assert!(exact);
        assert_eq!(slot, 9);
    }

    #[test]
    fn splits_block_past_129_keys_without_losing_keys() {
        let mut kl = Zint32KeyList::create(1 << 20, Zint32Codec::Varbyte);
        for k in 0..400u32 {
            kl.insert(k).unwrap();
        }
        kl.check_integrity().unwrap();
        assert_eq!(kl.materialize_all(), (0..400).collect::<Vec<_>>());
        assert!(kl.blocks.len() > 1);
    }

    #[test]
    fn erase_removes_key_and_unlinks_empty_block() {
        let mut kl = Zint32KeyList::create(4096, Zint32Codec::Varbyte);
        kl.insert(1).unwrap();
        kl.erase(1).unwrap();
        assert_eq!(kl.total_keys(), 0);
        assert_eq!(kl.blocks.len(), 1); // always keeps >= 1 block
    }
}
