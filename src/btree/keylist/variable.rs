//! Variable-length key list: one `UpfrontIndex` chunk per
//! slot. A chunk is `[flags:u8][payload]`; `Extended` replaces the
//! payload with an 8-byte blob id once a key exceeds the page-size
//! derived extended-key threshold. An optional per-key compressor wraps
//! inline (non-extended) payloads with a 2-byte uncompressed-length
//! prefix.

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::btree::blob::BlobManager;
use crate::btree::comparator::Comparator;
use crate::btree::upfront_index::UpfrontIndex;
use crate::config::Compressor;
use crate::error::{Error, Result};
use crate::types::BlobId;

const FLAG_EXTENDED: u8 = 0x1;
const FLAG_COMPRESSED: u8 = 0x2;

pub struct VariableKeyList {
    index: UpfrontIndex,
    /// Per-node cache of resolved extended-key bytes, keyed by blob id;
    /// cleared implicitly when the node (and this list) is dropped.
    extended_cache: HashMap<BlobId, Vec<u8>>,
}

impl VariableKeyList {
    pub fn create(page_size: u32, range_size: usize, capacity: usize) -> Self {
        Self {
            index: UpfrontIndex::create(page_size, range_size, capacity),
            extended_cache: HashMap::new(),
        }
    }

    pub fn open(page_size: u32, range: Vec<u8>) -> Self {
        Self {
            index: UpfrontIndex::open(page_size, range),
            extended_cache: HashMap::new(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.index.into_bytes()
    }

    pub fn range_size(&self) -> usize {
        self.index.range_size()
    }

    pub fn requires_split(&mut self, count: usize, key_len: usize, threshold: usize) -> bool {
        let chunk_len = self.chunk_len_for(key_len, threshold, Compressor::None);
        self.index.requires_split(count, chunk_len)
    }

    fn chunk_len_for(&self, key_len: usize, threshold: usize, compressor: Compressor) -> usize {
        if key_len > threshold {
            1 + 8
        } else if compressor == Compressor::None {
            1 + key_len
        } else {
            // Worst case: compression doesn't help; caller re-measures
            // the actual compressed chunk before allocating.
            1 + 2 + key_len
        }
    }

    pub fn key_at(&mut self, slot: usize, blobs: &BlobManager) -> Result<Vec<u8>> {
        let chunk = self.index.chunk_data(slot).to_vec();
        let flags = chunk[0];
        if flags & FLAG_EXTENDED != 0 {
            let blob_id = u64::from_le_bytes(chunk[1..9].try_into().unwrap());
            if let Some(cached) = self.extended_cache.get(&blob_id) {
                return Ok(cached.clone());
            }
            let bytes = blobs.read(blob_id)?;
            self.extended_cache.insert(blob_id, bytes.clone());
            Ok(bytes)
        } else if flags & FLAG_COMPRESSED != 0 {
            let uncompressed_len = u16::from_le_bytes(chunk[1..3].try_into().unwrap()) as usize;
            let mut dec = ZlibDecoder::new(&chunk[3..]);
            let mut out = Vec::with_capacity(uncompressed_len);
            dec.read_to_end(&mut out)?;
            Ok(out)
        } else {
            Ok(chunk[1..].to_vec())
        }
    }

    pub fn find_lower_bound(
        &mut self,
        count: usize,
        key: &[u8],
        cmp: &Comparator,
        blobs: &BlobManager,
    ) -> Result<(usize, bool)> {
        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_key = self.key_at(mid, blobs)?;
            match cmp.compare(&mid_key, key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                _ => hi = mid,
            }
        }
        let exact = if lo < count {
            cmp.compare(&self.key_at(lo, blobs)?, key) == std::cmp::Ordering::Equal
        } else {
            false
        };
        Ok((lo, exact))
    }

    pub fn insert(
        &mut self,
        count: usize,
        slot: usize,
        key: &[u8],
        threshold: usize,
        compressor: Compressor,
        blobs: &BlobManager,
    ) -> Result<()> {
        let chunk = if key.len() > threshold {
            let blob_id = blobs.allocate(key, Compressor::None)?;
            let mut c = vec![FLAG_EXTENDED];
            c.extend_from_slice(&blob_id.to_le_bytes());
            self.extended_cache.insert(blob_id, key.to_vec());
            c
        } else if compressor == Compressor::Zlib {
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            enc.write_all(key)?;
            let compressed = enc.finish()?;
            if compressed.len() + 3 < key.len() + 1 {
                let mut c = vec![FLAG_COMPRESSED];
                c.extend_from_slice(&(key.len() as u16).to_le_bytes());
                c.extend_from_slice(&compressed);
                c
            } else {
                let mut c = vec![0u8];
                c.extend_from_slice(key);
                c
            }
        } else {
            let mut c = vec![0u8];
            c.extend_from_slice(key);
            c
        };

        self.index.insert_slot(count, slot)?;
        let offset = self.index.allocate_space(count + 1, slot, chunk.len())?;
        let _ = offset;
        self.index.chunk_data_mut(slot).copy_from_slice(&chunk);
        Ok(())
    }

    pub fn erase(&mut self, count: usize, slot: usize, blobs: &BlobManager) -> Result<()> {
        let chunk = self.index.chunk_data(slot).to_vec();
        if chunk.first().copied().unwrap_or(0) & FLAG_EXTENDED != 0 {
            let blob_id = u64::from_le_bytes(chunk[1..9].try_into().unwrap());
            self.extended_cache.remove(&blob_id);
            blobs.erase(blob_id)?;
        }
        self.index.erase_slot(count, slot);
        Ok(())
    }

    pub fn vacuumize(&mut self, count: usize) {
        self.index.vacuumize(count);
    }

    pub fn required_range_size(&self, count: usize) -> usize {
        self.index.required_range_size(count)
    }

    pub fn change_range_size(&mut self, count: usize, new_size: usize) -> Result<()> {
        self.index.change_range_size(count, new_size)
    }

    /// Moves keys `[pivot, count)` out of `self` into `other` (must be
    /// empty), carrying extended-key blob ids as-is: only the chunk
    /// bytes (which hold the blob id, not the key bytes) move, so no
    /// blob is touched. The moved slice of `self.extended_cache` moves
    /// along with it.
    pub fn split(&mut self, count: usize, pivot: usize, other: &mut Self) -> Result<()> {
        for slot in pivot..count {
            let chunk = self.index.chunk_data(slot);
            if chunk.first().copied().unwrap_or(0) & FLAG_EXTENDED != 0 {
                let blob_id = u64::from_le_bytes(chunk[1..9].try_into().unwrap());
                if let Some(cached) = self.extended_cache.remove(&blob_id) {
                    other.extended_cache.insert(blob_id, cached);
                }
            }
        }
        self.index.split(count, pivot, &mut other.index)
    }

    pub fn merge_from(&mut self, count: usize, other: &mut Self, other_count: usize) -> Result<()> {
        self.index.merge_from(count, &other.index, other_count)?;
        self.extended_cache.extend(other.extended_cache.drain());
        Ok(())
    }

    pub fn fits_merge(&mut self, count: usize, other: &Self, other_count: usize) -> bool {
        self.index.fits_merge(count, &other.index, other_count)
    }

    pub fn check_integrity(&mut self, count: usize) -> Result<()> {
        self.index.check_integrity(count).map_err(|e| match e {
            Error::IntegrityViolated(m) => Error::IntegrityViolated(format!("variable keylist: {}", m)),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, InMemoryDevice};
    use crate::page_manager::PageManager;

    fn pm() -> PageManager {
        let mut device = InMemoryDevice::new(256);
        device.create().unwrap();
        PageManager::new(Box::new(device), 1024 * 1024, false)
    }

    #[test]
    fn inline_and_extended_keys_round_trip() {
        let pm = pm();
        let blobs = BlobManager::new(&pm);
        let mut kl = VariableKeyList::create(4096, 1024, 16);
        let cmp = Comparator::BinaryMemcmp;

        kl.insert(0, 0, b"short", 128, Compressor::None, &blobs).unwrap();
        let long_key = vec![9u8; 200];
        let (slot, exact) = kl.find_lower_bound(1, &long_key, &cmp, &blobs).unwrap();
        assert!(!exact);
        kl.insert(1, slot, &long_key, 128, Compressor::None, &blobs).unwrap();

        let mut keys = vec![];
        for i in 0..2 {
            keys.push(kl.key_at(i, &blobs).unwrap());
        }
        assert!(keys.contains(&b"short".to_vec()));
        assert!(keys.contains(&long_key));
        kl.check_integrity(2).unwrap();
    }

    #[test]
    fn erase_releases_extended_blob() {
        let pm = pm();
        let blobs = BlobManager::new(&pm);
        let mut kl = VariableKeyList::create(4096, 1024, 16);
        let long_key = vec![1u8; 200];
        kl.insert(0, 0, &long_key, 128, Compressor::None, &blobs).unwrap();
        kl.erase(1, 0, &blobs).unwrap();
        assert!(kl.extended_cache.is_empty());
    }
}
