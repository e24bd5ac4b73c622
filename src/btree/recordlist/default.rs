//! `DefaultRecord`: each slot is a 9-byte cell, `[flag:u8,
//! payload:8 bytes]`. `flag` is either an inline length `0..=8` (payload
//! holds that many record bytes, zero-padded) or the sentinel `0xFF`
//! meaning the payload is a little-endian blob id. Records over 8 bytes
//! always spill to a blob; `set_record` frees a stale blob when a large
//! record shrinks to fit inline, and allocates one when an inline
//! record grows past 8 bytes.

use crate::btree::blob::BlobManager;
use crate::config::Compressor;
use crate::error::{Error, Result};
use crate::types::BlobId;

const CELL_SIZE: usize = 9;
const FLAG_BLOB: u8 = 0xFF;

pub struct DefaultRecordList {
    data: Vec<u8>,
}

impl DefaultRecordList {
    pub fn create(range_size: usize) -> Self {
        Self {
            data: vec![0u8; range_size],
        }
    }

    pub fn open(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn range_size(&self) -> usize {
        self.data.len()
    }

    pub fn requires_split(&self, count: usize) -> bool {
        (count + 1) * CELL_SIZE > self.data.len()
    }

    pub fn required_range_size(&self, count: usize) -> usize {
        count * CELL_SIZE
    }

    pub fn change_range_size(&mut self, new_size: usize) {
        self.data.resize(new_size, 0);
    }

    /// Moves cells `[pivot, count)` out of `self` and into `other`
    /// (assumed empty); blob ids embedded in moved cells stay valid, no
    /// blob is touched.
    pub fn split(&mut self, count: usize, pivot: usize, other: &mut Self) {
        let moved = self.data[pivot * CELL_SIZE..count * CELL_SIZE].to_vec();
        other.data[..moved.len()].copy_from_slice(&moved);
        self.data[pivot * CELL_SIZE..count * CELL_SIZE].fill(0);
    }

    pub fn merge_from(&mut self, count: usize, other: &Self, other_count: usize) {
        let src_len = other_count * CELL_SIZE;
        self.data[count * CELL_SIZE..count * CELL_SIZE + src_len].copy_from_slice(&other.data[..src_len]);
    }

    fn cell(&self, slot: usize) -> &[u8] {
        &self.data[slot * CELL_SIZE..(slot + 1) * CELL_SIZE]
    }

    fn cell_mut(&mut self, slot: usize) -> &mut [u8] {
        &mut self.data[slot * CELL_SIZE..(slot + 1) * CELL_SIZE]
    }

    pub fn get(&self, slot: usize, blobs: &BlobManager) -> Result<Vec<u8>> {
        let cell = self.cell(slot);
        let flag = cell[0];
        if flag == FLAG_BLOB {
            let blob_id = u64::from_le_bytes(cell[1..9].try_into().unwrap());
            blobs.read(blob_id)
        } else {
            Ok(cell[1..1 + flag as usize].to_vec())
        }
    }

    fn blob_id_of(&self, slot: usize) -> Option<BlobId> {
        let cell = self.cell(slot);
        if cell[0] == FLAG_BLOB {
            Some(u64::from_le_bytes(cell[1..9].try_into().unwrap()))
        } else {
            None
        }
    }

    /// Writes `value` into `slot`, reusing or tearing down a stale blob
    /// as needed.
    pub fn set_record(&mut self, slot: usize, value: &[u8], compressor: Compressor, blobs: &BlobManager) -> Result<()> {
        let stale_blob = self.blob_id_of(slot);
        if value.len() <= 8 {
            if let Some(old) = stale_blob {
                blobs.erase(old)?;
            }
            let cell = self.cell_mut(slot);
            cell[0] = value.len() as u8;
            cell[1..].fill(0);
            cell[1..1 + value.len()].copy_from_slice(value);
        } else {
            let new_id = if let Some(old) = stale_blob {
                blobs.overwrite(old, value, compressor)?
            } else {
                blobs.allocate(value, compressor)?
            };
            let cell = self.cell_mut(slot);
            cell[0] = FLAG_BLOB;
            cell[1..9].copy_from_slice(&new_id.to_le_bytes());
        }
        Ok(())
    }

    pub fn insert(
        &mut self,
        count: usize,
        slot: usize,
        value: &[u8],
        compressor: Compressor,
        blobs: &BlobManager,
    ) -> Result<()> {
        if self.requires_split(count) {
            return Err(Error::LimitsReached);
        }
        let end = count * CELL_SIZE;
        self.data.copy_within(slot * CELL_SIZE..end, (slot + 1) * CELL_SIZE);
        self.cell_mut(slot).fill(0);
        self.set_record(slot, value, compressor, blobs)
    }

    pub fn erase(&mut self, count: usize, slot: usize, blobs: &BlobManager) -> Result<()> {
        if let Some(blob_id) = self.blob_id_of(slot) {
            blobs.erase(blob_id)?;
        }
        let start = (slot + 1) * CELL_SIZE;
        let end = count * CELL_SIZE;
        if start < end {
            self.data.copy_within(start..end, slot * CELL_SIZE);
        }
        Ok(())
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
    fn inline_then_grows_to_blob_then_shrinks_back() {
        let pm = pm();
        let blobs = BlobManager::new(&pm);
        let mut rl = DefaultRecordList::create(CELL_SIZE * 4);
        rl.insert(0, 0, b"abcd", Compressor::None, &blobs).unwrap();
        assert_eq!(rl.get(0, &blobs).unwrap(), b"abcd");

        let big = vec![9u8; 500];
        rl.set_record(0, &big, Compressor::None, &blobs).unwrap();
        assert_eq!(rl.get(0, &blobs).unwrap(), big);

        rl.set_record(0, b"x", Compressor::None, &blobs).unwrap();
        assert_eq!(rl.get(0, &blobs).unwrap(), b"x");
        assert!(rl.blob_id_of(0).is_none());
    }
}
