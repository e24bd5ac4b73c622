//! Duplicate `RecordList`: each key slot owns a small
//! inline run of records, or — once the run grows past a page-size
//! derived threshold — a single blob id pointing at an external
//! `DuplicateTable`. Both the inline run and the table encode each
//! entry the same way `DefaultRecord` does: `[flag:u8, payload:8]`,
//! flag `0..=8` inline length or `0xFF` + an 8-byte blob id for entries
//! that themselves exceed 8 bytes.

use crate::btree::blob::BlobManager;
use crate::btree::upfront_index::UpfrontIndex;
use crate::config::Compressor;
use crate::error::{Error, Result};
use crate::types::BlobId;

const ENTRY_SIZE: usize = 9;
const ENTRY_FLAG_BLOB: u8 = 0xFF;
const META_EXTENDED: u8 = 0x80;
const META_COUNT_MASK: u8 = 0x7F;

fn encode_entry(value: &[u8], compressor: Compressor, blobs: &BlobManager) -> Result<[u8; ENTRY_SIZE]> {
    let mut entry = [0u8; ENTRY_SIZE];
    if value.len() <= 8 {
        entry[0] = value.len() as u8;
        entry[1..1 + value.len()].copy_from_slice(value);
    } else {
        let blob_id = blobs.allocate(value, compressor)?;
        entry[0] = ENTRY_FLAG_BLOB;
        entry[1..9].copy_from_slice(&blob_id.to_le_bytes());
    }
    Ok(entry)
}

fn decode_entry(entry: &[u8], blobs: &BlobManager) -> Result<Vec<u8>> {
    if entry[0] == ENTRY_FLAG_BLOB {
        let blob_id = u64::from_le_bytes(entry[1..9].try_into().unwrap());
        blobs.read(blob_id)
    } else {
        Ok(entry[1..1 + entry[0] as usize].to_vec())
    }
}

fn free_entry_blob(entry: &[u8], blobs: &BlobManager) -> Result<()> {
    if entry[0] == ENTRY_FLAG_BLOB {
        let blob_id = u64::from_le_bytes(entry[1..9].try_into().unwrap());
        blobs.erase(blob_id)?;
    }
    Ok(())
}

/// External overflow store for one key's duplicate run: `[count:u32,
/// capacity:u32, entries...]`, capacity doubling on growth
/// open question: the source never shrinks it back, only this core's
/// `shrink` path removes it outright once the last entry is erased).
struct DuplicateTable {
    count: u32,
    capacity: u32,
    entries: Vec<u8>,
}

impl DuplicateTable {
    fn new_with(entries: &[[u8; ENTRY_SIZE]]) -> Self {
        let capacity = (entries.len() as u32).max(1);
        let mut data = Vec::with_capacity(capacity as usize * ENTRY_SIZE);
        for e in entries {
            data.extend_from_slice(e);
        }
        data.resize(capacity as usize * ENTRY_SIZE, 0);
        Self {
            count: entries.len() as u32,
            capacity,
            entries: data,
        }
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let capacity = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        Self {
            count,
            capacity,
            entries: bytes[8..].to_vec(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.entries.len());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.capacity.to_le_bytes());
        out.extend_from_slice(&self.entries);
        out
    }

    fn entry(&self, i: usize) -> &[u8] {
        &self.entries[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE]
    }

    fn insert_at(&mut self, i: usize, entry: [u8; ENTRY_SIZE]) {
        if self.count == self.capacity {
            self.capacity = (self.capacity * 2).max(1);
            self.entries.resize(self.capacity as usize * ENTRY_SIZE, 0);
        }
        let end = self.count as usize * ENTRY_SIZE;
        self.entries.copy_within(i * ENTRY_SIZE..end, (i + 1) * ENTRY_SIZE);
        self.entries[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE].copy_from_slice(&entry);
        self.count += 1;
    }

    fn erase_at(&mut self, i: usize) -> [u8; ENTRY_SIZE] {
        let mut removed = [0u8; ENTRY_SIZE];
        removed.copy_from_slice(self.entry(i));
        let start = (i + 1) * ENTRY_SIZE;
        let end = self.count as usize * ENTRY_SIZE;
        if start < end {
            self.entries.copy_within(start..end, i * ENTRY_SIZE);
        }
        self.count -= 1;
        removed
    }
}

pub struct DuplicateRecordList {
    index: UpfrontIndex,
    inline_threshold: usize,
}

impl DuplicateRecordList {
    pub fn create(page_size: u32, range_size: usize, capacity: usize, inline_threshold: usize) -> Self {
        Self {
            index: UpfrontIndex::create(page_size, range_size, capacity),
            inline_threshold,
        }
    }

    pub fn open(page_size: u32, range: Vec<u8>, inline_threshold: usize) -> Self {
        Self {
            index: UpfrontIndex::open(page_size, range),
            inline_threshold,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.index.into_bytes()
    }

    pub fn range_size(&self) -> usize {
        self.index.range_size()
    }

    pub fn requires_split(&mut self, count: usize) -> bool {
        self.index.requires_split(count, 1)
    }

    pub fn required_range_size(&self, count: usize) -> usize {
        self.index.required_range_size(count)
    }

    pub fn change_range_size(&mut self, count: usize, new_size: usize) -> Result<()> {
        self.index.change_range_size(count, new_size)
    }

    /// Moves duplicate runs `[pivot, count)` out of `self` into `other`
    /// (must be empty); every run's bytes (inline or a blob id) move
    /// wholesale, so no blob is touched.
    pub fn split(&mut self, count: usize, pivot: usize, other: &mut Self) -> Result<()> {
        self.index.split(count, pivot, &mut other.index)
    }

    pub fn merge_from(&mut self, count: usize, other: &Self, other_count: usize) -> Result<()> {
        self.index.merge_from(count, &other.index, other_count)
    }

    pub fn fits_merge(&mut self, count: usize, other: &Self, other_count: usize) -> bool {
        self.index.fits_merge(count, &other.index, other_count)
    }

    /// Opens a new, empty duplicate run for a freshly inserted key.
    pub fn insert_slot(&mut self, count: usize, slot: usize) -> Result<()> {
        self.index.insert_slot(count, slot)?;
        let offset = self.index.allocate_space(count + 1, slot, 1)?;
        let _ = offset;
        self.index.chunk_data_mut(slot)[0] = 0;
        Ok(())
    }

    pub fn erase_slot(&mut self, count: usize, slot: usize, blobs: &BlobManager) -> Result<()> {
        self.teardown(slot, blobs)?;
        self.index.erase_slot(count, slot);
        Ok(())
    }

    fn teardown(&mut self, slot: usize, blobs: &BlobManager) -> Result<()> {
        let chunk = self.index.chunk_data(slot).to_vec();
        let meta = chunk[0];
        if meta & META_EXTENDED != 0 {
            let blob_id = u64::from_le_bytes(chunk[1..9].try_into().unwrap());
            let table = DuplicateTable::from_bytes(&blobs.read(blob_id)?);
            for i in 0..table.count as usize {
                free_entry_blob(table.entry(i), blobs)?;
            }
            blobs.erase(blob_id)?;
        } else {
            let inline_count = (meta & META_COUNT_MASK) as usize;
            for i in 0..inline_count {
                free_entry_blob(&chunk[1 + i * ENTRY_SIZE..1 + (i + 1) * ENTRY_SIZE], blobs)?;
            }
        }
        Ok(())
    }

    pub fn duplicate_count(&self, slot: usize) -> usize {
        let chunk = self.index.chunk_data(slot);
        let meta = chunk[0];
        if meta & META_EXTENDED != 0 {
            0 // caller must use `table_count` when extended; see below
        } else {
            (meta & META_COUNT_MASK) as usize
        }
    }

    fn is_extended(&self, slot: usize) -> bool {
        self.index.chunk_data(slot)[0] & META_EXTENDED != 0
    }

    fn table_blob_id(&self, slot: usize) -> BlobId {
        let chunk = self.index.chunk_data(slot);
        u64::from_le_bytes(chunk[1..9].try_into().unwrap())
    }

    /// Total duplicate count, whether inline or externalized.
    pub fn count_for(&self, slot: usize, blobs: &BlobManager) -> Result<usize> {
        if self.is_extended(slot) {
            let table = DuplicateTable::from_bytes(&blobs.read(self.table_blob_id(slot))?);
            Ok(table.count as usize)
        } else {
            Ok(self.duplicate_count(slot))
        }
    }

    pub fn get(&self, slot: usize, dup_index: usize, blobs: &BlobManager) -> Result<Vec<u8>> {
        if self.is_extended(slot) {
            let table = DuplicateTable::from_bytes(&blobs.read(self.table_blob_id(slot))?);
            if dup_index >= table.count as usize {
                return Err(Error::KeyNotFound);
            }
            decode_entry(table.entry(dup_index), blobs)
        } else {
            let chunk = self.index.chunk_data(slot);
            let count = (chunk[0] & META_COUNT_MASK) as usize;
            if dup_index >= count {
                return Err(Error::KeyNotFound);
            }
            decode_entry(&chunk[1 + dup_index * ENTRY_SIZE..1 + (dup_index + 1) * ENTRY_SIZE], blobs)
        }
    }

    /// Converts an inline run to an external `DuplicateTable`, called
    /// when the inline count reaches `inline_threshold` or the chunk has
    /// no more room to grow.
    fn migrate_to_table(&mut self, count: usize, slot: usize, blobs: &BlobManager) -> Result<()> {
        let chunk = self.index.chunk_data(slot).to_vec();
        let inline_count = (chunk[0] & META_COUNT_MASK) as usize;
        let mut entries = Vec::with_capacity(inline_count);
        for i in 0..inline_count {
            let mut e = [0u8; ENTRY_SIZE];
            e.copy_from_slice(&chunk[1 + i * ENTRY_SIZE..1 + (i + 1) * ENTRY_SIZE]);
            entries.push(e);
        }
        let table = DuplicateTable::new_with(&entries);
        let blob_id = blobs.allocate(&table.to_bytes(), Compressor::None)?;

        let new_chunk_len = 9;
        self.index.erase_slot(count, slot);
        self.index.insert_slot(count - 1, slot)?;
        self.index.allocate_space(count, slot, new_chunk_len)?;
        let cell = self.index.chunk_data_mut(slot);
        cell[0] = META_EXTENDED;
        cell[1..9].copy_from_slice(&blob_id.to_le_bytes());
        Ok(())
    }

    /// Inserts `value` at `dup_index` within the key's duplicate run
    /// (`0` = first, `count` = last/append).
    pub fn insert_duplicate(
        &mut self,
        count: usize,
        slot: usize,
        dup_index: usize,
        value: &[u8],
        compressor: Compressor,
        blobs: &BlobManager,
    ) -> Result<()> {
        if self.is_extended(slot) {
            let blob_id = self.table_blob_id(slot);
            let mut table = DuplicateTable::from_bytes(&blobs.read(blob_id)?);
            let entry = encode_entry(value, compressor, blobs)?;
            table.insert_at(dup_index, entry);
            let new_id = blobs.overwrite(blob_id, &table.to_bytes(), Compressor::None)?;
            if new_id != blob_id {
                self.index.chunk_data_mut(slot)[1..9].copy_from_slice(&new_id.to_le_bytes());
            }
            return Ok(());
        }

        let chunk = self.index.chunk_data(slot).to_vec();
        let inline_count = (chunk[0] & META_COUNT_MASK) as usize;
        let entry = encode_entry(value, compressor, blobs)?;
        let required_len = 1 + (inline_count + 1) * ENTRY_SIZE;

        if inline_count + 1 >= self.inline_threshold || !self.index.can_allocate_space(count, required_len) {
            self.migrate_to_table(count, slot, blobs)?;
            return self.insert_duplicate(count, slot, dup_index, value, compressor, blobs);
        }

        let mut new_chunk = vec![0u8; required_len];
        new_chunk[0] = (inline_count + 1) as u8;
        new_chunk[1..1 + dup_index * ENTRY_SIZE].copy_from_slice(&chunk[1..1 + dup_index * ENTRY_SIZE]);
        new_chunk[1 + dup_index * ENTRY_SIZE..1 + (dup_index + 1) * ENTRY_SIZE].copy_from_slice(&entry);
        new_chunk[1 + (dup_index + 1) * ENTRY_SIZE..].copy_from_slice(&chunk[1 + dup_index * ENTRY_SIZE..1 + inline_count * ENTRY_SIZE]);

        self.index.allocate_space(count, slot, required_len)?;
        self.index.chunk_data_mut(slot).copy_from_slice(&new_chunk);
        Ok(())
    }

    /// Erases the duplicate at `dup_index`; shrinks an external table
    /// back down to inline-deleted (never back to inline-storage: the
    /// table is only ever deleted outright once its last entry is gone,
    /// (see DESIGN.md).
    pub fn erase_duplicate(&mut self, count: usize, slot: usize, dup_index: usize, blobs: &BlobManager) -> Result<()> {
        if self.is_extended(slot) {
            let blob_id = self.table_blob_id(slot);
            let mut table = DuplicateTable::from_bytes(&blobs.read(blob_id)?);
            let removed = table.erase_at(dup_index);
            free_entry_blob(&removed, blobs)?;
            if table.count == 0 {
                blobs.erase(blob_id)?;
                self.index.chunk_data_mut(slot)[0] = 0;
                let chunk = self.index.chunk_data_mut(slot);
                chunk[1..9].fill(0);
            } else {
                let new_id = blobs.overwrite(blob_id, &table.to_bytes(), Compressor::None)?;
                if new_id != blob_id {
                    self.index.chunk_data_mut(slot)[1..9].copy_from_slice(&new_id.to_le_bytes());
                }
            }
            return Ok(());
        }

        let chunk = self.index.chunk_data(slot).to_vec();
        let inline_count = (chunk[0] & META_COUNT_MASK) as usize;
        if dup_index >= inline_count {
            return Err(Error::KeyNotFound);
        }
        free_entry_blob(&chunk[1 + dup_index * ENTRY_SIZE..1 + (dup_index + 1) * ENTRY_SIZE], blobs)?;

        let new_count = inline_count - 1;
        let mut new_chunk = vec![0u8; 1 + new_count * ENTRY_SIZE];
        new_chunk[0] = new_count as u8;
        new_chunk[1..1 + dup_index * ENTRY_SIZE].copy_from_slice(&chunk[1..1 + dup_index * ENTRY_SIZE]);
        new_chunk[1 + dup_index * ENTRY_SIZE..].copy_from_slice(&chunk[1 + (dup_index + 1) * ENTRY_SIZE..1 + inline_count * ENTRY_SIZE]);

        if new_count == 0 {
            self.index.chunk_data_mut(slot)[0] = 0;
        } else {
            self.index.allocate_space(count, slot, new_chunk.len())?;
            self.index.chunk_data_mut(slot).copy_from_slice(&new_chunk);
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
    fn inline_run_insert_and_read_back_in_order() {
        let pm = pm();
        let blobs = BlobManager::new(&pm);
        let mut rl = DuplicateRecordList::create(4096, 1024, 16, 64);
        rl.insert_slot(0, 0).unwrap();
        for i in 0..5u8 {
            rl.insert_duplicate(1, 0, i as usize, &[i], Compressor::None, &blobs).unwrap();
        }
        assert_eq!(rl.count_for(0, &blobs).unwrap(), 5);
        for i in 0..5u8 {
            assert_eq!(rl.get(0, i as usize, &blobs).unwrap(), vec![i]);
        }
    }

    #[test]
    fn overflow_migrates_to_external_table() {
        let pm = pm();
        let blobs = BlobManager::new(&pm);
        let mut rl = DuplicateRecordList::create(4096, 4096, 16, 4);
        rl.insert_slot(0, 0).unwrap();
        for i in 0..10u32 {
            rl.insert_duplicate(1, 0, i as usize, &i.to_le_bytes(), Compressor::None, &blobs).unwrap();
        }
        assert_eq!(rl.count_for(0, &blobs).unwrap(), 10);
        assert!(rl.is_extended(0));
        for i in 0..10u32 {
            assert_eq!(rl.get(0, i as usize, &blobs).unwrap(), i.to_le_bytes());
        }
    }

    #[test]
    fn erase_all_removes_external_table() {
        let pm = pm();
        let blobs = BlobManager::new(&pm);
        let mut rl = DuplicateRecordList::create(4096, 4096, 16, 2);
        rl.insert_slot(0, 0).unwrap();
        for i in 0..5u32 {
            rl.insert_duplicate(1, 0, i as usize, &i.to_le_bytes(), Compressor::None, &blobs).unwrap();
        }
        assert!(rl.is_extended(0));
        while rl.count_for(0, &blobs).unwrap() > 0 {
            rl.erase_duplicate(1, 0, 0, &blobs).unwrap();
        }
        assert_eq!(rl.count_for(0, &blobs).unwrap(), 0);
    }
}
