//! Generic variable-length chunk manager shared by the variable-length
//! `KeyList` and the duplicate `RecordList`s.
//!
//! The index owns a byte range laid out as:
//!
//! ```text
//! [freelist_count:u32 | next_offset:u32 | capacity:u32]
//! [slot_1 .. slot_capacity]   (each: offset:u16|u32, size:u8)
//! [payload bytes ...]
//! ```
//!
//! Slots `0..node_count` are live chunks (in caller-managed slot order);
//! slots `node_count..node_count+freelist_count` are a LIFO freelist of
//! reusable chunks. Offsets are indices, never raw pointers, since the
//! backing `Vec<u8>` may be reallocated by `change_range_size` or
//! `vacuumize` relocates payload bytes.

use crate::error::{Error, Result};

const META_SIZE: usize = 12;
pub const MIN_CAPACITY: usize = 16;

/// Offset field width: 2 bytes when the owning page is <= 64 KiB, else 4.
fn sizeof_offset(page_size: u32) -> usize {
    if page_size <= 64 * 1024 {
        2
    } else {
        4
    }
}

pub struct UpfrontIndex {
    range: Vec<u8>,
    sizeof_offset: usize,
    /// Accumulated size of erased chunks since the last vacuumize.
    vacuumize_counter: usize,
}

impl UpfrontIndex {
    fn full_index_size(&self) -> usize {
        self.sizeof_offset + 1
    }

    pub fn create(page_size: u32, range_size: usize, capacity: usize) -> Self {
        let mut idx = Self {
            range: vec![0u8; range_size],
            sizeof_offset: sizeof_offset(page_size),
            vacuumize_counter: 0,
        };
        idx.set_capacity(capacity);
        idx.set_freelist_count(0);
        idx.set_next_offset(0);
        idx
    }

    pub fn open(page_size: u32, range: Vec<u8>) -> Self {
        let sizeof_offset = sizeof_offset(page_size);
        let has_freelist = {
            let fc = u32::from_le_bytes(range[0..4].try_into().unwrap());
            fc > 0
        };
        Self {
            vacuumize_counter: if has_freelist { range.len() } else { 0 },
            sizeof_offset,
            range,
        }
    }

    pub fn range_size(&self) -> usize {
        self.range.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.range
    }

    pub fn bytes(&self) -> &[u8] {
        &self.range
    }

    fn capacity(&self) -> usize {
        u32::from_le_bytes(self.range[8..12].try_into().unwrap()) as usize
    }

    fn set_capacity(&mut self, cap: usize) {
        self.range[8..12].copy_from_slice(&(cap as u32).to_le_bytes());
    }

    fn freelist_count(&self) -> usize {
        u32::from_le_bytes(self.range[0..4].try_into().unwrap()) as usize
    }

    fn set_freelist_count(&mut self, n: usize) {
        self.range[0..4].copy_from_slice(&(n as u32).to_le_bytes());
    }

    fn next_offset_raw(&self) -> u32 {
        u32::from_le_bytes(self.range[4..8].try_into().unwrap())
    }

    fn set_next_offset(&mut self, offset: usize) {
        self.range[4..8].copy_from_slice(&(offset as u32).to_le_bytes());
    }

    /// `next_offset` is cached but must always equal
    /// `max(offset+size)` over live chunks; when the cache has been
    /// invalidated (sentinel `u32::MAX`) it is recomputed.
    fn next_offset(&mut self, node_count: usize) -> usize {
        if self.next_offset_raw() != u32::MAX {
            return self.next_offset_raw() as usize;
        }
        let total = node_count + self.freelist_count();
        let max = (0..total)
            .map(|i| self.chunk_offset(i) + self.chunk_size(i) as usize)
            .max()
            .unwrap_or(0);
        self.set_next_offset(max);
        max
    }

    fn invalidate_next_offset(&mut self) {
        self.range[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
    }

    fn descriptor_table_size(&self) -> usize {
        self.capacity() * self.full_index_size()
    }

    fn usable_data_size(&self) -> usize {
        self.range.len() - META_SIZE - self.descriptor_table_size()
    }

    fn descriptor_offset(&self, slot: usize) -> usize {
        META_SIZE + slot * self.full_index_size()
    }

    fn chunk_offset(&self, slot: usize) -> usize {
        let at = self.descriptor_offset(slot);
        if self.sizeof_offset == 2 {
            u16::from_le_bytes(self.range[at..at + 2].try_into().unwrap()) as usize
        } else {
            u32::from_le_bytes(self.range[at..at + 4].try_into().unwrap()) as usize
        }
    }

    fn set_chunk_offset(&mut self, slot: usize, offset: usize) {
        let at = self.descriptor_offset(slot);
        if self.sizeof_offset == 2 {
            self.range[at..at + 2].copy_from_slice(&(offset as u16).to_le_bytes());
        } else {
            self.range[at..at + 4].copy_from_slice(&(offset as u32).to_le_bytes());
        }
    }

    fn chunk_size(&self, slot: usize) -> u8 {
        let at = self.descriptor_offset(slot) + self.sizeof_offset;
        self.range[at]
    }

    fn set_chunk_size(&mut self, slot: usize, size: u8) {
        let at = self.descriptor_offset(slot) + self.sizeof_offset;
        self.range[at] = size;
    }

    fn absolute_payload_offset(&self, relative: usize) -> usize {
        META_SIZE + self.descriptor_table_size() + relative
    }

    pub fn chunk_data(&self, slot: usize) -> &[u8] {
        let rel = self.chunk_offset(slot);
        let size = self.chunk_size(slot) as usize;
        let abs = self.absolute_payload_offset(rel);
        &self.range[abs..abs + size]
    }

    pub fn chunk_data_mut(&mut self, slot: usize) -> &mut [u8] {
        let rel = self.chunk_offset(slot);
        let size = self.chunk_size(slot) as usize;
        let abs = self.absolute_payload_offset(rel);
        &mut self.range[abs..abs + size]
    }

    pub fn can_insert(&self, node_count: usize) -> bool {
        node_count + self.freelist_count() < self.capacity()
    }

    /// Opens a gap at `slot` in the descriptor table for a new chunk.
    pub fn insert_slot(&mut self, node_count: usize, slot: usize) -> Result<()> {
        if !self.can_insert(node_count) {
            return Err(Error::LimitsReached);
        }
        let total = node_count + self.freelist_count();
        if slot < total {
            for i in (slot..total).rev() {
                let (o, s) = (self.chunk_offset(i), self.chunk_size(i));
                self.set_chunk_offset(i + 1, o);
                self.set_chunk_size(i + 1, s);
            }
        }
        self.set_chunk_offset(slot, 0);
        self.set_chunk_size(slot, 0);
        Ok(())
    }

    /// Removes the chunk at `slot`, shifting the descriptor table left
    /// and appending the freed chunk to the freelist.
    pub fn erase_slot(&mut self, node_count: usize, slot: usize) {
        let total = node_count + self.freelist_count();
        let chunk_size = self.chunk_size(slot);
        let chunk_offset = self.chunk_offset(slot);
        self.vacuumize_counter += chunk_size as usize;

        if slot != node_count - 1 {
            for i in slot..total.saturating_sub(1) {
                let (o, s) = (self.chunk_offset(i + 1), self.chunk_size(i + 1));
                self.set_chunk_offset(i, o);
                self.set_chunk_size(i, s);
            }
            self.set_chunk_offset(total - 1, chunk_offset);
            self.set_chunk_size(total - 1, chunk_size);
        }
        self.set_freelist_count(self.freelist_count() + 1);
    }

    pub fn can_allocate_space(&mut self, node_count: usize, num_bytes: usize) -> bool {
        if self.next_offset(node_count) + num_bytes <= self.usable_data_size() {
            return true;
        }
        let total = node_count + self.freelist_count();
        (node_count..total).any(|i| self.chunk_size(i) as usize >= num_bytes)
    }

    /// Allocates `num_bytes` for `slot`, appending at `next_offset` or
    /// reusing a freelist chunk; returns the relative offset.
    pub fn allocate_space(&mut self, node_count: usize, slot: usize, num_bytes: usize) -> Result<usize> {
        if num_bytes > u8::MAX as usize {
            return Err(Error::InvParameter("chunk exceeds 255 bytes; use an extended/blob key"));
        }
        if !self.can_allocate_space(node_count, num_bytes) {
            return Err(Error::LimitsReached);
        }

        let next = self.next_offset(node_count);
        if next + num_bytes <= self.usable_data_size() {
            let offset = self.chunk_offset(slot);
            if next == offset + self.chunk_size(slot) as usize {
                self.set_next_offset(offset + num_bytes);
                self.set_chunk_size(slot, num_bytes as u8);
                return Ok(offset);
            }
            self.set_next_offset(next + num_bytes);
            self.set_chunk_offset(slot, next);
            self.set_chunk_size(slot, num_bytes as u8);
            return Ok(next);
        }

        let total = node_count + self.freelist_count();
        for i in node_count..total {
            let chunk_size = self.chunk_size(i) as usize;
            let chunk_offset = self.chunk_offset(i);
            if chunk_size >= num_bytes {
                if next == chunk_offset + chunk_size {
                    self.invalidate_next_offset();
                }
                self.set_chunk_size(slot, num_bytes as u8);
                self.set_chunk_offset(slot, chunk_offset);
                if i < total - 1 {
                    for j in i..total - 1 {
                        let (o, s) = (self.chunk_offset(j + 1), self.chunk_size(j + 1));
                        self.set_chunk_offset(j, o);
                        self.set_chunk_size(j, s);
                    }
                }
                self.set_freelist_count(self.freelist_count() - 1);
                return Ok(self.chunk_offset(slot));
            }
        }
        Err(Error::LimitsReached)
    }

    pub fn requires_split(&mut self, node_count: usize, required_size: usize) -> bool {
        !self.can_insert(node_count) || !self.can_allocate_space(node_count, required_size)
    }

    /// Compacts payload bytes so no gaps remain between live chunks,
    /// cheap freelist-clear if the
    /// vacuumize counter is small, otherwise a full left-shift.
    pub fn vacuumize(&mut self, node_count: usize) {
        if self.vacuumize_counter < 10 && self.freelist_count() == 0 {
            return;
        }
        if self.vacuumize_counter < 10 {
            self.set_freelist_count(0);
            self.vacuumize_counter = 0;
            return;
        }

        let mut order: Vec<usize> = (0..node_count).collect();
        order.sort_by_key(|&slot| self.chunk_offset(slot));

        let payload_base = META_SIZE + self.descriptor_table_size();
        let mut write_cursor = 0usize;
        for &slot in &order {
            let rel = self.chunk_offset(slot);
            let size = self.chunk_size(slot) as usize;
            if rel != write_cursor {
                let src = payload_base + rel;
                let dst = payload_base + write_cursor;
                for k in 0..size {
                    self.range[dst + k] = self.range[src + k];
                }
                self.set_chunk_offset(slot, write_cursor);
            }
            write_cursor += size;
        }
        self.set_freelist_count(0);
        self.set_next_offset(write_cursor);
        self.vacuumize_counter = 0;
    }

    pub fn required_range_size(&self, node_count: usize) -> usize {
        META_SIZE + self.descriptor_table_size() + self.next_offset_for_check(node_count)
    }

    fn next_offset_for_check(&self, node_count: usize) -> usize {
        let total = node_count + self.freelist_count();
        (0..total)
            .map(|i| self.chunk_offset(i) + self.chunk_size(i) as usize)
            .max()
            .unwrap_or(0)
    }

    /// Forces a full left-compaction regardless of the usual
    /// cheap-vs-full threshold, leaving payload bytes packed from offset
    /// 0 with no freelist entries. Used before operations (resize,
    /// split, merge) that need an exact account of live bytes.
    fn force_vacuumize(&mut self, node_count: usize) {
        self.vacuumize_counter = self.vacuumize_counter.max(10);
        self.vacuumize(node_count);
    }

    /// Grows or shrinks the backing byte range. Shrinking compacts first
    /// and fails with `LimitsReached` if the live chunks plus descriptor
    /// table don't fit in `new_size`.
    pub fn change_range_size(&mut self, node_count: usize, new_size: usize) -> Result<()> {
        self.force_vacuumize(node_count);
        if new_size < self.required_range_size(node_count) {
            return Err(Error::LimitsReached);
        }
        self.range.resize(new_size, 0);
        Ok(())
    }

    /// Sum of the encoded size of every live chunk, `0..node_count`.
    pub fn live_payload_bytes(&self, node_count: usize) -> usize {
        (0..node_count).map(|i| self.chunk_size(i) as usize).sum()
    }

    /// Moves the live chunks `[pivot, node_count)` out of `self` and
    /// into `other` (which must be empty), preserving slot order.
    /// Leaves `self` holding only `0..pivot`.
    pub fn split(&mut self, node_count: usize, pivot: usize, other: &mut UpfrontIndex) -> Result<()> {
        for i in pivot..node_count {
            let chunk = self.chunk_data(i).to_vec();
            let dest = i - pivot;
            other.insert_slot(dest, dest)?;
            other.allocate_space(dest + 1, dest, chunk.len())?;
            other.chunk_data_mut(dest).copy_from_slice(&chunk);
        }
        let mut count = node_count;
        for slot in (pivot..node_count).rev() {
            self.erase_slot(count, slot);
            count -= 1;
        }
        self.force_vacuumize(pivot);
        Ok(())
    }

    /// Whether `other`'s live chunks (`0..other_count`) would fit into
    /// `self` alongside its own `node_count` live chunks.
    pub fn fits_merge(&mut self, node_count: usize, other: &UpfrontIndex, other_count: usize) -> bool {
        self.force_vacuumize(node_count);
        if node_count + other_count > self.capacity() {
            return false;
        }
        self.next_offset(node_count) + other.live_payload_bytes(other_count) <= self.usable_data_size()
    }

    /// Appends `other`'s live chunks (`0..other_count`) to the end of
    /// `self`'s slot range. Callers should check `fits_merge` first;
    /// this still fails cleanly (leaving `self` unmodified past the
    /// point of failure) via `LimitsReached` if it doesn't fit.
    pub fn merge_from(&mut self, node_count: usize, other: &UpfrontIndex, other_count: usize) -> Result<()> {
        let mut count = node_count;
        for i in 0..other_count {
            let chunk = other.chunk_data(i).to_vec();
            self.insert_slot(count, count)?;
            self.allocate_space(count + 1, count, chunk.len())?;
            self.chunk_data_mut(count).copy_from_slice(&chunk);
            count += 1;
        }
        Ok(())
    }

    /// Checks that no payload ranges overlap, and
    /// `next_offset == max(offset+size)`.
    pub fn check_integrity(&mut self, node_count: usize) -> Result<()> {
        let total = node_count + self.freelist_count();
        if total > self.capacity() {
            return Err(Error::IntegrityViolated(format!(
                "total slots {} exceeds capacity {}",
                total,
                self.capacity()
            )));
        }
        let mut ranges: Vec<(usize, usize)> = (0..total)
            .map(|i| (self.chunk_offset(i), self.chunk_size(i) as usize))
            .collect();
        ranges.sort();
        for w in ranges.windows(2) {
            let (o1, s1) = w[0];
            let (o2, _) = w[1];
            if o1 + s1 > o2 && s1 > 0 {
                return Err(Error::IntegrityViolated(format!(
                    "chunk at {}..{} overlaps chunk at {}",
                    o1,
                    o1 + s1,
                    o2
                )));
            }
        }
        let expected_next = self.next_offset_for_check(node_count);
        if self.next_offset(node_count) < expected_next {
            return Err(Error::IntegrityViolated(
                "next_offset smaller than the furthest live chunk".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_allocate_read_write_roundtrip() {
        let mut idx = UpfrontIndex::create(4096, 512, MIN_CAPACITY);
        idx.insert_slot(0, 0).unwrap();
        let off = idx.allocate_space(1, 0, 5).unwrap();
        assert_eq!(off, 0);
        idx.chunk_data_mut(0).copy_from_slice(b"hello");
        assert_eq!(idx.chunk_data(0), b"hello");
        idx.check_integrity(1).unwrap();
    }

    #[test]
    fn erase_moves_chunk_to_freelist_and_vacuumize_reclaims() {
        let mut idx = UpfrontIndex::create(4096, 512, MIN_CAPACITY);
        for i in 0..3 {
            idx.insert_slot(i, i).unwrap();
            idx.allocate_space(i + 1, i, 10).unwrap();
        }
        idx.erase_slot(3, 1);
        assert_eq!(idx.freelist_count(), 1);
        idx.vacuumize_counter = 100;
        idx.vacuumize(2);
        assert_eq!(idx.freelist_count(), 0);
        idx.check_integrity(2).unwrap();
    }

    #[test]
    fn change_range_size_shrinks_after_compaction_and_rejects_too_small() {
        let mut idx = UpfrontIndex::create(4096, 512, MIN_CAPACITY);
        for i in 0..4 {
            idx.insert_slot(i, i).unwrap();
            idx.allocate_space(i + 1, i, 10).unwrap();
        }
        idx.erase_slot(4, 1);
        let required = idx.required_range_size(3);
        idx.change_range_size(3, required).unwrap();
        idx.check_integrity(3).unwrap();
        assert!(idx.change_range_size(3, required - 1).is_err());
    }

    #[test]
    fn split_moves_tail_chunks_to_other_index() {
        let mut idx = UpfrontIndex::create(4096, 1024, MIN_CAPACITY);
        for i in 0..6 {
            idx.insert_slot(i, i).unwrap();
            idx.allocate_space(i + 1, i, 4).unwrap();
            idx.chunk_data_mut(i).copy_from_slice(&(i as u32).to_le_bytes());
        }
        let mut right = UpfrontIndex::create(4096, 1024, MIN_CAPACITY);
        idx.split(6, 4, &mut right).unwrap();
        idx.check_integrity(4).unwrap();
        right.check_integrity(2).unwrap();
        assert_eq!(u32::from_le_bytes(idx.chunk_data(3).try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(right.chunk_data(0).try_into().unwrap()), 4);
        assert_eq!(u32::from_le_bytes(right.chunk_data(1).try_into().unwrap()), 5);
    }

    #[test]
    fn merge_from_appends_other_index_and_reports_when_it_wont_fit() {
        let mut left = UpfrontIndex::create(4096, 1024, MIN_CAPACITY);
        for i in 0..2 {
            left.insert_slot(i, i).unwrap();
            left.allocate_space(i + 1, i, 4).unwrap();
        }
        let mut right = UpfrontIndex::create(4096, 1024, MIN_CAPACITY);
        for i in 0..2 {
            right.insert_slot(i, i).unwrap();
            right.allocate_space(i + 1, i, 4).unwrap();
            right.chunk_data_mut(i).copy_from_slice(&(i as u32 + 10).to_le_bytes());
        }
        assert!(left.fits_merge(2, &right, 2));
        left.merge_from(2, &right, 2).unwrap();
        left.check_integrity(4).unwrap();
        assert_eq!(u32::from_le_bytes(left.chunk_data(2).try_into().unwrap()), 10);
        assert_eq!(u32::from_le_bytes(left.chunk_data(3).try_into().unwrap()), 11);

        let mut tiny = UpfrontIndex::create(4096, 64, MIN_CAPACITY);
        assert!(!tiny.fits_merge(0, &left, 4));
    }

    #[test]
    fn requires_split_when_capacity_or_space_exhausted() {
        let mut idx = UpfrontIndex::create(4096, 64, MIN_CAPACITY);
        // usable data size is tiny; filling it should trigger a split signal
        let mut count = 0;
        loop {
            if idx.requires_split(count, 8) {
                break;
            }
            idx.insert_slot(count, count).unwrap();
            idx.allocate_space(count + 1, count, 8).unwrap();
            count += 1;
            if count > 64 {
                panic!("requires_split never triggered");
            }
        }
    }
}
