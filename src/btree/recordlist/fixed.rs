//! Shared implementation backing `InlineRecord(k)`, `PodRecord<T>` and
//! `InternalRecord`: all three are a flat array of
//! fixed-width cells, addressed by the node's shared slot index. They
//! differ only in what the caller puts in a cell (raw bytes, a POD
//! value, or a child page id), so one generic implementation serves
//! all three instead of three near-identical structs.

use crate::error::{Error, Result};

pub struct FixedRecordList {
    cell_size: usize,
    data: Vec<u8>,
}

impl FixedRecordList {
    pub fn create(cell_size: usize, range_size: usize) -> Self {
        Self {
            cell_size,
            data: vec![0u8; range_size],
        }
    }

    pub fn open(cell_size: usize, data: Vec<u8>) -> Self {
        Self { cell_size, data }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn range_size(&self) -> usize {
        self.data.len()
    }

    pub fn required_range_size(&self, count: usize) -> usize {
        count * self.cell_size
    }

    pub fn requires_split(&self, count: usize) -> bool {
        (count + 1) * self.cell_size > self.data.len()
    }

    pub fn get(&self, slot: usize) -> &[u8] {
        &self.data[slot * self.cell_size..(slot + 1) * self.cell_size]
    }

    pub fn set(&mut self, slot: usize, value: &[u8]) -> Result<()> {
        if value.len() != self.cell_size {
            return Err(Error::InvParameter("record size does not match the list's fixed cell size"));
        }
        self.data[slot * self.cell_size..(slot + 1) * self.cell_size].copy_from_slice(value);
        Ok(())
    }

    pub fn insert(&mut self, count: usize, slot: usize, value: &[u8]) -> Result<()> {
        if self.requires_split(count) {
            return Err(Error::LimitsReached);
        }
        let end = count * self.cell_size;
        self.data
            .copy_within(slot * self.cell_size..end, (slot + 1) * self.cell_size);
        self.set(slot, value)
    }

    pub fn erase(&mut self, count: usize, slot: usize) {
        let start = (slot + 1) * self.cell_size;
        let end = count * self.cell_size;
        if start < end {
            self.data.copy_within(start..end, slot * self.cell_size);
        }
    }

    pub fn change_range_size(&mut self, new_size: usize) {
        self.data.resize(new_size, 0);
    }

    pub fn split(&mut self, count: usize, pivot: usize, other: &mut Self) {
        let moved = self.data[pivot * self.cell_size..count * self.cell_size].to_vec();
        other.data[..moved.len()].copy_from_slice(&moved);
        self.data[pivot * self.cell_size..count * self.cell_size].fill(0);
    }

    pub fn merge_from(&mut self, count: usize, other: &Self, other_count: usize) {
        let src_len = other_count * other.cell_size;
        self.data[count * self.cell_size..count * self.cell_size + src_len].copy_from_slice(&other.data[..src_len]);
    }
}
