//! `Binary(fixed_size)` key list: identical layout and
//! operations to `PodKeyList`, just addressed by an arbitrary
//! `fixed_size` rather than a primitive width.

use crate::btree::comparator::Comparator;
use crate::error::{Error, Result};

pub struct BinaryKeyList {
    fixed_size: usize,
    data: Vec<u8>,
}

impl BinaryKeyList {
    pub fn create(fixed_size: usize, range_size: usize) -> Self {
        Self {
            fixed_size,
            data: vec![0u8; range_size],
        }
    }

    pub fn open(fixed_size: usize, data: Vec<u8>) -> Self {
        Self { fixed_size, data }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn range_size(&self) -> usize {
        self.data.len()
    }

    pub fn required_range_size(&self, count: usize) -> usize {
        count * self.fixed_size
    }

    pub fn requires_split(&self, count: usize) -> bool {
        (count + 1) * self.fixed_size > self.data.len()
    }

    pub fn key_at(&self, slot: usize) -> &[u8] {
        &self.data[slot * self.fixed_size..(slot + 1) * self.fixed_size]
    }

    pub fn find_lower_bound(&self, count: usize, key: &[u8], cmp: &Comparator) -> (usize, bool) {
        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match cmp.compare(self.key_at(mid), key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                _ => hi = mid,
            }
        }
        let exact = lo < count && cmp.compare(self.key_at(lo), key) == std::cmp::Ordering::Equal;
        (lo, exact)
    }

    pub fn insert(&mut self, count: usize, slot: usize, key: &[u8]) -> Result<()> {
        if key.len() != self.fixed_size {
            return Err(Error::InvKeySize);
        }
        if self.requires_split(count) {
            return Err(Error::LimitsReached);
        }
        let end = count * self.fixed_size;
        self.data
            .copy_within(slot * self.fixed_size..end, (slot + 1) * self.fixed_size);
        self.data[slot * self.fixed_size..(slot + 1) * self.fixed_size].copy_from_slice(key);
        Ok(())
    }

    pub fn erase(&mut self, count: usize, slot: usize) {
        let start = (slot + 1) * self.fixed_size;
        let end = count * self.fixed_size;
        if start < end {
            self.data.copy_within(start..end, slot * self.fixed_size);
        }
    }

    pub fn change_range_size(&mut self, new_size: usize) {
        self.data.resize(new_size, 0);
    }

    pub fn split(&mut self, count: usize, pivot: usize, other: &mut Self) {
        let moved = self.data[pivot * self.fixed_size..count * self.fixed_size].to_vec();
        other.data[..moved.len()].copy_from_slice(&moved);
        self.data[pivot * self.fixed_size..count * self.fixed_size].fill(0);
    }

    pub fn merge_from(&mut self, count: usize, other: &Self, other_count: usize) {
        let src_len = other_count * other.fixed_size;
        self.data[count * self.fixed_size..count * self.fixed_size + src_len].copy_from_slice(&other.data[..src_len]);
    }
}
