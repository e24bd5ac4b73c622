//! `POD<T>` key list: a plain, fixed-width array. `T` is
//! erased to its byte width at construction time (1/2/4/8), matching
//! the node's `KeyType`; the bound `Comparator` supplies ordering.

use crate::btree::comparator::Comparator;
use crate::error::{Error, Result};

pub struct PodKeyList {
    width: usize,
    data: Vec<u8>,
}

impl PodKeyList {
    pub fn create(width: usize, range_size: usize) -> Self {
        Self {
            width,
            data: vec![0u8; range_size],
        }
    }

    pub fn open(width: usize, data: Vec<u8>) -> Self {
        Self { width, data }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn range_size(&self) -> usize {
        self.data.len()
    }

    pub fn required_range_size(&self, count: usize) -> usize {
        count * self.width
    }

    pub fn requires_split(&self, count: usize) -> bool {
        (count + 1) * self.width > self.data.len()
    }

    pub fn key_at(&self, slot: usize) -> &[u8] {
        &self.data[slot * self.width..(slot + 1) * self.width]
    }

    /// Binary search over `0..count`; returns the slot at which `key`
    /// sits or would be inserted, and whether it is an exact match.
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
        if key.len() != self.width {
            return Err(Error::InvKeySize);
        }
        if self.requires_split(count) {
            return Err(Error::LimitsReached);
        }
        let end = count * self.width;
        self.data.copy_within(slot * self.width..end, (slot + 1) * self.width);
        self.data[slot * self.width..(slot + 1) * self.width].copy_from_slice(key);
        Ok(())
    }

    pub fn erase(&mut self, count: usize, slot: usize) {
        let start = (slot + 1) * self.width;
        let end = count * self.width;
        if start < end {
            self.data.copy_within(start..end, slot * self.width);
        }
    }

    pub fn change_range_size(&mut self, new_size: usize) {
        self.data.resize(new_size, 0);
    }

    /// Moves keys `[pivot, count)` out of `self` and into `other`
    /// (assumed empty), for a node split.
    pub fn split(&mut self, count: usize, pivot: usize, other: &mut Self) {
        let moved = self.data[pivot * self.width..count * self.width].to_vec();
        other.data[..moved.len()].copy_from_slice(&moved);
        self.data[pivot * self.width..count * self.width].fill(0);
    }

    /// Appends `other`'s first `other_count` keys after `self`'s first
    /// `count`, for a node merge.
    pub fn merge_from(&mut self, count: usize, other: &Self, other_count: usize) {
        let src_len = other_count * other.width;
        self.data[count * self.width..count * self.width + src_len].copy_from_slice(&other.data[..src_len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_sorted_order() {
        let mut kl = PodKeyList::create(4, 64);
        let cmp = Comparator::UintMemcmp { width: 4 };
        let keys = [5u32, 1, 9, 3];
        let mut count = 0;
        for &k in &keys {
            let bytes = k.to_le_bytes();
            let (slot, exact) = kl.find_lower_bound(count, &bytes, &cmp);
            assert!(!exact);
            kl.insert(count, slot, &bytes).unwrap();
            count += 1;
        }
        let mut out = vec![];
        for i in 0..count {
            out.push(u32::from_le_bytes(kl.key_at(i).try_into().unwrap()));
        }
        assert_eq!(out, vec![1, 3, 5, 9]);
    }
}
