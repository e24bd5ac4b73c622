//! The node's per-slot record store, sharing the slot index with the
//! `KeyList`. Dispatched the same way as `KeyList`:
//! one tagged enum, one indirect match per node operation.

pub mod default;
pub mod duplicate;
pub mod fixed;

use default::DefaultRecordList;
use duplicate::DuplicateRecordList;
use fixed::FixedRecordList;

use crate::btree::blob::BlobManager;
use crate::config::Compressor;
use crate::error::{Error, Result};

/// Which flavor of record storage a leaf (or internal) node uses,
/// chosen once at database-create time from `DatabaseConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Inline(usize),
    Pod(usize),
    Internal,
    Default,
    Duplicate,
}

pub enum RecordList {
    Fixed(FixedRecordList),
    Default(DefaultRecordList),
    Duplicate(DuplicateRecordList),
}

pub fn create(kind: RecordKind, page_size: u32, range_size: usize, capacity_hint: usize, dup_threshold: usize) -> RecordList {
    match kind {
        RecordKind::Inline(size) => RecordList::Fixed(FixedRecordList::create(size, range_size)),
        RecordKind::Pod(size) => RecordList::Fixed(FixedRecordList::create(size, range_size)),
        RecordKind::Internal => RecordList::Fixed(FixedRecordList::create(8, range_size)),
        RecordKind::Default => RecordList::Default(DefaultRecordList::create(range_size)),
        RecordKind::Duplicate => RecordList::Duplicate(DuplicateRecordList::create(page_size, range_size, capacity_hint, dup_threshold)),
    }
}

impl RecordList {
    pub fn range_size(&self) -> usize {
        match self {
            RecordList::Fixed(r) => r.range_size(),
            RecordList::Default(r) => r.range_size(),
            RecordList::Duplicate(r) => r.range_size(),
        }
    }

    pub fn requires_split(&mut self, count: usize) -> bool {
        match self {
            RecordList::Fixed(r) => r.requires_split(count),
            RecordList::Default(r) => r.requires_split(count),
            RecordList::Duplicate(r) => r.requires_split(count),
        }
    }

    /// Single-record accessor; for `Duplicate` this reads the record at
    /// duplicate index 0 (callers that care about the full run use the
    /// `*_duplicate` methods directly against the `Duplicate` variant).
    pub fn get(&self, slot: usize, blobs: &BlobManager) -> Result<Vec<u8>> {
        match self {
            RecordList::Fixed(r) => Ok(r.get(slot).to_vec()),
            RecordList::Default(r) => r.get(slot, blobs),
            RecordList::Duplicate(r) => r.get(slot, 0, blobs),
        }
    }

    pub fn insert(
        &mut self,
        count: usize,
        slot: usize,
        value: &[u8],
        compressor: Compressor,
        blobs: &BlobManager,
    ) -> Result<()> {
        match self {
            RecordList::Fixed(r) => r.insert(count, slot, value),
            RecordList::Default(r) => r.insert(count, slot, value, compressor, blobs),
            RecordList::Duplicate(r) => {
                r.insert_slot(count, slot)?;
                r.insert_duplicate(count + 1, slot, 0, value, compressor, blobs)
            }
        }
    }

    pub fn erase(&mut self, count: usize, slot: usize, blobs: &BlobManager) -> Result<()> {
        match self {
            RecordList::Fixed(r) => {
                r.erase(count, slot);
                Ok(())
            }
            RecordList::Default(r) => r.erase(count, slot, blobs),
            RecordList::Duplicate(r) => r.erase_slot(count, slot, blobs),
        }
    }

    /// Overwrites the record already occupying `slot`, without touching
    /// the key index. Not meaningful for `Duplicate` lists, which hold a
    /// run of records per slot rather than one: callers update those
    /// through `as_duplicate` directly.
    pub fn set(&mut self, slot: usize, value: &[u8], compressor: Compressor, blobs: &BlobManager) -> Result<()> {
        match self {
            RecordList::Fixed(r) => r.set(slot, value),
            RecordList::Default(r) => r.set_record(slot, value, compressor, blobs),
            RecordList::Duplicate(_) => Err(Error::InvParameter("use as_duplicate() to update a duplicate run")),
        }
    }

    pub fn as_duplicate(&mut self) -> Option<&mut DuplicateRecordList> {
        match self {
            RecordList::Duplicate(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_fixed(&mut self) -> Option<&mut FixedRecordList> {
        match self {
            RecordList::Fixed(r) => Some(r),
            _ => None,
        }
    }

    /// Minimum byte range needed to hold `count` records, used to
    /// decide how much slack a region can give up when shifting the
    /// KeyList/RecordList boundary.
    pub fn required_range_size(&self, count: usize) -> usize {
        match self {
            RecordList::Fixed(r) => r.required_range_size(count),
            RecordList::Default(r) => r.required_range_size(count),
            RecordList::Duplicate(r) => r.required_range_size(count),
        }
    }

    /// Grows or shrinks the region backing this list; fails with
    /// `LimitsReached` if `new_size` is below `required_range_size`.
    pub fn change_range_size(&mut self, count: usize, new_size: usize) -> Result<()> {
        match self {
            RecordList::Fixed(r) => {
                if new_size < r.required_range_size(count) {
                    return Err(Error::LimitsReached);
                }
                r.change_range_size(new_size);
                Ok(())
            }
            RecordList::Default(r) => {
                if new_size < r.required_range_size(count) {
                    return Err(Error::LimitsReached);
                }
                r.change_range_size(new_size);
                Ok(())
            }
            RecordList::Duplicate(r) => r.change_range_size(count, new_size),
        }
    }

    /// Splits off records `[pivot, count)` from `self` into `other`,
    /// which must be a freshly-created list of the same variant.
    pub fn split(&mut self, count: usize, pivot: usize, other: &mut RecordList) -> Result<()> {
        match (self, other) {
            (RecordList::Fixed(a), RecordList::Fixed(b)) => {
                a.split(count, pivot, b);
                Ok(())
            }
            (RecordList::Default(a), RecordList::Default(b)) => {
                a.split(count, pivot, b);
                Ok(())
            }
            (RecordList::Duplicate(a), RecordList::Duplicate(b)) => a.split(count, pivot, b),
            _ => Err(Error::InvParameter("record list variant mismatch on split")),
        }
    }

    /// Whether `other`'s first `other_count` records would fit
    /// alongside `self`'s first `count`.
    pub fn fits_merge(&mut self, count: usize, other: &RecordList, other_count: usize) -> bool {
        match (self, other) {
            (RecordList::Fixed(a), RecordList::Fixed(_)) => a.required_range_size(count + other_count) <= a.range_size(),
            (RecordList::Default(a), RecordList::Default(_)) => a.required_range_size(count + other_count) <= a.range_size(),
            (RecordList::Duplicate(a), RecordList::Duplicate(b)) => a.fits_merge(count, b, other_count),
            _ => false,
        }
    }

    /// Appends `other`'s first `other_count` records after `self`'s
    /// first `count`.
    pub fn merge_from(&mut self, count: usize, other: &mut RecordList, other_count: usize) -> Result<()> {
        match (self, other) {
            (RecordList::Fixed(a), RecordList::Fixed(b)) => {
                a.merge_from(count, b, other_count);
                Ok(())
            }
            (RecordList::Default(a), RecordList::Default(b)) => {
                a.merge_from(count, b, other_count);
                Ok(())
            }
            (RecordList::Duplicate(a), RecordList::Duplicate(b)) => a.merge_from(count, b, other_count),
            _ => Err(Error::InvParameter("record list variant mismatch on merge")),
        }
    }
}
