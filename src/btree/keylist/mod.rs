//! The node's typed, sorted key sequence. Runtime-dispatched
//! via a tagged enum per the "template dispatch → runtime dispatch"
//! design choice: one indirect `match` per node
//! operation rather than monomorphized code per `KeyType`.

pub mod binary;
pub mod pod;
pub mod variable;
pub mod zint32;

use binary::BinaryKeyList;
use pod::PodKeyList;
use variable::VariableKeyList;
use zint32::{Zint32Codec, Zint32KeyList};

use crate::btree::blob::BlobManager;
use crate::btree::comparator::Comparator;
use crate::config::{Compressor, DatabaseConfig, KeyType};
use crate::error::{Error, Result};

pub enum KeyList {
    Pod(PodKeyList),
    Binary(BinaryKeyList),
    Variable(VariableKeyList),
    Zint32(Zint32KeyList),
}

/// Chooses a variant for a database's declared key configuration; keys
/// with a codec in `{Varbyte, GroupVarint}` and `KeyType::Uint32` get
/// the Zint32 block list, everything else a POD/Binary/Variable array.
pub fn choose_variant(
    config: &DatabaseConfig,
    page_size: u32,
    range_size: usize,
    capacity_hint: usize,
) -> Result<KeyList> {
    if config.key_type == KeyType::Uint32
        && matches!(config.key_compressor, Compressor::Varbyte | Compressor::GroupVarint)
    {
        let codec = Zint32Codec::from_compressor(config.key_compressor)?;
        return Ok(KeyList::Zint32(Zint32KeyList::create(range_size, codec)));
    }
    if let Some(width) = config.key_type.pod_size() {
        return Ok(KeyList::Pod(PodKeyList::create(width, range_size)));
    }
    if config.key_size > 0 {
        return Ok(KeyList::Binary(BinaryKeyList::create(config.key_size as usize, range_size)));
    }
    Ok(KeyList::Variable(VariableKeyList::create(page_size, range_size, capacity_hint)))
}

impl KeyList {
    pub fn range_size(&self) -> usize {
        match self {
            KeyList::Pod(k) => k.range_size(),
            KeyList::Binary(k) => k.range_size(),
            KeyList::Variable(k) => k.range_size(),
            KeyList::Zint32(k) => k.range_size(),
        }
    }

    pub fn requires_split(&mut self, count: usize, key: &[u8], threshold: usize) -> bool {
        match self {
            KeyList::Pod(k) => k.requires_split(count),
            KeyList::Binary(k) => k.requires_split(count),
            KeyList::Variable(k) => k.requires_split(count, key.len(), threshold),
            KeyList::Zint32(k) => k.requires_split(count),
        }
    }

    pub fn find_lower_bound(
        &mut self,
        count: usize,
        key: &[u8],
        cmp: &Comparator,
        blobs: &BlobManager,
    ) -> Result<(usize, bool)> {
        match self {
            KeyList::Pod(k) => Ok(k.find_lower_bound(count, key, cmp)),
            KeyList::Binary(k) => Ok(k.find_lower_bound(count, key, cmp)),
            KeyList::Variable(k) => k.find_lower_bound(count, key, cmp, blobs),
            KeyList::Zint32(k) => {
                let key_u32 = u32::from_le_bytes(key.try_into().unwrap());
                Ok(k.find_lower_bound(key_u32))
            }
        }
    }

    pub fn key_at(&mut self, slot: usize, blobs: &BlobManager) -> Result<Vec<u8>> {
        match self {
            KeyList::Pod(k) => Ok(k.key_at(slot).to_vec()),
            KeyList::Binary(k) => Ok(k.key_at(slot).to_vec()),
            KeyList::Variable(k) => k.key_at(slot, blobs),
            KeyList::Zint32(k) => {
                let keys = k.materialize_all();
                Ok(keys[slot].to_le_bytes().to_vec())
            }
        }
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
        match self {
            KeyList::Pod(k) => k.insert(count, slot, key),
            KeyList::Binary(k) => k.insert(count, slot, key),
            KeyList::Variable(k) => k.insert(count, slot, key, threshold, compressor, blobs),
            KeyList::Zint32(k) => {
                let key_u32 = u32::from_le_bytes(key.try_into().unwrap());
                k.insert(key_u32)
            }
        }
    }

    pub fn erase(&mut self, count: usize, slot: usize, blobs: &BlobManager) -> Result<()> {
        match self {
            KeyList::Pod(k) => {
                k.erase(count, slot);
                Ok(())
            }
            KeyList::Binary(k) => {
                k.erase(count, slot);
                Ok(())
            }
            KeyList::Variable(k) => k.erase(count, slot, blobs),
            KeyList::Zint32(k) => {
                let keys = k.materialize_all();
                k.erase(keys[slot])
            }
        }
    }

    pub fn check_integrity(&mut self, count: usize) -> Result<()> {
        match self {
            KeyList::Pod(_) | KeyList::Binary(_) => Ok(()),
            KeyList::Variable(k) => k.check_integrity(count),
            KeyList::Zint32(k) => k.check_integrity(),
        }
    }

    /// Minimum byte range needed to hold `count` keys, used to decide
    /// how much slack a region can give up when shifting the
    /// KeyList/RecordList boundary.
    pub fn required_range_size(&self, count: usize) -> usize {
        match self {
            KeyList::Pod(k) => k.required_range_size(count),
            KeyList::Binary(k) => k.required_range_size(count),
            KeyList::Variable(k) => k.required_range_size(count),
            KeyList::Zint32(k) => k.required_range_size(count),
        }
    }

    /// Grows or shrinks the region backing this list; fails with
    /// `LimitsReached` if `new_size` is below `required_range_size`.
    pub fn change_range_size(&mut self, count: usize, new_size: usize) -> Result<()> {
        match self {
            KeyList::Pod(k) => {
                if new_size < k.required_range_size(count) {
                    return Err(Error::LimitsReached);
                }
                k.change_range_size(new_size);
                Ok(())
            }
            KeyList::Binary(k) => {
                if new_size < k.required_range_size(count) {
                    return Err(Error::LimitsReached);
                }
                k.change_range_size(new_size);
                Ok(())
            }
            KeyList::Variable(k) => k.change_range_size(count, new_size),
            KeyList::Zint32(k) => k.change_range_size(count, new_size),
        }
    }

    /// Splits off keys `[pivot, count)` from `self` into `other`, which
    /// must be a freshly-created list of the same variant.
    pub fn split(&mut self, count: usize, pivot: usize, other: &mut KeyList) -> Result<()> {
        match (self, other) {
            (KeyList::Pod(a), KeyList::Pod(b)) => {
                a.split(count, pivot, b);
                Ok(())
            }
            (KeyList::Binary(a), KeyList::Binary(b)) => {
                a.split(count, pivot, b);
                Ok(())
            }
            (KeyList::Variable(a), KeyList::Variable(b)) => a.split(count, pivot, b),
            (KeyList::Zint32(a), KeyList::Zint32(b)) => a.split(pivot, b),
            _ => Err(Error::InvParameter("key list variant mismatch on split")),
        }
    }

    /// Whether `other`'s first `other_count` keys would fit alongside
    /// `self`'s first `count`.
    pub fn fits_merge(&mut self, count: usize, other: &KeyList, other_count: usize) -> bool {
        match (self, other) {
            (KeyList::Pod(a), KeyList::Pod(_)) => a.required_range_size(count + other_count) <= a.range_size(),
            (KeyList::Binary(a), KeyList::Binary(_)) => a.required_range_size(count + other_count) <= a.range_size(),
            (KeyList::Variable(a), KeyList::Variable(b)) => a.fits_merge(count, b, other_count),
            (KeyList::Zint32(a), KeyList::Zint32(b)) => a.fits_merge(b),
            _ => false,
        }
    }

    /// Appends `other`'s first `other_count` keys after `self`'s first
    /// `count`.
    pub fn merge_from(&mut self, count: usize, other: &mut KeyList, other_count: usize) -> Result<()> {
        match (self, other) {
            (KeyList::Pod(a), KeyList::Pod(b)) => {
                a.merge_from(count, b, other_count);
                Ok(())
            }
            (KeyList::Binary(a), KeyList::Binary(b)) => {
                a.merge_from(count, b, other_count);
                Ok(())
            }
            (KeyList::Variable(a), KeyList::Variable(b)) => a.merge_from(count, b, other_count),
            (KeyList::Zint32(a), KeyList::Zint32(b)) => a.merge_from(b),
            _ => Err(Error::InvParameter("key list variant mismatch on merge")),
        }
    }
}
