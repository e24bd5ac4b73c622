//! Per-page btree node framing: `[NodeHeader | KeyList
//! region | RecordList region]`. The page-level header (`lsn`, `flags`,
//! `type`, `crc32`) lives on the in-memory `Page` struct rather than in
//! the byte buffer — see DESIGN.md: CRC32/encryption are explicit
//! out-of-scope filters, so there is nothing that exercises a
//! serialized page header here.
//!
//! The `range_split` boundary between the two regions starts as an
//! even split of the usable body, but is not fixed: `requires_split`
//! first tries `try_shift_boundary`, handing the overflowing region
//! whatever slack the other region can give up, before reporting that
//! an actual page split is needed.

use crate::btree::blob::BlobManager;
use crate::btree::comparator::Comparator;
use crate::btree::keylist::{self, KeyList};
use crate::btree::recordlist::{self, RecordKind, RecordList};
use crate::config::{Compressor, DatabaseConfig};
use crate::error::{Error, Result};
use crate::types::PageAddress;

pub const NODE_HEADER_SIZE: usize = 2 + 2 + 8 + 8 + 8 + 2;

const FLAG_LEAF: u16 = 0x1;
const FLAG_HAS_DUPLICATES: u16 = 0x2;

pub struct NodeHeader {
    pub count: u16,
    pub is_leaf: bool,
    pub has_duplicates: bool,
    pub left_sibling: PageAddress,
    pub right_sibling: PageAddress,
    /// Leftmost child for internal nodes; unused on leaves.
    pub ptr_down: PageAddress,
    pub range_split: u16,
}

impl NodeHeader {
    fn parse(bytes: &[u8]) -> Self {
        let count = u16::from_le_bytes(bytes[0..2].try_into().unwrap());
        let flags = u16::from_le_bytes(bytes[2..4].try_into().unwrap());
        let left_sibling = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
        let right_sibling = u64::from_le_bytes(bytes[12..20].try_into().unwrap());
        let ptr_down = u64::from_le_bytes(bytes[20..28].try_into().unwrap());
        let range_split = u16::from_le_bytes(bytes[28..30].try_into().unwrap());
        Self {
            count,
            is_leaf: flags & FLAG_LEAF != 0,
            has_duplicates: flags & FLAG_HAS_DUPLICATES != 0,
            left_sibling,
            right_sibling,
            ptr_down,
            range_split,
        }
    }

    fn write(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.count.to_le_bytes());
        let mut flags = 0u16;
        if self.is_leaf {
            flags |= FLAG_LEAF;
        }
        if self.has_duplicates {
            flags |= FLAG_HAS_DUPLICATES;
        }
        out[2..4].copy_from_slice(&flags.to_le_bytes());
        out[4..12].copy_from_slice(&self.left_sibling.to_le_bytes());
        out[12..20].copy_from_slice(&self.right_sibling.to_le_bytes());
        out[20..28].copy_from_slice(&self.ptr_down.to_le_bytes());
        out[28..30].copy_from_slice(&self.range_split.to_le_bytes());
    }
}

pub struct BtreeNode {
    pub header: NodeHeader,
    pub keys: KeyList,
    pub records: RecordList,
    page_size: usize,
}

/// Picks the record flavor for a leaf from database config:
/// duplicate keys enabled -> `Duplicate`; unlimited record size or a
/// record wider than 8 bytes -> `Default` (inline-or-blob); otherwise a
/// trivial fixed-width inline array.
fn leaf_record_kind(config: &DatabaseConfig) -> RecordKind {
    if config.enable_duplicate_keys {
        RecordKind::Duplicate
    } else if config.record_size == 0 || config.record_size > 8 {
        RecordKind::Default
    } else {
        RecordKind::Inline(config.record_size as usize)
    }
}

impl BtreeNode {
    pub fn create(page_size: usize, is_leaf: bool, config: &DatabaseConfig) -> Result<Self> {
        let usable = page_size - NODE_HEADER_SIZE;
        let key_range = usable / 2;
        let record_range = usable - key_range;
        let extended_threshold = config.resolved_extended_key_threshold(page_size as u32);
        let dup_threshold = config.resolved_duplicate_threshold(page_size as u32);

        let keys = keylist::choose_variant(config, page_size as u32, key_range, 32)?;
        let kind = if is_leaf {
            leaf_record_kind(config)
        } else {
            RecordKind::Internal
        };
        let records = recordlist::create(kind, page_size as u32, record_range, 32, dup_threshold);

        let _ = extended_threshold;
        Ok(Self {
            header: NodeHeader {
                count: 0,
                is_leaf,
                has_duplicates: config.enable_duplicate_keys,
                left_sibling: 0,
                right_sibling: 0,
                ptr_down: 0,
                range_split: key_range as u16,
            },
            keys,
            records,
            page_size,
        })
    }

    pub fn open(bytes: &[u8], config: &DatabaseConfig, record_kind_override: Option<RecordKind>) -> Result<Self> {
        let page_size = bytes.len();
        let header = NodeHeader::parse(&bytes[0..NODE_HEADER_SIZE]);
        let key_region = bytes[NODE_HEADER_SIZE..NODE_HEADER_SIZE + header.range_split as usize].to_vec();
        let record_region = bytes[NODE_HEADER_SIZE + header.range_split as usize..].to_vec();

        let keys = open_keylist(config, page_size as u32, key_region)?;
        let kind = record_kind_override.unwrap_or_else(|| {
            if header.is_leaf {
                leaf_record_kind(config)
            } else {
                RecordKind::Internal
            }
        });
        let records = open_recordlist(kind, page_size as u32, record_region, config.resolved_duplicate_threshold(page_size as u32));

        Ok(Self {
            header,
            keys,
            records,
            page_size,
        })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = vec![0u8; self.page_size];
        self.header.write(&mut out[0..NODE_HEADER_SIZE]);
        let key_bytes = keylist_into_bytes(self.keys);
        let record_bytes = recordlist_into_bytes(self.records);
        let key_end = NODE_HEADER_SIZE + key_bytes.len();
        out[NODE_HEADER_SIZE..key_end].copy_from_slice(&key_bytes);
        out[key_end..key_end + record_bytes.len()].copy_from_slice(&record_bytes);
        out
    }

    pub fn find_lower_bound(&mut self, key: &[u8], cmp: &Comparator, blobs: &BlobManager) -> Result<(usize, bool)> {
        self.keys.find_lower_bound(self.header.count as usize, key, cmp, blobs)
    }

    pub fn requires_split(&mut self, key: &[u8], extended_key_threshold: usize) -> bool {
        let count = self.header.count as usize;
        if !self.keys.requires_split(count, key, extended_key_threshold) && !self.records.requires_split(count) {
            return false;
        }
        !self.try_shift_boundary(key, extended_key_threshold)
    }

    /// Responds to a region overflow by handing the overflowing region
    /// whatever slack the other region can give up, rather than
    /// splitting the page outright. Returns whether the shift (if any)
    /// was enough to make room.
    fn try_shift_boundary(&mut self, key: &[u8], extended_key_threshold: usize) -> bool {
        let count = self.header.count as usize;
        let keys_over = self.keys.requires_split(count, key, extended_key_threshold);
        let records_over = self.records.requires_split(count);
        if keys_over && records_over {
            return false;
        }
        let total = self.keys.range_size() + self.records.range_size();

        if keys_over {
            let slack = self.records.range_size().saturating_sub(self.records.required_range_size(count));
            if slack == 0 {
                return false;
            }
            let new_key_range = self.keys.range_size() + slack;
            let new_record_range = total - new_key_range;
            if self.keys.change_range_size(count, new_key_range).is_err() {
                return false;
            }
            if self.records.change_range_size(count, new_record_range).is_err() {
                let _ = self.keys.change_range_size(count, total - self.records.range_size());
                return false;
            }
            self.header.range_split = new_key_range as u16;
            !self.keys.requires_split(count, key, extended_key_threshold)
        } else {
            let slack = self.keys.range_size().saturating_sub(self.keys.required_range_size(count));
            if slack == 0 {
                return false;
            }
            let new_record_range = self.records.range_size() + slack;
            let new_key_range = total - new_record_range;
            if self.records.change_range_size(count, new_record_range).is_err() {
                return false;
            }
            if self.keys.change_range_size(count, new_key_range).is_err() {
                let _ = self.records.change_range_size(count, total - self.keys.range_size());
                return false;
            }
            self.header.range_split = new_key_range as u16;
            !self.records.requires_split(count)
        }
    }

    /// Splits this node in place: keys/records `[pivot, count)` move
    /// into a freshly created sibling node of the same shape
    /// (leaf/internal, record kind), leaving `self` holding `0..pivot`.
    pub fn split(&mut self, pivot: usize, config: &DatabaseConfig) -> Result<Self> {
        let count = self.header.count as usize;
        let mut sibling = Self::create(self.page_size, self.header.is_leaf, config)?;
        // Give the sibling the same total range `self` currently has
        // (which may already be boundary-shifted away from 50/50), so
        // the moved tail always fits regardless of how the boundary sits.
        sibling.keys.change_range_size(0, self.keys.range_size())?;
        sibling.records.change_range_size(0, self.records.range_size())?;
        sibling.header.range_split = sibling.keys.range_size() as u16;

        self.keys.split(count, pivot, &mut sibling.keys)?;
        self.records.split(count, pivot, &mut sibling.records)?;
        sibling.header.count = (count - pivot) as u16;
        sibling.header.has_duplicates = self.header.has_duplicates;
        self.header.count = pivot as u16;
        Ok(sibling)
    }

    /// Whether `other`'s live entries would fit merged into `self`.
    pub fn fits_merge(&mut self, other: &mut BtreeNode) -> bool {
        let count = self.header.count as usize;
        let other_count = other.header.count as usize;
        self.keys.fits_merge(count, &other.keys, other_count) && self.records.fits_merge(count, &other.records, other_count)
    }

    /// Appends `other`'s entries after `self`'s own, growing `self` in
    /// place. Callers should check `fits_merge` first.
    pub fn merge(&mut self, other: &mut BtreeNode) -> Result<()> {
        let count = self.header.count as usize;
        let other_count = other.header.count as usize;
        self.keys.merge_from(count, &mut other.keys, other_count)?;
        self.records.merge_from(count, &mut other.records, other_count)?;
        self.header.count += other.header.count;
        Ok(())
    }

    pub fn insert_leaf(
        &mut self,
        slot: usize,
        key: &[u8],
        value: &[u8],
        extended_key_threshold: usize,
        key_compressor: Compressor,
        record_compressor: Compressor,
        blobs: &BlobManager,
    ) -> Result<()> {
        let count = self.header.count as usize;
        self.keys.insert(count, slot, key, extended_key_threshold, key_compressor, blobs)?;
        self.records.insert(count, slot, value, record_compressor, blobs)?;
        self.header.count += 1;
        Ok(())
    }

    pub fn insert_internal(&mut self, slot: usize, key: &[u8], child: PageAddress, extended_key_threshold: usize, blobs: &BlobManager) -> Result<()> {
        let count = self.header.count as usize;
        self.keys.insert(count, slot, key, extended_key_threshold, Compressor::None, blobs)?;
        self.records.insert(count, slot, &child.to_le_bytes(), Compressor::None, blobs)?;
        self.header.count += 1;
        Ok(())
    }

    /// Overwrites the record at an existing leaf slot (the `Overwrite`
    /// insert path); the key at that slot is left untouched.
    pub fn set_leaf_record(&mut self, slot: usize, value: &[u8], record_compressor: Compressor, blobs: &BlobManager) -> Result<()> {
        self.records.set(slot, value, record_compressor, blobs)
    }

    pub fn erase_leaf(&mut self, slot: usize, blobs: &BlobManager) -> Result<()> {
        let count = self.header.count as usize;
        self.keys.erase(count, slot, blobs)?;
        self.records.erase(count, slot, blobs)?;
        self.header.count -= 1;
        Ok(())
    }

    pub fn erase_internal(&mut self, slot: usize, blobs: &BlobManager) -> Result<()> {
        self.erase_leaf(slot, blobs)
    }

    /// Child page address for descent at internal-node `slot`: `slot ==
    /// 0` is `ptr_down`, otherwise `records[slot - 1]`.
    pub fn child_at(&mut self, slot: usize, blobs: &BlobManager) -> Result<PageAddress> {
        if slot == 0 {
            Ok(self.header.ptr_down)
        } else {
            let bytes = self.records.get(slot - 1, blobs)?;
            Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
        }
    }

    pub fn check_integrity(&mut self) -> Result<()> {
        self.keys.check_integrity(self.header.count as usize)
    }
}

fn open_keylist(config: &DatabaseConfig, page_size: u32, region: Vec<u8>) -> Result<KeyList> {
    use crate::btree::keylist::{binary::BinaryKeyList, pod::PodKeyList, variable::VariableKeyList, zint32::{Zint32Codec, Zint32KeyList}};
    use crate::config::Compressor as C;

    if config.key_type == crate::config::KeyType::Uint32 && matches!(config.key_compressor, C::Varbyte | C::GroupVarint) {
        let codec = Zint32Codec::from_compressor(config.key_compressor)?;
        let _ = page_size;
        return Ok(KeyList::Zint32(Zint32KeyList::from_bytes(region, codec)));
    }
    if let Some(width) = config.key_type.pod_size() {
        return Ok(KeyList::Pod(PodKeyList::open(width, region)));
    }
    if config.key_size > 0 {
        return Ok(KeyList::Binary(BinaryKeyList::open(config.key_size as usize, region)));
    }
    Ok(KeyList::Variable(VariableKeyList::open(page_size, region)))
}

fn keylist_into_bytes(kl: KeyList) -> Vec<u8> {
    match kl {
        KeyList::Pod(k) => k.into_bytes(),
        KeyList::Binary(k) => k.into_bytes(),
        KeyList::Variable(k) => k.into_bytes(),
        KeyList::Zint32(k) => k.to_bytes(),
    }
}

fn open_recordlist(kind: RecordKind, page_size: u32, region: Vec<u8>, dup_threshold: usize) -> RecordList {
    use crate::btree::recordlist::{default::DefaultRecordList, duplicate::DuplicateRecordList, fixed::FixedRecordList};
    match kind {
        RecordKind::Inline(size) | RecordKind::Pod(size) => RecordList::Fixed(FixedRecordList::open(size, region)),
        RecordKind::Internal => RecordList::Fixed(FixedRecordList::open(8, region)),
        RecordKind::Default => RecordList::Default(DefaultRecordList::open(region)),
        RecordKind::Duplicate => RecordList::Duplicate(DuplicateRecordList::open(page_size, region, dup_threshold)),
    }
}

fn recordlist_into_bytes(rl: RecordList) -> Vec<u8> {
    match rl {
        RecordList::Fixed(r) => r.into_bytes(),
        RecordList::Default(r) => r.into_bytes(),
        RecordList::Duplicate(r) => r.into_bytes(),
    }
}

pub fn classify_record_kind(config: &DatabaseConfig, is_leaf: bool) -> RecordKind {
    if is_leaf {
        leaf_record_kind(config)
    } else {
        RecordKind::Internal
    }
}

pub fn err_if_zero_range(range: usize) -> Result<()> {
    if range == 0 {
        return Err(Error::InvPageSize);
    }
    Ok(())
}
