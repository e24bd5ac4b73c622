//! Cursor traversal: leaves carry sibling pointers, and
//! `move_next`/`move_prev` walk slot by slot, crossing into the
//! neighbouring leaf once the current one is exhausted. A position is
//! `(leaf, slot, dup_index)`; `dup_index` is always `0` on a
//! non-duplicate database.
//!
//! Positions are plain values rather than a struct that pins its page:
//! every navigation call re-fetches the leaf through the `PageManager`'s
//! own cache, so a long-lived cursor never holds a borrow across calls.
//! `Page::pin`/`unpin` exist for a future cursor that keeps its current
//! leaf pinned against eviction; this core does not wire that up (see
//! DESIGN.md).

use crate::btree::blob::BlobManager;
use crate::btree::comparator::Comparator;
use crate::btree::node::BtreeNode;
use crate::btree::operations;
use crate::changeset::Changeset;
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::page::PageKind;
use crate::page_manager::PageManager;
use crate::types::PageAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub leaf: PageAddress,
    pub slot: usize,
    pub dup_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorFlags {
    /// Jump past the remaining duplicates of the current key instead of
    /// visiting them one at a time.
    pub skip_duplicates: bool,
    /// Never cross into a different key's slot; once the current key's
    /// duplicate run is exhausted, movement returns `None`.
    pub only_duplicates: bool,
}

fn load_leaf(pm: &PageManager, addr: PageAddress, config: &DatabaseConfig, changeset: &mut Changeset) -> Result<BtreeNode> {
    pm.fetch_page(addr, PageKind::BtreeNode)?;
    changeset.put(addr);
    let bytes = pm
        .with_page(addr, |p| p.data().to_vec())
        .ok_or_else(|| crate::error::Error::IntegrityViolated("leaf page missing from cache".into()))?;
    BtreeNode::open(&bytes, config, None)
}

fn duplicate_count(leaf: &mut BtreeNode, slot: usize, blobs: &BlobManager) -> Result<usize> {
    match leaf.records.as_duplicate() {
        Some(dup) => dup.count_for(slot, blobs),
        None => Ok(1),
    }
}

/// Position of the first record in key order, or `None` for an empty
/// tree.
pub fn first(pm: &PageManager, config: &DatabaseConfig, blobs: &BlobManager, root: PageAddress, changeset: &mut Changeset) -> Result<Option<CursorPosition>> {
    let addr = leaf_addr(pm, config, blobs, root, true, changeset)?;
    let leaf = load_leaf(pm, addr, config, changeset)?;
    if leaf.header.count == 0 {
        return Ok(None);
    }
    Ok(Some(CursorPosition { leaf: addr, slot: 0, dup_index: 0 }))
}

/// Position of the last record in key order, or `None` for an empty
/// tree.
pub fn last(pm: &PageManager, config: &DatabaseConfig, blobs: &BlobManager, root: PageAddress, changeset: &mut Changeset) -> Result<Option<CursorPosition>> {
    let addr = leaf_addr(pm, config, blobs, root, false, changeset)?;
    let mut leaf = load_leaf(pm, addr, config, changeset)?;
    if leaf.header.count == 0 {
        return Ok(None);
    }
    let slot = leaf.header.count as usize - 1;
    let dup_index = duplicate_count(&mut leaf, slot, blobs)?.saturating_sub(1);
    Ok(Some(CursorPosition { leaf: addr, slot, dup_index }))
}

/// Descends leftmost/rightmost from `root` to the first/last leaf.
fn leaf_addr(pm: &PageManager, config: &DatabaseConfig, blobs: &BlobManager, root: PageAddress, leftmost: bool, changeset: &mut Changeset) -> Result<PageAddress> {
    let mut addr = root;
    loop {
        let mut node = load_leaf(pm, addr, config, changeset)?;
        if node.header.is_leaf {
            return Ok(addr);
        }
        let child_slot = if leftmost { 0 } else { node.header.count as usize };
        addr = node.child_at(child_slot, blobs)?;
    }
}

pub fn move_next(pm: &PageManager, config: &DatabaseConfig, blobs: &BlobManager, pos: CursorPosition, flags: CursorFlags, changeset: &mut Changeset) -> Result<Option<CursorPosition>> {
    let mut leaf = load_leaf(pm, pos.leaf, config, changeset)?;
    let dup_count = duplicate_count(&mut leaf, pos.slot, blobs)?;

    if !flags.skip_duplicates && pos.dup_index + 1 < dup_count {
        return Ok(Some(CursorPosition { dup_index: pos.dup_index + 1, ..pos }));
    }
    if flags.only_duplicates {
        return Ok(None);
    }

    if pos.slot + 1 < leaf.header.count as usize {
        return Ok(Some(CursorPosition { slot: pos.slot + 1, dup_index: 0, ..pos }));
    }

    let next_leaf = leaf.header.right_sibling;
    if next_leaf == 0 {
        return Ok(None);
    }
    let sibling = load_leaf(pm, next_leaf, config, changeset)?;
    if sibling.header.count == 0 {
        return Ok(None);
    }
    Ok(Some(CursorPosition { leaf: next_leaf, slot: 0, dup_index: 0 }))
}

pub fn move_prev(pm: &PageManager, config: &DatabaseConfig, blobs: &BlobManager, pos: CursorPosition, flags: CursorFlags, changeset: &mut Changeset) -> Result<Option<CursorPosition>> {
    if !flags.skip_duplicates && pos.dup_index > 0 {
        return Ok(Some(CursorPosition { dup_index: pos.dup_index - 1, ..pos }));
    }
    if flags.only_duplicates {
        return Ok(None);
    }

    let leaf = load_leaf(pm, pos.leaf, config, changeset)?;
    if pos.slot > 0 {
        let prev_slot = pos.slot - 1;
        let mut leaf = leaf;
        let dup_count = duplicate_count(&mut leaf, prev_slot, blobs)?;
        return Ok(Some(CursorPosition { slot: prev_slot, dup_index: dup_count.saturating_sub(1), ..pos }));
    }

    let prev_leaf = leaf.header.left_sibling;
    if prev_leaf == 0 {
        return Ok(None);
    }
    let mut sibling = load_leaf(pm, prev_leaf, config, changeset)?;
    if sibling.header.count == 0 {
        return Ok(None);
    }
    let slot = sibling.header.count as usize - 1;
    let dup_index = duplicate_count(&mut sibling, slot, blobs)?.saturating_sub(1);
    Ok(Some(CursorPosition { leaf: prev_leaf, slot, dup_index }))
}

/// Positions a cursor on an exact-match key, or `None` if the key is
/// absent. Lands on the first duplicate of the run.
pub fn seek(
    pm: &PageManager,
    config: &DatabaseConfig,
    cmp: &Comparator,
    blobs: &BlobManager,
    root: PageAddress,
    key: &[u8],
    changeset: &mut Changeset,
) -> Result<Option<CursorPosition>> {
    let leaf_addr = operations::find_leaf(pm, config, cmp, blobs, root, key, changeset)?;
    let mut leaf = load_leaf(pm, leaf_addr, config, changeset)?;
    let (slot, exact) = leaf.find_lower_bound(key, cmp, blobs)?;
    if !exact {
        return Ok(None);
    }
    Ok(Some(CursorPosition { leaf: leaf_addr, slot, dup_index: 0 }))
}

pub fn key_at(pm: &PageManager, config: &DatabaseConfig, blobs: &BlobManager, pos: CursorPosition, changeset: &mut Changeset) -> Result<Vec<u8>> {
    let mut leaf = load_leaf(pm, pos.leaf, config, changeset)?;
    leaf.keys.key_at(pos.slot, blobs)
}

pub fn record_at(pm: &PageManager, config: &DatabaseConfig, blobs: &BlobManager, pos: CursorPosition, changeset: &mut Changeset) -> Result<Vec<u8>> {
    let mut leaf = load_leaf(pm, pos.leaf, config, changeset)?;
    match leaf.records.as_duplicate() {
        Some(dup) => dup.get(pos.slot, pos.dup_index, blobs),
        None => leaf.records.get(pos.slot, blobs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::comparator::Comparator;
    use crate::btree::operations::{self, InsertFlags};
    use crate::config::KeyType;
    use crate::device::{Device, InMemoryDevice};
    use crate::page_manager::PageManager;

    fn setup(page_size: u32, dup: bool) -> (PageManager, DatabaseConfig, PageAddress) {
        let mut device = InMemoryDevice::new(page_size);
        device.create().unwrap();
        let pm = PageManager::new(Box::new(device), 16 * 1024 * 1024, false);
        let mut config = DatabaseConfig::new("t", KeyType::Uint32);
        config.enable_duplicate_keys = dup;
        let root_addr = pm.alloc_page(PageKind::BtreeRoot).unwrap();
        let root_node = BtreeNode::create(pm.page_size() as usize, true, &config).unwrap();
        let bytes = root_node.into_bytes();
        pm.with_page(root_addr, |p| p.data_mut().copy_from_slice(&bytes));
        (pm, config, root_addr)
    }

    #[test]
    fn forward_traversal_visits_keys_in_order() {
        let (pm, config, mut root) = setup(1024, false);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();
        for k in [5u32, 1, 9, 3, 7, 2, 8, 4, 6, 0] {
            root = operations::insert(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &k.to_le_bytes(), InsertFlags::Unique, &mut cs).unwrap();
        }

        let mut seen = Vec::new();
        let mut pos = first(&pm, &config, &blobs, root, &mut cs).unwrap();
        while let Some(p) = pos {
            let k = key_at(&pm, &config, &blobs, p, &mut cs).unwrap();
            seen.push(u32::from_le_bytes(k.try_into().unwrap()));
            pos = move_next(&pm, &config, &blobs, p, CursorFlags::default(), &mut cs).unwrap();
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn backward_traversal_from_last_matches_reverse_order() {
        let (pm, config, mut root) = setup(1024, false);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();
        for k in 0..50u32 {
            root = operations::insert(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &k.to_le_bytes(), InsertFlags::Unique, &mut cs).unwrap();
        }

        let mut seen = Vec::new();
        let mut pos = last(&pm, &config, &blobs, root, &mut cs).unwrap();
        while let Some(p) = pos {
            let k = key_at(&pm, &config, &blobs, p, &mut cs).unwrap();
            seen.push(u32::from_le_bytes(k.try_into().unwrap()));
            pos = move_prev(&pm, &config, &blobs, p, CursorFlags::default(), &mut cs).unwrap();
        }
        assert_eq!(seen, (0..50).rev().collect::<Vec<_>>());
    }

    #[test]
    fn only_duplicates_stays_within_one_keys_run() {
        let (pm, config, mut root) = setup(4096, true);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();
        for v in 0..5u32 {
            root = operations::insert(&pm, &config, &cmp, &blobs, root, &1u32.to_le_bytes(), &v.to_le_bytes(), InsertFlags::Duplicate, &mut cs).unwrap();
        }

        let mut seen = Vec::new();
        let mut pos = first(&pm, &config, &blobs, root, &mut cs).unwrap();
        let flags = CursorFlags { only_duplicates: true, ..Default::default() };
        while let Some(p) = pos {
            let v = record_at(&pm, &config, &blobs, p, &mut cs).unwrap();
            seen.push(u32::from_le_bytes(v.try_into().unwrap()));
            pos = move_next(&pm, &config, &blobs, p, flags, &mut cs).unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn skip_duplicates_jumps_to_next_distinct_key() {
        let (pm, config, mut root) = setup(4096, true);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();
        for k in [1u32, 2] {
            for v in 0..3u32 {
                root = operations::insert(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &v.to_le_bytes(), InsertFlags::Duplicate, &mut cs).unwrap();
            }
        }

        let mut seen = Vec::new();
        let mut pos = first(&pm, &config, &blobs, root, &mut cs).unwrap();
        let flags = CursorFlags { skip_duplicates: true, ..Default::default() };
        while let Some(p) = pos {
            let k = key_at(&pm, &config, &blobs, p, &mut cs).unwrap();
            seen.push(u32::from_le_bytes(k.try_into().unwrap()));
            pos = move_next(&pm, &config, &blobs, p, flags, &mut cs).unwrap();
        }
        assert_eq!(seen, vec![1, 2]);
    }
}
