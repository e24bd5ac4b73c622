//! Find / insert / erase / split driver. Pages are loaded
//! from the `PageManager` into an owned `BtreeNode`, mutated, and
//! written back; every touched page address is recorded on the
//! `Changeset` the caller passed in, which flushes them as a unit.

use std::cmp::Ordering;

use crate::btree::blob::BlobManager;
use crate::btree::comparator::Comparator;
use crate::btree::node::BtreeNode;
use crate::changeset::Changeset;
use crate::config::{Compressor, DatabaseConfig};
use crate::error::{Error, Result};
use crate::page::PageKind;
use crate::page_manager::PageManager;
use crate::types::PageAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertFlags {
    /// Fail with `DuplicateKey` if the key already exists.
    Unique,
    /// Replace the existing record if the key already exists.
    Overwrite,
    /// Append another duplicate record (requires `enable_duplicate_keys`).
    Duplicate,
}

fn load_node(pm: &PageManager, addr: PageAddress, kind: PageKind, config: &DatabaseConfig, changeset: &mut Changeset) -> Result<BtreeNode> {
    pm.fetch_page(addr, kind)?;
    changeset.put(addr);
    let bytes = pm
        .with_page(addr, |p| p.data().to_vec())
        .ok_or_else(|| Error::IntegrityViolated("node page missing from cache".into()))?;
    BtreeNode::open(&bytes, config, None)
}

fn store_node(pm: &PageManager, addr: PageAddress, node: BtreeNode) -> Result<()> {
    let bytes = node.into_bytes();
    pm.with_page(addr, |p| p.data_mut().copy_from_slice(&bytes))
        .ok_or_else(|| Error::IntegrityViolated("node page vanished before write-back".into()))?;
    Ok(())
}

fn addr_from_record(bytes: &[u8]) -> PageAddress {
    u64::from_le_bytes(bytes.try_into().unwrap())
}

pub(crate) fn kind_for(addr: PageAddress, root: PageAddress) -> PageKind {
    if addr == root {
        PageKind::BtreeRoot
    } else {
        PageKind::BtreeNode
    }
}

/// Descends from `root` to the leaf that would hold `key`, returning its
/// address.
pub fn find_leaf(pm: &PageManager, config: &DatabaseConfig, cmp: &Comparator, blobs: &BlobManager, root: PageAddress, key: &[u8], changeset: &mut Changeset) -> Result<PageAddress> {
    let mut addr = root;
    loop {
        let mut node = load_node(pm, addr, kind_for(addr, root), config, changeset)?;
        if node.header.is_leaf {
            return Ok(addr);
        }
        let (slot, exact) = node.find_lower_bound(key, cmp, blobs)?;
        let child_index = if exact { slot + 1 } else { slot };
        addr = node.child_at(child_index, blobs)?;
    }
}

pub fn find(pm: &PageManager, config: &DatabaseConfig, cmp: &Comparator, blobs: &BlobManager, root: PageAddress, key: &[u8], changeset: &mut Changeset) -> Result<Vec<u8>> {
    let leaf_addr = find_leaf(pm, config, cmp, blobs, root, key, changeset)?;
    let mut leaf = load_node(pm, leaf_addr, kind_for(leaf_addr, root), config, changeset)?;
    let (slot, exact) = leaf.find_lower_bound(key, cmp, blobs)?;
    if !exact {
        return Err(Error::KeyNotFound);
    }
    leaf.records.get(slot, blobs)
}

/// Inserts `(key, value)`. On root overflow, allocates a fresh root and
/// returns its address; otherwise returns `root` unchanged.
#[allow(clippy::too_many_arguments)]
pub fn insert(
    pm: &PageManager,
    config: &DatabaseConfig,
    cmp: &Comparator,
    blobs: &BlobManager,
    root: PageAddress,
    key: &[u8],
    value: &[u8],
    flags: InsertFlags,
    changeset: &mut Changeset,
) -> Result<PageAddress> {
    let extended_threshold = config.resolved_extended_key_threshold(pm.page_size());
    let key_compressor = config.key_compressor;
    let record_compressor = config.record_compressor;

    match insert_recursive(
        pm, config, cmp, blobs, root, root, key, value, flags, extended_threshold, key_compressor, record_compressor, changeset,
    )? {
        InsertOutcome::Done => Ok(root),
        InsertOutcome::Split { pivot_key, new_right } => {
            let new_root_addr = pm.alloc_page(PageKind::BtreeRoot)?;
            changeset.put(new_root_addr);
            let mut new_root = BtreeNode::create(pm.page_size() as usize, false, config)?;
            new_root.header.ptr_down = root;
            new_root.insert_internal(0, &pivot_key, new_right, extended_threshold, blobs)?;
            store_node(pm, new_root_addr, new_root)?;
            Ok(new_root_addr)
        }
    }
}

enum InsertOutcome {
    Done,
    Split { pivot_key: Vec<u8>, new_right: PageAddress },
}

#[allow(clippy::too_many_arguments)]
fn insert_recursive(
    pm: &PageManager,
    config: &DatabaseConfig,
    cmp: &Comparator,
    blobs: &BlobManager,
    root: PageAddress,
    addr: PageAddress,
    key: &[u8],
    value: &[u8],
    flags: InsertFlags,
    extended_threshold: usize,
    key_compressor: Compressor,
    record_compressor: Compressor,
    changeset: &mut Changeset,
) -> Result<InsertOutcome> {
    let mut node = load_node(pm, addr, kind_for(addr, root), config, changeset)?;

    if node.header.is_leaf {
        let (slot, exact) = node.find_lower_bound(key, cmp, blobs)?;
        if exact {
            match flags {
                InsertFlags::Unique => return Err(Error::DuplicateKey),
                InsertFlags::Overwrite => {
                    node.set_leaf_record(slot, value, record_compressor, blobs)?;
                    store_node(pm, addr, node)?;
                    return Ok(InsertOutcome::Done);
                }
                InsertFlags::Duplicate => {
                    if !config.enable_duplicate_keys {
                        return Err(Error::InvParameter("database was not opened with EnableDuplicateKeys"));
                    }
                    let count = node.header.count as usize;
                    let dup = node
                        .records
                        .as_duplicate()
                        .ok_or(Error::InvParameter("record list does not support duplicates"))?;
                    let n = dup.count_for(slot, blobs)?;
                    dup.insert_duplicate(count, slot, n, value, record_compressor, blobs)?;
                    store_node(pm, addr, node)?;
                    return Ok(InsertOutcome::Done);
                }
            }
        }

        if node.requires_split(key, extended_threshold) {
            let (pivot, new_right) = split_leaf(pm, config, addr, &mut node, blobs, changeset)?;
            store_node(pm, addr, node)?;
            let go_right = cmp.compare(key, &pivot) != Ordering::Less;
            let target = if go_right { new_right } else { addr };
            let mut retry_node = load_node(pm, target, PageKind::BtreeNode, config, changeset)?;
            let (slot2, _) = retry_node.find_lower_bound(key, cmp, blobs)?;
            retry_node.insert_leaf(slot2, key, value, extended_threshold, key_compressor, record_compressor, blobs)?;
            store_node(pm, target, retry_node)?;
            return Ok(InsertOutcome::Split { pivot_key: pivot, new_right });
        }

        node.insert_leaf(slot, key, value, extended_threshold, key_compressor, record_compressor, blobs)?;
        store_node(pm, addr, node)?;
        return Ok(InsertOutcome::Done);
    }

    let (slot, exact) = node.find_lower_bound(key, cmp, blobs)?;
    let child_index = if exact { slot + 1 } else { slot };
    let child_addr = node.child_at(child_index, blobs)?;

    match insert_recursive(
        pm, config, cmp, blobs, root, child_addr, key, value, flags, extended_threshold, key_compressor, record_compressor, changeset,
    )? {
        InsertOutcome::Done => Ok(InsertOutcome::Done),
        InsertOutcome::Split { pivot_key, new_right } => {
            if node.requires_split(&pivot_key, extended_threshold) {
                let (parent_pivot, parent_new_right) = split_internal(pm, config, addr, &mut node, blobs, changeset)?;
                store_node(pm, addr, node)?;
                let go_right = cmp.compare(&pivot_key, &parent_pivot) != Ordering::Less;
                let target = if go_right { parent_new_right } else { addr };
                let mut retry_node = load_node(pm, target, PageKind::BtreeNode, config, changeset)?;
                let (slot2, _) = retry_node.find_lower_bound(&pivot_key, cmp, blobs)?;
                retry_node.insert_internal(slot2, &pivot_key, new_right, extended_threshold, blobs)?;
                store_node(pm, target, retry_node)?;
                return Ok(InsertOutcome::Split { pivot_key: parent_pivot, new_right: parent_new_right });
            }
            let (slot2, _) = node.find_lower_bound(&pivot_key, cmp, blobs)?;
            node.insert_internal(slot2, &pivot_key, new_right, extended_threshold, blobs)?;
            store_node(pm, addr, node)?;
            Ok(InsertOutcome::Done)
        }
    }
}

/// Splits `node` in place via a chunk-level `KeyList`/`RecordList`
/// split (carrying duplicate runs wholesale) rather than decoding and
/// reinserting every entry. Returns the promoted key and the new right
/// sibling's page address.
fn split_leaf(pm: &PageManager, config: &DatabaseConfig, addr: PageAddress, node: &mut BtreeNode, blobs: &BlobManager, changeset: &mut Changeset) -> Result<(Vec<u8>, PageAddress)> {
    let count = node.header.count as usize;
    let pivot = count / 2;
    let pivot_key = node.keys.key_at(pivot, blobs)?;

    let mut right = node.split(pivot, config)?;
    let new_addr = pm.alloc_page(PageKind::BtreeNode)?;
    changeset.put(new_addr);

    right.header.left_sibling = addr;
    right.header.right_sibling = node.header.right_sibling;
    let old_right_sibling = node.header.right_sibling;
    node.header.right_sibling = new_addr;

    if old_right_sibling != 0 {
        let mut far_right = load_node(pm, old_right_sibling, PageKind::BtreeNode, config, changeset)?;
        far_right.header.left_sibling = new_addr;
        store_node(pm, old_right_sibling, far_right)?;
    }

    store_node(pm, new_addr, right)?;
    Ok((pivot_key, new_addr))
}

/// Splits internal `node` in place: the slot at `count/2` is promoted
/// to the parent separator (its child becomes the right sibling's
/// `ptr_down`), with `[0, mid)` staying in `node` and `(mid, count)`
/// moving to the new right sibling via a chunk-level split.
fn split_internal(pm: &PageManager, config: &DatabaseConfig, _addr: PageAddress, node: &mut BtreeNode, blobs: &BlobManager, changeset: &mut Changeset) -> Result<(Vec<u8>, PageAddress)> {
    let count = node.header.count as usize;
    let mid = count / 2;

    let promoted_key = node.keys.key_at(mid, blobs)?;
    let right_ptr_down = addr_from_record(&node.records.get(mid, blobs)?);

    let mut right = node.split(mid + 1, config)?;
    node.erase_internal(mid, blobs)?;

    let new_addr = pm.alloc_page(PageKind::BtreeNode)?;
    changeset.put(new_addr);
    right.header.ptr_down = right_ptr_down;
    store_node(pm, new_addr, right)?;
    Ok((promoted_key, new_addr))
}

enum EraseOutcome {
    Done,
    Underflowed,
}

/// A node is below the occupancy floor once its live keys and records
/// would fit in under 40% of the byte range it currently holds.
fn below_occupancy_floor(node: &mut BtreeNode) -> bool {
    let count = node.header.count as usize;
    let used = node.keys.required_range_size(count) + node.records.required_range_size(count);
    let total = node.keys.range_size() + node.records.range_size();
    used.saturating_mul(10) < total.saturating_mul(4)
}

/// Fixes up the leaf doubly-linked list after a node is folded into the
/// neighbor at `survivor_addr`: points whatever lay past the absorbed
/// node's right side back at the survivor.
fn relink_leaf_right(pm: &PageManager, config: &DatabaseConfig, survivor_addr: PageAddress, far_right: PageAddress, changeset: &mut Changeset) -> Result<()> {
    if far_right == 0 {
        return Ok(());
    }
    let mut far_node = load_node(pm, far_right, PageKind::BtreeNode, config, changeset)?;
    far_node.header.left_sibling = survivor_addr;
    store_node(pm, far_right, far_node)
}

/// Erases every record stored under `key` (all duplicates, if any),
/// merging underflowed nodes with a neighbor and removing the dissolved
/// separator from their parent as the recursion unwinds. Returns the
/// (possibly collapsed) root address.
pub fn erase(pm: &PageManager, config: &DatabaseConfig, cmp: &Comparator, blobs: &BlobManager, root: PageAddress, key: &[u8], changeset: &mut Changeset) -> Result<PageAddress> {
    match erase_recursive(pm, config, cmp, blobs, root, root, key, changeset)? {
        EraseOutcome::Done => Ok(root),
        EraseOutcome::Underflowed => {
            let mut node = load_node(pm, root, PageKind::BtreeRoot, config, changeset)?;
            if !node.header.is_leaf && node.header.count == 0 {
                let new_root = node.header.ptr_down;
                pm.free_page(root)?;
                return Ok(new_root);
            }
            Ok(root)
        }
    }
}

fn erase_recursive(pm: &PageManager, config: &DatabaseConfig, cmp: &Comparator, blobs: &BlobManager, root: PageAddress, addr: PageAddress, key: &[u8], changeset: &mut Changeset) -> Result<EraseOutcome> {
    let mut node = load_node(pm, addr, kind_for(addr, root), config, changeset)?;

    if node.header.is_leaf {
        let (slot, exact) = node.find_lower_bound(key, cmp, blobs)?;
        if !exact {
            return Err(Error::KeyNotFound);
        }
        node.erase_leaf(slot, blobs)?;
        let underflowed = addr != root && below_occupancy_floor(&mut node);
        store_node(pm, addr, node)?;
        return Ok(if underflowed { EraseOutcome::Underflowed } else { EraseOutcome::Done });
    }

    let (slot, exact) = node.find_lower_bound(key, cmp, blobs)?;
    let child_index = if exact { slot + 1 } else { slot };
    let child_addr = node.child_at(child_index, blobs)?;

    match erase_recursive(pm, config, cmp, blobs, root, child_addr, key, changeset)? {
        EraseOutcome::Done => Ok(EraseOutcome::Done),
        EraseOutcome::Underflowed => {
            let count = node.header.count as usize;
            let merged_right = child_index < count && merge_with_right(pm, config, blobs, &mut node, child_index, changeset)?;
            if !merged_right && child_index > 0 {
                merge_with_left(pm, config, blobs, &mut node, child_index, changeset)?;
            }
            let underflowed = addr != root && below_occupancy_floor(&mut node);
            store_node(pm, addr, node)?;
            Ok(if underflowed { EraseOutcome::Underflowed } else { EraseOutcome::Done })
        }
    }
}

/// Tries to fold the underflowed child at `child_index` into its right
/// sibling (the child absorbs it, keeping its own page address), then
/// drops the separator key between them from `node`. Returns whether a
/// merge happened.
fn merge_with_right(pm: &PageManager, config: &DatabaseConfig, blobs: &BlobManager, node: &mut BtreeNode, child_index: usize, changeset: &mut Changeset) -> Result<bool> {
    let child_addr = node.child_at(child_index, blobs)?;
    let right_addr = node.child_at(child_index + 1, blobs)?;
    let mut child = load_node(pm, child_addr, PageKind::BtreeNode, config, changeset)?;
    let mut right = load_node(pm, right_addr, PageKind::BtreeNode, config, changeset)?;
    if !child.fits_merge(&mut right) {
        return Ok(false);
    }
    let is_leaf = child.header.is_leaf;
    let far_right = right.header.right_sibling;
    child.merge(&mut right)?;
    if is_leaf {
        child.header.right_sibling = far_right;
        relink_leaf_right(pm, config, child_addr, far_right, changeset)?;
    }
    store_node(pm, child_addr, child)?;
    pm.free_page(right_addr)?;
    node.erase_internal(child_index, blobs)?;
    Ok(true)
}

/// Tries to fold the underflowed child at `child_index` into its left
/// sibling (the left sibling absorbs it, keeping its own page address),
/// then drops the separator key between them from `node`. Returns
/// whether a merge happened.
fn merge_with_left(pm: &PageManager, config: &DatabaseConfig, blobs: &BlobManager, node: &mut BtreeNode, child_index: usize, changeset: &mut Changeset) -> Result<bool> {
    let left_addr = node.child_at(child_index - 1, blobs)?;
    let child_addr = node.child_at(child_index, blobs)?;
    let mut left = load_node(pm, left_addr, PageKind::BtreeNode, config, changeset)?;
    let mut child = load_node(pm, child_addr, PageKind::BtreeNode, config, changeset)?;
    if !left.fits_merge(&mut child) {
        return Ok(false);
    }
    let is_leaf = left.header.is_leaf;
    let far_right = child.header.right_sibling;
    left.merge(&mut child)?;
    if is_leaf {
        left.header.right_sibling = far_right;
        relink_leaf_right(pm, config, left_addr, far_right, changeset)?;
    }
    store_node(pm, left_addr, left)?;
    pm.free_page(child_addr)?;
    node.erase_internal(child_index - 1, blobs)?;
    Ok(true)
}

/// Erases a single duplicate of `key` at `dup_index` (0-based insertion
/// order), leaving the remaining duplicates intact.
#[allow(clippy::too_many_arguments)]
pub fn erase_duplicate(pm: &PageManager, config: &DatabaseConfig, cmp: &Comparator, blobs: &BlobManager, root: PageAddress, key: &[u8], dup_index: usize, changeset: &mut Changeset) -> Result<()> {
    let leaf_addr = find_leaf(pm, config, cmp, blobs, root, key, changeset)?;
    let mut leaf = load_node(pm, leaf_addr, kind_for(leaf_addr, root), config, changeset)?;
    let (slot, exact) = leaf.find_lower_bound(key, cmp, blobs)?;
    if !exact {
        return Err(Error::KeyNotFound);
    }
    let count = leaf.header.count as usize;
    let remaining = {
        let dup = leaf
            .records
            .as_duplicate()
            .ok_or(Error::InvParameter("key has no duplicate run"))?;
        dup.erase_duplicate(count, slot, dup_index, blobs)?;
        dup.count_for(slot, blobs)?
    };
    if remaining == 0 {
        leaf.erase_leaf(slot, blobs)?;
    }
    store_node(pm, leaf_addr, leaf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyType;
    use crate::device::{Device, InMemoryDevice};

    fn setup(page_size: u32) -> (PageManager, DatabaseConfig, PageAddress) {
        let mut device = InMemoryDevice::new(page_size);
        device.create().unwrap();
        let pm = PageManager::new(Box::new(device), 16 * 1024 * 1024, false);
        let config = DatabaseConfig::new("t", KeyType::Uint32);
        let root_addr = pm.alloc_page(PageKind::BtreeRoot).unwrap();
        let root_node = BtreeNode::create(pm.page_size() as usize, true, &config).unwrap();
        store_node(&pm, root_addr, root_node).unwrap();
        (pm, config, root_addr)
    }

    #[test]
    fn insert_and_find_roundtrip() {
        let (pm, config, mut root) = setup(1024);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();

        for k in [5u32, 1, 9, 3, 7] {
            root = insert(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &(k * 10).to_le_bytes(), InsertFlags::Unique, &mut cs).unwrap();
        }
        for k in [5u32, 1, 9, 3, 7] {
            let v = find(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &mut cs).unwrap();
            assert_eq!(u32::from_le_bytes(v.try_into().unwrap()), k * 10);
        }
    }

    #[test]
    fn insert_duplicate_without_unique_flag_fails() {
        let (pm, config, mut root) = setup(1024);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();
        root = insert(&pm, &config, &cmp, &blobs, root, &1u32.to_le_bytes(), &1u32.to_le_bytes(), InsertFlags::Unique, &mut cs).unwrap();
        let err = insert(&pm, &config, &cmp, &blobs, root, &1u32.to_le_bytes(), &2u32.to_le_bytes(), InsertFlags::Unique, &mut cs);
        assert!(matches!(err, Err(Error::DuplicateKey)));
    }

    #[test]
    fn overwrite_replaces_value() {
        let (pm, config, mut root) = setup(1024);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();
        root = insert(&pm, &config, &cmp, &blobs, root, &1u32.to_le_bytes(), &1u32.to_le_bytes(), InsertFlags::Unique, &mut cs).unwrap();
        root = insert(&pm, &config, &cmp, &blobs, root, &1u32.to_le_bytes(), &99u32.to_le_bytes(), InsertFlags::Overwrite, &mut cs).unwrap();
        let v = find(&pm, &config, &cmp, &blobs, root, &1u32.to_le_bytes(), &mut cs).unwrap();
        assert_eq!(u32::from_le_bytes(v.try_into().unwrap()), 99);
    }

    #[test]
    fn erase_removes_key() {
        let (pm, config, mut root) = setup(1024);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();
        root = insert(&pm, &config, &cmp, &blobs, root, &1u32.to_le_bytes(), &1u32.to_le_bytes(), InsertFlags::Unique, &mut cs).unwrap();
        erase(&pm, &config, &cmp, &blobs, root, &1u32.to_le_bytes(), &mut cs).unwrap();
        let err = find(&pm, &config, &cmp, &blobs, root, &1u32.to_le_bytes(), &mut cs);
        assert!(matches!(err, Err(Error::KeyNotFound)));
    }

    #[test]
    fn many_inserts_force_splits_and_stay_findable() {
        let (pm, config, mut root) = setup(1024);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();
        let mut keys: Vec<u32> = (0..2000).collect();
        for i in (1..keys.len()).rev() {
            let j = (i * 2654435761usize) % (i + 1);
            keys.swap(i, j);
        }
        for &k in &keys {
            root = insert(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &k.to_le_bytes(), InsertFlags::Unique, &mut cs).unwrap();
        }
        for &k in &keys {
            let v = find(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &mut cs).unwrap();
            assert_eq!(u32::from_le_bytes(v.try_into().unwrap()), k);
        }
    }

    #[test]
    fn erasing_most_keys_merges_nodes_and_keeps_survivors_findable() {
        let (pm, config, mut root) = setup(512);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();

        let keys: Vec<u32> = (0..400).collect();
        for &k in &keys {
            root = insert(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &k.to_le_bytes(), InsertFlags::Unique, &mut cs).unwrap();
        }

        let (erased, kept) = keys.split_at(380);
        for &k in erased {
            root = erase(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &mut cs).unwrap();
        }

        for &k in erased {
            let err = find(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &mut cs);
            assert!(matches!(err, Err(Error::KeyNotFound)));
        }
        for &k in kept {
            let v = find(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &mut cs).unwrap();
            assert_eq!(u32::from_le_bytes(v.try_into().unwrap()), k);
        }
    }

    #[test]
    fn erase_to_empty_collapses_tree_to_a_single_leaf_root() {
        let (pm, config, mut root) = setup(512);
        let cmp = Comparator::for_key_type(config.key_type);
        let blobs = BlobManager::new(&pm);
        let mut cs = Changeset::new();

        let keys: Vec<u32> = (0..400).collect();
        for &k in &keys {
            root = insert(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &k.to_le_bytes(), InsertFlags::Unique, &mut cs).unwrap();
        }
        for &k in &keys {
            root = erase(&pm, &config, &cmp, &blobs, root, &k.to_le_bytes(), &mut cs).unwrap();
        }

        let mut root_node = load_node(&pm, root, PageKind::BtreeRoot, &config, &mut cs).unwrap();
        assert!(root_node.header.is_leaf);
        assert_eq!(root_node.header.count, 0);
        let err = find(&pm, &config, &cmp, &blobs, root, &0u32.to_le_bytes(), &mut cs);
        assert!(matches!(err, Err(Error::KeyNotFound)));
    }
}
