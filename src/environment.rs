//! Top-level handle owning the file header, the per-database slot table
//! and the `PageManager`: the thing an embedder actually
//! opens.
//!
//! The coarse Environment mutex is `EnvState`'s `Mutex`:
//! every structural operation (create/open/erase a database) and every
//! btree entry point (`find`/`insert`/`erase`/cursor navigation) holds
//! it for the duration of the call, so at most one reader or writer is
//! ever inside a given tree's root at a time. A per-database lock would
//! be a legal refinement but is not needed at this
//! core's scale.

use std::path::Path;
use std::sync::Mutex;

use log::{info, warn};

use crate::btree::blob::BlobManager;
use crate::btree::comparator::Comparator;
use crate::btree::cursor::{self, CursorFlags, CursorPosition};
use crate::btree::node::BtreeNode;
use crate::btree::operations::{self, InsertFlags};
use crate::changeset::Changeset;
use crate::config::{Compressor, DatabaseConfig, EngineConfig, EnvFlags, KeyType};
use crate::device::{Device, FileDevice, InMemoryDevice};
use crate::error::{Error, Result};
use crate::page::PageKind;
use crate::page_manager::PageManager;
use crate::types::PageAddress;

const MAGIC: [u8; 4] = *b"AKV1";
const VERSION: (u8, u8, u8, u8) = (1, 0, 0, 0);
/// `magic | version | page_size | max_databases | flags | freelist_head
/// | encryption_iv`.
const HEADER_FIXED_SIZE: usize = 4 + 4 + 4 + 2 + 4 + 8 + 16;
const FREELIST_HEAD_OFFSET: usize = 4 + 4 + 4 + 2 + 4;

/// Max `{page_id, count}` entries a single freelist chain page can
/// hold: `next_page:u64 | entry_count:u32` followed by the entries.
fn freelist_entries_per_page(page_size: u32) -> usize {
    (page_size as usize - 8 - 4) / 16
}

fn encode_freelist_page(page_size: u32, next_page: PageAddress, entries: &[(PageAddress, u64)]) -> Vec<u8> {
    let mut out = vec![0u8; page_size as usize];
    out[0..8].copy_from_slice(&next_page.to_le_bytes());
    out[8..12].copy_from_slice(&(entries.len() as u32).to_le_bytes());
    let mut off = 12;
    for &(page_id, count) in entries {
        out[off..off + 8].copy_from_slice(&page_id.to_le_bytes());
        out[off + 8..off + 16].copy_from_slice(&count.to_le_bytes());
        off += 16;
    }
    out
}

fn decode_freelist_page(bytes: &[u8]) -> Result<(PageAddress, Vec<(PageAddress, u64)>)> {
    if bytes.len() < 12 {
        return Err(Error::IntegrityViolated("freelist chain page too small".into()));
    }
    let next_page = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let entry_count = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let mut entries = Vec::with_capacity(entry_count);
    let mut off = 12;
    for _ in 0..entry_count {
        if off + 16 > bytes.len() {
            return Err(Error::IntegrityViolated("freelist chain page truncated".into()));
        }
        let page_id = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        let count = u64::from_le_bytes(bytes[off + 8..off + 16].try_into().unwrap());
        entries.push((page_id, count));
        off += 16;
    }
    Ok((next_page, entries))
}

const NAME_CAP: usize = 32;
const SLOT_SIZE: usize = 1 + 2 + NAME_CAP + 4 + 4 + 4 + 4 + 8 + 1 + 1 + 4 + 4;

const HEADER_PAGE: PageAddress = 0;

const FLAG_IN_MEMORY: u32 = 0x1;
const FLAG_READ_ONLY: u32 = 0x2;
const FLAG_DISABLE_MMAP: u32 = 0x4;
const FLAG_CACHE_UNLIMITED: u32 = 0x8;
const FLAG_ENABLE_FSYNC: u32 = 0x10;
const FLAG_ENABLE_CRC32: u32 = 0x20;
const FLAG_ENABLE_RECOVERY: u32 = 0x40;
const FLAG_FORCE_RECORDS_INLINE: u32 = 0x80;
const FLAG_ENABLE_DUPLICATE_KEYS: u32 = 0x100;

fn encode_env_flags(flags: &EnvFlags) -> u32 {
    let mut out = 0u32;
    if flags.in_memory {
        out |= FLAG_IN_MEMORY;
    }
    if flags.read_only {
        out |= FLAG_READ_ONLY;
    }
    if flags.disable_mmap {
        out |= FLAG_DISABLE_MMAP;
    }
    if flags.cache_unlimited {
        out |= FLAG_CACHE_UNLIMITED;
    }
    if flags.enable_fsync {
        out |= FLAG_ENABLE_FSYNC;
    }
    if flags.enable_crc32 {
        out |= FLAG_ENABLE_CRC32;
    }
    if flags.enable_recovery {
        out |= FLAG_ENABLE_RECOVERY;
    }
    if flags.force_records_inline {
        out |= FLAG_FORCE_RECORDS_INLINE;
    }
    if flags.enable_duplicate_keys {
        out |= FLAG_ENABLE_DUPLICATE_KEYS;
    }
    out
}

fn decode_env_flags(bits: u32) -> EnvFlags {
    EnvFlags {
        in_memory: bits & FLAG_IN_MEMORY != 0,
        read_only: bits & FLAG_READ_ONLY != 0,
        disable_mmap: bits & FLAG_DISABLE_MMAP != 0,
        cache_unlimited: bits & FLAG_CACHE_UNLIMITED != 0,
        enable_fsync: bits & FLAG_ENABLE_FSYNC != 0,
        enable_crc32: bits & FLAG_ENABLE_CRC32 != 0,
        enable_recovery: bits & FLAG_ENABLE_RECOVERY != 0,
        force_records_inline: bits & FLAG_FORCE_RECORDS_INLINE != 0,
        enable_duplicate_keys: bits & FLAG_ENABLE_DUPLICATE_KEYS != 0,
    }
}

fn key_type_to_u32(kt: KeyType) -> u32 {
    match kt {
        KeyType::Uint8 => 0,
        KeyType::Uint16 => 1,
        KeyType::Uint32 => 2,
        KeyType::Uint64 => 3,
        KeyType::Real32 => 4,
        KeyType::Real64 => 5,
        KeyType::Binary => 6,
        KeyType::Custom => 7,
    }
}

fn u32_to_key_type(v: u32) -> Result<KeyType> {
    Ok(match v {
        0 => KeyType::Uint8,
        1 => KeyType::Uint16,
        2 => KeyType::Uint32,
        3 => KeyType::Uint64,
        4 => KeyType::Real32,
        5 => KeyType::Real64,
        6 => KeyType::Binary,
        7 => KeyType::Custom,
        _ => return Err(Error::InvFileHeader),
    })
}

fn compressor_to_u8(c: Compressor) -> u8 {
    match c {
        Compressor::None => 0,
        Compressor::Zlib => 1,
        Compressor::Snappy => 2,
        Compressor::Lzf => 3,
        Compressor::Lzo => 4,
        Compressor::Varbyte => 5,
        Compressor::GroupVarint => 6,
        Compressor::StreamVbyte => 7,
        Compressor::For => 8,
        Compressor::SimdComp => 9,
        Compressor::SimdFor => 10,
    }
}

fn u8_to_compressor(v: u8) -> Result<Compressor> {
    Ok(match v {
        0 => Compressor::None,
        1 => Compressor::Zlib,
        2 => Compressor::Snappy,
        3 => Compressor::Lzf,
        4 => Compressor::Lzo,
        5 => Compressor::Varbyte,
        6 => Compressor::GroupVarint,
        7 => Compressor::StreamVbyte,
        8 => Compressor::For,
        9 => Compressor::SimdComp,
        10 => Compressor::SimdFor,
        _ => return Err(Error::InvFileHeader),
    })
}

/// One occupied slot in the per-database table: the persisted
/// configuration plus the tree's current root page.
struct SlotEntry {
    config: DatabaseConfig,
    root: PageAddress,
}

fn encode_slot(out: &mut [u8], slot: Option<&SlotEntry>) {
    debug_assert_eq!(out.len(), SLOT_SIZE);
    for b in out.iter_mut() {
        *b = 0;
    }
    let entry = match slot {
        Some(e) => e,
        None => return,
    };
    out[0] = 1;
    let name_bytes = entry.config.name.as_bytes();
    let name_len = name_bytes.len().min(NAME_CAP);
    out[1..3].copy_from_slice(&(name_len as u16).to_le_bytes());
    out[3..3 + name_len].copy_from_slice(&name_bytes[..name_len]);
    let mut flags = 0u32;
    if entry.config.enable_duplicate_keys {
        flags |= 1;
    }
    let o = 3 + NAME_CAP;
    out[o..o + 4].copy_from_slice(&flags.to_le_bytes());
    out[o + 4..o + 8].copy_from_slice(&key_type_to_u32(entry.config.key_type).to_le_bytes());
    out[o + 8..o + 12].copy_from_slice(&entry.config.key_size.to_le_bytes());
    out[o + 12..o + 16].copy_from_slice(&entry.config.record_size.to_le_bytes());
    out[o + 16..o + 24].copy_from_slice(&entry.root.to_le_bytes());
    out[o + 24] = compressor_to_u8(entry.config.key_compressor);
    out[o + 25] = compressor_to_u8(entry.config.record_compressor);
    out[o + 26..o + 30].copy_from_slice(&entry.config.duplicate_threshold.to_le_bytes());
    out[o + 30..o + 34].copy_from_slice(&entry.config.extended_key_threshold.to_le_bytes());
}

fn decode_slot(bytes: &[u8]) -> Result<Option<SlotEntry>> {
    debug_assert_eq!(bytes.len(), SLOT_SIZE);
    if bytes[0] == 0 {
        return Ok(None);
    }
    let name_len = u16::from_le_bytes(bytes[1..3].try_into().unwrap()) as usize;
    if name_len > NAME_CAP {
        return Err(Error::InvFileHeader);
    }
    let name = String::from_utf8_lossy(&bytes[3..3 + name_len]).into_owned();
    let o = 3 + NAME_CAP;
    let flags = u32::from_le_bytes(bytes[o..o + 4].try_into().unwrap());
    let key_type = u32_to_key_type(u32::from_le_bytes(bytes[o + 4..o + 8].try_into().unwrap()))?;
    let key_size = u32::from_le_bytes(bytes[o + 8..o + 12].try_into().unwrap());
    let record_size = u32::from_le_bytes(bytes[o + 12..o + 16].try_into().unwrap());
    let root = u64::from_le_bytes(bytes[o + 16..o + 24].try_into().unwrap());
    let key_compressor = u8_to_compressor(bytes[o + 24])?;
    let record_compressor = u8_to_compressor(bytes[o + 25])?;
    let duplicate_threshold = u32::from_le_bytes(bytes[o + 26..o + 30].try_into().unwrap());
    let extended_key_threshold = u32::from_le_bytes(bytes[o + 30..o + 34].try_into().unwrap());
    let config = DatabaseConfig {
        name,
        key_type,
        key_size,
        record_size,
        key_compressor,
        record_compressor,
        duplicate_threshold,
        extended_key_threshold,
        enable_duplicate_keys: flags & 1 != 0,
    };
    Ok(Some(SlotEntry { config, root }))
}

struct EnvState {
    page_size: u32,
    max_databases: u16,
    flags: EnvFlags,
    slots: Vec<Option<SlotEntry>>,
    /// Head of the persisted freelist page chain, or `0` if the
    /// freelist was empty at the last `persist_freelist`.
    freelist_head: PageAddress,
    /// Addresses of the chain pages written by the last
    /// `persist_freelist` (or read back by `open_file`), freed and
    /// replaced the next time the freelist is persisted.
    freelist_chain: Vec<PageAddress>,
}

fn encode_header(state: &EnvState) -> Vec<u8> {
    let mut out = vec![0u8; state.page_size as usize];
    out[0..4].copy_from_slice(&MAGIC);
    out[4] = VERSION.0;
    out[5] = VERSION.1;
    out[6] = VERSION.2;
    out[7] = VERSION.3;
    out[8..12].copy_from_slice(&state.page_size.to_le_bytes());
    out[12..14].copy_from_slice(&state.max_databases.to_le_bytes());
    out[14..18].copy_from_slice(&encode_env_flags(&state.flags).to_le_bytes());
    out[FREELIST_HEAD_OFFSET..FREELIST_HEAD_OFFSET + 8].copy_from_slice(&state.freelist_head.to_le_bytes());
    // encryption_iv stays zeroed; this core never encrypts.
    let mut off = HEADER_FIXED_SIZE;
    for slot in &state.slots {
        encode_slot(&mut out[off..off + SLOT_SIZE], slot.as_ref());
        off += SLOT_SIZE;
    }
    out
}

fn parse_fixed_header(prefix: &[u8]) -> Result<(u32, u16, EnvFlags, PageAddress)> {
    if prefix.len() < HEADER_FIXED_SIZE || prefix[0..4] != MAGIC {
        return Err(Error::InvFileHeader);
    }
    if prefix[4] != VERSION.0 {
        return Err(Error::InvFileVersion);
    }
    let page_size = u32::from_le_bytes(prefix[8..12].try_into().unwrap());
    let max_databases = u16::from_le_bytes(prefix[12..14].try_into().unwrap());
    let flags = decode_env_flags(u32::from_le_bytes(prefix[14..18].try_into().unwrap()));
    let freelist_head = u64::from_le_bytes(prefix[FREELIST_HEAD_OFFSET..FREELIST_HEAD_OFFSET + 8].try_into().unwrap());
    Ok((page_size, max_databases, flags, freelist_head))
}

fn header_size_for(max_databases: u16) -> usize {
    HEADER_FIXED_SIZE + max_databases as usize * SLOT_SIZE
}

/// Walks the on-disk freelist page chain starting at `head` (tail-sealed
/// by a page whose `next_page` is `0`), returning the accumulated
/// free-run entries plus the chain's own page addresses.
fn read_freelist_chain(pm: &PageManager, head: PageAddress) -> Result<(Vec<(PageAddress, u64)>, Vec<PageAddress>)> {
    let mut entries = Vec::new();
    let mut chain = Vec::new();
    let mut addr = head;
    while addr != 0 {
        pm.fetch_page(addr, PageKind::Freelist)?;
        let bytes = pm
            .with_page(addr, |p| p.data().to_vec())
            .ok_or_else(|| Error::IntegrityViolated("freelist chain page missing from cache".into()))?;
        let (next, page_entries) = decode_freelist_page(&bytes)?;
        chain.push(addr);
        entries.extend(page_entries);
        addr = next;
    }
    Ok((entries, chain))
}

/// An open environment: one `PageManager` plus the header/slot-table
/// state guarded by the coarse environment mutex.
pub struct Environment {
    pm: PageManager,
    state: Mutex<EnvState>,
}

impl Environment {
    fn create_with_device(device: Box<dyn Device>, engine: EngineConfig) -> Result<Self> {
        engine.validate()?;
        if header_size_for(engine.max_databases) > engine.page_size as usize {
            return Err(Error::InvParameter("max_databases does not fit in one header page"));
        }
        let mut device = device;
        device.create()?;
        let pm = PageManager::new(device, engine.cache_capacity_bytes, engine.flags.cache_unlimited);
        let header_addr = pm.alloc_page(PageKind::Header)?;
        if header_addr != HEADER_PAGE {
            return Err(Error::IntegrityViolated("header page must be the first page allocated".into()));
        }
        let state = EnvState {
            page_size: engine.page_size,
            max_databases: engine.max_databases,
            flags: engine.flags,
            slots: (0..engine.max_databases).map(|_| None).collect(),
            freelist_head: 0,
            freelist_chain: Vec::new(),
        };
        let env = Self { pm, state: Mutex::new(state) };
        env.persist_header()?;
        info!("environment created: page_size={} max_databases={}", engine.page_size, engine.max_databases);
        Ok(env)
    }

    pub fn create_file(path: impl AsRef<Path>, engine: EngineConfig) -> Result<Self> {
        let device = FileDevice::new(path, engine.page_size, false);
        Self::create_with_device(Box::new(device), engine)
    }

    pub fn create_in_memory(engine: EngineConfig) -> Result<Self> {
        let device = InMemoryDevice::new(engine.page_size);
        Self::create_with_device(Box::new(device), engine)
    }

    /// Opens an existing file-backed environment. The real page size is
    /// discovered from the header itself, so the probe read below never
    /// assumes it; only raw (non-page-granular) `Device::read` is used
    /// until the page size is known.
    pub fn open_file(path: impl AsRef<Path>, cache_capacity_bytes: u64) -> Result<Self> {
        let path = path.as_ref();
        let mut probe = FileDevice::new(path, crate::config::MIN_PAGE_SIZE, false);
        probe.open()?;
        let mut prefix = vec![0u8; HEADER_FIXED_SIZE];
        probe.read(0, &mut prefix)?;
        let (page_size, max_databases, flags, freelist_head) = parse_fixed_header(&prefix)?;
        let mut slot_bytes = vec![0u8; max_databases as usize * SLOT_SIZE];
        probe.read(HEADER_FIXED_SIZE as u64, &mut slot_bytes)?;
        probe.close()?;

        let mut slots = Vec::with_capacity(max_databases as usize);
        for i in 0..max_databases as usize {
            slots.push(decode_slot(&slot_bytes[i * SLOT_SIZE..(i + 1) * SLOT_SIZE])?);
        }

        let mut device = FileDevice::new(path, page_size, flags.read_only);
        device.open()?;
        let pm = PageManager::new(Box::new(device), cache_capacity_bytes, flags.cache_unlimited);
        pm.fetch_page(HEADER_PAGE, PageKind::Header)?;

        let (freelist_entries, freelist_chain) = read_freelist_chain(&pm, freelist_head)?;
        pm.load_freelist(freelist_entries);

        let state = EnvState { page_size, max_databases, flags, slots, freelist_head, freelist_chain };
        info!("environment opened: page_size={} max_databases={}", page_size, max_databases);
        Ok(Self { pm, state: Mutex::new(state) })
    }

    fn persist_header(&self) -> Result<()> {
        let bytes = {
            let state = self.state.lock().unwrap();
            encode_header(&state)
        };
        self.pm.fetch_page(HEADER_PAGE, PageKind::Header)?;
        self.pm.with_page(HEADER_PAGE, |p| p.data_mut().copy_from_slice(&bytes));
        self.pm.flush_all()
    }

    /// Patches just the root-page field of one slot in the cached header
    /// page, without re-encoding the whole table; called on every insert
    /// that changes a tree's root.
    fn patch_slot_root(&self, index: usize, new_root: PageAddress) -> Result<()> {
        self.pm.fetch_page(HEADER_PAGE, PageKind::Header)?;
        let offset = HEADER_FIXED_SIZE + index * SLOT_SIZE + (3 + NAME_CAP + 4 + 4 + 4 + 4);
        self.pm.with_page(HEADER_PAGE, |p| {
            p.data_mut()[offset..offset + 8].copy_from_slice(&new_root.to_le_bytes());
        });
        Ok(())
    }

    pub fn create_database(&self, config: DatabaseConfig) -> Result<DatabaseHandle<'_>> {
        let mut state = self.state.lock().unwrap();
        if state.slots.iter().flatten().any(|e| e.config.name == config.name) {
            return Err(Error::InvParameter("database name already exists"));
        }
        let index = state
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::LimitsReached)?;

        let node = BtreeNode::create(state.page_size as usize, true, &config)?;
        let root = self.pm.alloc_page(PageKind::BtreeRoot)?;
        let bytes = node.into_bytes();
        self.pm.with_page(root, |p| p.data_mut().copy_from_slice(&bytes));

        state.slots[index] = Some(SlotEntry { config, root });
        drop(state);
        self.persist_header()?;
        info!("database created at slot {}", index);
        Ok(DatabaseHandle { env: self, index })
    }

    pub fn open_database(&self, name: &str) -> Result<DatabaseHandle<'_>> {
        let state = self.state.lock().unwrap();
        let index = state
            .slots
            .iter()
            .position(|s| s.as_ref().map(|e| e.config.name == name).unwrap_or(false))
            .ok_or(Error::KeyNotFound)?;
        Ok(DatabaseHandle { env: self, index })
    }

    /// Drops the slot and forgets the tree's root. The tree's own pages
    /// are not walked and freed (no recursive garbage collection of an
    /// abandoned tree); see DESIGN.md.
    pub fn erase_database(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.slots.get(index).map(|s| s.is_none()).unwrap_or(true) {
            return Err(Error::InvParameter("no database at that index"));
        }
        state.slots[index] = None;
        drop(state);
        self.persist_header()?;
        warn!("database at slot {} erased; its pages were not reclaimed", index);
        Ok(())
    }

    /// Frees the previous freelist chain's own pages, re-encodes the
    /// (now possibly larger) set of free runs across a fresh chain, and
    /// patches the header's `freelist_head`. The chain pages are
    /// allocated through the normal `PageManager::alloc_page` path, so
    /// the act of allocating them can itself shrink the freelist; since
    /// allocation never grows the entry count, the chain sized against
    /// the pre-allocation snapshot always has room for what's left.
    fn persist_freelist(&self) -> Result<()> {
        let (page_size, old_chain) = {
            let mut state = self.state.lock().unwrap();
            (state.page_size, std::mem::take(&mut state.freelist_chain))
        };
        for addr in &old_chain {
            self.pm.free_page(*addr)?;
        }

        let per_page = freelist_entries_per_page(page_size);
        let sized_against = self.pm.freelist_snapshot().len();
        let chain_len = if sized_against == 0 { 0 } else { (sized_against + per_page - 1) / per_page };

        let mut chain = Vec::with_capacity(chain_len);
        for _ in 0..chain_len {
            chain.push(self.pm.alloc_page(PageKind::Freelist)?);
        }

        let entries = self.pm.freelist_snapshot();
        for (i, &addr) in chain.iter().enumerate() {
            let start = i * per_page;
            let end = (start + per_page).min(entries.len());
            let next = chain.get(i + 1).copied().unwrap_or(0);
            let bytes = encode_freelist_page(page_size, next, &entries[start..end]);
            self.pm.with_page(addr, |p| p.data_mut().copy_from_slice(&bytes));
        }

        let head = chain.first().copied().unwrap_or(0);
        let mut state = self.state.lock().unwrap();
        state.freelist_head = head;
        state.freelist_chain = chain;
        drop(state);
        self.persist_header()
    }

    pub fn flush(&self) -> Result<()> {
        self.persist_freelist()?;
        self.pm.flush_all()
    }

    pub fn close(self) -> Result<()> {
        self.persist_freelist()?;
        self.pm.close()
    }
}

/// A handle to one open database inside an `Environment`; every method
/// takes the coarse environment lock for the duration of the call.
pub struct DatabaseHandle<'env> {
    env: &'env Environment,
    index: usize,
}

impl<'env> std::fmt::Debug for DatabaseHandle<'env> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandle").field("index", &self.index).finish()
    }
}

impl<'env> DatabaseHandle<'env> {
    pub fn config(&self) -> Result<DatabaseConfig> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        Ok(entry.config.clone())
    }

    pub fn root(&self) -> Result<PageAddress> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        Ok(entry.root)
    }

    pub fn find(&self, key: &[u8]) -> Result<Vec<u8>> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        let cmp = Comparator::for_key_type(entry.config.key_type);
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        let result = operations::find(&self.env.pm, &entry.config, &cmp, &blobs, entry.root, key, &mut changeset);
        changeset.clear();
        result
    }

    pub fn insert(&self, key: &[u8], value: &[u8], flags: InsertFlags) -> Result<()> {
        let mut state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_mut().ok_or(Error::InvParameter("database not open"))?;
        let cmp = Comparator::for_key_type(entry.config.key_type);
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        let new_root = operations::insert(&self.env.pm, &entry.config, &cmp, &blobs, entry.root, key, value, flags, &mut changeset)?;
        let root_changed = new_root != entry.root;
        entry.root = new_root;
        let index = self.index;
        drop(state);
        if root_changed {
            self.env.patch_slot_root(index, new_root)?;
            changeset.put(0);
        }
        changeset.flush(&self.env.pm)
    }

    pub fn erase(&self, key: &[u8]) -> Result<()> {
        let mut state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_mut().ok_or(Error::InvParameter("database not open"))?;
        let cmp = Comparator::for_key_type(entry.config.key_type);
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        let new_root = operations::erase(&self.env.pm, &entry.config, &cmp, &blobs, entry.root, key, &mut changeset)?;
        let root_changed = new_root != entry.root;
        entry.root = new_root;
        let index = self.index;
        drop(state);
        if root_changed {
            self.env.patch_slot_root(index, new_root)?;
            changeset.put(0);
        }
        changeset.flush(&self.env.pm)
    }

    pub fn erase_duplicate(&self, key: &[u8], dup_index: usize) -> Result<()> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        let cmp = Comparator::for_key_type(entry.config.key_type);
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        operations::erase_duplicate(&self.env.pm, &entry.config, &cmp, &blobs, entry.root, key, dup_index, &mut changeset)?;
        drop(state);
        changeset.flush(&self.env.pm)
    }

    pub fn cursor_first(&self) -> Result<Option<CursorPosition>> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        let pos = cursor::first(&self.env.pm, &entry.config, &blobs, entry.root, &mut changeset);
        changeset.clear();
        pos
    }

    pub fn cursor_last(&self) -> Result<Option<CursorPosition>> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        let pos = cursor::last(&self.env.pm, &entry.config, &blobs, entry.root, &mut changeset);
        changeset.clear();
        pos
    }

    pub fn cursor_seek(&self, key: &[u8]) -> Result<Option<CursorPosition>> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        let cmp = Comparator::for_key_type(entry.config.key_type);
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        let pos = cursor::seek(&self.env.pm, &entry.config, &cmp, &blobs, entry.root, key, &mut changeset);
        changeset.clear();
        pos
    }

    pub fn cursor_next(&self, pos: CursorPosition, flags: CursorFlags) -> Result<Option<CursorPosition>> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        let next = cursor::move_next(&self.env.pm, &entry.config, &blobs, pos, flags, &mut changeset);
        changeset.clear();
        next
    }

    pub fn cursor_prev(&self, pos: CursorPosition, flags: CursorFlags) -> Result<Option<CursorPosition>> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        let prev = cursor::move_prev(&self.env.pm, &entry.config, &blobs, pos, flags, &mut changeset);
        changeset.clear();
        prev
    }

    pub fn cursor_key(&self, pos: CursorPosition) -> Result<Vec<u8>> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        let key = cursor::key_at(&self.env.pm, &entry.config, &blobs, pos, &mut changeset);
        changeset.clear();
        key
    }

    pub fn cursor_record(&self, pos: CursorPosition) -> Result<Vec<u8>> {
        let state = self.env.state.lock().unwrap();
        let entry = state.slots[self.index].as_ref().ok_or(Error::InvParameter("database not open"))?;
        let blobs = BlobManager::new(&self.env.pm);
        let mut changeset = Changeset::new();
        let record = cursor::record_at(&self.env.pm, &entry.config, &blobs, pos, &mut changeset);
        changeset.clear();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EngineConfig {
        EngineConfig { page_size: 4096, max_databases: 4, ..EngineConfig::default() }
    }

    #[test]
    fn create_database_insert_and_find_in_memory() {
        let env = Environment::create_in_memory(engine()).unwrap();
        let db = env.create_database(DatabaseConfig::new("ints", KeyType::Uint32)).unwrap();
        for i in 0u32..50 {
            db.insert(&i.to_le_bytes(), &i.to_le_bytes(), InsertFlags::Unique).unwrap();
        }
        for i in 0u32..50 {
            assert_eq!(db.find(&i.to_le_bytes()).unwrap(), i.to_le_bytes().to_vec());
        }
    }

    #[test]
    fn duplicate_database_name_rejected() {
        let env = Environment::create_in_memory(engine()).unwrap();
        env.create_database(DatabaseConfig::new("a", KeyType::Uint32)).unwrap();
        let err = env.create_database(DatabaseConfig::new("a", KeyType::Uint32)).unwrap_err();
        assert!(matches!(err, Error::InvParameter(_)));
    }

    #[test]
    fn close_and_reopen_file_backed_environment_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.akv");

        {
            let env = Environment::create_file(&path, engine()).unwrap();
            let db = env.create_database(DatabaseConfig::new("ints", KeyType::Uint32)).unwrap();
            for i in 0u32..200 {
                db.insert(&i.to_le_bytes(), &i.to_le_bytes(), InsertFlags::Unique).unwrap();
            }
            env.flush().unwrap();
            env.close().unwrap();
        }

        let env = Environment::open_file(&path, EngineConfig::default().cache_capacity_bytes).unwrap();
        let db = env.open_database("ints").unwrap();
        for i in 0u32..200 {
            assert_eq!(db.find(&i.to_le_bytes()).unwrap(), i.to_le_bytes().to_vec());
        }
    }

    #[test]
    fn erase_database_frees_its_slot_for_reuse() {
        let env = Environment::create_in_memory(engine()).unwrap();
        let db = env.create_database(DatabaseConfig::new("a", KeyType::Uint32)).unwrap();
        let index = db.index;
        env.erase_database(index).unwrap();
        env.create_database(DatabaseConfig::new("a", KeyType::Uint32)).unwrap();
    }

    #[test]
    fn freelist_survives_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.akv");

        {
            let env = Environment::create_file(&path, engine()).unwrap();
            let db = env.create_database(DatabaseConfig::new("ints", KeyType::Uint32)).unwrap();
            for i in 0u32..500 {
                db.insert(&i.to_le_bytes(), &i.to_le_bytes(), InsertFlags::Unique).unwrap();
            }
            for i in 0u32..450 {
                db.erase(&i.to_le_bytes()).unwrap();
            }
            env.close().unwrap();
        }

        let env = Environment::open_file(&path, EngineConfig::default().cache_capacity_bytes).unwrap();
        let db = env.open_database("ints").unwrap();
        for i in 450u32..500 {
            assert_eq!(db.find(&i.to_le_bytes()).unwrap(), i.to_le_bytes().to_vec());
        }
        for i in 500u32..900 {
            db.insert(&i.to_le_bytes(), &i.to_le_bytes(), InsertFlags::Unique).unwrap();
        }
        for i in 450u32..900 {
            assert_eq!(db.find(&i.to_le_bytes()).unwrap(), i.to_le_bytes().to_vec());
        }
        env.close().unwrap();

        let env = Environment::open_file(&path, EngineConfig::default().cache_capacity_bytes).unwrap();
        let db = env.open_database("ints").unwrap();
        for i in 450u32..900 {
            assert_eq!(db.find(&i.to_le_bytes()).unwrap(), i.to_le_bytes().to_vec());
        }
    }
}
