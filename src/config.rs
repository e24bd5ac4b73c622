//! Explicit, constructor-supplied configuration.
//!
//! No process-wide static tunables: page size, cache capacity and flags
//! are fields on `EngineConfig`, passed in at `Environment::create`/
//! `open` time, with per-database overrides living in `DatabaseConfig`
//! and persisted in the environment's file header.

pub const DEFAULT_PAGE_SIZE: u32 = 4096;
pub const MIN_PAGE_SIZE: u32 = 1024;

/// Environment-wide open/create flags recognized by the core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvFlags {
    pub in_memory: bool,
    pub read_only: bool,
    pub disable_mmap: bool,
    pub cache_unlimited: bool,
    pub enable_fsync: bool,
    pub enable_crc32: bool,
    pub enable_recovery: bool,
    pub force_records_inline: bool,
    pub enable_duplicate_keys: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Real32,
    Real64,
    Binary,
    Custom,
}

impl KeyType {
    /// Size in bytes of a POD key type, or `None` for variable-length
    /// (`Binary` with `key_size == 0`) or `Custom` keys.
    pub fn pod_size(&self) -> Option<usize> {
        match self {
            KeyType::Uint8 => Some(1),
            KeyType::Uint16 => Some(2),
            KeyType::Uint32 | KeyType::Real32 => Some(4),
            KeyType::Uint64 | KeyType::Real64 => Some(8),
            KeyType::Binary | KeyType::Custom => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    None,
    Zlib,
    Snappy,
    Lzf,
    Lzo,
    Varbyte,
    GroupVarint,
    StreamVbyte,
    For,
    SimdComp,
    SimdFor,
}

/// Per-database parameters, persisted in the environment header's
/// per-database slot table.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub name: String,
    pub key_type: KeyType,
    /// 0 means variable-length keys.
    pub key_size: u32,
    /// 0 means unlimited record size (records may spill to blobs).
    pub record_size: u32,
    pub key_compressor: Compressor,
    pub record_compressor: Compressor,
    /// 0 means "derive from page size".
    pub duplicate_threshold: u32,
    /// 0 means "derive from page size".
    pub extended_key_threshold: u32,
    pub enable_duplicate_keys: bool,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
            key_size: key_type.pod_size().map(|s| s as u32).unwrap_or(0),
            record_size: 0,
            key_compressor: Compressor::None,
            record_compressor: Compressor::None,
            duplicate_threshold: 0,
            extended_key_threshold: 0,
            enable_duplicate_keys: false,
        }
    }

    /// Extended-key threshold in bytes, derived from page size per
    /// when not explicitly configured. The UpfrontIndex size
    /// field is one byte, so no threshold may exceed 255.
    pub fn resolved_extended_key_threshold(&self, page_size: u32) -> usize {
        if self.extended_key_threshold != 0 {
            return self.extended_key_threshold as usize;
        }
        if page_size <= 1024 {
            64
        } else if page_size <= 8192 {
            128
        } else {
            250
        }
    }

    /// Inline-duplicate-run threshold, derived from page size per
    /// when not explicitly configured.
    pub fn resolved_duplicate_threshold(&self, page_size: u32) -> usize {
        if self.duplicate_threshold != 0 {
            return self.duplicate_threshold as usize;
        }
        let scaled = (page_size / 256).max(8);
        scaled.min(64) as usize
    }
}

/// Engine-wide configuration supplied at environment creation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub page_size: u32,
    pub max_databases: u16,
    pub flags: EnvFlags,
    /// Cache capacity in bytes; ignored when `flags.cache_unlimited`.
    pub cache_capacity_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_databases: 16,
            flags: EnvFlags::default(),
            cache_capacity_bytes: 16 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.page_size < MIN_PAGE_SIZE || self.page_size % MIN_PAGE_SIZE != 0 {
            return Err(crate::error::Error::InvPageSize);
        }
        Ok(())
    }
}
