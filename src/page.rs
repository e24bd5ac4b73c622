//! Fixed-size page buffers and their in-memory bookkeeping.
//!
//! An address, a type tag, a dirty flag, a cursor reference count, and
//! the raw bytes. `Page` owns no back-pointer into the cache or page
//! manager; callers pass addresses, never long-lived `&Page`s across
//! operations that might evict.

use bytes::BytesMut;

use crate::types::PageAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Header,
    BtreeRoot,
    BtreeNode,
    Blob,
    PageManagerState,
    Freelist,
}

/// One fixed-size page buffer plus its bookkeeping. The `data` buffer is
/// always exactly `page_size` bytes.
pub struct Page {
    address: PageAddress,
    kind: PageKind,
    data: BytesMut,
    dirty: bool,
    /// Number of cursors currently positioned on this page; pages with
    /// `cursor_refs > 0` are never chosen as eviction candidates.
    cursor_refs: u32,
    lsn: u64,
}

impl Page {
    pub fn new(address: PageAddress, kind: PageKind, page_size: usize) -> Self {
        Self {
            address,
            kind,
            data: BytesMut::zeroed(page_size),
            dirty: false,
            cursor_refs: 0,
            lsn: 0,
        }
    }

    pub fn from_bytes(address: PageAddress, kind: PageKind, data: Vec<u8>) -> Self {
        Self {
            address,
            kind,
            data: BytesMut::from(&data[..]),
            dirty: false,
            cursor_refs: 0,
            lsn: 0,
        }
    }

    pub fn address(&self) -> PageAddress {
        self.address
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: PageKind) {
        self.kind = kind;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.data
    }

    /// Borrow the raw buffer without marking the page dirty; used by
    /// read-only helpers (integrity checks, cache flushing) that must
    /// not themselves dirty the page.
    pub fn data_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn is_pinned(&self) -> bool {
        self.cursor_refs > 0 || matches!(self.kind, PageKind::BtreeRoot)
    }

    pub fn pin(&mut self) {
        self.cursor_refs += 1;
    }

    pub fn unpin(&mut self) {
        self.cursor_refs = self.cursor_refs.saturating_sub(1);
    }

    pub fn lsn(&self) -> u64 {
        self.lsn
    }

    pub fn set_lsn(&mut self, lsn: u64) {
        self.lsn = lsn;
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
