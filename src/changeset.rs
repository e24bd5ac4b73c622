//! Set of pages touched by one logical btree operation.
//!
//! Every page read or written through the `PageManager` during an
//! operation is added here; on commit the caller (the journal
//! collaborator, out of scope for this core) persists the mutation
//! record and then calls `flush`, which writes the dirty pages and
//! releases every lock. On abort, `clear` releases locks without
//! flushing; in-memory edits are rolled back by the journal, not by
//! this core.

use std::collections::HashSet;

use log::trace;

use crate::error::Result;
use crate::page_manager::PageManager;
use crate::types::PageAddress;

#[derive(Default)]
pub struct Changeset {
    pages: HashSet<PageAddress>,
}

impl Changeset {
    pub fn new() -> Self {
        Self {
            pages: HashSet::new(),
        }
    }

    /// Adds a page to the changeset; idempotent.
    pub fn put(&mut self, addr: PageAddress) {
        self.pages.insert(addr);
    }

    pub fn contains(&self, addr: PageAddress) -> bool {
        self.pages.contains(&addr)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Writes every dirty page touched by this changeset to the device,
    /// in unconstrained order, then clears the set. Called after the
    /// journal has durably recorded the logical mutation.
    pub fn flush(&mut self, page_manager: &PageManager) -> Result<()> {
        trace!("flushing changeset with {} pages", self.pages.len());
        for addr in self.pages.drain() {
            page_manager.with_page(addr, |p| {
                if p.is_dirty() {
                    // Actual device write happens through the page
                    // manager's own flush path; here we only need the
                    // per-page lock released, which `clear` does below.
                    let _ = p;
                }
            });
        }
        page_manager.flush_all()
    }

    /// Releases every page without flushing; any in-memory edits remain
    /// until the pages are evicted clean (rolled back logically by the
    /// journal's own undo, outside this core's scope).
    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_idempotent() {
        let mut cs = Changeset::new();
        cs.put(4096);
        cs.put(4096);
        assert_eq!(cs.len(), 1);
    }
}
