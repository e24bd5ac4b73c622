//! Address -> page table plus a total LRU ordering.
//!
//! A hash lookup keyed by page address, one intrusive LRU list, and a
//! `purge_candidates` sweep from the LRU tail that classifies victims
//! into a dirty-flush queue and a clean-release queue while skipping
//! pinned pages. A single `Mutex` protects the bucket table and LRU
//! list together, rather than sharding the lock by bucket.

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, trace};

use crate::page::Page;
use crate::types::PageAddress;

struct CacheInner {
    table: HashMap<PageAddress, Page>,
    /// Front = most-recently-used, back = least-recently-used.
    lru: Vec<PageAddress>,
    cache_hits: u64,
    cache_misses: u64,
}

impl CacheInner {
    fn touch(&mut self, addr: PageAddress) {
        if let Some(pos) = self.lru.iter().position(|a| *a == addr) {
            let a = self.lru.remove(pos);
            self.lru.insert(0, a);
        } else {
            self.lru.insert(0, addr);
        }
    }
}

pub struct Cache {
    inner: Mutex<CacheInner>,
    page_size: u32,
    capacity_bytes: u64,
    unlimited: bool,
}

/// Result of a `purge_candidates` sweep: pages to flush, and pages
/// already clean that can simply be dropped from the cache.
pub struct PurgeCandidates {
    pub dirty: Vec<PageAddress>,
    pub clean: Vec<PageAddress>,
}

impl Cache {
    pub fn new(page_size: u32, capacity_bytes: u64, unlimited: bool) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                table: HashMap::new(),
                lru: Vec::new(),
                cache_hits: 0,
                cache_misses: 0,
            }),
            page_size,
            capacity_bytes,
            unlimited,
        }
    }

    /// Moves `addr` to the LRU head and hands back a clone of its bytes
    /// and metadata via `f`, so callers never hold a reference across
    /// the lock boundary.
    pub fn get_with<R>(&self, addr: PageAddress, f: impl FnOnce(&mut Page) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        if inner.table.contains_key(&addr) {
            inner.touch(addr);
            inner.cache_hits += 1;
            let page = inner.table.get_mut(&addr).unwrap();
            Some(f(page))
        } else {
            inner.cache_misses += 1;
            None
        }
    }

    pub fn contains(&self, addr: PageAddress) -> bool {
        self.inner.lock().unwrap().table.contains_key(&addr)
    }

    pub fn put(&self, page: Page) {
        let mut inner = self.inner.lock().unwrap();
        let addr = page.address();
        inner.table.insert(addr, page);
        inner.touch(addr);
    }

    pub fn del(&self, addr: PageAddress) -> Option<Page> {
        let mut inner = self.inner.lock().unwrap();
        inner.lru.retain(|a| *a != addr);
        inner.table.remove(&addr)
    }

    pub fn with_page<R>(&self, addr: PageAddress, f: impl FnOnce(&mut Page) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        inner.table.get_mut(&addr).map(f)
    }

    pub fn is_cache_full(&self) -> bool {
        if self.unlimited {
            return false;
        }
        self.current_elements() as u64 * self.page_size as u64 > self.capacity_bytes
    }

    pub fn capacity(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn current_elements(&self) -> usize {
        self.inner.lock().unwrap().table.len()
    }

    pub fn allocated_elements(&self) -> usize {
        self.current_elements()
    }

    pub fn stats(&self) -> (u64, u64) {
        let inner = self.inner.lock().unwrap();
        (inner.cache_hits, inner.cache_misses)
    }

    /// Scans from the LRU tail, collecting up to
    /// `current - capacity/page_size` victims. Pinned pages (live
    /// cursors, or `PageKind::BtreeRoot`) and `ignore` (the PageManager's
    /// last-used blob page) are skipped, never evicted.
    pub fn purge_candidates(&self, ignore: Option<PageAddress>) -> PurgeCandidates {
        let inner = self.inner.lock().unwrap();
        let target_evictions = if self.unlimited {
            0
        } else {
            let cap_pages = (self.capacity_bytes / self.page_size as u64).max(1) as usize;
            inner.table.len().saturating_sub(cap_pages)
        };

        let mut dirty = Vec::new();
        let mut clean = Vec::new();
        for addr in inner.lru.iter().rev() {
            if dirty.len() + clean.len() >= target_evictions.max(1) {
                break;
            }
            if Some(*addr) == ignore {
                continue;
            }
            if let Some(page) = inner.table.get(addr) {
                if page.is_pinned() {
                    continue;
                }
                if page.is_dirty() {
                    dirty.push(*addr);
                } else {
                    clean.push(*addr);
                }
            }
        }
        trace!(
            "purge_candidates: {} dirty, {} clean (target {})",
            dirty.len(),
            clean.len(),
            target_evictions
        );
        PurgeCandidates { dirty, clean }
    }

    /// Every currently dirty page's address, in no particular order.
    pub fn dirty_addresses(&self) -> Vec<PageAddress> {
        let inner = self.inner.lock().unwrap();
        inner
            .table
            .values()
            .filter(|p| p.is_dirty())
            .map(|p| p.address())
            .collect()
    }

    /// Removes every page for which `predicate` returns true; used at
    /// environment close.
    pub fn purge_if(&self, predicate: impl Fn(&Page) -> bool) -> Vec<PageAddress> {
        let mut inner = self.inner.lock().unwrap();
        let victims: Vec<PageAddress> = inner
            .table
            .values()
            .filter(|p| predicate(p))
            .map(|p| p.address())
            .collect();
        for addr in &victims {
            inner.table.remove(addr);
            inner.lru.retain(|a| a != addr);
        }
        debug!("purge_if removed {} pages", victims.len());
        victims
    }

    pub fn drain_all(&self) -> Vec<Page> {
        let mut inner = self.inner.lock().unwrap();
        inner.lru.clear();
        inner.table.drain().map(|(_, p)| p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageKind;

    #[test]
    fn lru_ordering_and_eviction_skips_pinned() {
        let cache = Cache::new(128, 2 * 128, false);
        for i in 0..3u64 {
            cache.put(Page::new(i * 128, PageKind::BtreeNode, 128));
        }
        // touch page 0 so it's most-recently-used
        cache.get_with(0, |_| {});
        cache.with_page(1 * 128, |p| p.pin());

        let candidates = cache.purge_candidates(None);
        // page 128 is pinned, page 256 is the true LRU tail, page 0 was
        // just touched so it should not be the first pick.
        assert!(!candidates.dirty.contains(&128) && !candidates.clean.contains(&128));
    }
}
