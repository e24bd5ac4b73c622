//! In-memory map of page-id -> contiguous-free-page count.
//!
//! A `BTreeMap<page_id, count>` with `alloc`/`put`/`has`, hit/miss
//! counters, and a `truncate` helper that finds how many pages at the
//! file's tail are free (used by `Device::reclaim_space`). `snapshot`/
//! `load` round-trip the map itself; `Environment` is the one that
//! encodes/decodes the on-disk page chain (see DESIGN.md).

use std::collections::BTreeMap;

use crate::types::PageAddress;

#[derive(Debug, Default, Clone, Copy)]
pub struct FreelistStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct Freelist {
    page_size: u64,
    free_pages: BTreeMap<PageAddress, u64>,
    stats: FreelistStats,
}

impl Freelist {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size as u64,
            free_pages: BTreeMap::new(),
            stats: FreelistStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.free_pages.is_empty()
    }

    pub fn stats(&self) -> FreelistStats {
        self.stats
    }

    /// Allocates `num_pages` sequential pages from the freelist; returns
    /// `None` if no contiguous run of that size is tracked (the caller
    /// falls back to `Device::alloc`).
    pub fn alloc(&mut self, num_pages: u64) -> Option<PageAddress> {
        let hit = self
            .free_pages
            .iter()
            .find(|(_, &count)| count >= num_pages)
            .map(|(&addr, &count)| (addr, count));

        match hit {
            Some((addr, count)) => {
                self.free_pages.remove(&addr);
                if count > num_pages {
                    let remainder_addr = addr + num_pages * self.page_size;
                    self.free_pages.insert(remainder_addr, count - num_pages);
                }
                self.stats.hits += 1;
                Some(addr)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Stores a contiguous run of `page_count` pages starting at
    /// `page_id`, merging with an adjacent run when possible.
    pub fn put(&mut self, page_id: PageAddress, page_count: u64) {
        let merge_left = self
            .free_pages
            .iter()
            .find(|(&addr, &count)| addr + count * self.page_size == page_id)
            .map(|(&addr, &count)| (addr, count));

        let (start, mut total) = match merge_left {
            Some((addr, count)) => {
                self.free_pages.remove(&addr);
                (addr, count + page_count)
            }
            None => (page_id, page_count),
        };

        let merge_right_addr = start + total * self.page_size;
        if let Some(&right_count) = self.free_pages.get(&merge_right_addr) {
            self.free_pages.remove(&merge_right_addr);
            total += right_count;
        }

        self.free_pages.insert(start, total);
    }

    pub fn has(&self, page_id: PageAddress) -> bool {
        self.free_pages.contains_key(&page_id)
            || self
                .free_pages
                .range(..page_id)
                .next_back()
                .map(|(&addr, &count)| page_id < addr + count * self.page_size)
                .unwrap_or(false)
    }

    /// Returns the address at which the file could be truncated: the
    /// start of the trailing free run, or `file_size` if the file's last
    /// page is not free.
    pub fn truncate(&mut self, file_size: PageAddress) -> PageAddress {
        if file_size < self.page_size {
            return file_size;
        }
        let last_page = file_size - self.page_size;
        if let Some((&addr, &count)) = self
            .free_pages
            .range(..=last_page)
            .next_back()
        {
            if addr + count * self.page_size == file_size {
                self.free_pages.remove(&addr);
                return addr;
            }
        }
        file_size
    }

    pub fn clear(&mut self) {
        self.free_pages.clear();
        self.stats = FreelistStats::default();
    }

    /// Every tracked free run as `(start, count)`, in ascending address
    /// order, for persisting to the on-disk page chain.
    pub fn snapshot(&self) -> Vec<(PageAddress, u64)> {
        self.free_pages.iter().map(|(&addr, &count)| (addr, count)).collect()
    }

    /// Replaces the tracked free runs wholesale, used when rebuilding
    /// the freelist from its on-disk page chain on open. Any runs
    /// already tracked (there should be none, this early) are dropped.
    pub fn load(&mut self, entries: Vec<(PageAddress, u64)>) {
        self.free_pages = entries.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_put_round_trip() {
        let mut fl = Freelist::new(1024);
        fl.put(4096, 2);
        assert!(fl.has(4096));
        assert!(fl.has(5120));
        let addr = fl.alloc(1).unwrap();
        assert_eq!(addr, 4096);
        // remainder of 1 page stays tracked
        assert!(fl.has(5120));
        assert_eq!(fl.stats().hits, 1);
    }

    #[test]
    fn merges_adjacent_runs() {
        let mut fl = Freelist::new(1024);
        fl.put(0, 1);
        fl.put(1024, 1);
        // should have merged into a single 2-page run starting at 0
        let addr = fl.alloc(2).unwrap();
        assert_eq!(addr, 0);
    }

    #[test]
    fn truncate_finds_trailing_free_run() {
        let mut fl = Freelist::new(1024);
        fl.put(3072, 1);
        assert_eq!(fl.truncate(4096), 3072);
        assert_eq!(fl.truncate(4096), 4096); // already removed
    }
}
