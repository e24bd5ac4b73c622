//! Arbiter between `Cache`, `Freelist` and `Device`: allocates page
//! addresses, fetches pages through the cache, and hands dirty pages to
//! the flush pipeline on eviction or close.

use std::sync::Mutex;

use log::{debug, warn};

use crate::cache::Cache;
use crate::device::Device;
use crate::error::Result;
use crate::freelist::Freelist;
use crate::page::{Page, PageKind};
use crate::types::PageAddress;

pub struct PageManager {
    device: Mutex<Box<dyn Device>>,
    cache: Cache,
    freelist: Mutex<Freelist>,
    page_size: u32,
}

impl PageManager {
    pub fn new(device: Box<dyn Device>, cache_capacity_bytes: u64, cache_unlimited: bool) -> Self {
        let page_size = device.page_size();
        Self {
            device: Mutex::new(device),
            cache: Cache::new(page_size, cache_capacity_bytes, cache_unlimited),
            freelist: Mutex::new(Freelist::new(page_size)),
            page_size,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Allocates a fresh page: consult the freelist first, falling back
    /// to `Device::alloc` on a miss. The returned address is already
    /// present (dirty) in the cache.
    pub fn alloc_page(&self, kind: PageKind) -> Result<PageAddress> {
        let addr = {
            let mut freelist = self.freelist.lock().unwrap();
            match freelist.alloc(1) {
                Some(addr) => addr,
                None => {
                    drop(freelist);
                    let mut device = self.device.lock().unwrap();
                    device.alloc_page()?
                }
            }
        };
        if self.cache.is_cache_full() {
            self.purge_cache()?;
        }
        let mut page = Page::new(addr, kind, self.page_size as usize);
        page.mark_dirty();
        self.cache.put(page);
        debug!("alloc_page: addr={} kind={:?}", addr, kind);
        Ok(addr)
    }

    /// Allocates `n` contiguous pages (used by blobs spanning more than
    /// one page); returns the address of the first page. The caller is
    /// responsible for inserting the resulting pages into the cache.
    pub fn alloc_multiple_pages(&self, n: u64) -> Result<PageAddress> {
        let mut freelist = self.freelist.lock().unwrap();
        if let Some(addr) = freelist.alloc(n) {
            return Ok(addr);
        }
        drop(freelist);
        let mut device = self.device.lock().unwrap();
        device.alloc(n * self.page_size as u64)
    }

    /// Fetches a page by address, reading through `Device` on a cache
    /// miss and inserting the result into the cache.
    pub fn fetch_page(&self, addr: PageAddress, kind: PageKind) -> Result<()> {
        if self.cache.contains(addr) {
            return Ok(());
        }
        let mut buf = vec![0u8; self.page_size as usize];
        {
            let device = self.device.lock().unwrap();
            device.read_page(addr, &mut buf)?;
        }
        if self.cache.is_cache_full() {
            self.purge_cache()?;
        }
        self.cache.put(Page::from_bytes(addr, kind, buf));
        Ok(())
    }

    pub fn with_page<R>(&self, addr: PageAddress, f: impl FnOnce(&mut Page) -> R) -> Option<R> {
        self.cache.with_page(addr, f)
    }

    /// Every free run currently tracked, for persisting the freelist's
    /// on-disk page chain.
    pub fn freelist_snapshot(&self) -> Vec<(PageAddress, u64)> {
        self.freelist.lock().unwrap().snapshot()
    }

    /// Replaces the tracked freelist wholesale; used once, right after
    /// `open_file` decodes the on-disk page chain, before any other
    /// allocation has happened.
    pub fn load_freelist(&self, entries: Vec<(PageAddress, u64)>) {
        self.freelist.lock().unwrap().load(entries);
    }

    pub fn free_page(&self, addr: PageAddress) -> Result<()> {
        self.cache.del(addr);
        self.freelist.lock().unwrap().put(addr, 1);
        Ok(())
    }

    pub fn free_multiple_pages(&self, first: PageAddress, n: u64) -> Result<()> {
        for i in 0..n {
            self.cache.del(first + i * self.page_size as u64);
        }
        self.freelist.lock().unwrap().put(first, n);
        Ok(())
    }

    fn flush_page_to_device(&self, addr: PageAddress) -> Result<()> {
        let bytes: Option<Vec<u8>> = self.cache.with_page(addr, |p| p.data_raw().to_vec());
        if let Some(bytes) = bytes {
            let mut device = self.device.lock().unwrap();
            device.write(addr, &bytes)?;
            drop(device);
            self.cache.with_page(addr, |p| p.clear_dirty());
        }
        Ok(())
    }

    /// Gathers eviction candidates, flushes the dirty ones, and releases
    /// both groups from the cache. Invoked when `cache.is_cache_full()`.
    pub fn purge_cache(&self) -> Result<()> {
        let candidates = self.cache.purge_candidates(None);
        if candidates.dirty.is_empty() && candidates.clean.is_empty() {
            warn!("purge_cache: no evictable candidates, cache stays over budget");
        }
        for addr in &candidates.dirty {
            self.flush_page_to_device(*addr)?;
            self.cache.del(*addr);
        }
        for addr in &candidates.clean {
            self.cache.del(*addr);
        }
        Ok(())
    }

    /// Flushes every dirty page to the device, without evicting clean
    /// pages from the cache.
    pub fn flush_all(&self) -> Result<()> {
        for addr in self.cache.dirty_addresses() {
            self.flush_page_to_device(addr)?;
        }
        let mut device = self.device.lock().unwrap();
        device.flush()?;
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.flush_all()?;
        drop(self.cache.drain_all());
        let mut device = self.device.lock().unwrap();
        device.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::InMemoryDevice;

    #[test]
    fn alloc_fetch_roundtrip() {
        let device = InMemoryDevice::new(1024);
        let mut boxed: Box<dyn Device> = Box::new(device);
        boxed.create().unwrap();
        let pm = PageManager::new(boxed, 1024 * 1024, false);

        let addr = pm.alloc_page(PageKind::BtreeNode).unwrap();
        pm.with_page(addr, |p| {
            p.data_mut()[0] = 9;
        });
        pm.flush_all().unwrap();
        pm.free_page(addr).unwrap();
        assert!(pm.fetch_page(addr, PageKind::BtreeNode).is_ok());
    }
}
