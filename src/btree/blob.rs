//! Allocates, reads, overwrites and erases variable-length byte runs
//! across contiguous blob pages.
//!
//! A blob is a header (`size`, `allocated_size`, `flags`) followed
//! immediately by payload, spanning one or more pages allocated as a
//! single contiguous run; the id is the run's starting page address.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::config::Compressor;
use crate::error::{Error, Result};
use crate::page::{Page, PageKind};
use crate::page_manager::PageManager;
use crate::types::{BlobId, PageAddress};

// size:u32 (logical length) + stored_len:u32 (bytes actually on disk,
// differs from `size` when compressed) + allocated_size:u32 (run size,
// rounded up to whole pages) + flags:u8
const HEADER_SIZE: usize = 13;
const FLAG_COMPRESSED: u8 = 0x1;

pub struct BlobManager<'a> {
    pm: &'a PageManager,
}

impl<'a> BlobManager<'a> {
    pub fn new(pm: &'a PageManager) -> Self {
        Self { pm }
    }

    fn page_size(&self) -> u64 {
        self.pm.page_size() as u64
    }

    /// Reads `len` bytes starting at absolute offset `start`, fetching
    /// whatever pages the range spans.
    fn read_range(&self, start: u64, len: usize) -> Result<Vec<u8>> {
        let page_size = self.page_size();
        let mut out = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let abs = start + done as u64;
            let page_addr = (abs / page_size) * page_size;
            let in_page = (abs - page_addr) as usize;
            self.pm.fetch_page(page_addr, PageKind::Blob)?;
            let take = (page_size as usize - in_page).min(len - done);
            self.pm
                .with_page(page_addr, |p| {
                    out[done..done + take].copy_from_slice(&p.data()[in_page..in_page + take]);
                })
                .ok_or(Error::IntegrityViolated("blob page vanished from cache".into()))?;
            done += take;
        }
        Ok(out)
    }

    fn write_range(&self, start: u64, buf: &[u8]) -> Result<()> {
        let page_size = self.page_size();
        let mut done = 0;
        while done < buf.len() {
            let abs = start + done as u64;
            let page_addr = (abs / page_size) * page_size;
            let in_page = (abs - page_addr) as usize;
            if !self.pm.cache().contains(page_addr) {
                self.pm.fetch_page(page_addr, PageKind::Blob)?;
            }
            let take = (page_size as usize - in_page).min(buf.len() - done);
            self.pm
                .with_page(page_addr, |p| {
                    p.data_mut()[in_page..in_page + take].copy_from_slice(&buf[done..done + take]);
                })
                .ok_or(Error::IntegrityViolated("blob page vanished from cache".into()))?;
            done += take;
        }
        Ok(())
    }

    fn pages_needed(&self, total_len: usize) -> u64 {
        let page_size = self.page_size();
        ((total_len as u64) + page_size - 1) / page_size
    }

    /// Reserves a contiguous run of fresh pages and registers them with
    /// the cache as dirty `Blob` pages (`PageManager::alloc_multiple_pages`
    /// leaves that registration to the caller).
    fn alloc_run(&self, num_pages: u64) -> Result<PageAddress> {
        let first = self.pm.alloc_multiple_pages(num_pages)?;
        let page_size = self.pm.page_size() as usize;
        for i in 0..num_pages {
            let addr = first + i * page_size as u64;
            if !self.pm.cache().contains(addr) {
                let mut page = Page::new(addr, PageKind::Blob, page_size);
                page.mark_dirty();
                self.pm.cache().put(page);
            }
        }
        Ok(first)
    }

    fn maybe_compress(&self, data: &[u8], compressor: Compressor) -> Result<(Vec<u8>, bool)> {
        match compressor {
            Compressor::None => Ok((data.to_vec(), false)),
            Compressor::Zlib => {
                let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
                enc.write_all(data)?;
                Ok((enc.finish()?, true))
            }
            other => Err(Error::NotImplemented(compressor_name(other))),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut dec = ZlibDecoder::new(data);
        let mut out = Vec::new();
        dec.read_to_end(&mut out)?;
        Ok(out)
    }

    pub fn allocate(&self, data: &[u8], compressor: Compressor) -> Result<BlobId> {
        let (payload, compressed) = self.maybe_compress(data, compressor)?;
        let total = HEADER_SIZE + payload.len();
        let num_pages = self.pages_needed(total).max(1);
        let addr = self.alloc_run(num_pages)?;

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&(data.len() as u32).to_le_bytes());
        header.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        header.extend_from_slice(&((num_pages * self.page_size()) as u32).to_le_bytes());
        header.push(if compressed { FLAG_COMPRESSED } else { 0 });
        self.write_range(addr, &header)?;
        self.write_range(addr + HEADER_SIZE as u64, &payload)?;
        Ok(addr)
    }

    pub fn blob_size(&self, blob_id: BlobId) -> Result<u32> {
        let header = self.read_range(blob_id, HEADER_SIZE)?;
        Ok(u32::from_le_bytes(header[0..4].try_into().unwrap()))
    }

    fn allocated_size(&self, blob_id: BlobId) -> Result<u32> {
        let header = self.read_range(blob_id, HEADER_SIZE)?;
        Ok(u32::from_le_bytes(header[8..12].try_into().unwrap()))
    }

    pub fn read(&self, blob_id: BlobId) -> Result<Vec<u8>> {
        let header = self.read_range(blob_id, HEADER_SIZE)?;
        let size = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
        let stored_len = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
        let flags = header[12];
        let raw = self.read_range(blob_id + HEADER_SIZE as u64, stored_len)?;
        if flags & FLAG_COMPRESSED != 0 {
            self.decompress(&raw)
        } else {
            Ok(raw[..size].to_vec())
        }
    }

    /// Writes `rec` to a new or existing location: in place if it fits
    /// within the blob's already-allocated run, otherwise a fresh
    /// allocation (and the old run is freed).
    pub fn overwrite(&self, blob_id: BlobId, rec: &[u8], compressor: Compressor) -> Result<BlobId> {
        let (payload, compressed) = self.maybe_compress(rec, compressor)?;
        let allocated = self.allocated_size(blob_id)?;
        let required = (HEADER_SIZE + payload.len()) as u32;
        if required <= allocated {
            let mut header = Vec::with_capacity(HEADER_SIZE);
            header.extend_from_slice(&(rec.len() as u32).to_le_bytes());
            header.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            header.extend_from_slice(&allocated.to_le_bytes());
            header.push(if compressed { FLAG_COMPRESSED } else { 0 });
            self.write_range(blob_id, &header)?;
            self.write_range(blob_id + HEADER_SIZE as u64, &payload)?;
            Ok(blob_id)
        } else {
            let new_id = self.allocate(rec, compressor)?;
            self.erase(blob_id)?;
            Ok(new_id)
        }
    }

    /// Writes only the selected `(offset, bytes)` regions of an
    /// uncompressed blob's payload in place; used by `DuplicateTable`
    /// in-place slot updates.
    pub fn overwrite_regions(&self, blob_id: BlobId, regions: &[(usize, &[u8])]) -> Result<()> {
        let header = self.read_range(blob_id, HEADER_SIZE)?;
        if header[12] & FLAG_COMPRESSED != 0 {
            return Err(Error::InvParameter("cannot patch regions of a compressed blob"));
        }
        for (offset, bytes) in regions {
            self.write_range(blob_id + HEADER_SIZE as u64 + *offset as u64, bytes)?;
        }
        Ok(())
    }

    pub fn erase(&self, blob_id: BlobId) -> Result<()> {
        let allocated = self.allocated_size(blob_id)?;
        let num_pages = self.pages_needed(allocated as usize).max(1);
        self.pm.free_multiple_pages(blob_id, num_pages)
    }
}

fn compressor_name(c: Compressor) -> &'static str {
    match c {
        Compressor::Snappy => "snappy blob compressor",
        Compressor::Lzf => "lzf blob compressor",
        Compressor::Lzo => "lzo blob compressor",
        _ => "blob compressor",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, InMemoryDevice};

    fn pm() -> PageManager {
        let mut device = InMemoryDevice::new(256);
        device.create().unwrap();
        PageManager::new(Box::new(device), 1024 * 1024, false)
    }

    #[test]
    fn allocate_read_roundtrip_single_page() {
        let pm = pm();
        let mgr = BlobManager::new(&pm);
        let id = mgr.allocate(b"hello world", Compressor::None).unwrap();
        assert_eq!(mgr.read(id).unwrap(), b"hello world");
        assert_eq!(mgr.blob_size(id).unwrap(), 11);
    }

    #[test]
    fn allocate_spans_multiple_pages() {
        let pm = pm();
        let mgr = BlobManager::new(&pm);
        let data = vec![0xABu8; 1000];
        let id = mgr.allocate(&data, Compressor::None).unwrap();
        assert_eq!(mgr.read(id).unwrap(), data);
    }

    #[test]
    fn overwrite_in_place_when_it_fits() {
        let pm = pm();
        let mgr = BlobManager::new(&pm);
        let id = mgr.allocate(b"0123456789", Compressor::None).unwrap();
        let new_id = mgr.overwrite(id, b"abc", Compressor::None).unwrap();
        assert_eq!(new_id, id);
        assert_eq!(mgr.read(id).unwrap(), b"abc");
    }

    #[test]
    fn overwrite_reallocates_when_it_does_not_fit() {
        let pm = pm();
        let mgr = BlobManager::new(&pm);
        let id = mgr.allocate(b"short", Compressor::None).unwrap();
        let bigger = vec![7u8; 2000];
        let new_id = mgr.overwrite(id, &bigger, Compressor::None).unwrap();
        assert_eq!(mgr.read(new_id).unwrap(), bigger);
    }

    #[test]
    fn zlib_compression_roundtrip() {
        let pm = pm();
        let mgr = BlobManager::new(&pm);
        let data = vec![42u8; 4000];
        let id = mgr.allocate(&data, Compressor::Zlib).unwrap();
        assert_eq!(mgr.read(id).unwrap(), data);
    }
}
