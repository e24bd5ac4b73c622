//! Owns the environment's file (or, for `InMemory` environments, a
//! growable in-process arena) and its size.
//!
//! `create`/`open`, `read`/`write` (raw, never through the cache),
//! `alloc` (grow the file and return the new region's offset),
//! `read_page`/`alloc_page`/`free_page` (page-granular, may use mmap),
//! `is_mapped`, and `reclaim_space`.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::PageAddress;

/// Byte-oriented backing store for an `Environment`.
///
/// Implementations are free to use mmap for `read_page`/`alloc_page` when
/// the range fits a mapped window; `read`/`write` never use mmap, so the
/// btree core can always fall back to them (e.g. for blob reads spanning
/// multiple pages).
pub trait Device: Send + Sync {
    fn create(&mut self) -> Result<()>;
    fn open(&mut self) -> Result<()>;
    fn is_open(&self) -> bool;
    fn close(&mut self) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn truncate(&mut self, new_size: u64) -> Result<()>;
    fn file_size(&self) -> Result<u64>;

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Grows the device by `len` bytes (rounded up to a multiple of the
    /// page size) and returns the offset of the first new page.
    fn alloc(&mut self, len: u64) -> Result<PageAddress>;

    fn read_page(&self, addr: PageAddress, buf: &mut [u8]) -> Result<()> {
        self.read(addr, buf)
    }

    fn alloc_page(&mut self) -> Result<PageAddress> {
        self.alloc(self.page_size() as u64)
    }

    /// Returns page-sized space to the device. The caller must ensure
    /// the page is clean (not dirty) before calling this.
    fn free_page(&mut self, _addr: PageAddress) -> Result<()> {
        Ok(())
    }

    fn is_mapped(&self, _offset: u64, _size: u64) -> bool {
        false
    }

    /// Shrinks the file to the last live page. This core only calls
    /// `truncate`, which is safe for both the pread/pwrite and the
    /// mmap-backed implementations since neither keeps a long-lived
    /// mapping across calls (see DESIGN.md).
    fn reclaim_space(&mut self, last_live_offset: u64) -> Result<()> {
        self.truncate(last_live_offset)
    }

    fn page_size(&self) -> u32;
}

/// File-backed device using `pread`/`pwrite`-style positioned I/O
/// (`seek` + `read`/`write`, since `std::fs::File` on all platforms
/// supports this without disturbing a shared cursor as long as callers
/// never interleave unsynchronized seeks).
pub struct FileDevice {
    path: PathBuf,
    file: Option<File>,
    page_size: u32,
    read_only: bool,
}

impl FileDevice {
    pub fn new(path: impl AsRef<Path>, page_size: u32, read_only: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            page_size,
            read_only,
        }
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or(Error::NotReady)
    }

    fn file_ref(&self) -> Result<&File> {
        self.file.as_ref().ok_or(Error::NotReady)
    }
}

impl Device for FileDevice {
    fn create(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        self.file = Some(file);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Err(Error::FileNotFound(self.path.display().to_string()));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(!self.read_only)
            .open(&self.path)?;
        self.file = Some(file);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut f) = self.file.take() {
            f.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file_mut()?.flush()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> Result<()> {
        self.file_mut()?.set_len(new_size)?;
        Ok(())
    }

    fn file_size(&self) -> Result<u64> {
        Ok(self.file_ref()?.metadata()?.len())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        // Positioned read (pread) so concurrent readers never race on a
        // shared file cursor the way a seek()+read() pair would.
        self.file_ref()?.read_exact_at(buf, offset).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::ShortRead
            } else {
                Error::from(e)
            }
        })
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::DbReadOnly);
        }
        self.file_mut()?.write_all_at(buf, offset).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WriteZero {
                Error::ShortWrite
            } else {
                Error::from(e)
            }
        })
    }

    fn alloc(&mut self, len: u64) -> Result<PageAddress> {
        let page_size = self.page_size as u64;
        let rounded = ((len + page_size - 1) / page_size) * page_size;
        let current = self.file_size()?;
        self.truncate(current + rounded)?;
        Ok(current)
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}

/// In-memory variant used by `EnvFlags::in_memory` environments: every
/// page is always "allocated" (no mmap, no lazy growth beyond the
/// arena's own `Vec` resizing).
pub struct InMemoryDevice {
    arena: Vec<u8>,
    page_size: u32,
    open: bool,
}

impl InMemoryDevice {
    pub fn new(page_size: u32) -> Self {
        Self {
            arena: Vec::new(),
            page_size,
            open: false,
        }
    }
}

impl Device for InMemoryDevice {
    fn create(&mut self) -> Result<()> {
        self.arena.clear();
        self.open = true;
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> Result<()> {
        self.arena.resize(new_size as usize, 0);
        Ok(())
    }

    fn file_size(&self) -> Result<u64> {
        Ok(self.arena.len() as u64)
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.arena.len() {
            return Err(Error::ShortRead);
        }
        buf.copy_from_slice(&self.arena[start..end]);
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.arena.len() {
            self.arena.resize(end, 0);
        }
        self.arena[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn alloc(&mut self, len: u64) -> Result<PageAddress> {
        let page_size = self.page_size as u64;
        let rounded = ((len + page_size - 1) / page_size) * page_size;
        let current = self.arena.len() as u64;
        self.arena.resize((current + rounded) as usize, 0);
        Ok(current)
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_device_alloc_and_rw() {
        let mut dev = InMemoryDevice::new(1024);
        dev.create().unwrap();
        let addr = dev.alloc_page().unwrap();
        assert_eq!(addr, 0);
        let addr2 = dev.alloc_page().unwrap();
        assert_eq!(addr2, 1024);

        let mut payload = vec![0u8; 1024];
        payload[0] = 42;
        dev.write(addr, &payload).unwrap();

        let mut out = vec![0u8; 1024];
        dev.read(addr, &mut out).unwrap();
        assert_eq!(out[0], 42);
    }

    #[test]
    fn file_device_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut dev = FileDevice::new(&path, 4096, false);
        dev.create().unwrap();
        let addr = dev.alloc_page().unwrap();
        let mut payload = vec![7u8; 4096];
        dev.write(addr, &payload).unwrap();
        payload.fill(0);
        dev.read(addr, &mut payload).unwrap();
        assert!(payload.iter().all(|&b| b == 7));
        dev.close().unwrap();

        let mut reopened = FileDevice::new(&path, 4096, false);
        reopened.open().unwrap();
        assert_eq!(reopened.file_size().unwrap(), 4096);
    }
}
