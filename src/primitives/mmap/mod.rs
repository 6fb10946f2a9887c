//! Growable shared mapping of the database file.
//!
//! The mapping is a list of chunks. The first chunk covers at least the
//! whole file when it is opened; every later chunk doubles the mapped
//! address space, so pages never move once mapped and no existing chunk is
//! ever remapped. Chunks may extend past the end of the file; the pager
//! extends the file before touching any page beyond it.
#![allow(unsafe_code)]

use std::fs::File;

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::types::{page::PAGE_SIZE, MisqlError, PageId, Result};

/// Chunked `MAP_SHARED` mapping of a database file.
pub struct MmapRegion {
    chunks: Vec<MmapMut>,
    size: usize,
}

impl MmapRegion {
    /// Maps `file`, starting from `initial` bytes and doubling until the
    /// mapping covers `file_len`.
    pub fn map(file: &File, file_len: u64, initial: usize) -> Result<Self> {
        if initial == 0 || initial % PAGE_SIZE != 0 {
            return Err(MisqlError::Config(
                "mmap size must be a positive multiple of the page size",
            ));
        }
        let mut size = initial;
        while (size as u64) < file_len {
            size = size
                .checked_mul(2)
                .ok_or(MisqlError::Invalid("mmap size overflow"))?;
        }
        // SAFETY: the pager is the only writer of this file for the lifetime
        // of the mapping and never truncates it below the mapped pages in use.
        let chunk = unsafe { MmapOptions::new().offset(0).len(size).map_mut(file)? };
        debug!(size, file_len, "mmap.map");
        Ok(Self {
            chunks: vec![chunk],
            size,
        })
    }

    /// Total mapped bytes across all chunks.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns true when nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of mapped chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Makes sure at least `pages` pages are addressable.
    pub fn extend(&mut self, file: &File, pages: u64) -> Result<()> {
        let required = pages
            .checked_mul(PAGE_SIZE as u64)
            .ok_or(MisqlError::Invalid("page count overflow"))?;
        while (self.size as u64) < required {
            let offset = self.size as u64;
            let len = self.size;
            // SAFETY: see `map`; the new chunk covers a disjoint file range.
            let chunk = unsafe { MmapOptions::new().offset(offset).len(len).map_mut(file)? };
            self.chunks.push(chunk);
            self.size += len;
            debug!(size = self.size, chunks = self.chunks.len(), "mmap.extend");
        }
        Ok(())
    }

    fn locate(&self, id: PageId) -> Option<(usize, usize)> {
        let mut start = 0u64;
        for (idx, chunk) in self.chunks.iter().enumerate() {
            let end = start + (chunk.len() / PAGE_SIZE) as u64;
            if id.0 < end {
                let off = (id.0 - start) as usize * PAGE_SIZE;
                return Some((idx, off));
            }
            start = end;
        }
        None
    }

    /// Borrows the bytes of page `id`, if mapped.
    pub fn page(&self, id: PageId) -> Option<&[u8]> {
        let (chunk, off) = self.locate(id)?;
        Some(&self.chunks[chunk][off..off + PAGE_SIZE])
    }

    /// Mutably borrows the bytes of page `id`, if mapped.
    pub fn page_mut(&mut self, id: PageId) -> Option<&mut [u8]> {
        let (chunk, off) = self.locate(id)?;
        Some(&mut self.chunks[chunk][off..off + PAGE_SIZE])
    }

    /// Flushes dirty mapped pages to the file (`msync`).
    pub fn flush(&self) -> Result<()> {
        for chunk in &self.chunks {
            chunk.flush()?;
        }
        Ok(())
    }
}
