use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::primitives::io::{FileIo, StdFileIo};
use crate::primitives::mmap::MmapRegion;
use crate::storage::btree::{Node, NodeStore};
use crate::types::{page::PAGE_SIZE, MisqlError, PageId, Result};

use super::freelist::{FreeList, FreeListStore};
use super::meta::{load_meta, store_meta, Meta};

/// Default size of the first mapping chunk.
pub const DEFAULT_INITIAL_MMAP_BYTES: usize = 64 << 20;

/// Configuration options for the pager.
#[derive(Clone, Debug)]
pub struct PagerOptions {
    /// Size of the first mapping chunk; a positive multiple of the page size.
    pub initial_mmap_bytes: usize,
    /// Create the file when it does not exist.
    pub create_if_missing: bool,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            initial_mmap_bytes: DEFAULT_INITIAL_MMAP_BYTES,
            create_if_missing: true,
        }
    }
}

/// Counters describing the pager's file and pending state.
#[derive(Default, Clone, Debug)]
pub struct PagerStats {
    /// Pages backed by the file.
    pub file_pages: u64,
    /// Durable pages in use, meta page included.
    pub flushed: u64,
    /// Bytes currently mapped.
    pub mapped_bytes: u64,
    /// Pages written or freed since the last commit.
    pub pending_updates: u64,
    /// Pages taken off the freelist since the last commit.
    pub pending_reused: u64,
    /// Pages appended past the flushed region since the last commit.
    pub pending_appended: u64,
    /// Successful commits since open.
    pub commits: u64,
    /// Rolled back commits since open.
    pub aborts: u64,
}

/// Page allocator and commit pipeline over a memory-mapped file.
///
/// Durable pages are never overwritten while they are reachable from the
/// last committed meta page. New content goes to pages that are either
/// free in the durable state or past its end, and only the final meta
/// write publishes it:
///
/// 1. [`Pager::write_pages`] folds the freed pages into the freelist,
///    grows the file and mapping, and copies every pending page in.
/// 2. [`Pager::sync_pages`] fsyncs those pages, then overwrites and fsyncs
///    the meta page.
///
/// A crash before step 2 finishes leaves the old meta page pointing at an
/// intact old tree.
pub struct Pager {
    path: PathBuf,
    io: StdFileIo,
    mmap: MmapRegion,
    file_pages: u64,
    flushed: u64,
    nfree: u64,
    appended: u64,
    updates: BTreeMap<PageId, Option<Vec<u8>>>,
    freelist: FreeList,
    durable: Meta,
    stats: PagerStats,
}

impl Pager {
    /// Opens (or creates) the database file at `path` and loads its meta page.
    pub fn open(path: impl AsRef<Path>, options: &PagerOptions) -> Result<Self> {
        let path = path.as_ref();
        let io = StdFileIo::open(path, options.create_if_missing)?;
        let meta = load_meta(&io)?;
        let len = io.len()?;
        let mmap = MmapRegion::map(io.file(), len, options.initial_mmap_bytes)?;
        let file_pages = len / PAGE_SIZE as u64;
        debug!(
            path = %path.display(),
            file_pages,
            root = meta.root.0,
            flushed = meta.flushed,
            free_head = meta.free_head.0,
            "pager.open"
        );
        Ok(Self {
            path: path.to_path_buf(),
            io,
            mmap,
            file_pages,
            flushed: meta.flushed,
            nfree: 0,
            appended: 0,
            updates: BTreeMap::new(),
            freelist: FreeList::new(meta.free_head),
            durable: meta,
            stats: PagerStats::default(),
        })
    }

    /// Path the pager was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last durable meta state.
    pub fn meta(&self) -> Meta {
        self.durable
    }

    /// Durable pages in use, meta page included.
    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    /// Pages backed by the file.
    pub fn file_pages(&self) -> u64 {
        self.file_pages
    }

    /// Handle on the freelist chain as of the last update.
    pub fn freelist(&self) -> FreeList {
        self.freelist
    }

    /// Number of reusable page numbers on the freelist.
    pub fn free_total(&self) -> Result<u64> {
        self.freelist.total(self)
    }

    /// Returns true when nothing is waiting to be committed.
    pub fn is_clean(&self) -> bool {
        self.updates.is_empty() && self.nfree == 0 && self.appended == 0
    }

    /// Snapshot of the pager counters.
    pub fn stats(&self) -> PagerStats {
        let mut stats = self.stats.clone();
        stats.file_pages = self.file_pages;
        stats.flushed = self.flushed;
        stats.mapped_bytes = self.mmap.len() as u64;
        stats.pending_updates = self.updates.len() as u64;
        stats.pending_reused = self.nfree;
        stats.pending_appended = self.appended;
        stats
    }

    fn page_bytes(&self, id: PageId) -> Result<Vec<u8>> {
        if id.is_none() {
            return Err(MisqlError::Invalid("page 0 holds the meta page"));
        }
        if let Some(pending) = self.updates.get(&id) {
            return pending
                .clone()
                .ok_or(MisqlError::Invalid("page was freed in this transaction"));
        }
        if id.0 >= self.flushed {
            return Err(MisqlError::Corruption("page number past the flushed pages"));
        }
        self.mmap
            .page(id)
            .map(<[u8]>::to_vec)
            .ok_or(MisqlError::Corruption("page number outside the mapping"))
    }

    /// Folds freed pages into the freelist and copies every pending page
    /// into the mapping, growing the file first. Nothing here is durable
    /// until [`Pager::sync_pages`] runs.
    pub fn write_pages(&mut self) -> Result<()> {
        let freed: Vec<PageId> = self
            .updates
            .iter()
            .filter(|(_, page)| page.is_none())
            .map(|(id, _)| *id)
            .collect();
        let nfreed = freed.len();
        let mut freelist = self.freelist;
        let summary = freelist.update(self, self.nfree, freed)?;
        self.freelist = freelist;

        let npages = self.flushed + self.appended;
        self.extend_file(npages)?;
        self.mmap.extend(self.io.file(), npages)?;

        let mut written = 0usize;
        for (id, page) in &self.updates {
            let Some(bytes) = page else { continue };
            let dst = self
                .mmap
                .page_mut(*id)
                .ok_or(MisqlError::Corruption("pending page outside the mapping"))?;
            dst.copy_from_slice(bytes);
            written += 1;
        }
        debug!(
            written,
            freed = nfreed,
            reused = self.nfree,
            appended = self.appended,
            freelist_nodes = summary.nodes_pushed,
            "pager.write_pages"
        );
        Ok(())
    }

    fn extend_file(&mut self, npages: u64) -> Result<()> {
        let mut file_pages = self.file_pages;
        while file_pages <= npages {
            file_pages += (file_pages / 8).max(1);
        }
        if file_pages != self.file_pages {
            self.io.set_len(file_pages * PAGE_SIZE as u64)?;
            debug!(from = self.file_pages, to = file_pages, "pager.extend_file");
            self.file_pages = file_pages;
        }
        Ok(())
    }

    /// Makes the written pages durable, then publishes `root` by rewriting
    /// the meta page.
    pub fn sync_pages(&mut self, root: PageId) -> Result<()> {
        self.mmap.flush()?;
        self.io.sync_all()?;

        self.flushed += self.appended;
        self.nfree = 0;
        self.appended = 0;
        self.updates.clear();

        let meta = Meta {
            root,
            flushed: self.flushed,
            free_head: self.freelist.head(),
        };
        store_meta(&self.io, &meta)?;
        self.io.sync_all()?;
        self.durable = meta;
        self.stats.commits += 1;
        debug!(%meta, "pager.sync_pages");
        Ok(())
    }

    /// Writes and syncs pending pages, publishing `root`. On failure the
    /// in-memory state falls back to the last durable meta.
    pub fn commit(&mut self, root: PageId) -> Result<()> {
        let result = self.write_pages().and_then(|()| self.sync_pages(root));
        if let Err(err) = &result {
            warn!(error = %err, "pager.commit.failed");
            self.abort();
        }
        result
    }

    /// Drops every pending page and restores the last durable state.
    pub fn abort(&mut self) {
        self.updates.clear();
        self.nfree = 0;
        self.appended = 0;
        self.flushed = self.durable.flushed;
        self.freelist = FreeList::new(self.durable.free_head);
        self.stats.aborts += 1;
        debug!(meta = %self.durable, "pager.abort");
    }

    /// Unmaps and closes the file. Uncommitted pages are discarded.
    pub fn close(self) -> Result<()> {
        if !self.is_clean() {
            warn!(pending = self.updates.len(), "pager.close.discarding_pending");
        }
        debug!(path = %self.path.display(), "pager.close");
        Ok(())
    }
}

impl FreeListStore for Pager {
    fn read_page(&self, id: PageId) -> Result<Vec<u8>> {
        self.page_bytes(id)
    }

    fn append_page(&mut self, page: Vec<u8>) -> PageId {
        let id = PageId(self.flushed + self.appended);
        self.appended += 1;
        self.updates.insert(id, Some(page));
        id
    }

    fn reuse_page(&mut self, id: PageId, page: Vec<u8>) {
        self.updates.insert(id, Some(page));
    }
}

impl NodeStore for Pager {
    fn get(&self, id: PageId) -> Result<Node> {
        self.page_bytes(id).map(Node::from_bytes)
    }

    fn new_node(&mut self, node: Node) -> Result<PageId> {
        let page = node.into_page().into_bytes();
        let freelist = self.freelist;
        if self.nfree < freelist.total(&*self)? {
            let id = freelist.get(&*self, self.nfree)?;
            self.nfree += 1;
            self.reuse_page(id, page);
            Ok(id)
        } else {
            Ok(self.append_page(page))
        }
    }

    fn del(&mut self, id: PageId) {
        self.updates.insert(id, None);
    }
}
