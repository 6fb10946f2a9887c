use std::fs;

use serde::Serialize;

use crate::db::Db;
use crate::primitives::pager::{read_free_page, FreeListStore};
use crate::storage::btree::{NodeKind, NodeStore};
use crate::types::{page::PAGE_SIZE, MisqlError, PageId, Result};

/// Point-in-time statistics of an open database.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Page allocation and commit counters.
    pub pager: PagerStatsSection,
    /// Shape of the committed tree.
    pub tree: TreeStatsSection,
    /// Freelist chain summary.
    pub freelist: FreelistStatsSection,
    /// On-disk footprint.
    pub filesystem: FilesystemStats,
}

/// Pager geometry and commit counters.
#[derive(Debug, Clone, Serialize)]
pub struct PagerStatsSection {
    /// Bytes per page.
    pub page_size: usize,
    /// Pages the file currently holds, including preallocated tail pages.
    pub file_pages: u64,
    /// Pages in use according to the meta page.
    pub flushed_pages: u64,
    /// Bytes of address space mapped over the file.
    pub mapped_bytes: u64,
    /// Commits since open.
    pub commits: u64,
    /// Aborted commits since open.
    pub aborts: u64,
}

/// Shape of the committed B+Tree.
#[derive(Debug, Clone, Serialize)]
pub struct TreeStatsSection {
    /// Root page number, 0 for an empty tree.
    pub root_page: u64,
    /// Levels from root to leaf.
    pub height: u64,
    /// Internal pages reached from the root.
    pub internal_pages: u64,
    /// Leaf pages reached from the root.
    pub leaf_pages: u64,
    /// User keys, sentinel excluded.
    pub keys: u64,
    /// Sum of user key lengths.
    pub key_bytes: u64,
    /// Sum of value lengths.
    pub value_bytes: u64,
    /// Encoded bytes across all tree pages.
    pub used_bytes: u64,
}

/// Freelist chain summary.
#[derive(Debug, Clone, Serialize)]
pub struct FreelistStatsSection {
    /// Head node page number, 0 when the list is empty.
    pub head_page: u64,
    /// Nodes in the chain.
    pub nodes: u64,
    /// Page numbers listed as reusable.
    pub free_pages: u64,
}

/// On-disk footprint.
#[derive(Debug, Clone, Serialize)]
pub struct FilesystemStats {
    /// Database file path.
    pub db_path: String,
    /// File length in bytes.
    pub db_size_bytes: u64,
}

/// Gathers statistics by walking the committed tree and freelist.
pub fn stats(db: &Db) -> Result<StatsReport> {
    let pager = db.pager();
    let meta = pager.meta();
    let counters = pager.stats();

    let mut tree = TreeStatsSection {
        root_page: meta.root.0,
        height: 0,
        internal_pages: 0,
        leaf_pages: 0,
        keys: 0,
        key_bytes: 0,
        value_bytes: 0,
        used_bytes: 0,
    };
    let mut stack: Vec<(PageId, u64)> = Vec::new();
    if !meta.root.is_none() {
        stack.push((meta.root, 1));
    }
    while let Some((id, depth)) = stack.pop() {
        let node = pager.get(id)?;
        tree.height = tree.height.max(depth);
        tree.used_bytes += node.size_bytes() as u64;
        match node.kind_at(id)? {
            NodeKind::Leaf => {
                tree.leaf_pages += 1;
                for i in 0..node.count() {
                    let key = node.key(i);
                    if key.is_empty() {
                        continue;
                    }
                    tree.keys += 1;
                    tree.key_bytes += key.len() as u64;
                    tree.value_bytes += node.val(i).len() as u64;
                }
            }
            NodeKind::Internal => {
                tree.internal_pages += 1;
                stack.extend((0..node.count()).map(|i| (node.ptr(i), depth + 1)));
            }
        }
    }

    let mut freelist = FreelistStatsSection {
        head_page: meta.free_head.0,
        nodes: 0,
        free_pages: pager.free_total()?,
    };
    let mut current = meta.free_head;
    while !current.is_none() {
        if freelist.nodes > meta.flushed {
            return Err(MisqlError::Corruption("freelist chain longer than the file"));
        }
        let node = read_free_page(&pager.read_page(current)?)?;
        freelist.nodes += 1;
        current = node.next;
    }

    let db_size_bytes = fs::metadata(db.path())?.len();
    Ok(StatsReport {
        pager: PagerStatsSection {
            page_size: PAGE_SIZE,
            file_pages: counters.file_pages,
            flushed_pages: counters.flushed,
            mapped_bytes: counters.mapped_bytes,
            commits: counters.commits,
            aborts: counters.aborts,
        },
        tree,
        freelist,
        filesystem: FilesystemStats {
            db_path: db.path().display().to_string(),
            db_size_bytes,
        },
    })
}
