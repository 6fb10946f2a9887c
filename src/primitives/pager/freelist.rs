//! Persistent LIFO stack of reusable page numbers.
//!
//! The stack is a chain of pages. Each node stores up to [`FREE_PAGE_CAP`]
//! page numbers, a link to the next node, and the number of items held by
//! itself and every node below it, so the head node alone answers
//! [`FreeList::total`]. Nodes are never rewritten once durable: popping
//! consumes whole nodes from the top and pushes their leftovers back as
//! fresh nodes.

use tracing::debug;

use crate::types::{
    page::{read_u16, read_u64, write_u16, write_u64, PageKind, PAGE_SIZE},
    MisqlError, PageId, Result,
};

const KIND_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 2;
const TOTAL_OFFSET: usize = 4;
const NEXT_OFFSET: usize = 12;

/// Freelist node header: kind, size, running total, next.
pub const FREE_PAGE_HEADER: usize = 4 + 8 + 8;

/// Page numbers held by one freelist node.
pub const FREE_PAGE_CAP: usize = (PAGE_SIZE - FREE_PAGE_HEADER) / 8;

/// Page access the freelist needs from its owner.
pub trait FreeListStore {
    /// Returns the current image of page `id`.
    fn read_page(&self, id: PageId) -> Result<Vec<u8>>;
    /// Stores `page` at a brand-new page number and returns it.
    fn append_page(&mut self, page: Vec<u8>) -> PageId;
    /// Stores `page` at a page number taken off the freelist.
    fn reuse_page(&mut self, id: PageId, page: Vec<u8>);
}

/// Decoded freelist node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FreePage {
    /// Items in this node plus every node below it.
    pub total: u64,
    /// Next node in the chain.
    pub next: PageId,
    /// Stored page numbers, bottom of the stack first.
    pub pages: Vec<PageId>,
}

/// Decodes a freelist node, rejecting pages of another kind.
pub fn read_free_page(buf: &[u8]) -> Result<FreePage> {
    if buf.len() < FREE_PAGE_HEADER {
        return Err(MisqlError::Corruption("free page truncated"));
    }
    if read_u16(buf, KIND_OFFSET) != PageKind::FreeList.as_u16() {
        return Err(MisqlError::Corruption("free page kind mismatch"));
    }
    let size = read_u16(buf, SIZE_OFFSET) as usize;
    if size > FREE_PAGE_CAP || buf.len() < FREE_PAGE_HEADER + size * 8 {
        return Err(MisqlError::Corruption("free page count exceeds capacity"));
    }
    let pages = (0..size)
        .map(|i| PageId(read_u64(buf, FREE_PAGE_HEADER + i * 8)))
        .collect();
    Ok(FreePage {
        total: read_u64(buf, TOTAL_OFFSET),
        next: PageId(read_u64(buf, NEXT_OFFSET)),
        pages,
    })
}

/// Encodes a freelist node into a fresh page image.
pub fn write_free_page(node: &FreePage) -> Vec<u8> {
    assert!(node.pages.len() <= FREE_PAGE_CAP, "free page over capacity");
    let mut buf = vec![0u8; PAGE_SIZE];
    write_u16(&mut buf, KIND_OFFSET, PageKind::FreeList.as_u16());
    write_u16(&mut buf, SIZE_OFFSET, node.pages.len() as u16);
    write_u64(&mut buf, TOTAL_OFFSET, node.total);
    write_u64(&mut buf, NEXT_OFFSET, node.next.0);
    for (i, page) in node.pages.iter().enumerate() {
        write_u64(&mut buf, FREE_PAGE_HEADER + i * 8, page.0);
    }
    buf
}

/// Handle on the freelist chain. Only the head pointer lives in memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FreeList {
    head: PageId,
}

/// Outcome of one [`FreeList::update`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FreeListUpdate {
    /// Old nodes consumed from the top of the chain.
    pub nodes_consumed: usize,
    /// New nodes pushed.
    pub nodes_pushed: usize,
    /// Of the pushed nodes, how many landed on reused page numbers.
    pub nodes_reused: usize,
}

impl FreeList {
    /// Attaches to the chain starting at `head`.
    pub fn new(head: PageId) -> Self {
        Self { head }
    }

    /// Current head page, `PageId::NONE` when empty.
    pub fn head(&self) -> PageId {
        self.head
    }

    /// Number of page numbers on the stack.
    pub fn total(&self, store: &impl FreeListStore) -> Result<u64> {
        if self.head.is_none() {
            return Ok(0);
        }
        Ok(read_free_page(&store.read_page(self.head)?)?.total)
    }

    /// Returns the `idx`-th most recently freed page number.
    pub fn get(&self, store: &impl FreeListStore, mut idx: u64) -> Result<PageId> {
        let mut current = self.head;
        let mut node = self.node(store, current)?;
        if idx >= node.total {
            return Err(MisqlError::Invalid("freelist index out of range"));
        }
        let mut steps = 0u64;
        while idx >= node.pages.len() as u64 {
            idx -= node.pages.len() as u64;
            current = node.next;
            steps += 1;
            if current.is_none() || steps > node.total + 1 {
                return Err(MisqlError::Corruption("freelist shorter than its total"));
            }
            node = self.node(store, current)?;
        }
        Ok(node.pages[node.pages.len() - 1 - idx as usize])
    }

    fn node(&self, store: &impl FreeListStore, id: PageId) -> Result<FreePage> {
        if id.is_none() {
            return Err(MisqlError::Invalid("freelist is empty"));
        }
        read_free_page(&store.read_page(id)?)
    }

    /// Pops the top `popn` items (already handed out through [`FreeList::get`])
    /// and pushes `freed`.
    ///
    /// Consumed nodes are freed pages themselves, so they join `freed`.
    /// Items left over in a consumed node are either kept aside to host the
    /// new nodes or pushed back. Nodes keep being consumed until the popped
    /// items are gone and enough spare page numbers exist to host the pushed
    /// list, or the chain runs out; the chain length bounds the loop.
    pub fn update(
        &mut self,
        store: &mut impl FreeListStore,
        mut popn: u64,
        mut freed: Vec<PageId>,
    ) -> Result<FreeListUpdate> {
        let mut summary = FreeListUpdate::default();
        if popn == 0 && freed.is_empty() {
            return Ok(summary);
        }
        let mut total = self.total(store)?;
        if popn > total {
            return Err(MisqlError::Invalid("freelist pop exceeds total"));
        }
        let max_nodes = total + 1;
        let mut reuse: Vec<PageId> = Vec::new();
        while !self.head.is_none() && (popn > 0 || reuse.len() * FREE_PAGE_CAP < freed.len()) {
            if summary.nodes_consumed as u64 >= max_nodes {
                return Err(MisqlError::Corruption("freelist chain longer than its total"));
            }
            let node = self.node(store, self.head)?;
            freed.push(self.head);
            let size = node.pages.len() as u64;
            if popn >= size {
                popn -= size;
            } else {
                let mut remain = (size - popn) as usize;
                popn = 0;
                while remain > 0 && reuse.len() * FREE_PAGE_CAP < freed.len() + remain {
                    remain -= 1;
                    reuse.push(node.pages[remain]);
                }
                freed.extend_from_slice(&node.pages[..remain]);
            }
            total = total
                .checked_sub(size)
                .ok_or(MisqlError::Corruption("freelist node exceeds recorded total"))?;
            self.head = node.next;
            summary.nodes_consumed += 1;
        }
        if popn != 0 {
            return Err(MisqlError::Corruption("freelist shorter than its total"));
        }
        assert!(
            reuse.len() * FREE_PAGE_CAP >= freed.len() || self.head.is_none(),
            "freelist kept too few spare pages"
        );
        self.push(store, total, &freed, reuse, &mut summary);
        debug!(
            head = self.head.0,
            consumed = summary.nodes_consumed,
            pushed = summary.nodes_pushed,
            reused = summary.nodes_reused,
            "freelist.update"
        );
        Ok(summary)
    }

    fn push(
        &mut self,
        store: &mut impl FreeListStore,
        mut total: u64,
        mut freed: &[PageId],
        reuse: Vec<PageId>,
        summary: &mut FreeListUpdate,
    ) {
        // Reserving a host page shrinks the item count by one, so at the
        // `(r - 1) * FREE_PAGE_CAP` boundary one reserved page is spare. Every
        // reserved page still hosts a node; later nodes keep at least one item.
        let mut nodes_left = freed.len().div_ceil(FREE_PAGE_CAP).max(reuse.len());
        let mut reuse = reuse.into_iter();
        while !freed.is_empty() {
            let size = FREE_PAGE_CAP.min(freed.len() - (nodes_left - 1));
            nodes_left -= 1;
            total += size as u64;
            let page = write_free_page(&FreePage {
                total,
                next: self.head,
                pages: freed[..size].to_vec(),
            });
            freed = &freed[size..];
            self.head = match reuse.next() {
                Some(id) => {
                    store.reuse_page(id, page);
                    summary.nodes_reused += 1;
                    id
                }
                None => store.append_page(page),
            };
            summary.nodes_pushed += 1;
        }
        assert!(reuse.next().is_none(), "freelist reserved unused pages");
    }
}
