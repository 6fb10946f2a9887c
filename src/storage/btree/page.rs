use std::fmt;

use crate::types::{
    page::{read_u16, read_u64, write_u16, write_u64, PageKind, PAGE_SIZE},
    MisqlError, PageId, Result,
};

/// Node header length (`kind:u16`, `count:u16`).
pub const HEADER: usize = 4;

/// Bytes per pointer table entry.
pub const PTR_LEN: usize = 8;

/// Bytes per offset table entry.
pub const OFFSET_LEN: usize = 2;

/// Bytes of per-record length prefix (`key_len:u16`, `val_len:u16`).
pub const RECORD_HEADER_LEN: usize = 4;

/// Capacity of scratch buffers used while a node may still overflow.
pub const SCRATCH_SIZE: usize = 2 * PAGE_SIZE;

/// Logical kind of a B+Tree node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// Separator keys with child pointers.
    Internal,
    /// Keys with values.
    Leaf,
}

impl NodeKind {
    fn page_kind(self) -> PageKind {
        match self {
            NodeKind::Internal => PageKind::Internal,
            NodeKind::Leaf => PageKind::Leaf,
        }
    }
}

/// One B+Tree node as an owned byte buffer.
///
/// Layout:
///
/// ```text
/// | kind:u16 | count:u16 | ptrs: count*u64 | offsets: count*u16 | records |
/// record = | key_len:u16 | val_len:u16 | key | val |
/// ```
///
/// Offset entry `i` (1-based) is the end of record `i-1` relative to the
/// start of the record region; the offset of record 0 is implicitly 0. All
/// setters assume the buffer was sized for the declared count.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    data: Vec<u8>,
}

impl Node {
    /// A zeroed scratch node that may hold up to two pages of content.
    pub fn scratch() -> Self {
        Self {
            data: vec![0u8; SCRATCH_SIZE],
        }
    }

    /// A zeroed single-page node.
    pub fn page() -> Self {
        Self {
            data: vec![0u8; PAGE_SIZE],
        }
    }

    /// Wraps a page image read from storage.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Raw buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the node, returning its buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Raw kind tag.
    pub fn raw_kind(&self) -> u16 {
        read_u16(&self.data, 0)
    }

    /// Decoded kind; anything else is an untyped node living at `id`.
    pub fn kind_at(&self, id: PageId) -> Result<NodeKind> {
        match PageKind::try_from(self.raw_kind()) {
            Ok(PageKind::Internal) => Ok(NodeKind::Internal),
            Ok(PageKind::Leaf) => Ok(NodeKind::Leaf),
            _ => Err(MisqlError::UntypedNode(id)),
        }
    }

    /// Decoded kind of a node with no page number yet.
    pub fn kind(&self) -> Result<NodeKind> {
        self.kind_at(PageId::NONE)
    }

    /// Number of entries.
    pub fn count(&self) -> u16 {
        read_u16(&self.data, 2)
    }

    /// Writes kind and count.
    pub fn set_header(&mut self, kind: NodeKind, count: u16) {
        write_u16(&mut self.data, 0, kind.page_kind().as_u16());
        write_u16(&mut self.data, 2, count);
    }

    /// Child pointer `idx`.
    pub fn ptr(&self, idx: u16) -> PageId {
        debug_assert!(idx < self.count());
        PageId(read_u64(&self.data, HEADER + PTR_LEN * idx as usize))
    }

    /// Sets child pointer `idx`.
    pub fn set_ptr(&mut self, idx: u16, id: PageId) {
        debug_assert!(idx < self.count());
        write_u64(&mut self.data, HEADER + PTR_LEN * idx as usize, id.0);
    }

    fn offset_pos(&self, idx: u16) -> usize {
        debug_assert!(1 <= idx && idx <= self.count());
        HEADER + PTR_LEN * self.count() as usize + OFFSET_LEN * (idx as usize - 1)
    }

    /// Start of record `idx` relative to the record region.
    pub fn offset(&self, idx: u16) -> u16 {
        if idx == 0 {
            return 0;
        }
        read_u16(&self.data, self.offset_pos(idx))
    }

    /// Sets the end of record `idx - 1`.
    pub fn set_offset(&mut self, idx: u16, offset: u16) {
        let pos = self.offset_pos(idx);
        write_u16(&mut self.data, pos, offset);
    }

    /// Absolute position of record `idx`; `idx == count` is the end.
    pub fn kv_pos(&self, idx: u16) -> usize {
        debug_assert!(idx <= self.count());
        HEADER + (PTR_LEN + OFFSET_LEN) * self.count() as usize + self.offset(idx) as usize
    }

    /// Key of record `idx`.
    pub fn key(&self, idx: u16) -> &[u8] {
        debug_assert!(idx < self.count());
        let pos = self.kv_pos(idx);
        let klen = read_u16(&self.data, pos) as usize;
        &self.data[pos + RECORD_HEADER_LEN..][..klen]
    }

    /// Value of record `idx`; empty for internal nodes.
    pub fn val(&self, idx: u16) -> &[u8] {
        debug_assert!(idx < self.count());
        let pos = self.kv_pos(idx);
        let klen = read_u16(&self.data, pos) as usize;
        let vlen = read_u16(&self.data, pos + 2) as usize;
        &self.data[pos + RECORD_HEADER_LEN + klen..][..vlen]
    }

    /// Bytes used by the node: position just past the last record.
    pub fn size_bytes(&self) -> usize {
        self.kv_pos(self.count())
    }

    /// Drops scratch capacity once the node is known to fit a page.
    ///
    /// Panics if it does not fit: every persisted node must.
    pub fn into_page(mut self) -> Self {
        let size = self.size_bytes();
        assert!(size <= PAGE_SIZE, "node of {size} bytes exceeds a page");
        self.data.resize(PAGE_SIZE, 0);
        self
    }

    /// Copies `n` records of `src` starting at `src_idx` into positions
    /// `dst_idx..dst_idx + n`; records before `dst_idx` must already be in
    /// place. The header is the caller's job.
    pub fn append_range(&mut self, src: &Node, dst_idx: u16, src_idx: u16, n: u16) {
        if n == 0 {
            return;
        }
        debug_assert!(src_idx + n <= src.count());
        debug_assert!(dst_idx + n <= self.count());
        for i in 0..n {
            self.set_ptr(dst_idx + i, src.ptr(src_idx + i));
        }
        let dst_begin = self.offset(dst_idx);
        let src_begin = src.offset(src_idx);
        for i in 1..=n {
            let offset = dst_begin + (src.offset(src_idx + i) - src_begin);
            self.set_offset(dst_idx + i, offset);
        }
        let begin = src.kv_pos(src_idx);
        let end = src.kv_pos(src_idx + n);
        let at = self.kv_pos(dst_idx);
        self.data[at..at + (end - begin)].copy_from_slice(&src.data[begin..end]);
    }

    /// Writes one record at `idx`; records before it must already be in place.
    pub fn append_kv(&mut self, idx: u16, ptr: PageId, key: &[u8], val: &[u8]) {
        self.set_ptr(idx, ptr);
        let pos = self.kv_pos(idx);
        write_u16(&mut self.data, pos, key.len() as u16);
        write_u16(&mut self.data, pos + 2, val.len() as u16);
        let key_at = pos + RECORD_HEADER_LEN;
        self.data[key_at..key_at + key.len()].copy_from_slice(key);
        let val_at = key_at + key.len();
        self.data[val_at..val_at + val.len()].copy_from_slice(val);
        let end = self.offset(idx) as usize + RECORD_HEADER_LEN + key.len() + val.len();
        self.set_offset(idx + 1, end as u16);
    }
}

/// Size a node would have with the first `n` records of `node`.
pub fn prefix_size(node: &Node, n: u16) -> usize {
    HEADER + (PTR_LEN + OFFSET_LEN) * n as usize + node.offset(n) as usize
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = (0..self.count())
            .map(|i| String::from_utf8_lossy(self.key(i)).into_owned())
            .collect();
        f.debug_struct("Node")
            .field("kind", &self.raw_kind())
            .field("count", &self.count())
            .field("size", &self.size_bytes())
            .field("keys", &keys)
            .finish()
    }
}
