use tracing::trace;

use super::page::{Node, NodeKind};
use super::split::split3;
use crate::types::{
    page::{MAX_KEY_SIZE, MAX_VAL_SIZE},
    MisqlError, PageId, Result,
};

/// Page capabilities the tree needs from its owner.
///
/// The tree never writes a page in place: it reads nodes with [`get`],
/// writes every new version with [`new_node`], and hands replaced pages to
/// [`del`].
///
/// [`get`]: NodeStore::get
/// [`new_node`]: NodeStore::new_node
/// [`del`]: NodeStore::del
pub trait NodeStore {
    /// Reads the node stored at `id`.
    fn get(&self, id: PageId) -> Result<Node>;
    /// Stores a node that fits one page and returns its page number.
    fn new_node(&mut self, node: Node) -> Result<PageId>;
    /// Marks `id` reclaimable once the current batch commits.
    fn del(&mut self, id: PageId);
}

/// Copy-on-write B+Tree over byte-string keys.
///
/// The handle is only a root page number; all pages are reached through a
/// [`NodeStore`] passed to each call. Every node starts with its smallest
/// key, and the leftmost leaf starts with an empty sentinel key, so a
/// lookup never has to handle "smaller than every key".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BTree {
    root: PageId,
}

impl BTree {
    /// Attaches to the tree rooted at `root` (`PageId::NONE` for empty).
    pub fn new(root: PageId) -> Self {
        Self { root }
    }

    /// Current root page.
    pub fn root(&self) -> PageId {
        self.root
    }

    /// Returns true when the tree holds no pages.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Looks up `key`. The empty key is the sentinel and never matches.
    pub fn get(&self, store: &impl NodeStore, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.root.is_none() || key.is_empty() {
            return Ok(None);
        }
        let mut id = self.root;
        loop {
            let node = store.get(id)?;
            let idx = lookup_le(&node, key);
            match node.kind_at(id)? {
                NodeKind::Leaf => {
                    return Ok((node.key(idx) == key).then(|| node.val(idx).to_vec()));
                }
                NodeKind::Internal => id = node.ptr(idx),
            }
        }
    }

    /// Inserts or replaces `key`.
    pub fn insert(&mut self, store: &mut impl NodeStore, key: &[u8], val: &[u8]) -> Result<()> {
        check_record(key, val)?;
        if self.root.is_none() {
            let mut root = Node::page();
            root.set_header(NodeKind::Leaf, 2);
            root.append_kv(0, PageId::NONE, b"", b"");
            root.append_kv(1, PageId::NONE, key, val);
            self.root = store.new_node(root)?;
            trace!(root = self.root.0, "btree.insert.first_leaf");
            return Ok(());
        }
        let old = self.root;
        let node = store.get(old)?;
        store.del(old);
        let updated = super::insert::tree_insert(store, old, &node, key, val)?;
        self.root = grow_root(store, updated)?;
        trace!(old = old.0, root = self.root.0, "btree.insert");
        Ok(())
    }

    /// Removes `key`, returning false when it was not present.
    pub fn delete(&mut self, store: &mut impl NodeStore, key: &[u8]) -> Result<bool> {
        if self.root.is_none() || key.is_empty() {
            return Ok(false);
        }
        let old = self.root;
        let node = store.get(old)?;
        let Some(updated) = super::delete::tree_delete(store, old, &node, key)? else {
            return Ok(false);
        };
        store.del(old);
        self.root = match updated.kind()? {
            NodeKind::Internal if updated.count() == 1 => updated.ptr(0),
            _ if updated.count() == 0 => PageId::NONE,
            _ => grow_root(store, updated)?,
        };
        trace!(old = old.0, root = self.root.0, "btree.delete");
        Ok(true)
    }
}

fn check_record(key: &[u8], val: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(MisqlError::Invalid("empty key"));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(MisqlError::Invalid("key too large"));
    }
    if val.len() > MAX_VAL_SIZE {
        return Err(MisqlError::Invalid("value too large"));
    }
    Ok(())
}

/// Persists a new root, adding a level when `node` overflows a page.
fn grow_root(store: &mut impl NodeStore, node: Node) -> Result<PageId> {
    let mut kids = split3(node)?;
    if kids.len() == 1 {
        return store.new_node(kids.remove(0));
    }
    let kids = persist_kids(store, kids)?;
    let mut root = Node::page();
    root.set_header(NodeKind::Internal, kids.len() as u16);
    for (i, (id, key)) in kids.iter().enumerate() {
        root.append_kv(i as u16, *id, key, b"");
    }
    store.new_node(root)
}

/// Stores split outputs, returning each page number with its first key.
pub(crate) fn persist_kids(
    store: &mut impl NodeStore,
    kids: Vec<Node>,
) -> Result<Vec<(PageId, Vec<u8>)>> {
    kids.into_iter()
        .map(|kid| {
            let key = kid.key(0).to_vec();
            Ok((store.new_node(kid)?, key))
        })
        .collect()
}

/// Index of the last key `<= key`, or 0 when every key is larger.
///
/// Entry 0 is the node's lower bound and is never compared.
pub(crate) fn lookup_le(node: &Node, key: &[u8]) -> u16 {
    let (mut lo, mut hi) = (1u16, node.count());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if node.key(mid) <= key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo - 1
}
