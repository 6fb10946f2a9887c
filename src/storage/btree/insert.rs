use super::page::{Node, NodeKind};
use super::split::split3;
use super::tree::{lookup_le, persist_kids, NodeStore};
use crate::types::{PageId, Result};

/// Returns a copy of `node` (stored at `id`) with `key` set to `val`. The
/// result may span up to two pages; callers split it.
pub(crate) fn tree_insert(
    store: &mut impl NodeStore,
    id: PageId,
    node: &Node,
    key: &[u8],
    val: &[u8],
) -> Result<Node> {
    let idx = lookup_le(node, key);
    match node.kind_at(id)? {
        NodeKind::Leaf if node.key(idx) == key => Ok(leaf_update(node, idx, key, val)),
        NodeKind::Leaf => Ok(leaf_insert(node, idx + 1, key, val)),
        NodeKind::Internal => node_insert(store, node, idx, key, val),
    }
}

fn node_insert(
    store: &mut impl NodeStore,
    node: &Node,
    idx: u16,
    key: &[u8],
    val: &[u8],
) -> Result<Node> {
    let kid_id = node.ptr(idx);
    let kid = store.get(kid_id)?;
    store.del(kid_id);
    let kid = tree_insert(store, kid_id, &kid, key, val)?;
    let kids = persist_kids(store, split3(kid)?)?;
    Ok(replace_kids(node, idx, &kids))
}

/// Copy of `old` with a new record at `idx`.
pub(crate) fn leaf_insert(old: &Node, idx: u16, key: &[u8], val: &[u8]) -> Node {
    let mut new = Node::scratch();
    new.set_header(NodeKind::Leaf, old.count() + 1);
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, PageId::NONE, key, val);
    new.append_range(old, idx + 1, idx, old.count() - idx);
    new
}

/// Copy of `old` with record `idx` replaced.
pub(crate) fn leaf_update(old: &Node, idx: u16, key: &[u8], val: &[u8]) -> Node {
    let mut new = Node::scratch();
    new.set_header(NodeKind::Leaf, old.count());
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, PageId::NONE, key, val);
    new.append_range(old, idx + 1, idx + 1, old.count() - idx - 1);
    new
}

/// Copy of internal node `old` with child `idx` replaced by `kids`.
pub(crate) fn replace_kids(old: &Node, idx: u16, kids: &[(PageId, Vec<u8>)]) -> Node {
    let inc = kids.len() as u16;
    let mut new = Node::scratch();
    new.set_header(NodeKind::Internal, old.count() + inc - 1);
    new.append_range(old, 0, 0, idx);
    for (i, (id, key)) in kids.iter().enumerate() {
        new.append_kv(idx + i as u16, *id, key, b"");
    }
    new.append_range(old, idx + inc, idx + 1, old.count() - idx - 1);
    new
}
