use super::insert::replace_kids;
use super::page::{Node, NodeKind};
use super::split::{merge_target, split3, Merge};
use super::tree::{lookup_le, persist_kids, NodeStore};
use crate::types::{PageId, Result};

/// Returns a copy of `node` (stored at `id`) without `key`, or `None` when
/// the key is absent. Nothing is allocated or freed on a miss.
pub(crate) fn tree_delete(
    store: &mut impl NodeStore,
    id: PageId,
    node: &Node,
    key: &[u8],
) -> Result<Option<Node>> {
    let idx = lookup_le(node, key);
    match node.kind_at(id)? {
        NodeKind::Leaf => {
            if node.count() == 0 || node.key(idx) != key {
                return Ok(None);
            }
            Ok(Some(leaf_delete(node, idx)))
        }
        NodeKind::Internal => node_delete(store, node, idx, key),
    }
}

fn node_delete(
    store: &mut impl NodeStore,
    node: &Node,
    idx: u16,
    key: &[u8],
) -> Result<Option<Node>> {
    let kid_id = node.ptr(idx);
    let kid = store.get(kid_id)?;
    let Some(updated) = tree_delete(store, kid_id, &kid, key)? else {
        return Ok(None);
    };
    store.del(kid_id);

    let new = match merge_target(store, node, idx, &updated)? {
        Merge::Left(sibling) => {
            store.del(node.ptr(idx - 1));
            let merged = merge(&sibling, &updated)?;
            let first = merged.key(0).to_vec();
            let merged_id = store.new_node(merged)?;
            replace_2kid(node, idx - 1, merged_id, &first)
        }
        Merge::Right(sibling) => {
            store.del(node.ptr(idx + 1));
            let merged = merge(&updated, &sibling)?;
            let first = merged.key(0).to_vec();
            let merged_id = store.new_node(merged)?;
            replace_2kid(node, idx, merged_id, &first)
        }
        Merge::None if updated.count() == 0 => remove_kid(node, idx),
        Merge::None => {
            let kids = persist_kids(store, split3(updated)?)?;
            replace_kids(node, idx, &kids)
        }
    };
    Ok(Some(new))
}

/// Copy of `old` without record `idx`.
pub(crate) fn leaf_delete(old: &Node, idx: u16) -> Node {
    let mut new = Node::scratch();
    new.set_header(NodeKind::Leaf, old.count() - 1);
    new.append_range(old, 0, 0, idx);
    new.append_range(old, idx, idx + 1, old.count() - idx - 1);
    new
}

/// Concatenation of two adjacent siblings of the same kind.
pub(crate) fn merge(left: &Node, right: &Node) -> Result<Node> {
    let kind = left.kind()?;
    assert_eq!(kind, right.kind()?, "merging nodes of different kinds");
    let mut new = Node::scratch();
    new.set_header(kind, left.count() + right.count());
    new.append_range(left, 0, 0, left.count());
    new.append_range(right, left.count(), 0, right.count());
    Ok(new)
}

/// Copy of internal node `old` with children `idx` and `idx + 1` replaced
/// by a single child.
pub(crate) fn replace_2kid(old: &Node, idx: u16, id: PageId, key: &[u8]) -> Node {
    let mut new = Node::scratch();
    new.set_header(NodeKind::Internal, old.count() - 1);
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, id, key, b"");
    new.append_range(old, idx + 1, idx + 2, old.count() - idx - 2);
    new
}

/// Copy of internal node `old` without child `idx`.
pub(crate) fn remove_kid(old: &Node, idx: u16) -> Node {
    let mut new = Node::scratch();
    new.set_header(NodeKind::Internal, old.count() - 1);
    new.append_range(old, 0, 0, idx);
    new.append_range(old, idx, idx + 1, old.count() - idx - 1);
    new
}
