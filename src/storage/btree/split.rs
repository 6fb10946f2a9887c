use super::page::{prefix_size, Node, HEADER};
use super::tree::NodeStore;
use crate::types::{page::PAGE_SIZE, Result};

/// Splits `old` in two: the left node takes the longest prefix that fits a
/// page, the right node (which may still overflow) takes the rest.
pub(crate) fn split2(old: &Node) -> Result<(Node, Node)> {
    let count = old.count();
    assert!(count >= 2, "cannot split a node with {count} entries");
    let kind = old.kind()?;
    let mut nleft = count - 1;
    while nleft > 1 && prefix_size(old, nleft) > PAGE_SIZE {
        nleft -= 1;
    }
    let nright = count - nleft;

    let mut left = Node::scratch();
    left.set_header(kind, nleft);
    left.append_range(old, 0, 0, nleft);

    let mut right = Node::scratch();
    right.set_header(kind, nright);
    right.append_range(old, 0, nleft, nright);
    Ok((left.into_page(), right))
}

/// Splits an oversized node into at most three page-sized nodes; a node
/// that already fits comes back alone.
pub(crate) fn split3(old: Node) -> Result<Vec<Node>> {
    if old.size_bytes() <= PAGE_SIZE {
        return Ok(vec![old.into_page()]);
    }
    let (left, right) = split2(&old)?;
    if right.size_bytes() <= PAGE_SIZE {
        return Ok(vec![left, right.into_page()]);
    }
    let (middle, right) = split2(&right)?;
    assert!(
        right.size_bytes() <= PAGE_SIZE,
        "split of a {}-byte node needs more than three pages",
        old.size_bytes()
    );
    Ok(vec![left, middle, right.into_page()])
}

/// Sibling chosen to absorb an underfull child.
pub(crate) enum Merge {
    /// Merge with the child at `idx - 1`.
    Left(Node),
    /// Merge with the child at `idx + 1`.
    Right(Node),
    /// Keep the child on its own.
    None,
}

/// Decides whether `updated`, the new version of child `idx` of `parent`,
/// should be merged with a sibling. The left sibling wins when both fit.
pub(crate) fn merge_target(
    store: &impl NodeStore,
    parent: &Node,
    idx: u16,
    updated: &Node,
) -> Result<Merge> {
    if updated.size_bytes() > PAGE_SIZE / 4 {
        return Ok(Merge::None);
    }
    let fits = |sibling: &Node| sibling.size_bytes() + updated.size_bytes() - HEADER < PAGE_SIZE;
    if idx > 0 {
        let sibling = store.get(parent.ptr(idx - 1))?;
        if fits(&sibling) {
            return Ok(Merge::Left(sibling));
        }
    }
    if idx + 1 < parent.count() {
        let sibling = store.get(parent.ptr(idx + 1))?;
        if fits(&sibling) {
            return Ok(Merge::Right(sibling));
        }
    }
    Ok(Merge::None)
}
