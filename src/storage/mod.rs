//! Persistent data structures built on the pager.

/// B-tree data structure implementation.
///
/// Copy-on-write B+Tree mapping byte-string keys to byte-string values.
pub mod btree;

pub use btree::{BTree, NodeStore};
