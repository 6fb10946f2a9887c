#![forbid(unsafe_code)]

//! Copy-on-write B+Tree over fixed-size pages.

/// B+ tree node format and codec.
pub mod page;

mod delete;
mod insert;
mod split;
mod tree;

pub use page::{Node, NodeKind};
pub use tree::{BTree, NodeStore};

#[cfg(test)]
mod tests;
