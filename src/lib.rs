//! misql: an embedded single-file key-value store.
//!
//! Keys and values are byte strings kept in a copy-on-write B+Tree whose
//! nodes are 4 KiB pages of a memory-mapped file. Writes never touch a page
//! reachable from the last committed root; each `set`/`delete` is made
//! durable by syncing the new pages and then rewriting the meta page.

#![warn(missing_docs)]

pub mod admin;
pub mod db;
pub mod primitives;
pub mod storage;
pub mod types;

pub use db::{Db, DbOptions};
pub use types::{MisqlError, PageId, Result};
