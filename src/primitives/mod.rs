//! Low-level primitives for building the storage engine.
//!
//! Includes positioned file I/O, the growable file mapping, and the pager
//! that allocates pages and commits them.

/// I/O abstractions and utilities.
///
/// Interfaces for reading/writing data and file operations.
pub mod io;

/// Chunked memory mapping of the database file.
pub mod mmap;

/// Paging subsystem: meta page, freelist, and the commit pipeline.
pub mod pager;
