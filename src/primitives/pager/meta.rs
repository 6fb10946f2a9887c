use std::fmt;
use std::ops::Range;

use crate::primitives::io::{is_eof, FileIo};
use crate::types::{
    page::{read_u64, write_u64, PAGE_SIZE},
    MisqlError, PageId, Result,
};

/// Signature stored in the first 16 bytes of the file (zero padded).
pub const DB_SIG: &[u8; 15] = b"MiSQLMasterPage";

const META_SIG: Range<usize> = 0..16;
const META_ROOT: usize = 16;
const META_FLUSHED: usize = 24;
const META_FREE_HEAD: usize = 32;

/// Number of meaningful bytes at the start of page 0.
pub const META_LEN: usize = 40;

/// Durable anchor of the database, stored in page 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Meta {
    /// Root page of the B+Tree, `PageId::NONE` for an empty tree.
    pub root: PageId,
    /// Number of pages in use, counting the meta page itself.
    pub flushed: u64,
    /// Head of the freelist chain, `PageId::NONE` when empty.
    pub free_head: PageId,
}

impl Meta {
    /// State of a database file that has never been committed to.
    pub fn fresh() -> Self {
        Self {
            root: PageId::NONE,
            flushed: 1,
            free_head: PageId::NONE,
        }
    }
}

/// Encodes `meta` into the leading [`META_LEN`] bytes of `buf`.
pub fn write_meta_page(buf: &mut [u8], meta: &Meta) -> Result<()> {
    if buf.len() < META_LEN {
        return Err(MisqlError::Invalid("meta buffer too small"));
    }
    buf[META_SIG].fill(0);
    buf[..DB_SIG.len()].copy_from_slice(DB_SIG);
    write_u64(buf, META_ROOT, meta.root.0);
    write_u64(buf, META_FLUSHED, meta.flushed);
    write_u64(buf, META_FREE_HEAD, meta.free_head.0);
    Ok(())
}

/// Decodes and validates the meta page of a file that is `file_pages` long.
///
/// The flushed count must lie in `[1, file_pages)`, and both the root and
/// the freelist head must point below it.
pub fn read_meta_page(buf: &[u8], file_pages: u64) -> Result<Meta> {
    if buf.len() < META_LEN {
        return Err(MisqlError::Corruption("meta page truncated"));
    }
    if &buf[..DB_SIG.len()] != DB_SIG || buf[DB_SIG.len()..META_SIG.end] != [0] {
        return Err(MisqlError::Corruption("bad meta signature"));
    }
    let meta = Meta {
        root: PageId(read_u64(buf, META_ROOT)),
        flushed: read_u64(buf, META_FLUSHED),
        free_head: PageId(read_u64(buf, META_FREE_HEAD)),
    };
    if !(1..file_pages).contains(&meta.flushed) {
        return Err(MisqlError::Corruption("meta flushed page count out of range"));
    }
    if meta.root.0 >= meta.flushed || meta.free_head.0 >= meta.flushed {
        return Err(MisqlError::Corruption("meta points past flushed pages"));
    }
    Ok(meta)
}

/// Loads the meta page through `io`; an empty file yields [`Meta::fresh`].
pub fn load_meta(io: &dyn FileIo) -> Result<Meta> {
    let len = io.len()?;
    if len == 0 {
        return Ok(Meta::fresh());
    }
    if len % PAGE_SIZE as u64 != 0 {
        return Err(MisqlError::Corruption(
            "file size is not a multiple of the page size",
        ));
    }
    let mut buf = [0u8; META_LEN];
    match io.read_at(0, &mut buf) {
        Ok(()) => {}
        Err(err) if is_eof(&err) => return Err(MisqlError::Corruption("meta page truncated")),
        Err(err) => return Err(err),
    }
    read_meta_page(&buf, len / PAGE_SIZE as u64)
}

/// Overwrites the meta page in place. Callers fsync afterwards.
pub fn store_meta(io: &dyn FileIo, meta: &Meta) -> Result<()> {
    let mut buf = [0u8; META_LEN];
    write_meta_page(&mut buf, meta)?;
    io.write_at(0, &buf)
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Meta(root={}, flushed={}, free_head={})",
            self.root, self.flushed, self.free_head
        )
    }
}
