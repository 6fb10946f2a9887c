#![forbid(unsafe_code)]

//! Shared identifiers, error type and on-disk constants.

use std::fmt;

/// Disk page number. Page 0 is the meta page, so `PageId(0)` doubles as "none".
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct PageId(pub u64);

impl PageId {
    /// The null page number.
    pub const NONE: PageId = PageId(0);

    /// Returns true for the null page number.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PageId {
    fn from(value: u64) -> Self {
        PageId(value)
    }
}

/// Errors surfaced by the storage engine.
#[derive(thiserror::Error, Debug)]
pub enum MisqlError {
    /// Failure at the file or mapping boundary.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// The file contents cannot be trusted.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// A tree page carries neither the internal nor the leaf kind.
    #[error("page {0} is not a b+tree node")]
    UntypedNode(PageId),
    /// Options that can never produce a working engine.
    #[error("configuration: {0}")]
    Config(&'static str),
    /// An options file that does not parse.
    #[error("options file: {0}")]
    ConfigFile(#[from] toml::de::Error),
    /// Rejected caller input.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MisqlError>;

pub mod page {
    //! Page geometry and page kinds shared by the pager and the tree.

    use super::{MisqlError, Result};

    /// Size of every page in the file.
    pub const PAGE_SIZE: usize = 4096;

    /// Hard upper bound for keys accepted by the engine.
    pub const MAX_KEY_SIZE: usize = 1000;

    /// Hard upper bound for values accepted by the engine.
    pub const MAX_VAL_SIZE: usize = 3000;

    /// Kind tag stored in the first two bytes of every non-meta page.
    #[repr(u16)]
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub enum PageKind {
        /// B+Tree node holding child pointers.
        Internal = 1,
        /// B+Tree node holding key/value records.
        Leaf = 2,
        /// Freelist chain node.
        FreeList = 3,
    }

    impl PageKind {
        /// Raw on-disk tag.
        pub const fn as_u16(self) -> u16 {
            self as u16
        }
    }

    impl TryFrom<u16> for PageKind {
        type Error = MisqlError;

        fn try_from(value: u16) -> Result<Self> {
            match value {
                1 => Ok(PageKind::Internal),
                2 => Ok(PageKind::Leaf),
                3 => Ok(PageKind::FreeList),
                _ => Err(MisqlError::Corruption("unknown page kind")),
            }
        }
    }

    /// Reads a little-endian `u16` at `off`.
    #[inline]
    pub fn read_u16(buf: &[u8], off: usize) -> u16 {
        u16::from_le_bytes([buf[off], buf[off + 1]])
    }

    /// Writes a little-endian `u16` at `off`.
    #[inline]
    pub fn write_u16(buf: &mut [u8], off: usize, value: u16) {
        buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Reads a little-endian `u64` at `off`.
    #[inline]
    pub fn read_u64(buf: &[u8], off: usize) -> u64 {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&buf[off..off + 8]);
        u64::from_le_bytes(arr)
    }

    /// Writes a little-endian `u64` at `off`.
    #[inline]
    pub fn write_u64(buf: &mut [u8], off: usize, value: u64) {
        buf[off..off + 8].copy_from_slice(&value.to_le_bytes());
    }
}
