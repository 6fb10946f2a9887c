use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::primitives::pager::{PagerOptions, DEFAULT_INITIAL_MMAP_BYTES};
use crate::storage::btree::page::{HEADER, OFFSET_LEN, PTR_LEN, RECORD_HEADER_LEN};
use crate::types::{
    page::{MAX_KEY_SIZE, MAX_VAL_SIZE, PAGE_SIZE},
    MisqlError, Result,
};

/// Options accepted by [`Db::open`](super::Db::open).
///
/// Missing fields in a TOML file fall back to [`DbOptions::default`]:
///
/// ```toml
/// max_key_size = 256
/// initial_mmap_bytes = 1048576
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbOptions {
    /// Longest key accepted by `set`.
    pub max_key_size: usize,
    /// Longest value accepted by `set`.
    pub max_value_size: usize,
    /// Size of the first mapping chunk in bytes.
    pub initial_mmap_bytes: usize,
    /// Create the database file when it does not exist.
    pub create_if_missing: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            max_key_size: MAX_KEY_SIZE,
            max_value_size: MAX_VAL_SIZE,
            initial_mmap_bytes: DEFAULT_INITIAL_MMAP_BYTES,
            create_if_missing: true,
        }
    }
}

impl DbOptions {
    /// Sets the key length limit.
    pub fn max_key_size(mut self, bytes: usize) -> Self {
        self.max_key_size = bytes;
        self
    }

    /// Sets the value length limit.
    pub fn max_value_size(mut self, bytes: usize) -> Self {
        self.max_value_size = bytes;
        self
    }

    /// Sets the first mapping chunk size.
    pub fn initial_mmap_bytes(mut self, bytes: usize) -> Self {
        self.initial_mmap_bytes = bytes;
        self
    }

    /// Sets whether a missing file is created.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Rejects options no database can run with. A leaf holding one
    /// maximal record next to its sentinel must fit a single page.
    pub fn validate(&self) -> Result<()> {
        if self.max_key_size == 0 {
            return Err(MisqlError::Config("max_key_size must be positive"));
        }
        if self.max_key_size > MAX_KEY_SIZE {
            return Err(MisqlError::Config("max_key_size above the engine limit"));
        }
        if self.max_value_size > MAX_VAL_SIZE {
            return Err(MisqlError::Config("max_value_size above the engine limit"));
        }
        let worst = HEADER
            + PTR_LEN
            + OFFSET_LEN
            + RECORD_HEADER_LEN
            + self.max_key_size
            + self.max_value_size;
        if worst > PAGE_SIZE {
            return Err(MisqlError::Config("largest record does not fit a page"));
        }
        if self.initial_mmap_bytes == 0 || self.initial_mmap_bytes % PAGE_SIZE != 0 {
            return Err(MisqlError::Config(
                "initial_mmap_bytes must be a positive multiple of the page size",
            ));
        }
        Ok(())
    }

    /// Parses options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub(crate) fn pager_options(&self) -> PagerOptions {
        PagerOptions {
            initial_mmap_bytes: self.initial_mmap_bytes,
            create_if_missing: self.create_if_missing,
        }
    }
}
