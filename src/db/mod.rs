//! Embedded key-value database handle.
//!
//! Every successful `set` or `delete` is its own durable transaction: the
//! tree writes new pages through the pager, and the pager commits them and
//! publishes the new root before the call returns.

mod config;


use std::path::Path;

use tracing::{debug, info};

use crate::primitives::pager::Pager;
use crate::storage::btree::BTree;
use crate::types::{MisqlError, PageId, Result};

pub use config::DbOptions;

/// An open database file.
pub struct Db {
    options: DbOptions,
    pager: Pager,
    tree: BTree,
}

impl Db {
    /// Opens the database at `path`, validating `options` first.
    pub fn open(path: impl AsRef<Path>, options: DbOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();
        let pager = Pager::open(path, &options.pager_options())?;
        let tree = BTree::new(pager.meta().root);
        info!(
            path = %path.display(),
            root = tree.root().0,
            flushed = pager.flushed(),
            "db.open"
        );
        Ok(Self {
            options,
            pager,
            tree,
        })
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_key(key)?;
        self.tree.get(&self.pager, key)
    }

    /// Stores `val` under `key` and commits.
    pub fn set(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        self.check_key(key)?;
        if val.len() > self.options.max_value_size {
            return Err(MisqlError::Invalid("value longer than max_value_size"));
        }
        self.apply(|tree, pager| tree.insert(pager, key, val))?;
        debug!(key_len = key.len(), val_len = val.len(), root = self.root().0, "db.set");
        Ok(())
    }

    /// Removes `key` and commits. Returns false, committing nothing, when
    /// the key was absent.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        self.check_key(key)?;
        let deleted = self.apply(|tree, pager| tree.delete(pager, key))?;
        debug!(key_len = key.len(), deleted, root = self.root().0, "db.delete");
        Ok(deleted)
    }

    /// Closes the file.
    pub fn close(self) -> Result<()> {
        info!(path = %self.pager.path().display(), "db.close");
        self.pager.close()
    }

    /// Root page of the committed tree.
    pub fn root(&self) -> PageId {
        self.tree.root()
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        self.pager.path()
    }

    /// Options the database was opened with.
    pub fn options(&self) -> &DbOptions {
        &self.options
    }

    /// Read access to the pager, for inspection.
    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(MisqlError::Invalid("empty key"));
        }
        if key.len() > self.options.max_key_size {
            return Err(MisqlError::Invalid("key longer than max_key_size"));
        }
        Ok(())
    }

    /// Runs one tree mutation and commits whatever it produced. Any failure
    /// leaves the handle on the last durable root.
    fn apply<T>(&mut self, op: impl FnOnce(&mut BTree, &mut Pager) -> Result<T>) -> Result<T> {
        let out = match op(&mut self.tree, &mut self.pager) {
            Ok(out) => out,
            Err(err) => {
                self.pager.abort();
                self.tree = BTree::new(self.pager.meta().root);
                return Err(err);
            }
        };
        if !self.pager.is_clean() {
            if let Err(err) = self.pager.commit(self.tree.root()) {
                self.tree = BTree::new(self.pager.meta().root);
                return Err(err);
            }
        }
        Ok(out)
    }
}
