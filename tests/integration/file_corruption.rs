#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use misql::types::page::PAGE_SIZE;
use misql::{Db, DbOptions, MisqlError, Result};
use tempfile::tempdir;

fn seed(path: &Path) -> Result<()> {
    let mut db = Db::open(path, DbOptions::default().initial_mmap_bytes(16 * PAGE_SIZE))?;
    for i in 0..50u32 {
        db.set(format!("key{i}").as_bytes(), b"value")?;
    }
    db.close()
}

fn patch(path: &Path, offset: u64, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

fn expect_corruption(path: &Path) {
    match Db::open(path, DbOptions::default()) {
        Err(MisqlError::Corruption(_)) => {}
        Err(other) => panic!("expected corruption, got {other}"),
        Ok(_) => panic!("expected corruption, open succeeded"),
    }
}

#[test]
fn bad_signature_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sig.db");
    seed(&path)?;
    patch(&path, 0, b"NotAMisqlFile!!")?;
    expect_corruption(&path);
    Ok(())
}

#[test]
fn misaligned_file_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("short.db");
    seed(&path)?;
    let len = fs::metadata(&path)?.len();
    OpenOptions::new()
        .write(true)
        .open(&path)?
        .set_len(len - 100)?;
    expect_corruption(&path);
    Ok(())
}

#[test]
fn flushed_count_past_the_file_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("flushed.db");
    seed(&path)?;
    let file_pages = fs::metadata(&path)?.len() / PAGE_SIZE as u64;
    patch(&path, 24, &file_pages.to_le_bytes())?;
    expect_corruption(&path);
    Ok(())
}

#[test]
fn zero_flushed_count_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("zero.db");
    seed(&path)?;
    patch(&path, 24, &0u64.to_le_bytes())?;
    expect_corruption(&path);
    Ok(())
}
