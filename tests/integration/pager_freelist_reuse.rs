#![allow(missing_docs)]

use misql::admin::{stats, verify};
use misql::types::page::PAGE_SIZE;
use misql::{Db, DbOptions, Result};
use tempfile::tempdir;

fn options() -> DbOptions {
    DbOptions::default().initial_mmap_bytes(16 * PAGE_SIZE)
}

#[test]
fn overwriting_one_key_keeps_the_file_small() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("reuse.db");
    let mut db = Db::open(&path, options())?;
    for i in 0..2_000u32 {
        db.set(b"counter", i.to_string().as_bytes())?;
    }
    let report = stats(&db)?;
    assert!(
        report.pager.flushed_pages <= 8,
        "flushed grew to {}",
        report.pager.flushed_pages
    );
    assert!(report.pager.file_pages <= 10);
    assert_eq!(report.tree.keys, 1);
    assert!(verify(&db)?.success);
    assert_eq!(db.get(b"counter")?.as_deref(), Some(&b"1999"[..]));
    db.close()
}

#[test]
fn churn_stays_bounded_by_live_data() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("churn.db");
    let mut db = Db::open(&path, options())?;
    for i in 0..500u32 {
        db.set(format!("key{i:04}").as_bytes(), &[1u8; 300])?;
    }
    let after_load = stats(&db)?.pager.flushed_pages;

    for round in 0..4u8 {
        for i in 0..500u32 {
            db.set(format!("key{i:04}").as_bytes(), &[round; 300])?;
        }
    }
    let after_churn = stats(&db)?;
    assert!(
        after_churn.pager.flushed_pages <= after_load + after_load / 2,
        "flushed {} after load, {} after churn",
        after_load,
        after_churn.pager.flushed_pages
    );
    let report = verify(&db)?;
    assert!(report.success, "{:?}", report.findings);
    assert_eq!(report.counts.keys, 500);
    db.close()
}

#[test]
fn freed_pages_are_reused_after_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("reopen.db");
    let flushed = {
        let mut db = Db::open(&path, options())?;
        for i in 0..400u32 {
            db.set(format!("key{i:04}").as_bytes(), &[9u8; 200])?;
        }
        for i in 0..400u32 {
            db.delete(format!("key{i:04}").as_bytes())?;
        }
        let flushed = stats(&db)?.pager.flushed_pages;
        db.close()?;
        flushed
    };

    let mut db = Db::open(&path, options())?;
    assert!(db.pager().free_total()? > 0);
    for i in 0..100u32 {
        db.set(format!("key{i:04}").as_bytes(), &[9u8; 200])?;
    }
    assert!(stats(&db)?.pager.flushed_pages <= flushed);
    assert!(verify(&db)?.success);
    db.close()
}

#[test]
fn bulk_delete_fills_freelist_nodes_to_capacity() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bulk.db");
    let mut db = Db::open(&path, options())?;
    for i in 0..6_000u32 {
        db.set(format!("k{i:06}").as_bytes(), &[5u8; 400])?;
    }
    for i in 0..6_000u32 {
        assert!(db.delete(format!("k{i:06}").as_bytes())?);
        if i % 1_500 == 0 {
            let report = verify(&db)?;
            assert!(report.success, "after {i} deletes: {:?}", report.findings);
        }
    }
    assert!(db.root().is_none());
    let report = verify(&db)?;
    assert!(report.success, "{:?}", report.findings);
    assert!(report.counts.freelist_nodes > 1);
    db.close()?;

    let db = Db::open(&path, options())?;
    assert!(verify(&db)?.success);
    db.close()
}
