#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::Path;

use misql::admin::verify;
use misql::types::page::PAGE_SIZE;
use misql::{Db, DbOptions, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;

fn open(path: &Path) -> Result<Db> {
    Db::open(path, DbOptions::default().initial_mmap_bytes(16 * PAGE_SIZE))
}

fn assert_matches(db: &Db, expected: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<()> {
    for (key, val) in expected {
        assert_eq!(db.get(key)?.as_deref(), Some(val.as_slice()), "key {key:?}");
    }
    Ok(())
}

#[test]
fn reopen_sees_every_committed_write() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("persist.db");
    let mut expected = BTreeMap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED_0001);

    {
        let mut db = open(&path)?;
        for i in 0..1_500u32 {
            let key = format!("user:{:06}", rng.gen_range(0..3_000u32)).into_bytes();
            let val = vec![(i % 251) as u8; rng.gen_range(0..400usize)];
            db.set(&key, &val)?;
            expected.insert(key, val);
        }
        for key in expected.keys().step_by(4).cloned().collect::<Vec<_>>() {
            assert!(db.delete(&key)?);
            expected.remove(&key);
        }
        db.close()?;
    }

    let db = open(&path)?;
    assert_matches(&db, &expected)?;
    assert_eq!(db.get(b"user:missing")?, None);
    let report = verify(&db)?;
    assert!(report.success, "{:?}", report.findings);
    assert_eq!(report.counts.keys, expected.len() as u64);
    db.close()
}

#[test]
fn emptied_database_reopens_empty() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("empty.db");
    {
        let mut db = open(&path)?;
        for i in 0..300u32 {
            db.set(format!("k{i}").as_bytes(), &[3u8; 200])?;
        }
        for i in 0..300u32 {
            assert!(db.delete(format!("k{i}").as_bytes())?);
        }
        assert!(db.root().is_none());
        db.close()?;
    }

    let mut db = open(&path)?;
    assert!(db.root().is_none());
    assert_eq!(db.get(b"k1")?, None);
    let report = verify(&db)?;
    assert!(report.success, "{:?}", report.findings);
    assert!(report.counts.free_pages > 0);

    db.set(b"again", b"hello")?;
    assert_eq!(db.get(b"again")?.as_deref(), Some(&b"hello"[..]));
    db.close()
}

#[test]
fn large_records_survive_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("large.db");
    let options = DbOptions::default();
    let key = vec![b'k'; options.max_key_size];
    let val = vec![b'v'; options.max_value_size];
    {
        let mut db = open(&path)?;
        for i in 0..20u8 {
            let mut key = key.clone();
            key[0] = b'a' + i;
            db.set(&key, &val)?;
        }
        db.close()?;
    }

    let db = open(&path)?;
    for i in 0..20u8 {
        let mut key = key.clone();
        key[0] = b'a' + i;
        assert_eq!(db.get(&key)?.as_deref(), Some(val.as_slice()));
    }
    assert!(verify(&db)?.success);
    db.close()
}
