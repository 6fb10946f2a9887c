use super::page::{Node, NodeKind};
use super::{BTree, NodeStore};
use crate::primitives::pager::{Pager, PagerOptions};
use crate::types::{page::PAGE_SIZE, MisqlError, PageId, Result};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tempfile::tempdir;

/// Page map that frees eagerly and refuses double frees or dangling reads.
#[derive(Default)]
struct MemStore {
    pages: HashMap<PageId, Node>,
    next: u64,
}

impl NodeStore for MemStore {
    fn get(&self, id: PageId) -> Result<Node> {
        self.pages
            .get(&id)
            .cloned()
            .ok_or(MisqlError::Invalid("dangling page"))
    }

    fn new_node(&mut self, node: Node) -> Result<PageId> {
        let node = node.into_page();
        self.next += 1;
        let id = PageId(self.next);
        self.pages.insert(id, node);
        Ok(id)
    }

    fn del(&mut self, id: PageId) {
        assert!(self.pages.remove(&id).is_some(), "page {id} freed twice");
    }
}

struct Harness {
    tree: BTree,
    store: MemStore,
    reference: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            tree: BTree::default(),
            store: MemStore::default(),
            reference: BTreeMap::new(),
        }
    }

    fn add(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        self.tree.insert(&mut self.store, key, val)?;
        self.reference.insert(key.to_vec(), val.to_vec());
        Ok(())
    }

    fn del(&mut self, key: &[u8]) -> Result<bool> {
        let expected = self.reference.remove(key).is_some();
        let deleted = self.tree.delete(&mut self.store, key)?;
        assert_eq!(deleted, expected, "delete of {:?}", String::from_utf8_lossy(key));
        Ok(deleted)
    }

    fn verify(&self) -> Result<Shape> {
        let shape = check_tree(&self.store, self.tree.root())?;
        assert_eq!(shape.pages, self.store.pages.keys().copied().collect());
        assert_eq!(shape.entries, self.reference);
        for (key, val) in &self.reference {
            assert_eq!(self.tree.get(&self.store, key)?.as_deref(), Some(&val[..]));
        }
        Ok(shape)
    }
}

#[derive(Debug, Default)]
struct Shape {
    height: usize,
    leaves: usize,
    internals: usize,
    pages: BTreeSet<PageId>,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Walks the whole tree and asserts every structural invariant.
fn check_tree(store: &impl NodeStore, root: PageId) -> Result<Shape> {
    let mut shape = Shape::default();
    if root.is_none() {
        return Ok(shape);
    }
    let mut leaf_depth = None;
    check_node(store, root, 1, None, None, &mut leaf_depth, &mut shape)?;
    shape.height = leaf_depth.unwrap_or(0);
    Ok(shape)
}

fn check_node(
    store: &impl NodeStore,
    id: PageId,
    depth: usize,
    low: Option<&[u8]>,
    high: Option<&[u8]>,
    leaf_depth: &mut Option<usize>,
    shape: &mut Shape,
) -> Result<()> {
    assert!(shape.pages.insert(id), "page {id} reachable twice");
    let node = store.get(id)?;
    assert!(node.size_bytes() <= PAGE_SIZE);
    assert!(node.count() > 0, "empty node {id}");
    let keys: Vec<&[u8]> = (0..node.count()).map(|i| node.key(i)).collect();
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1], "keys out of order in page {id}");
    }
    match low {
        Some(low) => assert_eq!(keys[0], low, "first key of page {id} differs from separator"),
        None => assert_eq!(keys[0], b"", "leftmost page {id} lacks the sentinel"),
    }
    if let Some(high) = high {
        assert!(keys[keys.len() - 1] < high, "page {id} crosses its upper separator");
    }
    match node.kind_at(id)? {
        NodeKind::Leaf => {
            match leaf_depth {
                Some(expected) => assert_eq!(*expected, depth, "leaves at uneven depth"),
                None => *leaf_depth = Some(depth),
            }
            shape.leaves += 1;
            for i in 0..node.count() {
                if !node.key(i).is_empty() {
                    shape.entries.insert(node.key(i).to_vec(), node.val(i).to_vec());
                }
            }
        }
        NodeKind::Internal => {
            shape.internals += 1;
            for i in 0..node.count() {
                let child_low = if low.is_none() && i == 0 { None } else { Some(keys[i as usize]) };
                let child_high = if i + 1 < node.count() { Some(keys[i as usize + 1]) } else { high };
                check_node(store, node.ptr(i), depth + 1, child_low, child_high, leaf_depth, shape)?;
            }
        }
    }
    Ok(())
}

fn big_key(i: u32) -> Vec<u8> {
    format!("key-{i:06}").into_bytes()
}

#[test]
fn insert_and_lookup_beatles() -> Result<()> {
    let mut h = Harness::new();
    h.add(b"paul", b"mccartney")?;
    h.add(b"john", b"lennon")?;
    h.add(b"ringo", b"starr")?;
    h.add(b"george", b"harrison")?;
    let shape = h.verify()?;
    assert_eq!(shape.height, 1);
    assert_eq!(h.tree.get(&h.store, b"pete")?, None);
    Ok(())
}

#[test]
fn update_replaces_value_in_place_of_key() -> Result<()> {
    let mut h = Harness::new();
    h.add(b"paul", b"mccartney")?;
    h.add(b"john", b"lennon")?;
    h.add(b"ringo", b"starr")?;
    h.add(b"john", b"mayer")?;
    assert_eq!(h.tree.get(&h.store, b"john")?.as_deref(), Some(&b"mayer"[..]));
    let shape = h.verify()?;
    assert_eq!(shape.entries.len(), 3);
    Ok(())
}

#[test]
fn empty_tree_edge_cases() -> Result<()> {
    let mut h = Harness::new();
    assert!(h.tree.is_empty());
    assert_eq!(h.tree.get(&h.store, b"x")?, None);
    assert!(!h.tree.delete(&mut h.store, b"x")?);
    assert!(h.store.pages.is_empty());

    h.add(b"x", b"1")?;
    // The sentinel is not a user key.
    assert_eq!(h.tree.get(&h.store, b"")?, None);
    assert!(!h.tree.delete(&mut h.store, b"")?);
    assert!(matches!(
        h.tree.insert(&mut h.store, b"", b"v"),
        Err(MisqlError::Invalid(_))
    ));
    assert!(!h.del(b"y")?);
    assert!(h.del(b"x")?);
    let shape = h.verify()?;
    assert_eq!(shape.leaves, 1);
    assert!(shape.entries.is_empty());
    Ok(())
}

#[test]
fn oversized_records_are_rejected() {
    let mut h = Harness::new();
    let key = vec![b'k'; 1001];
    let val = vec![b'v'; 3001];
    assert!(h.tree.insert(&mut h.store, &key, b"v").is_err());
    assert!(h.tree.insert(&mut h.store, b"k", &val).is_err());
    assert!(h.tree.is_empty());
}

#[test]
fn leaf_overflow_grows_a_level() -> Result<()> {
    let mut h = Harness::new();
    let val = vec![b'v'; 500];
    for i in 0..7 {
        h.add(&big_key(i), &val)?;
    }
    assert_eq!(h.verify()?.height, 1);
    h.add(&big_key(7), &val)?;
    let shape = h.verify()?;
    assert_eq!(shape.height, 2);
    assert_eq!(shape.internals, 1);
    assert_eq!(shape.leaves, 2);
    Ok(())
}

#[test]
fn large_records_spread_over_three_leaves() -> Result<()> {
    let mut h = Harness::new();
    h.add(&[b'a'; 1000], &[1u8; 1996])?;
    h.add(&[b'c'; 1000], &[3u8; 996])?;
    // Lands between two leaves and overflows the left one again.
    h.add(&[b'b'; 1000], &[2u8; 1996])?;
    let shape = h.verify()?;
    assert_eq!(shape.height, 2);
    assert_eq!(shape.leaves, 3);
    Ok(())
}

#[test]
fn deleting_keys_merges_underfull_leaves() -> Result<()> {
    let mut h = Harness::new();
    let val = vec![b'v'; 300];
    for i in 0..200 {
        h.add(&big_key(i), &val)?;
    }
    let before = h.verify()?;
    assert!(before.leaves > 10);
    for i in 0..200 {
        if i % 10 != 0 {
            h.del(&big_key(i))?;
        }
    }
    let after = h.verify()?;
    assert_eq!(after.entries.len(), 20);
    // 20 records of ~320 bytes fit in two pages; merges leave a handful.
    assert!(after.leaves < before.leaves / 2, "{after:?}");
    Ok(())
}

#[test]
fn root_collapses_when_one_child_remains() -> Result<()> {
    let mut h = Harness::new();
    let val = vec![b'v'; 1000];
    for i in 0..12 {
        h.add(&big_key(i), &val)?;
    }
    assert!(h.verify()?.height >= 2);
    for i in 1..12 {
        h.del(&big_key(i))?;
    }
    let shape = h.verify()?;
    assert_eq!(shape.height, 1);
    assert_eq!(shape.internals, 0);
    assert_eq!(h.store.pages.len(), 1);
    Ok(())
}

#[test]
fn deleting_everything_leaves_the_sentinel_leaf() -> Result<()> {
    let mut h = Harness::new();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut keys: Vec<u32> = (0..500).collect();
    for &i in &keys {
        let len = rng.gen_range(0..400);
        h.add(&big_key(i), &vec![b'x'; len])?;
    }
    h.verify()?;
    for i in (1..keys.len()).rev() {
        keys.swap(i, rng.gen_range(0..=i));
    }
    for (n, &i) in keys.iter().enumerate() {
        assert!(h.del(&big_key(i))?);
        if n % 50 == 0 {
            h.verify()?;
        }
    }
    let shape = h.verify()?;
    assert!(shape.entries.is_empty());
    assert!(h.store.pages.len() <= 1);
    Ok(())
}

#[test]
fn random_workload_matches_reference() -> Result<()> {
    let mut h = Harness::new();
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    for step in 0..3000 {
        let key = format!("k{:04}", rng.gen_range(0..600)).into_bytes();
        if rng.gen_bool(0.6) {
            let len = rng.gen_range(0..900);
            let val: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            h.add(&key, &val)?;
        } else {
            h.del(&key)?;
        }
        if step % 250 == 0 {
            h.verify()?;
        }
    }
    h.verify()?;
    Ok(())
}

#[test]
fn separator_growth_on_delete_is_split() -> Result<()> {
    // Long keys make separators large; deleting a child's first key can
    // replace it with a longer one.
    let mut h = Harness::new();
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    for i in 0..400u32 {
        let mut key = format!("{i:04}").into_bytes();
        key.resize(rng.gen_range(4..1000), b'z');
        h.add(&key, &[1u8; 64])?;
    }
    h.verify()?;
    let keys: Vec<Vec<u8>> = h.reference.keys().cloned().collect();
    for key in keys.iter().step_by(3) {
        h.del(key)?;
    }
    h.verify()?;
    Ok(())
}

#[test]
fn tree_runs_on_the_pager() -> Result<()> {
    let dir = tempdir().map_err(MisqlError::Io)?;
    let options = PagerOptions {
        initial_mmap_bytes: 16 * PAGE_SIZE,
        create_if_missing: true,
    };
    let path = dir.path().join("btree.db");
    let mut reference = BTreeMap::new();
    {
        let mut pager = Pager::open(&path, &options)?;
        let mut tree = BTree::new(pager.meta().root);
        for i in 0..300 {
            let val = vec![(i % 251) as u8; 100];
            tree.insert(&mut pager, &big_key(i), &val)?;
            reference.insert(big_key(i), val);
            if i % 20 == 19 {
                pager.commit(tree.root())?;
            }
        }
        for i in (0..300).step_by(2) {
            assert!(tree.delete(&mut pager, &big_key(i))?);
            reference.remove(&big_key(i));
        }
        pager.commit(tree.root())?;
    }
    let pager = Pager::open(&path, &options)?;
    let tree = BTree::new(pager.meta().root);
    let shape = check_tree(&pager, tree.root())?;
    assert_eq!(shape.entries, reference);
    Ok(())
}

#[derive(Debug, Clone)]
enum Op {
    Put(u8, usize),
    Del(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<u8>(), 0usize..1200).prop_map(|(k, len)| Op::Put(k, len)),
        2 => any::<u8>().prop_map(Op::Del),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_tree_matches_btreemap(ops in prop::collection::vec(op_strategy(), 1..300)) {
        let mut h = Harness::new();
        for op in ops {
            match op {
                Op::Put(k, len) => {
                    let key = format!("p{k:03}").into_bytes();
                    h.add(&key, &vec![k; len]).unwrap();
                }
                Op::Del(k) => {
                    h.del(&format!("p{k:03}").into_bytes()).unwrap();
                }
            }
        }
        h.verify().unwrap();
    }
}
