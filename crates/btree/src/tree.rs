//! Copy-on-write B-Tree operations over a [`yggdrasil_pagestore::PageStore`].
//!
//! Every mutation reads the path from the root to the affected leaf,
//! rewrites each node on that path to a fresh page, and marks the
//! superseded pages freed — so unrelated subtrees are always shared
//! between the old and new root, and the old root stays fully readable
//! until the caller's next `PageStore::flush`.

use crate::error::Result;
use crate::node::Node;
use std::ops::Bound;
use tracing::trace;
use yggdrasil_pagestore::{PageAddr, PageStore};

/// Default number of entries (leaf) or children (internal) a node holds
/// before it splits.
pub const DEFAULT_FANOUT: usize = 64;

/// A COW B-Tree view over a page store. Holds no state of its own beyond
/// the fanout; the root address is threaded through every call by the
/// caller (typically the snapshot registry or composite journal), which
/// is what makes the tree's mutations pure value transformations.
pub struct BTree<'a> {
    store: &'a mut PageStore,
    fanout: usize,
}

impl<'a> BTree<'a> {
    /// Borrow `store` for a batch of operations with the default fanout.
    pub fn new(store: &'a mut PageStore) -> Self {
        BTree { store, fanout: DEFAULT_FANOUT }
    }

    /// Borrow `store` for a batch of operations with an explicit fanout.
    pub fn with_fanout(store: &'a mut PageStore, fanout: usize) -> Self {
        BTree { store, fanout }
    }

    /// Look up `key` under `root`.
    pub fn get(&self, root: Option<PageAddr>, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(addr) = root else { return Ok(None) };
        let node = self.load(addr)?;
        match node {
            Node::Leaf { entries } => {
                Ok(entries.binary_search_by(|(k, _)| k.as_slice().cmp(key)).ok().map(|i| entries[i].1.clone()))
            }
            Node::Internal { keys, children } => {
                let idx = child_index(&keys, key);
                self.get(Some(children[idx]), key)
            }
        }
    }

    /// Find the entry with the greatest key `<= key`, if any.
    pub fn seek_le(&self, root: Option<PageAddr>, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let Some(addr) = root else { return Ok(None) };
        let node = self.load(addr)?;
        match node {
            Node::Leaf { entries } => {
                Ok(entries.iter().rev().find(|(k, _)| k.as_slice() <= key).cloned())
            }
            Node::Internal { keys, children } => {
                let idx = child_index(&keys, key);
                for i in (0..=idx).rev() {
                    if let Some(hit) = self.seek_le(Some(children[i]), key)? {
                        return Ok(Some(hit));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Collect every entry with key in `[start, end)` (bounds per
    /// [`std::ops::Bound`]), in ascending key order.
    pub fn range(
        &self,
        root: Option<PageAddr>,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        self.range_collect(root, &start, &end, &mut out)?;
        Ok(out)
    }

    fn range_collect(
        &self,
        root: Option<PageAddr>,
        start: &Bound<Vec<u8>>,
        end: &Bound<Vec<u8>>,
        out: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<()> {
        let Some(addr) = root else { return Ok(()) };
        match self.load(addr)? {
            Node::Leaf { entries } => {
                for (k, v) in entries {
                    if in_bounds(&k, start, end) {
                        out.push((k, v));
                    }
                }
            }
            Node::Internal { keys, children } => {
                for (i, child) in children.iter().enumerate() {
                    if subtree_may_overlap(&keys, i, start, end) {
                        self.range_collect(Some(*child), start, end, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Insert or overwrite `key` -> `value`, returning the new root.
    pub fn put(&mut self, root: Option<PageAddr>, key: Vec<u8>, value: Vec<u8>) -> Result<PageAddr> {
        let (new_root, split) = self.put_rec(root, key, value)?;
        match split {
            None => Ok(new_root),
            Some((sep, sibling)) => {
                let node = Node::Internal { keys: vec![sep], children: vec![new_root, sibling] };
                self.write_new(&node)
            }
        }
    }

    fn put_rec(
        &mut self,
        root: Option<PageAddr>,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<(PageAddr, Option<(Vec<u8>, PageAddr)>)> {
        let Some(addr) = root else {
            let node = Node::Leaf { entries: vec![(key, value)] };
            return Ok((self.write_new(&node)?, None));
        };
        let node = self.load(addr)?;
        self.store.mark_freed(addr);
        match node {
            Node::Leaf { mut entries } => {
                match entries.binary_search_by(|(k, _)| k.cmp(&key)) {
                    Ok(i) => entries[i].1 = value,
                    Err(i) => entries.insert(i, (key, value)),
                }
                if entries.len() <= self.fanout {
                    let node = Node::Leaf { entries };
                    Ok((self.write_new(&node)?, None))
                } else {
                    let mid = entries.len() / 2;
                    let right = entries.split_off(mid);
                    let sep = right[0].0.clone();
                    let left_addr = self.write_new(&Node::Leaf { entries })?;
                    let right_addr = self.write_new(&Node::Leaf { entries: right })?;
                    Ok((left_addr, Some((sep, right_addr))))
                }
            }
            Node::Internal { mut keys, mut children } => {
                let idx = child_index(&keys, &key);
                let (new_child, split) = self.put_rec(Some(children[idx]), key, value)?;
                children[idx] = new_child;
                if let Some((sep, sibling)) = split {
                    keys.insert(idx, sep);
                    children.insert(idx + 1, sibling);
                }
                if children.len() <= self.fanout + 1 {
                    let node = Node::Internal { keys, children };
                    Ok((self.write_new(&node)?, None))
                } else {
                    let mid = children.len() / 2;
                    let right_children = children.split_off(mid);
                    let mut right_keys = keys.split_off(mid - 1);
                    let sep = right_keys.remove(0);
                    let left_addr = self.write_new(&Node::Internal { keys, children })?;
                    let right_addr =
                        self.write_new(&Node::Internal { keys: right_keys, children: right_children })?;
                    Ok((left_addr, Some((sep, right_addr))))
                }
            }
        }
    }

    /// Remove `key` if present, returning the new root (`None` if the
    /// tree became empty) and whether the key was found.
    ///
    /// This does not rebalance underfull nodes after a delete; nodes only
    /// ever shrink to zero entries and vanish. A workload with heavy
    /// delete churn will accumulate sparse nodes until the next time the
    /// affected keys are rewritten.
    pub fn delete(&mut self, root: Option<PageAddr>, key: &[u8]) -> Result<(Option<PageAddr>, bool)> {
        let Some(addr) = root else { return Ok((None, false)) };
        let node = self.load(addr)?;
        match node {
            Node::Leaf { mut entries } => match entries.binary_search_by(|(k, _)| k.as_slice().cmp(key)) {
                Err(_) => Ok((Some(addr), false)),
                Ok(i) => {
                    self.store.mark_freed(addr);
                    entries.remove(i);
                    if entries.is_empty() {
                        Ok((None, true))
                    } else {
                        Ok((Some(self.write_new(&Node::Leaf { entries })?), true))
                    }
                }
            },
            Node::Internal { mut keys, mut children } => {
                let idx = child_index(&keys, key);
                let (new_child, found) = self.delete(Some(children[idx]), key)?;
                if !found {
                    return Ok((Some(addr), false));
                }
                self.store.mark_freed(addr);
                match new_child {
                    Some(new_addr) => children[idx] = new_addr,
                    None => {
                        children.remove(idx);
                        if idx > 0 {
                            keys.remove(idx - 1);
                        } else if !keys.is_empty() {
                            keys.remove(0);
                        }
                    }
                }
                if children.is_empty() {
                    Ok((None, true))
                } else if children.len() == 1 {
                    // Collapse a routing node with a single remaining child.
                    Ok((Some(children[0]), true))
                } else {
                    Ok((Some(self.write_new(&Node::Internal { keys, children })?), true))
                }
            }
        }
    }

    fn load(&self, addr: PageAddr) -> Result<Node> {
        let page = self.store.read(addr)?;
        Node::decode(&page, addr)
    }

    fn write_new(&mut self, node: &Node) -> Result<PageAddr> {
        let bytes = node.encode(self.store.page_size())?;
        let addr = self.store.alloc();
        self.store.write(addr, &bytes)?;
        trace!(addr, "wrote node");
        Ok(addr)
    }
}

/// Index of the child that may hold `key`, given an internal node's
/// separator keys.
fn child_index(keys: &[Vec<u8>], key: &[u8]) -> usize {
    match keys.binary_search_by(|k| k.as_slice().cmp(key)) {
        Ok(i) => i + 1,
        Err(i) => i,
    }
}

fn in_bounds(key: &[u8], start: &Bound<Vec<u8>>, end: &Bound<Vec<u8>>) -> bool {
    let after_start = match start {
        Bound::Included(s) => key >= s.as_slice(),
        Bound::Excluded(s) => key > s.as_slice(),
        Bound::Unbounded => true,
    };
    let before_end = match end {
        Bound::Included(e) => key <= e.as_slice(),
        Bound::Excluded(e) => key < e.as_slice(),
        Bound::Unbounded => true,
    };
    after_start && before_end
}

/// Conservative check: could child `i` (bounded by `keys[i-1]` and
/// `keys[i]`) contain any key in `[start, end)`?
fn subtree_may_overlap(keys: &[Vec<u8>], i: usize, start: &Bound<Vec<u8>>, end: &Bound<Vec<u8>>) -> bool {
    let child_lo: Option<&[u8]> = if i == 0 { None } else { Some(&keys[i - 1]) };
    let child_hi: Option<&[u8]> = keys.get(i).map(|k| k.as_slice());

    let start_before_hi = match (child_hi, start) {
        (Some(hi), Bound::Included(s)) => s.as_slice() < hi,
        (Some(hi), Bound::Excluded(s)) => s.as_slice() < hi,
        (None, _) => true,
        (Some(_), Bound::Unbounded) => true,
    };
    let end_after_lo = match (child_lo, end) {
        (Some(lo), Bound::Included(e)) => e.as_slice() >= lo,
        (Some(lo), Bound::Excluded(e)) => e.as_slice() > lo,
        (None, _) => true,
        (Some(_), Bound::Unbounded) => true,
    };
    start_before_hi && end_after_lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use yggdrasil_pagestore::PageStoreConfig;

    fn store() -> (tempfile::TempDir, PageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::create(dir.path().join("t"), PageStoreConfig { page_size: 512 }).unwrap();
        (dir, store)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (_dir, mut store) = store();
        let mut tree = BTree::with_fanout(&mut store, 4);
        let root = tree.put(None, b"a".to_vec(), b"1".to_vec()).unwrap();
        let root = tree.put(Some(root), b"b".to_vec(), b"2".to_vec()).unwrap();
        assert_eq!(tree.get(Some(root), b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(tree.get(Some(root), b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(tree.get(Some(root), b"c").unwrap(), None);
    }

    #[test]
    fn overwrite_replaces_value() {
        let (_dir, mut store) = store();
        let mut tree = BTree::with_fanout(&mut store, 4);
        let root = tree.put(None, b"a".to_vec(), b"1".to_vec()).unwrap();
        let root = tree.put(Some(root), b"a".to_vec(), b"2".to_vec()).unwrap();
        assert_eq!(tree.get(Some(root), b"a").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn splitting_preserves_all_keys() {
        let (_dir, mut store) = store();
        let mut tree = BTree::with_fanout(&mut store, 4);
        let mut root = None;
        for i in 0..100u32 {
            let key = format!("k{i:04}").into_bytes();
            root = Some(tree.put(root, key, i.to_le_bytes().to_vec()).unwrap());
        }
        for i in 0..100u32 {
            let key = format!("k{i:04}").into_bytes();
            assert_eq!(tree.get(root, &key).unwrap(), Some(i.to_le_bytes().to_vec()));
        }
    }

    #[test]
    fn range_returns_sorted_subset() {
        let (_dir, mut store) = store();
        let mut tree = BTree::with_fanout(&mut store, 4);
        let mut root = None;
        for i in 0..20u32 {
            let key = format!("k{i:04}").into_bytes();
            root = Some(tree.put(root, key, vec![]).unwrap());
        }
        let start = b"k0005".to_vec();
        let end = b"k0010".to_vec();
        let results = tree
            .range(root, Bound::Included(start), Bound::Excluded(end))
            .unwrap();
        let keys: Vec<String> = results.iter().map(|(k, _)| String::from_utf8(k.clone()).unwrap()).collect();
        assert_eq!(keys, vec!["k0005", "k0006", "k0007", "k0008", "k0009"]);
    }

    #[test]
    fn seek_le_finds_predecessor() {
        let (_dir, mut store) = store();
        let mut tree = BTree::with_fanout(&mut store, 4);
        let mut root = None;
        for k in ["b", "d", "f"] {
            root = Some(tree.put(root, k.as_bytes().to_vec(), vec![]).unwrap());
        }
        let (k, _) = tree.seek_le(root, b"e").unwrap().unwrap();
        assert_eq!(k, b"d");
        assert!(tree.seek_le(root, b"a").unwrap().is_none());
    }

    #[test]
    fn delete_removes_key_and_shrinks_to_empty() {
        let (_dir, mut store) = store();
        let mut tree = BTree::with_fanout(&mut store, 4);
        let root = tree.put(None, b"a".to_vec(), b"1".to_vec()).unwrap();
        let (root, found) = tree.delete(Some(root), b"a").unwrap();
        assert!(found);
        assert!(root.is_none());
    }

    #[test]
    fn delete_missing_key_is_a_noop() {
        let (_dir, mut store) = store();
        let mut tree = BTree::with_fanout(&mut store, 4);
        let root = tree.put(None, b"a".to_vec(), b"1".to_vec()).unwrap();
        let (new_root, found) = tree.delete(Some(root), b"z").unwrap();
        assert!(!found);
        assert_eq!(new_root, Some(root));
    }

    #[test]
    fn delete_across_many_keys_preserves_the_rest() {
        let (_dir, mut store) = store();
        let mut tree = BTree::with_fanout(&mut store, 4);
        let mut root = None;
        for i in 0..50u32 {
            let key = format!("k{i:04}").into_bytes();
            root = Some(tree.put(root, key, vec![]).unwrap());
        }
        for i in (0..50u32).step_by(2) {
            let key = format!("k{i:04}").into_bytes();
            let (new_root, found) = tree.delete(root, &key).unwrap();
            assert!(found);
            root = new_root;
        }
        for i in 0..50u32 {
            let key = format!("k{i:04}").into_bytes();
            let expect_present = i % 2 == 1;
            assert_eq!(tree.get(root, &key).unwrap().is_some(), expect_present);
        }
    }
}
