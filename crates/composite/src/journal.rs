//! The composite commit journal: `composite_snap_id -> {parent, hlc, msg,
//! sub_snapshots}`, persisted as a `yggdrasil-btree` instance over its own
//! page store, with an in-memory mirror serving every read.

use crate::error::{btree_err, pagestore_err, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use yggdrasil_btree::BTree;
use yggdrasil_core::{Error, Hlc, SnapshotId, SystemId};
use yggdrasil_pagestore::{PageAddr, PageStore, PageStoreConfig};

/// One record in the composite journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// The composite snapshot this record describes.
    pub composite_snap_id: SnapshotId,
    /// The composite snapshot this one was committed on top of, if any.
    pub parent: Option<SnapshotId>,
    /// The HLC this commit was registered under, if known.
    pub hlc: Option<Hlc>,
    /// Commit message, if any.
    pub message: Option<String>,
    /// Each sub-system's contributing snapshot.
    pub sub_snapshots: Vec<(SystemId, SnapshotId)>,
}

struct Backing {
    store: PageStore,
    root: Option<PageAddr>,
}

struct Inner {
    backing: Option<Backing>,
    entries: BTreeMap<SnapshotId, JournalEntry>,
}

/// The composite journal. Usable purely in-memory (no `store_path`
/// supplied to the constructor) or persisted to its own page store.
pub struct CompositeJournal {
    inner: Mutex<Inner>,
}

impl CompositeJournal {
    /// A journal with no on-disk backing; entries live only as long as the
    /// process does.
    pub fn in_memory() -> Self {
        CompositeJournal { inner: Mutex::new(Inner { backing: None, entries: BTreeMap::new() }) }
    }

    /// A brand-new persisted journal rooted at `dir`.
    pub fn create(dir: impl AsRef<Path>, config: PageStoreConfig) -> Result<Self> {
        let store = PageStore::create(dir, config).map_err(pagestore_err)?;
        Ok(CompositeJournal {
            inner: Mutex::new(Inner { backing: Some(Backing { store, root: None }), entries: BTreeMap::new() }),
        })
    }

    /// Open an existing persisted journal, rebuilding the in-memory mirror
    /// from disk.
    pub fn open(dir: impl AsRef<Path>, config: PageStoreConfig) -> Result<Self> {
        let store = PageStore::open(dir, config).map_err(pagestore_err)?;
        let root = store.roots().first().copied();
        let mut backing = Backing { store, root };
        let mut entries = BTreeMap::new();
        {
            let tree = BTree::new(&mut backing.store);
            let all = tree
                .range(backing.root, std::ops::Bound::Unbounded, std::ops::Bound::Unbounded)
                .map_err(btree_err)?;
            for (_, value) in all {
                let entry: JournalEntry = rmp_serde::from_slice(&value)
                    .map_err(|e| Error::IntegrityError(format!("corrupt journal entry: {e}")))?;
                entries.insert(entry.composite_snap_id.clone(), entry);
            }
        }
        Ok(CompositeJournal { inner: Mutex::new(Inner { backing: Some(backing), entries }) })
    }

    /// Append `entry`. Idempotent on `composite_snap_id`: re-appending an
    /// entry whose content is identical to what's already recorded is a
    /// silent no-op, satisfying the "reopen with an identical initial
    /// snapshot must not duplicate the root entry" requirement.
    pub fn append(&self, entry: JournalEntry) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.entries.get(&entry.composite_snap_id) == Some(&entry) {
            return Ok(());
        }

        if let Some(backing) = inner.backing.as_mut() {
            let key = entry.composite_snap_id.as_str().as_bytes().to_vec();
            let value = rmp_serde::to_vec(&entry)
                .map_err(|e| Error::IntegrityError(format!("failed to encode journal entry: {e}")))?;
            let new_root =
                BTree::new(&mut backing.store).put(backing.root, key, value).map_err(btree_err)?;
            backing.root = Some(new_root);
        }
        inner.entries.insert(entry.composite_snap_id.clone(), entry);
        Ok(())
    }

    /// Look up a single entry by composite snapshot id.
    pub fn get(&self, id: &SnapshotId) -> Option<JournalEntry> {
        self.inner.lock().entries.get(id).cloned()
    }

    /// Walk the journal backwards from `start`, newest first.
    pub fn history_from(&self, start: &SnapshotId) -> Vec<JournalEntry> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        let mut cursor = Some(start.clone());
        while let Some(id) = cursor {
            let Some(entry) = inner.entries.get(&id) else { break };
            out.push(entry.clone());
            cursor = entry.parent.clone();
        }
        out
    }

    /// Every journal entry, in insertion (composite-snap-id-ascending) order.
    pub fn all(&self) -> Vec<JournalEntry> {
        self.inner.lock().entries.values().cloned().collect()
    }

    /// Commit the on-disk tree root, if this journal is persisted.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(backing) = inner.backing.as_mut() {
            let roots: Vec<PageAddr> = backing.root.into_iter().collect();
            backing.store.flush(&roots).map_err(pagestore_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, parent: Option<&str>) -> JournalEntry {
        JournalEntry {
            composite_snap_id: SnapshotId::new(id),
            parent: parent.map(SnapshotId::new),
            hlc: None,
            message: None,
            sub_snapshots: vec![(SystemId::new("git"), SnapshotId::new(format!("{id}-git")))],
        }
    }

    #[test]
    fn append_is_idempotent_on_identical_content() {
        let journal = CompositeJournal::in_memory();
        journal.append(entry("c1", None)).unwrap();
        journal.append(entry("c1", None)).unwrap();
        assert_eq!(journal.all().len(), 1);
    }

    #[test]
    fn history_from_walks_parent_chain() {
        let journal = CompositeJournal::in_memory();
        journal.append(entry("c1", None)).unwrap();
        journal.append(entry("c2", Some("c1"))).unwrap();
        journal.append(entry("c3", Some("c2"))).unwrap();

        let history = journal.history_from(&SnapshotId::new("c3"));
        let ids: Vec<String> = history.iter().map(|e| e.composite_snap_id.to_string()).collect();
        assert_eq!(ids, vec!["c3", "c2", "c1"]);
    }

    #[test]
    fn persisted_journal_survives_reopen_without_duplicating_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal");
        let journal = CompositeJournal::create(&path, PageStoreConfig::default()).unwrap();
        journal.append(entry("c1", None)).unwrap();
        journal.flush().unwrap();

        let reopened = CompositeJournal::open(&path, PageStoreConfig::default()).unwrap();
        assert_eq!(reopened.all().len(), 1);
        reopened.append(entry("c1", None)).unwrap();
        assert_eq!(reopened.all().len(), 1, "re-appending identical root entry must not duplicate it");
    }
}
