//! The snapshot registry: three persisted B-trees plus the in-memory
//! mirror that actually serves reads.

use crate::error::{btree_err, pagestore_err};
use crate::keys;
use crate::mirror::Mirror;
use crate::value::EntryValue;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};
use yggdrasil_btree::BTree;
use yggdrasil_core::{BranchName, Error, Hlc, RegistryEntry, Result, SnapshotId, SystemId};
use yggdrasil_pagestore::{PageAddr, PageStore, PageStoreConfig};

struct Inner {
    store: PageStore,
    tsbs_root: Option<PageAddr>,
    sbts_root: Option<PageAddr>,
    stbh_root: Option<PageAddr>,
    mirror: Mirror,
}

/// Owns the registry's persisted state and in-memory mirror. Safe to
/// share across threads: every operation takes an internal lock.
pub struct SnapshotRegistry {
    inner: Mutex<Inner>,
}

impl SnapshotRegistry {
    /// Create a brand-new, empty registry rooted at `dir`.
    pub fn create(dir: impl AsRef<Path>, config: PageStoreConfig) -> Result<Self> {
        let store = PageStore::create(dir, config).map_err(pagestore_err)?;
        Ok(SnapshotRegistry {
            inner: Mutex::new(Inner {
                store,
                tsbs_root: None,
                sbts_root: None,
                stbh_root: None,
                mirror: Mirror::new(),
            }),
        })
    }

    /// Open an existing registry, rebuilding the mirror from the three
    /// on-disk trees and failing with [`Error::IntegrityError`] if they
    /// disagree.
    pub fn open(dir: impl AsRef<Path>, config: PageStoreConfig) -> Result<Self> {
        let store = PageStore::open(dir, config).map_err(pagestore_err)?;
        let roots = store.roots();
        let tsbs_root = roots.first().copied();
        let sbts_root = roots.get(1).copied();
        let stbh_root = roots.get(2).copied();

        let mut mirror = Mirror::new();
        let mut inner =
            Inner { store, tsbs_root, sbts_root, stbh_root, mirror: Mirror::new() };
        rebuild_mirror(&mut inner, &mut mirror)?;
        inner.mirror = mirror;
        info!(entries = inner.mirror.len(), "opened snapshot registry");
        Ok(SnapshotRegistry { inner: Mutex::new(inner) })
    }

    /// Insert `entry` into all three indices and the mirror. Idempotent
    /// on `(snapshot_id, system_id, branch_name, hlc)`; returns `false` if
    /// the entry already existed.
    pub fn register(&self, entry: RegistryEntry) -> Result<bool> {
        let mut inner = self.inner.lock();
        register_one(&mut inner, &entry)
    }

    /// Bulk insert; same semantics as repeated `register`, but the mirror
    /// only updates after every tree write has succeeded.
    pub fn register_batch(&self, entries: Vec<RegistryEntry>) -> Result<usize> {
        let mut inner = self.inner.lock();
        let mut inserted = 0;
        for entry in entries {
            if register_one(&mut inner, &entry)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Remove `entry`'s identity tuple from all three indices and the
    /// mirror. No-op if absent.
    pub fn deregister(&self, entry: &RegistryEntry) -> Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.mirror.contains(entry) {
            return Ok(false);
        }
        let tsbs_key = keys::encode_tsbs(entry.hlc, &entry.system_id, &entry.branch_name, &entry.snapshot_id)?;
        let sbts_key = keys::encode_sbts(&entry.system_id, &entry.branch_name, entry.hlc, &entry.snapshot_id)?;
        let stbh_key = keys::encode_stbh(&entry.snapshot_id, &entry.system_id, &entry.branch_name, entry.hlc)?;

        let (tsbs_root, _) =
            BTree::new(&mut inner.store).delete(inner.tsbs_root, &tsbs_key).map_err(btree_err)?;
        let (sbts_root, _) =
            BTree::new(&mut inner.store).delete(inner.sbts_root, &sbts_key).map_err(btree_err)?;
        let (stbh_root, _) =
            BTree::new(&mut inner.store).delete(inner.stbh_root, &stbh_key).map_err(btree_err)?;

        inner.tsbs_root = tsbs_root;
        inner.sbts_root = sbts_root;
        inner.stbh_root = stbh_root;
        inner.mirror.remove(entry);
        Ok(true)
    }

    /// For each known `(system, branch)`, the entry with the greatest HLC
    /// `<= hlc`.
    pub fn as_of(&self, hlc: Hlc) -> BTreeMap<(SystemId, BranchName), RegistryEntry> {
        self.inner.lock().mirror.as_of(hlc)
    }

    /// Every entry with `low <= hlc <= high`, HLC-ascending.
    pub fn entries_in_range(&self, low: Hlc, high: Hlc) -> Vec<RegistryEntry> {
        self.inner.lock().mirror.entries_in_range(low, high)
    }

    /// Entries for `(system_id, branch)`, newest HLC first, optionally
    /// bounded to the first `limit`.
    pub fn system_history(&self, system_id: &SystemId, branch: &BranchName, limit: Option<usize>) -> Vec<RegistryEntry> {
        self.inner.lock().mirror.system_history(system_id, branch, limit)
    }

    /// Every branch name ever registered for `system_id`.
    pub fn system_branches(&self, system_id: &SystemId) -> BTreeSet<BranchName> {
        self.inner.lock().mirror.system_branches(system_id)
    }

    /// Every entry referencing `snapshot_id`, across all systems, or
    /// `None` if no system has ever referenced it.
    pub fn snapshot_refs(&self, snapshot_id: &SnapshotId) -> Option<Vec<RegistryEntry>> {
        self.inner.lock().mirror.snapshot_refs(snapshot_id)
    }

    /// The set of systems that have ever referenced `snapshot_id`.
    pub fn snapshot_systems(&self, snapshot_id: &SnapshotId) -> Option<BTreeSet<SystemId>> {
        self.inner.lock().mirror.snapshot_systems(snapshot_id)
    }

    /// Total number of registered entries.
    pub fn entry_count(&self) -> usize {
        self.inner.lock().mirror.len()
    }

    /// Commit the three tree roots together.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let roots: Vec<PageAddr> = [inner.tsbs_root, inner.sbts_root, inner.stbh_root]
            .into_iter()
            .flatten()
            .collect();
        inner.store.flush(&roots).map_err(pagestore_err)?;
        debug!(entries = inner.mirror.len(), "flushed snapshot registry");
        Ok(())
    }

    /// Flush, then release resources.
    pub fn close(self) -> Result<()> {
        self.flush()?;
        Ok(())
    }
}

fn register_one(inner: &mut Inner, entry: &RegistryEntry) -> Result<bool> {
    if inner.mirror.contains(entry) {
        return Ok(false);
    }
    let tsbs_key = keys::encode_tsbs(entry.hlc, &entry.system_id, &entry.branch_name, &entry.snapshot_id)?;
    let sbts_key = keys::encode_sbts(&entry.system_id, &entry.branch_name, entry.hlc, &entry.snapshot_id)?;
    let stbh_key = keys::encode_stbh(&entry.snapshot_id, &entry.system_id, &entry.branch_name, entry.hlc)?;
    let value = EntryValue::from(entry).encode();

    let tsbs_root =
        BTree::new(&mut inner.store).put(inner.tsbs_root, tsbs_key, value.clone()).map_err(btree_err)?;
    let sbts_root =
        BTree::new(&mut inner.store).put(inner.sbts_root, sbts_key, value.clone()).map_err(btree_err)?;
    let stbh_root = BTree::new(&mut inner.store).put(inner.stbh_root, stbh_key, value).map_err(btree_err)?;

    inner.tsbs_root = Some(tsbs_root);
    inner.sbts_root = Some(sbts_root);
    inner.stbh_root = Some(stbh_root);
    inner.mirror.insert(entry.clone());
    Ok(true)
}

/// Scan all three on-disk trees into `mirror` and cross-check I1/I2.
fn rebuild_mirror(inner: &mut Inner, mirror: &mut Mirror) -> Result<()> {
    let tree = BTree::new(&mut inner.store);
    let tsbs_entries = tree.range(inner.tsbs_root, std::ops::Bound::Unbounded, std::ops::Bound::Unbounded).map_err(btree_err)?;
    for (key, value) in tsbs_entries {
        let (hlc, system_id, branch_name, snapshot_id) = keys::decode_tsbs(&key);
        let v = EntryValue::decode(&value)
            .map_err(|e| Error::IntegrityError(format!("corrupt registry value: {e}")))?;
        mirror.insert(RegistryEntry {
            snapshot_id,
            system_id,
            branch_name,
            hlc,
            parent_ids: v.parent_ids,
            message: v.message,
            metadata: v.metadata,
        });
    }
    mirror.check_consistency()?;

    // Cross-check cardinality against the other two trees directly: a
    // mismatch here means the trees themselves disagree, independent of
    // how the mirror was built from TSBS alone.
    let sbts_count = tree
        .range(inner.sbts_root, std::ops::Bound::Unbounded, std::ops::Bound::Unbounded)
        .map_err(btree_err)?
        .len();
    let stbh_count = tree
        .range(inner.stbh_root, std::ops::Bound::Unbounded, std::ops::Bound::Unbounded)
        .map_err(btree_err)?
        .len();
    if sbts_count != mirror.len() || stbh_count != mirror.len() {
        return Err(Error::IntegrityError(format!(
            "registry index cardinality mismatch on reopen: tsbs={} sbts={} stbh={}",
            mirror.len(),
            sbts_count,
            stbh_count
        )));
    }
    Ok(())
}
