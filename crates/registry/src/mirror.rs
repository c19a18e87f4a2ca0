//! The in-memory mirror: three `BTreeMap`s kept in lockstep with the
//! on-disk trees, serving every read without disk I/O.

use crate::keys::{SbtsMirrorKey, StbhMirrorKey, TsbsMirrorKey};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use yggdrasil_core::{BranchName, Error, Hlc, RegistryEntry, SnapshotId, SystemId};

/// In-memory reflection of the registry's three indices.
#[derive(Default)]
pub struct Mirror {
    tsbs: BTreeMap<TsbsMirrorKey, RegistryEntry>,
    sbts: BTreeMap<SbtsMirrorKey, RegistryEntry>,
    stbh: BTreeMap<StbhMirrorKey, RegistryEntry>,
}

impl Mirror {
    pub fn new() -> Self {
        Mirror::default()
    }

    pub fn len(&self) -> usize {
        self.tsbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tsbs.is_empty()
    }

    pub fn contains(&self, entry: &RegistryEntry) -> bool {
        self.tsbs.contains_key(&tsbs_key(entry))
    }

    /// Insert `entry` into all three maps. Callers are responsible for the
    /// idempotency check against `contains` beforehand.
    pub fn insert(&mut self, entry: RegistryEntry) {
        self.tsbs.insert(tsbs_key(&entry), entry.clone());
        self.sbts.insert(sbts_key(&entry), entry.clone());
        self.stbh.insert(stbh_key(&entry), entry);
    }

    /// Remove the entry with this exact identity tuple, if present.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, entry: &RegistryEntry) -> bool {
        let removed = self.tsbs.remove(&tsbs_key(entry)).is_some();
        self.sbts.remove(&sbts_key(entry));
        self.stbh.remove(&stbh_key(entry));
        removed
    }

    /// Verify invariant I1/I2: all three maps hold the same entry set.
    pub fn check_consistency(&self) -> Result<(), Error> {
        if self.tsbs.len() != self.sbts.len() || self.tsbs.len() != self.stbh.len() {
            return Err(Error::IntegrityError(format!(
                "registry index cardinality mismatch: tsbs={} sbts={} stbh={}",
                self.tsbs.len(),
                self.sbts.len(),
                self.stbh.len()
            )));
        }
        for entry in self.tsbs.values() {
            if !self.sbts.contains_key(&sbts_key(entry)) || !self.stbh.contains_key(&stbh_key(entry)) {
                return Err(Error::IntegrityError(format!(
                    "entry for snapshot {} missing from a sibling index",
                    entry.snapshot_id
                )));
            }
        }
        Ok(())
    }

    /// For each `(system, branch)` pair with at least one entry at or
    /// before `hlc`, the entry with the greatest such HLC.
    ///
    /// Walks the TSBS map in ascending HLC order so later entries for the
    /// same slot naturally overwrite earlier ones; stops as soon as HLCs
    /// exceed `hlc`.
    pub fn as_of(&self, hlc: Hlc) -> BTreeMap<(SystemId, BranchName), RegistryEntry> {
        let mut out: BTreeMap<(SystemId, BranchName), RegistryEntry> = BTreeMap::new();
        for (key, entry) in self.tsbs.iter() {
            if key.hlc > hlc {
                break;
            }
            out.insert((entry.system_id.clone(), entry.branch_name.clone()), entry.clone());
        }
        out
    }

    pub fn entries_in_range(&self, low: Hlc, high: Hlc) -> Vec<RegistryEntry> {
        self.tsbs
            .iter()
            .filter(|(k, _)| k.hlc >= low && k.hlc <= high)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn system_history(&self, system_id: &SystemId, branch: &BranchName, limit: Option<usize>) -> Vec<RegistryEntry> {
        let iter = self
            .sbts
            .iter()
            .filter(|(k, _)| &k.system_id == system_id && &k.branch == branch)
            .map(|(_, v)| v.clone());
        match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    pub fn system_branches(&self, system_id: &SystemId) -> BTreeSet<BranchName> {
        self.sbts
            .keys()
            .filter(|k| &k.system_id == system_id)
            .map(|k| k.branch.clone())
            .collect()
    }

    pub fn snapshot_refs(&self, snapshot_id: &SnapshotId) -> Option<Vec<RegistryEntry>> {
        let entries: Vec<RegistryEntry> = self
            .stbh
            .iter()
            .filter(|(k, _)| &k.snapshot_id == snapshot_id)
            .map(|(_, v)| v.clone())
            .collect();
        if entries.is_empty() {
            None
        } else {
            Some(entries)
        }
    }

    pub fn snapshot_systems(&self, snapshot_id: &SnapshotId) -> Option<BTreeSet<SystemId>> {
        self.snapshot_refs(snapshot_id)
            .map(|entries| entries.into_iter().map(|e| e.system_id).collect())
    }

    /// Every entry, in TSBS (temporal ascending) order.
    pub fn all(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.tsbs.values()
    }
}

fn tsbs_key(entry: &RegistryEntry) -> TsbsMirrorKey {
    TsbsMirrorKey {
        hlc: entry.hlc,
        system_id: entry.system_id.clone(),
        branch: entry.branch_name.clone(),
        snapshot_id: entry.snapshot_id.clone(),
    }
}

fn sbts_key(entry: &RegistryEntry) -> SbtsMirrorKey {
    SbtsMirrorKey {
        system_id: entry.system_id.clone(),
        branch: entry.branch_name.clone(),
        hlc_desc: Reverse(entry.hlc),
        snapshot_id: entry.snapshot_id.clone(),
    }
}

fn stbh_key(entry: &RegistryEntry) -> StbhMirrorKey {
    StbhMirrorKey {
        snapshot_id: entry.snapshot_id.clone(),
        system_id: entry.system_id.clone(),
        branch: entry.branch_name.clone(),
        hlc: entry.hlc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sys: &str, branch: &str, snap: &str, hlc: Hlc) -> RegistryEntry {
        RegistryEntry::new(SnapshotId::new(snap), SystemId::new(sys), BranchName::new(branch), hlc)
    }

    #[test]
    fn as_of_picks_the_latest_entry_per_system_branch_at_or_before_hlc() {
        let mut mirror = Mirror::new();
        mirror.insert(entry("git", "main", "s1", Hlc::new(1000, 0)));
        mirror.insert(entry("git", "main", "s2", Hlc::new(2000, 0)));
        mirror.insert(entry("zfs", "main", "a", Hlc::new(1500, 0)));
        mirror.insert(entry("zfs", "main", "b", Hlc::new(2500, 0)));

        let snapshot = mirror.as_of(Hlc::new(1500, 0));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&(SystemId::new("git"), BranchName::new("main"))].snapshot_id, SnapshotId::new("s1"));
        assert_eq!(snapshot[&(SystemId::new("zfs"), BranchName::new("main"))].snapshot_id, SnapshotId::new("a"));
    }

    #[test]
    fn system_history_is_newest_first() {
        let mut mirror = Mirror::new();
        for i in 1..=10u32 {
            mirror.insert(entry("sys", "main", &format!("snap-{i}"), Hlc::new(i as i64 * 1000, 0)));
        }
        let history = mirror.system_history(&SystemId::new("sys"), &BranchName::new("main"), Some(3));
        let ids: Vec<String> = history.iter().map(|e| e.snapshot_id.to_string()).collect();
        assert_eq!(ids, vec!["snap-10", "snap-9", "snap-8"]);
    }

    #[test]
    fn snapshot_refs_collects_across_systems() {
        let mut mirror = Mirror::new();
        mirror.insert(entry("git", "r1", "snap-1", Hlc::new(100, 0)));
        mirror.insert(entry("btrfs", "v1", "snap-1", Hlc::new(200, 0)));
        let refs = mirror.snapshot_refs(&SnapshotId::new("snap-1")).unwrap();
        assert_eq!(refs.len(), 2);
        let systems = mirror.snapshot_systems(&SnapshotId::new("snap-1")).unwrap();
        assert_eq!(systems, BTreeSet::from([SystemId::new("git"), SystemId::new("btrfs")]));
    }

    #[test]
    fn remove_drops_from_all_three_maps() {
        let mut mirror = Mirror::new();
        let e = entry("git", "main", "s1", Hlc::new(100, 0));
        mirror.insert(e.clone());
        assert!(mirror.remove(&e));
        assert!(mirror.is_empty());
        mirror.check_consistency().unwrap();
    }
}
