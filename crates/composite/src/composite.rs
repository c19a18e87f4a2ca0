//! The composite system itself: a fiber-product over a nonempty ordered
//! list of sub-systems, aggregating their protocols per the table in the
//! design notes.

use crate::hashing::composite_snapshot_id;
use crate::journal::{CompositeJournal, JournalEntry};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use yggdrasil_core::{
    Branchable, Capabilities, Closeable, CommitGraph, CommitInfo, Committable, Conflict, Diff,
    DiffChange, Error, GarbageCollectable, Graphable, MergeOptions, Mergeable, Result, Snapshotable,
    SnapshotId, SnapshotMeta, System, BranchName, SystemId,
};
use yggdrasil_pagestore::PageStoreConfig;

/// The branch name assumed for a composite with no branchable sub-systems.
pub const DEFAULT_BRANCH: &str = "main";

/// Which constructor produced a [`CompositeSystem`], governing how the
/// shared logical branch was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    /// Strict: every branchable sub-system must report the same native
    /// current branch.
    Pullback,
    /// Lenient: sub-systems may use distinct native branches; the
    /// composite pins its own shared logical branch.
    Composite { branch: BranchName },
}

/// A fiber-product over an ordered, nonempty list of sub-systems.
pub struct CompositeSystem {
    id: SystemId,
    mode: Mode,
    subs: Vec<Box<dyn System>>,
    journal: Arc<CompositeJournal>,
    capabilities: Capabilities,
}

impl CompositeSystem {
    /// Strict composition: fails with [`Error::FiberCondition`] if the
    /// sub-systems disagree on their current branch.
    pub fn pullback(subs: Vec<Box<dyn System>>, name: Option<String>) -> Result<Self> {
        let branches: Vec<BranchName> =
            subs.iter().filter_map(|s| s.as_branchable().map(|b| b.current_branch())).collect();
        let shared = match branches.split_first() {
            Some((first, rest)) if rest.iter().all(|b| b == first) => first.clone(),
            Some(_) => {
                let joined = branches.iter().map(|b| b.as_str()).collect::<Vec<_>>().join(", ");
                return Err(Error::FiberCondition(joined));
            }
            None => BranchName::new(DEFAULT_BRANCH),
        };
        let name = name.unwrap_or_else(|| {
            format!("pullback:{}", join_ids(&subs, "×"))
        });
        Self::assemble(SystemId::new(name), Mode::Pullback, subs, CompositeJournal::in_memory())
    }

    /// Lenient composition: pins `branch` as the shared logical branch
    /// regardless of what native branch each sub-system is on.
    pub fn composite(
        subs: Vec<Box<dyn System>>,
        name: Option<String>,
        branch: BranchName,
        store_path: Option<&Path>,
    ) -> Result<Self> {
        let name = name.unwrap_or_else(|| format!("composite:{}", join_ids(&subs, "+")));
        let journal = match store_path {
            Some(path) => open_or_create_journal(path, PageStoreConfig::default())?,
            None => CompositeJournal::in_memory(),
        };
        Self::assemble(SystemId::new(name), Mode::Composite { branch }, subs, journal)
    }

    fn assemble(id: SystemId, mode: Mode, subs: Vec<Box<dyn System>>, journal: CompositeJournal) -> Result<Self> {
        if subs.is_empty() {
            return Err(Error::IntegrityError("a composite system requires at least one sub-system".into()));
        }
        let capabilities = subs
            .iter()
            .map(|s| s.capabilities())
            .fold(Capabilities::NONE.with_snapshotable(true).with_branchable(true).with_committable(true)
                .with_graphable(true).with_mergeable(true).with_garbage_collectable(true),
                Capabilities::meet)
            // Watch aggregation across sub-systems isn't implemented; a
            // composite never reports itself watchable even if every
            // sub-system is.
            .with_watchable(false)
            // Intrinsic to the composite itself (flushing its own
            // journal), not an aggregate of sub-system capabilities, so
            // it's set after the meet rather than folded into it.
            .with_closeable(true);

        if capabilities.snapshotable() {
            let pairs: Vec<(SystemId, SnapshotId)> = subs
                .iter()
                .map(|s| (s.system_id().clone(), s.as_snapshotable().expect("gated by capability check above").snapshot_id()))
                .collect();
            let initial_id = composite_snapshot_id(&pairs);
            // Only seed a root entry if the journal doesn't already have
            // one for this id. On reopen at a state that already has
            // commits, `initial_id` coincides with the last commit's own
            // composite snapshot id (the hash depends only on the current
            // sub-pairs); appending an entry here unconditionally would
            // overwrite its real parent chain with `parent: None` and
            // truncate history on reopen.
            if journal.get(&initial_id).is_none() {
                journal.append(JournalEntry { composite_snap_id: initial_id, parent: None, hlc: None, message: None, sub_snapshots: pairs })?;
            }
        }

        Ok(CompositeSystem { id, mode, subs, journal: Arc::new(journal), capabilities })
    }

    /// The `i`-th sub-system, by construction order.
    pub fn get_subsystem(&self, index: usize) -> Option<&dyn System> {
        self.subs.get(index).map(|s| s.as_ref())
    }

    fn sub_pairs(&self) -> Result<Vec<(SystemId, SnapshotId)>> {
        self.subs
            .iter()
            .map(|s| {
                let snap = s
                    .as_snapshotable()
                    .ok_or_else(|| Error::capability(s.system_id(), "snapshotable"))?
                    .snapshot_id();
                Ok((s.system_id().clone(), snap))
            })
            .collect()
    }

    fn require(&self, flag: bool, capability: &'static str) -> Result<()> {
        if flag {
            Ok(())
        } else {
            Err(Error::capability(&self.id, capability))
        }
    }

    fn current_snapshot(&self) -> Result<SnapshotId> {
        Ok(composite_snapshot_id(&self.sub_pairs()?))
    }

    fn fork(&self, subs: Vec<Box<dyn System>>) -> CompositeSystem {
        CompositeSystem {
            id: self.id.clone(),
            mode: self.mode.clone(),
            subs,
            journal: Arc::clone(&self.journal),
            capabilities: self.capabilities,
        }
    }
}

fn join_ids(subs: &[Box<dyn System>], sep: &str) -> String {
    subs.iter().map(|s| s.system_id().as_str()).collect::<Vec<_>>().join(sep)
}

fn open_or_create_journal(path: &Path, config: PageStoreConfig) -> Result<CompositeJournal> {
    if path.join("header.0").exists() {
        CompositeJournal::open(path, config)
    } else {
        CompositeJournal::create(path, config)
    }
}

impl System for CompositeSystem {
    fn system_id(&self) -> &SystemId {
        &self.id
    }

    fn system_type(&self) -> &str {
        "composite"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn as_snapshotable(&self) -> Option<&dyn Snapshotable> {
        self.capabilities.snapshotable().then_some(self as &dyn Snapshotable)
    }

    fn as_branchable(&self) -> Option<&dyn Branchable> {
        self.capabilities.branchable().then_some(self as &dyn Branchable)
    }

    fn as_committable(&self) -> Option<&dyn Committable> {
        self.capabilities.committable().then_some(self as &dyn Committable)
    }

    fn as_graphable(&self) -> Option<&dyn Graphable> {
        self.capabilities.graphable().then_some(self as &dyn Graphable)
    }

    fn as_mergeable(&self) -> Option<&dyn Mergeable> {
        self.capabilities.mergeable().then_some(self as &dyn Mergeable)
    }

    fn as_garbage_collectable(&self) -> Option<&dyn GarbageCollectable> {
        self.capabilities.garbage_collectable().then_some(self as &dyn GarbageCollectable)
    }

    fn as_closeable(&self) -> Option<&dyn Closeable> {
        self.capabilities.closeable().then_some(self as &dyn Closeable)
    }
}

impl Closeable for CompositeSystem {
    /// Flush the composite journal, if it's persisted.
    fn close(&self) -> Result<()> {
        self.journal.flush()
    }
}

impl Snapshotable for CompositeSystem {
    fn snapshot_id(&self) -> SnapshotId {
        self.current_snapshot().unwrap_or_else(|_| SnapshotId::new(""))
    }

    fn parent_ids(&self) -> Vec<SnapshotId> {
        self.current_snapshot()
            .ok()
            .and_then(|id| self.journal.get(&id))
            .and_then(|entry| entry.parent)
            .into_iter()
            .collect()
    }

    fn as_of(&self, snapshot: &SnapshotId) -> Result<Box<dyn System>> {
        let entry = self.journal.get(snapshot).ok_or_else(|| Error::snapshot_not_found(snapshot))?;
        let by_id: std::collections::HashMap<_, _> = entry.sub_snapshots.into_iter().collect();
        let mut new_subs = Vec::with_capacity(self.subs.len());
        for sub in &self.subs {
            let target = by_id.get(sub.system_id()).ok_or_else(|| Error::snapshot_not_found(snapshot))?;
            let pinned = sub.as_snapshotable().ok_or_else(|| Error::capability(sub.system_id(), "snapshotable"))?;
            new_subs.push(pinned.as_of(target)?);
        }
        Ok(Box::new(self.fork(new_subs)))
    }

    fn snapshot_meta(&self, snapshot: &SnapshotId) -> Result<SnapshotMeta> {
        let entry = self.journal.get(snapshot).ok_or_else(|| Error::snapshot_not_found(snapshot))?;
        Ok(SnapshotMeta { message: entry.message, metadata: Default::default() })
    }
}

impl Branchable for CompositeSystem {
    fn branches(&self) -> Vec<BranchName> {
        let mut sets = self.subs.iter().filter_map(|s| s.as_branchable()).map(|b| {
            b.branches().into_iter().collect::<BTreeSet<_>>()
        });
        let Some(first) = sets.next() else { return Vec::new() };
        let intersection = sets.fold(first, |acc, s| acc.intersection(&s).cloned().collect());
        intersection.into_iter().collect()
    }

    fn current_branch(&self) -> BranchName {
        match &self.mode {
            Mode::Composite { branch } => branch.clone(),
            Mode::Pullback => self
                .subs
                .iter()
                .find_map(|s| s.as_branchable())
                .map(|b| b.current_branch())
                .unwrap_or_else(|| BranchName::new(DEFAULT_BRANCH)),
        }
    }

    fn branch(&self, name: &BranchName, from: Option<&BranchName>) -> Result<Box<dyn System>> {
        let mut new_subs = Vec::with_capacity(self.subs.len());
        for sub in &self.subs {
            match sub.as_branchable() {
                Some(b) => new_subs.push(b.branch(name, from)?),
                None => new_subs.push(clone_unbranchable(sub.as_ref())?),
            }
        }
        Ok(Box::new(self.fork(new_subs)))
    }

    fn delete_branch(&self, name: &BranchName) -> Result<Box<dyn System>> {
        let mut new_subs = Vec::with_capacity(self.subs.len());
        for sub in &self.subs {
            match sub.as_branchable() {
                Some(b) => new_subs.push(b.delete_branch(name)?),
                None => new_subs.push(clone_unbranchable(sub.as_ref())?),
            }
        }
        Ok(Box::new(self.fork(new_subs)))
    }

    fn checkout(&self, name: &BranchName) -> Result<Box<dyn System>> {
        let mut new_subs = Vec::with_capacity(self.subs.len());
        for sub in &self.subs {
            match sub.as_branchable() {
                Some(b) => new_subs.push(b.checkout(name)?),
                None => new_subs.push(clone_unbranchable(sub.as_ref())?),
            }
        }
        let mode = match &self.mode {
            Mode::Composite { .. } => Mode::Composite { branch: name.clone() },
            Mode::Pullback => Mode::Pullback,
        };
        Ok(Box::new(CompositeSystem {
            id: self.id.clone(),
            mode,
            subs: new_subs,
            journal: Arc::clone(&self.journal),
            capabilities: self.capabilities,
        }))
    }
}

/// A sub-system with no `Branchable` impl has nothing to fork; adapters
/// without branch support are expected to be side-effect-free to clone
/// through a no-op. Since `System` values aren't `Clone`, we can't produce
/// an equivalent value generically — surfacing this as a capability error
/// is the honest answer.
fn clone_unbranchable(_sub: &dyn System) -> Result<Box<dyn System>> {
    Err(Error::IntegrityError(
        "composite branch operations require every sub-system to be branchable".into(),
    ))
}

impl Committable for CompositeSystem {
    fn commit(&self, message: Option<&str>) -> Result<Box<dyn System>> {
        let parent = self.current_snapshot().ok();
        let mut new_subs = Vec::with_capacity(self.subs.len());
        for sub in &self.subs {
            let committable = sub.as_committable().ok_or_else(|| Error::capability(sub.system_id(), "committable"))?;
            new_subs.push(committable.commit(message)?);
        }
        let sub_pairs: Vec<(SystemId, SnapshotId)> = new_subs
            .iter()
            .map(|s| {
                let snap = s.as_snapshotable().expect("just committed, must remain snapshotable").snapshot_id();
                (s.system_id().clone(), snap)
            })
            .collect();
        let composite_snap_id = composite_snapshot_id(&sub_pairs);
        self.journal.append(JournalEntry {
            composite_snap_id,
            parent,
            hlc: None,
            message: message.map(String::from),
            sub_snapshots: sub_pairs,
        })?;
        Ok(Box::new(self.fork(new_subs)))
    }
}

impl Graphable for CompositeSystem {
    fn history(&self) -> Vec<CommitInfo> {
        let Ok(current) = self.current_snapshot() else { return Vec::new() };
        self.journal
            .history_from(&current)
            .into_iter()
            .map(|e| CommitInfo {
                snapshot_id: e.composite_snap_id,
                parent_ids: e.parent.into_iter().collect(),
                message: e.message,
                hlc: e.hlc,
            })
            .collect()
    }

    fn ancestors(&self, snapshot: &SnapshotId) -> Result<Vec<SnapshotId>> {
        let entries = self.journal.history_from(snapshot);
        Ok(entries.into_iter().skip(1).map(|e| e.composite_snap_id).collect())
    }

    fn is_ancestor(&self, candidate: &SnapshotId, descendant: &SnapshotId) -> Result<bool> {
        if candidate == descendant {
            return Ok(true);
        }
        Ok(self.ancestors(descendant)?.contains(candidate))
    }

    fn common_ancestor(&self, a: &SnapshotId, b: &SnapshotId) -> Result<Option<SnapshotId>> {
        let mut a_chain: Vec<SnapshotId> = self.journal.history_from(a).into_iter().map(|e| e.composite_snap_id).collect();
        if a_chain.is_empty() {
            a_chain.push(a.clone());
        }
        let b_chain: HashSet<SnapshotId> = self.journal.history_from(b).into_iter().map(|e| e.composite_snap_id).collect();
        Ok(a_chain.into_iter().find(|s| b_chain.contains(s)))
    }

    fn commit_graph(&self) -> CommitGraph {
        let entries = self.journal.all();
        let nodes: Vec<CommitInfo> = entries
            .iter()
            .map(|e| CommitInfo {
                snapshot_id: e.composite_snap_id.clone(),
                parent_ids: e.parent.clone().into_iter().collect(),
                message: e.message.clone(),
                hlc: e.hlc,
            })
            .collect();
        let roots = nodes.iter().filter(|n| n.parent_ids.is_empty()).map(|n| n.snapshot_id.clone()).collect();
        let branches = self.current_snapshot().ok().map(|s| vec![(self.current_branch(), s)]).unwrap_or_default();
        CommitGraph { nodes, branches, roots }
    }

    fn commit_info(&self, snapshot: &SnapshotId) -> Result<CommitInfo> {
        let entry = self.journal.get(snapshot).ok_or_else(|| Error::snapshot_not_found(snapshot))?;
        Ok(CommitInfo {
            snapshot_id: entry.composite_snap_id,
            parent_ids: entry.parent.into_iter().collect(),
            message: entry.message,
            hlc: entry.hlc,
        })
    }
}

impl Mergeable for CompositeSystem {
    fn merge(&self, source_branch: &BranchName, opts: &MergeOptions) -> Result<Box<dyn System>> {
        let parent = self.current_snapshot().ok();
        let mut new_subs = Vec::with_capacity(self.subs.len());
        for sub in &self.subs {
            let mergeable = sub.as_mergeable().ok_or_else(|| Error::capability(sub.system_id(), "mergeable"))?;
            new_subs.push(mergeable.merge(source_branch, opts)?);
        }
        let sub_pairs: Vec<(SystemId, SnapshotId)> = new_subs
            .iter()
            .map(|s| (s.system_id().clone(), s.as_snapshotable().expect("post-merge value stays snapshotable").snapshot_id()))
            .collect();
        let composite_snap_id = composite_snapshot_id(&sub_pairs);
        self.journal.append(JournalEntry {
            composite_snap_id,
            parent,
            hlc: None,
            message: opts.message.clone(),
            sub_snapshots: sub_pairs,
        })?;
        Ok(Box::new(self.fork(new_subs)))
    }

    fn conflicts(&self, a: &SnapshotId, b: &SnapshotId) -> Result<Vec<Conflict>> {
        let entry_a = self.journal.get(a).ok_or_else(|| Error::snapshot_not_found(a))?;
        let entry_b = self.journal.get(b).ok_or_else(|| Error::snapshot_not_found(b))?;
        let a_by_sys: std::collections::HashMap<_, _> = entry_a.sub_snapshots.into_iter().collect();
        let mut conflicts = Vec::new();
        for (system_id, snap_b) in entry_b.sub_snapshots {
            let Some(snap_a) = a_by_sys.get(&system_id) else { continue };
            let Some(sub) = self.subs.iter().find(|s| s.system_id() == &system_id) else { continue };
            if let Some(mergeable) = sub.as_mergeable() {
                conflicts.extend(mergeable.conflicts(snap_a, &snap_b)?);
            }
        }
        Ok(conflicts)
    }

    fn diff(&self, a: &SnapshotId, b: &SnapshotId) -> Result<Diff> {
        let entry_a = self.journal.get(a).ok_or_else(|| Error::snapshot_not_found(a))?;
        let entry_b = self.journal.get(b).ok_or_else(|| Error::snapshot_not_found(b))?;
        let a_by_sys: std::collections::HashMap<_, _> = entry_a.sub_snapshots.into_iter().collect();
        let mut changes: Vec<DiffChange> = Vec::new();
        for (system_id, snap_b) in entry_b.sub_snapshots {
            let Some(snap_a) = a_by_sys.get(&system_id) else { continue };
            let Some(sub) = self.subs.iter().find(|s| s.system_id() == &system_id) else { continue };
            if let Some(mergeable) = sub.as_mergeable() {
                changes.extend(mergeable.diff(snap_a, &snap_b)?.changes);
            }
        }
        Ok(Diff { changes })
    }
}

impl GarbageCollectable for CompositeSystem {
    fn gc_roots(&self) -> Vec<SnapshotId> {
        self.subs
            .iter()
            .filter_map(|s| s.as_garbage_collectable())
            .flat_map(|g| g.gc_roots())
            .collect()
    }

    fn gc_sweep(&self, snapshots: &[SnapshotId]) -> Result<Box<dyn System>> {
        self.require(self.capabilities.garbage_collectable(), "garbage_collectable")?;
        // Composite snapshot ids aren't native sub ids; sweeping a
        // composite directly isn't supported. GC operates per managed
        // sub-system instead (see `yggdrasil-gc`).
        let _ = snapshots;
        Err(Error::IntegrityError(
            "composite systems are not swept directly; manage their sub-systems individually for GC".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yggdrasil_testkit::MockSystem;

    #[test]
    fn pullback_requires_matching_branches() {
        let a = Box::new(MockSystem::new("git", "main", "g0"));
        let b = Box::new(MockSystem::new("zfs", "dev", "z0"));
        let err = CompositeSystem::pullback(vec![a, b], None).unwrap_err();
        assert!(matches!(err, Error::FiberCondition(_)));
    }

    #[test]
    fn pullback_succeeds_when_branches_agree() {
        let a = Box::new(MockSystem::new("git", "main", "g0"));
        let b = Box::new(MockSystem::new("zfs", "main", "z0"));
        let composite = CompositeSystem::pullback(vec![a, b], None).unwrap();
        assert_eq!(composite.current_branch(), BranchName::new("main"));
    }

    #[test]
    fn commit_assembles_a_new_composite_snapshot_and_records_it() {
        let a = Box::new(MockSystem::new("git", "main", "g0"));
        let b = Box::new(MockSystem::new("zfs", "main", "z0"));
        let composite = CompositeSystem::pullback(vec![a, b], None).unwrap();
        let parent_snapshot = composite.snapshot_id();

        let next = composite.commit(Some("joint commit")).unwrap();
        let next_snapshot = next.as_snapshotable().unwrap().snapshot_id();
        assert_ne!(parent_snapshot, next_snapshot);

        let history = next.as_graphable().unwrap().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].snapshot_id, next_snapshot);
        assert_eq!(history[0].parent_ids, vec![parent_snapshot]);
    }

    #[test]
    fn composite_mode_uses_its_own_pinned_branch_even_when_subs_differ() {
        let a = Box::new(MockSystem::new("git", "main", "g0"));
        let b = Box::new(MockSystem::new("zfs", "dev", "z0"));
        let composite =
            CompositeSystem::composite(vec![a, b], None, BranchName::new("logical"), None).unwrap();
        assert_eq!(composite.current_branch(), BranchName::new("logical"));
    }

    #[test]
    fn capabilities_are_the_meet_of_sub_systems() {
        let a = Box::new(MockSystem::new("git", "main", "g0"));
        let b = Box::new(MockSystem::new("zfs", "main", "z0"));
        let composite = CompositeSystem::pullback(vec![a, b], None).unwrap();
        assert!(composite.capabilities().committable());
        assert!(!composite.capabilities().watchable(), "composite never aggregates watch");
    }
}
