//! In-memory `System` implementations used by integration tests across the
//! workspace, composite, and gc crates. Not part of the production
//! dependency graph of any crate other than as a `dev-dependency`.

#![warn(missing_docs)]

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use yggdrasil_core::{
    Branchable, CommitGraph, CommitInfo, Committable, Conflict, Capabilities, Diff, DiffChange,
    DiffChangeKind, Error, GarbageCollectable, Graphable, MergeOptions, Mergeable, Result,
    Snapshotable, SnapshotMeta, SnapshotId, System, BranchName, SystemId, WatchCallback,
    WatchEvent, WatchEventKind, WatchId, Watchable,
};

#[derive(Debug, Clone)]
struct CommitRecord {
    parents: Vec<SnapshotId>,
    message: Option<String>,
    metadata: BTreeMap<String, String>,
}

struct SharedState {
    commits: HashMap<SnapshotId, CommitRecord>,
    branches: HashMap<BranchName, SnapshotId>,
    watchers: HashMap<WatchId, WatchCallback>,
    next_watch_id: u64,
    next_snapshot_seq: u64,
}

/// A fully in-memory mock adapter implementing every capability trait.
///
/// Mimics a value-semantic COW system: every mutation returns a new
/// `MockSystem` sharing the same underlying commit history via `Arc`, so
/// tests can clone a value, commit on the clone, and still see the shared
/// history grow for both.
pub struct MockSystem {
    id: SystemId,
    current_branch: BranchName,
    current_snapshot: SnapshotId,
    state: Arc<Mutex<SharedState>>,
}

impl MockSystem {
    /// Construct a fresh mock system with a single root commit.
    pub fn new(system_id: &str, branch: &str, snapshot_id: &str) -> Self {
        let snapshot = SnapshotId::new(snapshot_id);
        let branch_name = BranchName::new(branch);
        let mut commits = HashMap::new();
        commits.insert(
            snapshot.clone(),
            CommitRecord { parents: Vec::new(), message: None, metadata: BTreeMap::new() },
        );
        let mut branches = HashMap::new();
        branches.insert(branch_name.clone(), snapshot.clone());

        MockSystem {
            id: SystemId::new(system_id),
            current_branch: branch_name,
            current_snapshot: snapshot,
            state: Arc::new(Mutex::new(SharedState {
                commits,
                branches,
                watchers: HashMap::new(),
                next_watch_id: 0,
                next_snapshot_seq: 1,
            })),
        }
    }

    /// Test helper: produce the value that would result from committing
    /// `snapshot_id` on the current branch, with an explicit id rather than
    /// the auto-generated one `commit()` would mint.
    pub fn committed(&self, snapshot_id: &str) -> MockSystem {
        let snapshot = SnapshotId::new(snapshot_id);
        {
            let mut state = self.state.lock();
            state.commits.insert(
                snapshot.clone(),
                CommitRecord {
                    parents: vec![self.current_snapshot.clone()],
                    message: None,
                    metadata: BTreeMap::new(),
                },
            );
            state.branches.insert(self.current_branch.clone(), snapshot.clone());
        }
        self.notify(WatchEventKind::Commit, snapshot.clone(), self.current_branch.clone());
        MockSystem {
            id: self.id.clone(),
            current_branch: self.current_branch.clone(),
            current_snapshot: snapshot,
            state: Arc::clone(&self.state),
        }
    }

    fn notify(&self, kind: WatchEventKind, snapshot_id: SnapshotId, branch: BranchName) {
        let state = self.state.lock();
        for callback in state.watchers.values() {
            callback(WatchEvent { kind, snapshot_id: snapshot_id.clone(), branch: branch.clone(), timestamp_ms: None });
        }
    }

    fn fork(&self, branch: BranchName, snapshot: SnapshotId) -> MockSystem {
        MockSystem {
            id: self.id.clone(),
            current_branch: branch,
            current_snapshot: snapshot,
            state: Arc::clone(&self.state),
        }
    }
}

impl System for MockSystem {
    fn system_id(&self) -> &SystemId {
        &self.id
    }

    fn system_type(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
            .with_snapshotable(true)
            .with_branchable(true)
            .with_committable(true)
            .with_graphable(true)
            .with_mergeable(true)
            .with_watchable(true)
            .with_garbage_collectable(true)
    }

    fn as_snapshotable(&self) -> Option<&dyn Snapshotable> {
        Some(self)
    }

    fn as_branchable(&self) -> Option<&dyn Branchable> {
        Some(self)
    }

    fn as_committable(&self) -> Option<&dyn Committable> {
        Some(self)
    }

    fn as_graphable(&self) -> Option<&dyn Graphable> {
        Some(self)
    }

    fn as_mergeable(&self) -> Option<&dyn Mergeable> {
        Some(self)
    }

    fn as_watchable(&self) -> Option<&dyn Watchable> {
        Some(self)
    }

    fn as_garbage_collectable(&self) -> Option<&dyn GarbageCollectable> {
        Some(self)
    }
}

impl Snapshotable for MockSystem {
    fn snapshot_id(&self) -> SnapshotId {
        self.current_snapshot.clone()
    }

    fn parent_ids(&self) -> Vec<SnapshotId> {
        let state = self.state.lock();
        state.commits.get(&self.current_snapshot).map(|c| c.parents.clone()).unwrap_or_default()
    }

    fn as_of(&self, snapshot: &SnapshotId) -> Result<Box<dyn System>> {
        let state = self.state.lock();
        if !state.commits.contains_key(snapshot) {
            return Err(Error::snapshot_not_found(snapshot));
        }
        drop(state);
        Ok(Box::new(self.fork(self.current_branch.clone(), snapshot.clone())))
    }

    fn snapshot_meta(&self, snapshot: &SnapshotId) -> Result<SnapshotMeta> {
        let state = self.state.lock();
        let record = state.commits.get(snapshot).ok_or_else(|| Error::snapshot_not_found(snapshot))?;
        Ok(SnapshotMeta { message: record.message.clone(), metadata: record.metadata.clone() })
    }
}

impl Branchable for MockSystem {
    fn branches(&self) -> Vec<BranchName> {
        self.state.lock().branches.keys().cloned().collect()
    }

    fn current_branch(&self) -> BranchName {
        self.current_branch.clone()
    }

    fn branch(&self, name: &BranchName, from: Option<&BranchName>) -> Result<Box<dyn System>> {
        let mut state = self.state.lock();
        let source_branch = from.unwrap_or(&self.current_branch);
        let head = state
            .branches
            .get(source_branch)
            .cloned()
            .ok_or_else(|| Error::branch_not_found(&self.id, source_branch))?;
        state.branches.insert(name.clone(), head);
        drop(state);
        Ok(Box::new(self.fork(self.current_branch.clone(), self.current_snapshot.clone())))
    }

    fn delete_branch(&self, name: &BranchName) -> Result<Box<dyn System>> {
        let mut state = self.state.lock();
        if state.branches.remove(name).is_none() {
            return Err(Error::branch_not_found(&self.id, name));
        }
        drop(state);
        Ok(Box::new(self.fork(self.current_branch.clone(), self.current_snapshot.clone())))
    }

    fn checkout(&self, name: &BranchName) -> Result<Box<dyn System>> {
        let head = {
            let state = self.state.lock();
            state.branches.get(name).cloned().ok_or_else(|| Error::branch_not_found(&self.id, name))?
        };
        Ok(Box::new(self.fork(name.clone(), head)))
    }
}

impl Committable for MockSystem {
    fn commit(&self, message: Option<&str>) -> Result<Box<dyn System>> {
        let snapshot = {
            let mut state = self.state.lock();
            let seq = state.next_snapshot_seq;
            state.next_snapshot_seq += 1;
            let snapshot = SnapshotId::new(format!("{}-{seq}", self.id));
            state.commits.insert(
                snapshot.clone(),
                CommitRecord {
                    parents: vec![self.current_snapshot.clone()],
                    message: message.map(String::from),
                    metadata: BTreeMap::new(),
                },
            );
            state.branches.insert(self.current_branch.clone(), snapshot.clone());
            snapshot
        };
        self.notify(WatchEventKind::Commit, snapshot.clone(), self.current_branch.clone());
        Ok(Box::new(self.fork(self.current_branch.clone(), snapshot)))
    }
}

impl Graphable for MockSystem {
    fn history(&self) -> Vec<CommitInfo> {
        let state = self.state.lock();
        let mut nodes = Vec::new();
        let mut cursor = Some(self.current_snapshot.clone());
        while let Some(snap) = cursor {
            let Some(record) = state.commits.get(&snap) else { break };
            nodes.push(CommitInfo {
                snapshot_id: snap.clone(),
                parent_ids: record.parents.clone(),
                message: record.message.clone(),
                hlc: None,
            });
            cursor = record.parents.first().cloned();
        }
        nodes
    }

    fn ancestors(&self, snapshot: &SnapshotId) -> Result<Vec<SnapshotId>> {
        let state = self.state.lock();
        if !state.commits.contains_key(snapshot) {
            return Err(Error::snapshot_not_found(snapshot));
        }
        let mut out = Vec::new();
        let mut cursor = state.commits.get(snapshot).and_then(|r| r.parents.first().cloned());
        while let Some(snap) = cursor {
            out.push(snap.clone());
            cursor = state.commits.get(&snap).and_then(|r| r.parents.first().cloned());
        }
        Ok(out)
    }

    fn is_ancestor(&self, candidate: &SnapshotId, descendant: &SnapshotId) -> Result<bool> {
        if candidate == descendant {
            return Ok(true);
        }
        Ok(self.ancestors(descendant)?.contains(candidate))
    }

    fn common_ancestor(&self, a: &SnapshotId, b: &SnapshotId) -> Result<Option<SnapshotId>> {
        let mut a_chain = self.ancestors(a)?;
        a_chain.insert(0, a.clone());
        let mut b_chain = self.ancestors(b)?;
        b_chain.insert(0, b.clone());
        let b_set: std::collections::HashSet<_> = b_chain.into_iter().collect();
        Ok(a_chain.into_iter().find(|s| b_set.contains(s)))
    }

    fn commit_graph(&self) -> CommitGraph {
        let state = self.state.lock();
        let nodes: Vec<CommitInfo> = state
            .commits
            .iter()
            .map(|(snap, record)| CommitInfo {
                snapshot_id: snap.clone(),
                parent_ids: record.parents.clone(),
                message: record.message.clone(),
                hlc: None,
            })
            .collect();
        let roots = nodes.iter().filter(|n| n.parent_ids.is_empty()).map(|n| n.snapshot_id.clone()).collect();
        let branches = state.branches.iter().map(|(b, s)| (b.clone(), s.clone())).collect();
        CommitGraph { nodes, branches, roots }
    }

    fn commit_info(&self, snapshot: &SnapshotId) -> Result<CommitInfo> {
        let state = self.state.lock();
        let record = state.commits.get(snapshot).ok_or_else(|| Error::snapshot_not_found(snapshot))?;
        Ok(CommitInfo {
            snapshot_id: snapshot.clone(),
            parent_ids: record.parents.clone(),
            message: record.message.clone(),
            hlc: None,
        })
    }
}

impl Mergeable for MockSystem {
    fn merge(&self, source_branch: &BranchName, opts: &MergeOptions) -> Result<Box<dyn System>> {
        let source_head = {
            let state = self.state.lock();
            state
                .branches
                .get(source_branch)
                .cloned()
                .ok_or_else(|| Error::branch_not_found(&self.id, source_branch))?
        };
        let snapshot = {
            let mut state = self.state.lock();
            let seq = state.next_snapshot_seq;
            state.next_snapshot_seq += 1;
            let snapshot = SnapshotId::new(format!("{}-merge-{seq}", self.id));
            state.commits.insert(
                snapshot.clone(),
                CommitRecord {
                    parents: vec![self.current_snapshot.clone(), source_head],
                    message: opts.message.clone(),
                    metadata: BTreeMap::new(),
                },
            );
            state.branches.insert(self.current_branch.clone(), snapshot.clone());
            snapshot
        };
        Ok(Box::new(self.fork(self.current_branch.clone(), snapshot)))
    }

    fn conflicts(&self, _a: &SnapshotId, _b: &SnapshotId) -> Result<Vec<Conflict>> {
        Ok(Vec::new())
    }

    fn diff(&self, a: &SnapshotId, b: &SnapshotId) -> Result<Diff> {
        if a == b {
            return Ok(Diff::default());
        }
        Ok(Diff {
            changes: vec![DiffChange { path: format!("{a}..{b}"), kind: DiffChangeKind::Modified }],
        })
    }
}

impl Watchable for MockSystem {
    fn watch(&self, callback: WatchCallback) -> WatchId {
        let mut state = self.state.lock();
        let id = WatchId(state.next_watch_id);
        state.next_watch_id += 1;
        state.watchers.insert(id, callback);
        id
    }

    fn unwatch(&self, id: WatchId) {
        self.state.lock().watchers.remove(&id);
    }
}

impl GarbageCollectable for MockSystem {
    fn gc_roots(&self) -> Vec<SnapshotId> {
        self.state.lock().branches.values().cloned().collect()
    }

    fn gc_sweep(&self, snapshots: &[SnapshotId]) -> Result<Box<dyn System>> {
        let mut state = self.state.lock();
        for snap in snapshots {
            state.commits.remove(snap);
        }
        drop(state);
        Ok(Box::new(self.fork(self.current_branch.clone(), self.current_snapshot.clone())))
    }
}

/// Process-wide counter for minting distinct mock system ids in tests that
/// spin up many instances.
static NEXT_MOCK_ID: AtomicU64 = AtomicU64::new(0);

/// Mint a unique suffix for disambiguating mock system ids within a test.
pub fn next_mock_id() -> u64 {
    NEXT_MOCK_ID.fetch_add(1, Ordering::Relaxed)
}
