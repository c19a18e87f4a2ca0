//! The System capability interface (spec component E).
//!
//! Every external COW store is consumed by the core only through this
//! interface. A system is **value-semantic**: every mutating operation
//! returns a *new* system value and leaves the receiver unchanged; the
//! core stores one `Box<dyn System>` per managed system and replaces it in
//! its slot after every mutation, rather than assuming exclusive ownership
//! of a single long-lived object.
//!
//! Capability traits (`Snapshotable`, `Branchable`, ...) are reached
//! through `System::as_*` accessors rather than inheritance, so a single
//! dynamic adapter type can implement any subset of them; `capabilities()`
//! must agree with which `as_*` accessors return `Some`.

use crate::capabilities::Capabilities;
use crate::error::Result;
use crate::hlc::Hlc;
use crate::ids::{BranchName, SnapshotId, SystemId};
use std::collections::BTreeMap;

/// A managed system value.
///
/// This is the escape-hatch trait object mentioned in the design notes:
/// the core has no compile-time knowledge of concrete adapter types, only
/// of this interface and the optional capability traits reachable from it.
pub trait System: Send + Sync {
    /// The stable identifier for this system instance.
    fn system_id(&self) -> &SystemId;

    /// A human-readable adapter type tag (e.g. `"git"`, `"zfs"`), used only
    /// for diagnostics; the core never branches on its value.
    fn system_type(&self) -> &str;

    /// The capability flags this value declares. Must stay consistent with
    /// which `as_*` accessors return `Some`.
    fn capabilities(&self) -> Capabilities;

    /// Downcast to [`Snapshotable`] if this system implements it.
    fn as_snapshotable(&self) -> Option<&dyn Snapshotable> {
        None
    }

    /// Downcast to [`Branchable`] if this system implements it.
    fn as_branchable(&self) -> Option<&dyn Branchable> {
        None
    }

    /// Downcast to [`Committable`] if this system implements it.
    fn as_committable(&self) -> Option<&dyn Committable> {
        None
    }

    /// Downcast to [`Graphable`] if this system implements it.
    fn as_graphable(&self) -> Option<&dyn Graphable> {
        None
    }

    /// Downcast to [`Mergeable`] if this system implements it.
    fn as_mergeable(&self) -> Option<&dyn Mergeable> {
        None
    }

    /// Downcast to [`Watchable`] if this system implements it.
    fn as_watchable(&self) -> Option<&dyn Watchable> {
        None
    }

    /// Downcast to [`GarbageCollectable`] if this system implements it.
    fn as_garbage_collectable(&self) -> Option<&dyn GarbageCollectable> {
        None
    }

    /// Downcast to [`Closeable`] if this system implements it.
    fn as_closeable(&self) -> Option<&dyn Closeable> {
        None
    }
}

/// Metadata recorded alongside a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// Free-form commit/snapshot message.
    pub message: Option<String>,
    /// Adapter-defined key/value metadata.
    pub metadata: BTreeMap<String, String>,
}

/// Systems whose current and historical state is addressable by snapshot id.
pub trait Snapshotable: System {
    /// The snapshot identifying this value's current state.
    fn snapshot_id(&self) -> SnapshotId;

    /// Direct parents of the current snapshot (empty for a root).
    fn parent_ids(&self) -> Vec<SnapshotId>;

    /// Produce a new system value pinned to a historical snapshot.
    fn as_of(&self, snapshot: &SnapshotId) -> Result<Box<dyn System>>;

    /// Metadata recorded for a given snapshot.
    fn snapshot_meta(&self, snapshot: &SnapshotId) -> Result<SnapshotMeta>;
}

/// Systems that support named branches.
pub trait Branchable: System {
    /// All branch names known to this system.
    fn branches(&self) -> Vec<BranchName>;

    /// The branch this value is currently checked out on.
    fn current_branch(&self) -> BranchName;

    /// Create a new branch, optionally forking from another branch instead
    /// of the current one. Returns a new system value; the branch is not
    /// implicitly checked out.
    fn branch(&self, name: &BranchName, from: Option<&BranchName>) -> Result<Box<dyn System>>;

    /// Delete a branch. Returns a new system value.
    fn delete_branch(&self, name: &BranchName) -> Result<Box<dyn System>>;

    /// Switch the current branch. Returns a new system value.
    fn checkout(&self, name: &BranchName) -> Result<Box<dyn System>>;
}

/// Systems that accept commits, minting a fresh snapshot id each time.
pub trait Committable: System {
    /// Commit the current working state, returning a new system value
    /// whose `snapshot_id` (via [`Snapshotable`]) is freshly minted.
    fn commit(&self, message: Option<&str>) -> Result<Box<dyn System>>;
}

/// One node in a commit history, independent of any particular system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// The snapshot this commit produced.
    pub snapshot_id: SnapshotId,
    /// Direct parents of this commit.
    pub parent_ids: Vec<SnapshotId>,
    /// Commit message, if any.
    pub message: Option<String>,
    /// The HLC this commit was registered under, if known to the caller.
    pub hlc: Option<Hlc>,
}

/// A commit DAG snapshot: nodes, branch heads, and roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitGraph {
    /// Every commit reachable from a branch head.
    pub nodes: Vec<CommitInfo>,
    /// Branch name to the snapshot it currently points at.
    pub branches: Vec<(BranchName, SnapshotId)>,
    /// Commits with no parents.
    pub roots: Vec<SnapshotId>,
}

/// Systems exposing commit history and ancestry queries.
pub trait Graphable: System {
    /// Commits reachable from the current snapshot, newest first.
    fn history(&self) -> Vec<CommitInfo>;

    /// All ancestors of `snapshot`, not including `snapshot` itself.
    fn ancestors(&self, snapshot: &SnapshotId) -> Result<Vec<SnapshotId>>;

    /// Whether `candidate` is an ancestor of (or equal to) `descendant`.
    fn is_ancestor(&self, candidate: &SnapshotId, descendant: &SnapshotId) -> Result<bool>;

    /// The most recent common ancestor of two snapshots, if any.
    fn common_ancestor(&self, a: &SnapshotId, b: &SnapshotId) -> Result<Option<SnapshotId>>;

    /// The full commit graph as currently known to this system.
    fn commit_graph(&self) -> CommitGraph;

    /// Look up commit metadata by snapshot id.
    fn commit_info(&self, snapshot: &SnapshotId) -> Result<CommitInfo>;
}

/// Options influencing a merge; adapters may ignore fields they don't
/// understand.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Message to attach to the resulting merge commit, if the adapter
    /// creates one.
    pub message: Option<String>,
}

/// One line of disagreement surfaced by [`Mergeable::conflicts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Adapter-defined path/key identifying the conflicting unit.
    pub path: String,
    /// Human-readable description of the disagreement.
    pub description: String,
}

/// The kind of change one side of a [`Diff`] entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffChangeKind {
    /// Present only on the `b` side.
    Added,
    /// Present only on the `a` side.
    Removed,
    /// Present on both sides with different content.
    Modified,
}

/// One changed unit between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffChange {
    /// Adapter-defined path/key identifying the changed unit.
    pub path: String,
    /// What kind of change this is.
    pub kind: DiffChangeKind,
}

/// The set of changes between two snapshots of one system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// All changed units, in adapter-defined order.
    pub changes: Vec<DiffChange>,
}

/// Systems supporting merge (pushout) between branches.
pub trait Mergeable: System {
    /// Merge `source_branch` into the current branch. Returns a new system
    /// value; the merged content itself is supplied by the adapter, not
    /// computed by the core (the core only records the pushout).
    fn merge(&self, source_branch: &BranchName, opts: &MergeOptions) -> Result<Box<dyn System>>;

    /// Points of disagreement between two snapshots, if a merge were
    /// attempted between them.
    fn conflicts(&self, a: &SnapshotId, b: &SnapshotId) -> Result<Vec<Conflict>>;

    /// The full diff between two snapshots.
    fn diff(&self, a: &SnapshotId, b: &SnapshotId) -> Result<Diff>;
}

/// What kind of external event a [`WatchEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// A new commit was observed.
    Commit,
    /// A branch was created.
    BranchCreated,
    /// A branch was deleted.
    BranchDeleted,
}

/// One externally observed change, delivered to a watcher callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// What kind of event this is.
    pub kind: WatchEventKind,
    /// The snapshot the event refers to.
    pub snapshot_id: SnapshotId,
    /// The branch the event occurred on.
    pub branch: BranchName,
    /// Adapter-reported timestamp, if available; the core stamps its own
    /// HLC on receipt regardless of this value.
    pub timestamp_ms: Option<i64>,
}

/// An opaque identifier for a live watch subscription, scoped to the
/// system instance that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(pub u64);

/// A synchronous watcher callback. The adapter invokes this directly from
/// whatever thread observes the external change; no async machinery is
/// involved, matching the "coroutine-free watchers" design note.
pub type WatchCallback = Box<dyn Fn(WatchEvent) + Send + Sync>;

/// Systems that can notify the core of externally observed changes.
pub trait Watchable: System {
    /// Register a callback, invoked synchronously for each observed
    /// external event. Delivery order matches the adapter's observation
    /// order; the core neither reorders nor deduplicates events.
    fn watch(&self, callback: WatchCallback) -> WatchId;

    /// Unregister a previously installed callback. A no-op if `id` is
    /// already unregistered.
    fn unwatch(&self, id: WatchId);
}

/// Systems that participate in cross-system garbage collection.
pub trait GarbageCollectable: System {
    /// Snapshots that must be considered live roots (e.g. branch heads,
    /// explicit tags) independent of the registry.
    fn gc_roots(&self) -> Vec<SnapshotId>;

    /// Reclaim native storage for exactly the given snapshots. Returns a
    /// new system value reflecting the sweep.
    fn gc_sweep(&self, snapshots: &[SnapshotId]) -> Result<Box<dyn System>>;
}

/// Systems that hold open resources (a journal, a file handle) needing an
/// explicit flush/release step beyond ordinary drop semantics.
///
/// Reached through `System::as_closeable` so a caller holding only a
/// `Box<dyn System>` — the typical state after a `Committable::commit` —
/// can still durably close the value it's holding.
pub trait Closeable: System {
    /// Flush any buffered state to durable storage and release resources.
    /// Idempotent: closing twice is not an error.
    fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Minimal {
        id: SystemId,
    }

    impl System for Minimal {
        fn system_id(&self) -> &SystemId {
            &self.id
        }
        fn system_type(&self) -> &str {
            "minimal"
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
        }
    }

    #[test]
    fn default_capability_accessors_are_none() {
        let sys: Box<dyn System> = Box::new(Minimal { id: SystemId::new("s") });
        assert!(sys.as_snapshotable().is_none());
        assert!(sys.as_branchable().is_none());
        assert!(sys.as_committable().is_none());
        assert!(sys.as_graphable().is_none());
        assert!(sys.as_mergeable().is_none());
        assert!(sys.as_watchable().is_none());
        assert!(sys.as_garbage_collectable().is_none());
        assert!(sys.as_closeable().is_none());
        assert_eq!(sys.capabilities(), Capabilities::NONE);
    }

    #[test]
    fn system_trait_object_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Box<dyn System>>();
        assert_sync::<Box<dyn System>>();
    }
}
