//! # Yggdrasil
//!
//! A cross-system version-control coordinator: it composes multiple
//! heterogeneous copy-on-write stores — a content-addressed repository, a
//! columnar table format, a snapshotting filesystem, a datalog database,
//! anything that can satisfy the [`System`] capability interfaces — into a
//! single logical versioned workspace with coherent snapshot identity,
//! branching, history, merge, and garbage collection.
//!
//! # Quick start
//!
//! ```no_run
//! use yggdrasil::{WorkspaceConfig, WorkspaceCoordinator};
//!
//! fn main() -> yggdrasil::Result<()> {
//!     let workspace = WorkspaceCoordinator::create("./workspace-data", WorkspaceConfig::default())?;
//!     // workspace.manage(Box::new(my_adapter))?;
//!     Ok(())
//! }
//! ```
//!
//! # Components
//!
//! | Crate | Responsibility |
//! |---|---|
//! | [`yggdrasil_core`] | value types, HLC, the `System` capability interfaces, unified errors |
//! | [`yggdrasil_pagestore`] | append-mostly page file with a free-list and alternating-header recovery |
//! | [`yggdrasil_btree`] | persistent ordered map over the page store |
//! | [`yggdrasil_registry`] | three B-tree-backed temporal indices over registry entries |
//! | [`yggdrasil_workspace`] | managed systems, coordinated commits, watchers |
//! | [`yggdrasil_composite`] | fiber-product systems over sub-systems |
//! | [`yggdrasil_gc`] | reachability-based candidate selection and sweep dispatch |
//!
//! Adapters to concrete stores, CLI surfaces, configuration loading, and
//! automatic content merge are outside this crate's scope; it consumes
//! external systems purely through the [`System`] capability interfaces.

pub use yggdrasil_core::{
    BranchName, Branchable, Capabilities, Closeable, CommitGraph, CommitInfo, Committable,
    Conflict, Diff, DiffChange, DiffChangeKind, Error, GarbageCollectable, Graphable, Hlc,
    HlcClock, MergeOptions, Mergeable, RegistryEntry, Result, Snapshotable, SnapshotId,
    SnapshotMeta, System, SystemId, WatchCallback, WatchEvent, WatchEventKind, WatchId, Watchable,
};

pub use yggdrasil_pagestore::{PageAddr, PageStore, PageStoreConfig};

pub use yggdrasil_btree::BTree;

pub use yggdrasil_registry::SnapshotRegistry;

pub use yggdrasil_workspace::{
    CommitFn, CoordinatedCommitResult, WorkspaceConfig, WorkspaceCoordinator, DEFAULT_BRANCH,
};

pub use yggdrasil_composite::{CompositeJournal, CompositeSystem, JournalEntry};

pub use yggdrasil_gc::{GarbageCollector, GcConfig, GcReport};
