//! Core types shared across the Yggdrasil workspace substrate.
//!
//! This crate defines the foundational, dependency-free layer everything
//! else builds on:
//! - [`hlc`]: the hybrid logical clock and its process-local source
//! - [`ids`]: opaque `SnapshotId`/`SystemId`/`BranchName` newtypes
//! - [`capabilities`]: the `Capabilities` bitfield a system declares
//! - [`system`]: the System capability interface (spec component E)
//! - [`entry`]: the registry entry record
//! - [`error`]: the unified error taxonomy

#![warn(missing_docs)]

pub mod capabilities;
pub mod entry;
pub mod error;
pub mod hlc;
pub mod ids;
pub mod system;

pub use capabilities::Capabilities;
pub use entry::RegistryEntry;
pub use error::{Error, Result};
pub use hlc::{Hlc, HlcClock};
pub use ids::{BranchName, SnapshotId, SystemId};
pub use system::{
    Branchable, Closeable, CommitGraph, CommitInfo, Committable, Conflict, Diff, DiffChange,
    DiffChangeKind, GarbageCollectable, Graphable, MergeOptions, Mergeable, Snapshotable,
    SnapshotMeta, System, WatchCallback, WatchEvent, WatchEventKind, WatchId, Watchable,
};
