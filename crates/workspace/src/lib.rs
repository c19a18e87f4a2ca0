//! The workspace coordinator: the single entry point managing a set of
//! `System` values, pinning coordinated commits to one HLC, and recording
//! every observed snapshot into a shared [`yggdrasil_registry::SnapshotRegistry`].

#![warn(missing_docs)]

mod config;
mod coordinator;

pub use config::{WorkspaceConfig, DEFAULT_BRANCH};
pub use coordinator::{CoordinatedCommitResult, CommitFn, WorkspaceCoordinator};
