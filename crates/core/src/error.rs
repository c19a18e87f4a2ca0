//! Unified error taxonomy for Yggdrasil.
//!
//! Every downstream crate (`yggdrasil-pagestore`, `yggdrasil-btree`,
//! `yggdrasil-registry`, `yggdrasil-workspace`, `yggdrasil-composite`,
//! `yggdrasil-gc`) defines its own leaf error type for the failures
//! specific to that layer, and converts it into this [`Error`] via
//! `#[from]` at the crate boundary, so callers above the core only ever
//! have to match on one error enum.

use crate::ids::{BranchName, SnapshotId, SystemId};
use thiserror::Error;

/// Result type alias used across the workspace substrate.
pub type Result<T> = std::result::Result<T, Error>;

/// The unified error type for the Yggdrasil core.
#[derive(Debug, Error)]
pub enum Error {
    /// A system, snapshot, or branch referenced by an operation doesn't exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// `pullback` was asked to compose sub-systems that disagree on their
    /// current branch (the fiber condition failed).
    #[error("fiber condition violated: sub-systems disagree on current branch ({0})")]
    FiberCondition(String),

    /// On-disk state is internally inconsistent: registry index
    /// disagreement at startup, a header checksum mismatch with no valid
    /// alternate, or an impossible HLC ordering.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// A page store or file-system I/O operation failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// An adapter raised an error while servicing a call; wrapped with the
    /// id of the system that raised it.
    #[error("adapter error from system {system_id}: {message}")]
    AdapterError {
        /// The system that raised the error.
        system_id: SystemId,
        /// The adapter-supplied message.
        message: String,
    },

    /// An operation was requested on a system whose capability flag for
    /// that operation is false.
    #[error("capability error: system {system_id} does not support {capability}")]
    CapabilityError {
        /// The system that was asked to perform an unsupported operation.
        system_id: SystemId,
        /// The name of the missing capability.
        capability: &'static str,
    },
}

impl Error {
    /// Build a [`Error::NotFound`] for a missing system.
    pub fn system_not_found(system_id: &SystemId) -> Self {
        Error::NotFound(format!("system {system_id}"))
    }

    /// Build a [`Error::NotFound`] for a missing snapshot.
    pub fn snapshot_not_found(snapshot_id: &SnapshotId) -> Self {
        Error::NotFound(format!("snapshot {snapshot_id}"))
    }

    /// Build a [`Error::NotFound`] for a missing branch.
    pub fn branch_not_found(system_id: &SystemId, branch: &BranchName) -> Self {
        Error::NotFound(format!("branch {branch} on system {system_id}"))
    }

    /// Build a [`Error::CapabilityError`].
    pub fn capability(system_id: &SystemId, capability: &'static str) -> Self {
        Error::CapabilityError { system_id: system_id.clone(), capability }
    }

    /// Build an [`Error::AdapterError`].
    pub fn adapter(system_id: &SystemId, message: impl Into<String>) -> Self {
        Error::AdapterError { system_id: system_id.clone(), message: message.into() }
    }
}
