//! The registry entry record (spec §3 "Registry Entry").
//!
//! An entry is one immutable observation `(snapshot, system, branch,
//! time, metadata)`. Entries are never mutated once inserted; they are
//! destroyed only by explicit deregistration or GC sweep, as a unit across
//! all three registry indices.

use crate::hlc::Hlc;
use crate::ids::{BranchName, SnapshotId, SystemId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One durable observation that a snapshot existed on a branch of a system
/// at a given point in hybrid logical time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// The snapshot being observed.
    pub snapshot_id: SnapshotId,
    /// The system that produced it.
    pub system_id: SystemId,
    /// The branch it was observed on.
    pub branch_name: BranchName,
    /// The hybrid logical clock value stamped on this observation.
    pub hlc: Hlc,
    /// Direct parent snapshot ids, if known.
    pub parent_ids: Vec<SnapshotId>,
    /// Free-form commit/snapshot message, if any.
    pub message: Option<String>,
    /// Adapter- or workspace-defined metadata.
    pub metadata: BTreeMap<String, String>,
}

impl RegistryEntry {
    /// Construct an entry with empty parents/message/metadata.
    pub fn new(
        snapshot_id: SnapshotId,
        system_id: SystemId,
        branch_name: BranchName,
        hlc: Hlc,
    ) -> Self {
        RegistryEntry {
            snapshot_id,
            system_id,
            branch_name,
            hlc,
            parent_ids: Vec::new(),
            message: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Builder: attach parent ids.
    pub fn with_parents(mut self, parents: Vec<SnapshotId>) -> Self {
        self.parent_ids = parents;
        self
    }

    /// Builder: attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Builder: attach metadata.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// The `(system_id, branch_name)` pair this entry is filed under.
    pub fn system_branch(&self) -> (&SystemId, &BranchName) {
        (&self.system_id, &self.branch_name)
    }

    /// The idempotency tuple `register` deduplicates on: re-registering an
    /// entry with an identical tuple is a no-op.
    pub fn identity_tuple(&self) -> (&SnapshotId, &SystemId, &BranchName, Hlc) {
        (&self.snapshot_id, &self.system_id, &self.branch_name, self.hlc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_compose() {
        let entry = RegistryEntry::new(
            SnapshotId::new("snap-1"),
            SystemId::new("git"),
            BranchName::new("main"),
            Hlc::new(1000, 0),
        )
        .with_message("initial commit")
        .with_parents(vec![SnapshotId::new("snap-0")]);

        assert_eq!(entry.message.as_deref(), Some("initial commit"));
        assert_eq!(entry.parent_ids, vec![SnapshotId::new("snap-0")]);
    }

    #[test]
    fn identity_tuple_distinguishes_hlc() {
        let a = RegistryEntry::new(
            SnapshotId::new("s"),
            SystemId::new("sys"),
            BranchName::new("main"),
            Hlc::new(1, 0),
        );
        let b = RegistryEntry::new(
            SnapshotId::new("s"),
            SystemId::new("sys"),
            BranchName::new("main"),
            Hlc::new(2, 0),
        );
        assert_ne!(a.identity_tuple(), b.identity_tuple());
    }
}
