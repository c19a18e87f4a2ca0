//! Deterministic hashing of sub-snapshot sets into a composite snapshot id.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use yggdrasil_core::{SnapshotId, SystemId};

/// Hash the sorted `(system_id, sub_snapshot_id)` pairs into a composite
/// snapshot id. Sorting first makes the result independent of sub-system
/// declaration order, matching the monoidal-commit requirement that
/// `composite([a,b,c])` behaves like `composite([composite([a,b]), c])`.
pub fn composite_snapshot_id(pairs: &[(SystemId, SnapshotId)]) -> SnapshotId {
    let mut sorted: Vec<&(SystemId, SnapshotId)> = pairs.iter().collect();
    sorted.sort_by(|a, b| (a.0.as_str(), a.1.as_str()).cmp(&(b.0.as_str(), b.1.as_str())));

    let mut hasher = FxHasher::default();
    for (system_id, snapshot_id) in &sorted {
        system_id.as_str().hash(&mut hasher);
        snapshot_id.as_str().hash(&mut hasher);
    }
    SnapshotId::new(format!("{:016x}", hasher.finish()))
}
