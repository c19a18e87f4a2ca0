//! End-to-end registry scenarios.

use yggdrasil_core::{BranchName, Hlc, RegistryEntry, SnapshotId, SystemId};
use yggdrasil_pagestore::PageStoreConfig;
use yggdrasil_registry::SnapshotRegistry;

fn entry(sys: &str, branch: &str, snap: &str, hlc: Hlc) -> RegistryEntry {
    RegistryEntry::new(SnapshotId::new(snap), SystemId::new(sys), BranchName::new(branch), hlc)
}

#[test]
fn temporal_as_of_across_two_systems() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SnapshotRegistry::create(dir.path().join("reg"), PageStoreConfig::default()).unwrap();

    registry.register(entry("git", "main", "s1", Hlc::new(1000, 0))).unwrap();
    registry.register(entry("git", "main", "s2", Hlc::new(2000, 0))).unwrap();
    registry.register(entry("zfs", "main", "a", Hlc::new(1500, 0))).unwrap();
    registry.register(entry("zfs", "main", "b", Hlc::new(2500, 0))).unwrap();

    let snapshot = registry.as_of(Hlc::new(1500, 0));
    assert_eq!(snapshot.len(), 2);
    assert_eq!(
        snapshot[&(SystemId::new("git"), BranchName::new("main"))].snapshot_id,
        SnapshotId::new("s1")
    );
    assert_eq!(
        snapshot[&(SystemId::new("zfs"), BranchName::new("main"))].snapshot_id,
        SnapshotId::new("a")
    );
}

#[test]
fn history_ordering_bounded_by_limit() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SnapshotRegistry::create(dir.path().join("reg"), PageStoreConfig::default()).unwrap();

    for i in 1..=10u32 {
        registry
            .register(entry("sys", "main", &format!("snap-{i}"), Hlc::new(i as i64 * 1000, 0)))
            .unwrap();
    }

    let history = registry.system_history(&SystemId::new("sys"), &BranchName::new("main"), Some(3));
    let ids: Vec<String> = history.iter().map(|e| e.snapshot_id.to_string()).collect();
    assert_eq!(ids, vec!["snap-10", "snap-9", "snap-8"]);
}

#[test]
fn cross_system_reference_by_shared_snapshot_id() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SnapshotRegistry::create(dir.path().join("reg"), PageStoreConfig::default()).unwrap();

    registry.register(entry("git", "r1", "snap-1", Hlc::new(100, 0))).unwrap();
    registry.register(entry("btrfs", "v1", "snap-1", Hlc::new(200, 0))).unwrap();

    let refs = registry.snapshot_refs(&SnapshotId::new("snap-1")).unwrap();
    assert_eq!(refs.len(), 2);
    let systems = registry.snapshot_systems(&SnapshotId::new("snap-1")).unwrap();
    assert!(systems.contains(&SystemId::new("git")));
    assert!(systems.contains(&SystemId::new("btrfs")));
}

#[test]
fn register_is_idempotent_on_identity_tuple() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SnapshotRegistry::create(dir.path().join("reg"), PageStoreConfig::default()).unwrap();

    let e = entry("git", "main", "s1", Hlc::new(100, 0));
    assert!(registry.register(e.clone()).unwrap());
    assert!(!registry.register(e).unwrap());
    assert_eq!(registry.entry_count(), 1);
}

#[test]
fn batch_registration_survives_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reg");
    let registry = SnapshotRegistry::create(&path, PageStoreConfig::default()).unwrap();

    let entries: Vec<RegistryEntry> = (0..20u32)
        .map(|i| entry("sys", "main", &format!("snap-{i}"), Hlc::new(i as i64 * 10, 0)))
        .collect();
    let inserted = registry.register_batch(entries.clone()).unwrap();
    assert_eq!(inserted, 20);
    registry.close().unwrap();

    let reopened = SnapshotRegistry::open(&path, PageStoreConfig::default()).unwrap();
    assert_eq!(reopened.entry_count(), 20);
    for e in &entries {
        let refs = reopened.snapshot_refs(&e.snapshot_id).unwrap();
        assert_eq!(refs[0].hlc, e.hlc);
    }
}

#[test]
fn deregister_removes_from_all_indices() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SnapshotRegistry::create(dir.path().join("reg"), PageStoreConfig::default()).unwrap();

    let e = entry("git", "main", "s1", Hlc::new(100, 0));
    registry.register(e.clone()).unwrap();
    assert!(registry.deregister(&e).unwrap());
    assert_eq!(registry.entry_count(), 0);
    assert!(registry.snapshot_refs(&e.snapshot_id).is_none());
    assert!(!registry.deregister(&e).unwrap(), "second deregister is a no-op");
}
