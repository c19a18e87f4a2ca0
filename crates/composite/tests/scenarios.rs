//! End-to-end composite system scenarios.

use yggdrasil_composite::CompositeSystem;
use yggdrasil_core::{BranchName, Closeable, System};
use yggdrasil_testkit::MockSystem;

#[test]
fn composite_round_trip_persists_three_commits_across_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal");

    let a = Box::new(MockSystem::new("a", "main", "a0"));
    let b = Box::new(MockSystem::new("b", "main", "b0"));
    let composite =
        CompositeSystem::composite(vec![a, b], None, BranchName::new("main"), Some(&path)).unwrap();

    let mut current: Box<dyn System> = Box::new(composite);
    for message in ["first", "second", "third"] {
        current = current.as_committable().unwrap().commit(Some(message)).unwrap();
    }
    let history_before_close = current.as_graphable().unwrap().history();
    assert_eq!(history_before_close.len(), 4, "initial entry plus three commits");
    let snapshot_id_before_close = current.as_snapshotable().unwrap().snapshot_id();

    current.as_closeable().unwrap().close().unwrap();
    drop(current);

    // Reconnect the sub-systems at the state they were left in after the
    // three commits (MockSystem's commit ids are `{system_id}-{seq}`), not
    // their original pre-commit state.
    let a2 = Box::new(MockSystem::new("a", "main", "a-3"));
    let b2 = Box::new(MockSystem::new("b", "main", "b-3"));
    let reopened =
        CompositeSystem::composite(vec![a2, b2], None, BranchName::new("main"), Some(&path)).unwrap();
    let history_after_reopen = reopened.as_graphable().unwrap().history();
    assert_eq!(
        history_after_reopen.len(),
        4,
        "reopening at the post-commit sub-system state must see the full persisted history"
    );
    assert_eq!(reopened.as_snapshotable().unwrap().snapshot_id(), snapshot_id_before_close);

    let a3 = Box::new(MockSystem::new("a", "main", "a-3"));
    let b3 = Box::new(MockSystem::new("b", "main", "b-3"));
    let reopened_again =
        CompositeSystem::composite(vec![a3, b3], None, BranchName::new("main"), Some(&path)).unwrap();
    assert_eq!(
        reopened_again.as_graphable().unwrap().history().len(),
        4,
        "reopening the same post-commit state twice must not duplicate any entry"
    );
}

#[test]
fn composite_snapshot_id_is_a_function_of_sub_snapshots_only() {
    let a1 = Box::new(MockSystem::new("a", "main", "a0"));
    let b1 = Box::new(MockSystem::new("b", "main", "b0"));
    let composite1 = CompositeSystem::pullback(vec![a1, b1], None).unwrap();

    let a2 = Box::new(MockSystem::new("a", "main", "a0"));
    let b2 = Box::new(MockSystem::new("b", "main", "b0"));
    let composite2 = CompositeSystem::pullback(vec![a2, b2], None).unwrap();

    assert_eq!(
        composite1.as_snapshotable().unwrap().snapshot_id(),
        composite2.as_snapshotable().unwrap().snapshot_id()
    );
}
