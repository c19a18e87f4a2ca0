//! Reachability-based garbage collection over a [`WorkspaceCoordinator`]'s
//! managed systems.
//!
//! Live roots are the union of every Garbage-Collectable system's
//! `gc_roots()`; the reachable set extends each root by its ancestors on
//! every Graphable system. Registry entries older than the configured
//! grace period, unreachable, and not covered by a held ref become sweep
//! candidates, grouped by system and dispatched to that system's native
//! `gc_sweep`.

#![warn(missing_docs)]

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use yggdrasil_core::{Error, Hlc, RegistryEntry, SnapshotId, SystemId};
use yggdrasil_workspace::WorkspaceCoordinator;

/// Configuration for a [`GarbageCollector`] run.
#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    /// Minimum age, in milliseconds of wall-clock time, an entry must have
    /// before it becomes sweep-eligible.
    pub grace_period_ms: i64,
    /// If true, compute candidates but skip the sweep and deregister
    /// steps entirely.
    pub dry_run: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig { grace_period_ms: 0, dry_run: false }
    }
}

/// The outcome of one [`GarbageCollector::run`] pass.
#[derive(Debug, Default)]
pub struct GcReport {
    /// Every snapshot id identified as a sweep candidate this pass.
    pub candidates: Vec<SnapshotId>,
    /// Snapshot ids actually swept and deregistered (empty in dry-run).
    pub swept: Vec<SnapshotId>,
    /// Per-system sweep failures; candidates for a failing system_id stay
    /// registered and are retried on the next pass.
    pub errors: HashMap<SystemId, Error>,
}

impl GcReport {
    /// Human-readable one-line summary, in the teacher's `RecoveryResult`
    /// style.
    pub fn summary(&self) -> String {
        format!(
            "gc pass: {} candidates, {} swept, {} errors",
            self.candidates.len(),
            self.swept.len(),
            self.errors.len()
        )
    }

    /// Whether any system failed to sweep its candidates this pass.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Computes and sweeps unreachable, expired registry entries across every
/// system managed by a [`WorkspaceCoordinator`].
pub struct GarbageCollector<'a> {
    workspace: &'a WorkspaceCoordinator,
    config: GcConfig,
}

impl<'a> GarbageCollector<'a> {
    /// Build a collector over `workspace` with the given `config`.
    pub fn new(workspace: &'a WorkspaceCoordinator, config: GcConfig) -> Self {
        GarbageCollector { workspace, config }
    }

    /// Run one collection pass.
    pub fn run(&self) -> GcReport {
        self.run_at(Hlc::now())
    }

    /// Run one collection pass as of `now`, treating `now` as the current
    /// wall-clock reading for grace-period comparisons. Exposed separately
    /// from [`Self::run`] so tests can pin a deterministic clock.
    pub fn run_at(&self, now: Hlc) -> GcReport {
        let reachable = self.reachable_set();
        let held = self.workspace.held_snapshot_ids();
        let cutoff = now.physical().saturating_sub(self.config.grace_period_ms);

        let candidates: Vec<RegistryEntry> = self
            .workspace
            .registry()
            .entries_in_range(Hlc::ZERO, Hlc::new(cutoff, u32::MAX))
            .into_iter()
            .filter(|e| !reachable.contains(&e.snapshot_id) && !held.contains(&e.snapshot_id))
            .collect();

        let mut report = GcReport {
            candidates: candidates.iter().map(|e| e.snapshot_id.clone()).collect(),
            ..Default::default()
        };

        if self.config.dry_run {
            info!(candidates = report.candidates.len(), "gc dry run: no sweep performed");
            return report;
        }

        let mut by_system: HashMap<SystemId, Vec<RegistryEntry>> = HashMap::new();
        for entry in candidates {
            by_system.entry(entry.system_id.clone()).or_default().push(entry);
        }

        for (system_id, entries) in by_system {
            let ids: Vec<SnapshotId> = entries.iter().map(|e| e.snapshot_id.clone()).collect();
            let sweep_result = self.workspace.replace_system(&system_id, |sys| {
                let gc = sys
                    .as_garbage_collectable()
                    .ok_or_else(|| Error::capability(&system_id, "garbage_collectable"))?;
                gc.gc_sweep(&ids)
            });

            match sweep_result {
                Ok(()) => {
                    for entry in &entries {
                        if let Err(err) = self.workspace.registry().deregister(entry) {
                            warn!(system = %system_id, error = %err, "failed to deregister swept entry");
                        }
                    }
                    debug!(system = %system_id, swept = ids.len(), "gc swept system");
                    report.swept.extend(ids);
                }
                Err(err) => {
                    warn!(system = %system_id, error = %err, "gc sweep failed, entries remain registered");
                    report.errors.insert(system_id, err);
                }
            }
        }

        info!("{}", report.summary());
        report
    }

    fn reachable_set(&self) -> HashSet<SnapshotId> {
        let mut reachable = HashSet::new();
        for system_id in self.workspace.list_systems() {
            let roots = self
                .workspace
                .with_system(&system_id, |sys| {
                    sys.as_garbage_collectable().map(|gc| gc.gc_roots()).unwrap_or_default()
                })
                .unwrap_or_default();

            for root in roots {
                reachable.insert(root.clone());
                let ancestors = self
                    .workspace
                    .with_system(&system_id, |sys| {
                        sys.as_graphable().and_then(|g| g.ancestors(&root).ok()).unwrap_or_default()
                    })
                    .unwrap_or_default();
                reachable.extend(ancestors);
            }
        }
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use yggdrasil_core::BranchName;
    use yggdrasil_pagestore::PageStoreConfig;
    use yggdrasil_testkit::MockSystem;
    use yggdrasil_workspace::WorkspaceConfig;

    fn workspace() -> Arc<WorkspaceCoordinator> {
        WorkspaceCoordinator::create(
            tempfile::tempdir().unwrap().into_path(),
            WorkspaceConfig { registry: PageStoreConfig::default() },
        )
        .unwrap()
    }

    #[test]
    fn unreachable_expired_entries_are_swept() {
        let workspace = workspace();
        let system = Box::new(MockSystem::new("git", "main", "g0"));
        workspace.manage(system).unwrap();

        let system_id = SystemId::new("git");
        let hlc = workspace.begin_transaction();
        let snap = workspace
            .commit_with_hlc(
                &system_id,
                hlc,
                Box::new(|sys| {
                    let next = sys.as_committable().unwrap().commit(Some("orphan"))?;
                    let id = next.as_snapshotable().unwrap().snapshot_id();
                    Ok((next, id))
                }),
            )
            .unwrap();

        // "orphan" is not a gc_root (the mock's only root is the current
        // branch head, which has since moved past it via another commit
        // that we don't keep as a root). Advance the branch again so the
        // first commit becomes unreachable from the (new) head... in the
        // mock, every commit becomes the new head, so instead we simulate
        // an unreachable entry by registering a synthetic one directly.
        let _ = snap;
        let orphan_id = SnapshotId::new("orphan-detached");
        workspace
            .registry()
            .register(RegistryEntry::new(
                orphan_id.clone(),
                system_id.clone(),
                BranchName::new("main"),
                Hlc::new(0, 0),
            ))
            .unwrap();

        let gc = GarbageCollector::new(&workspace, GcConfig { grace_period_ms: 0, dry_run: false });
        let report = gc.run_at(Hlc::new(1_000_000, 0));

        assert!(report.candidates.contains(&orphan_id));
        assert!(report.swept.contains(&orphan_id));
        assert!(workspace.registry().snapshot_refs(&orphan_id).is_none());
    }

    #[test]
    fn held_refs_are_never_candidates() {
        let workspace = workspace();
        let system = Box::new(MockSystem::new("git", "main", "g0"));
        workspace.manage(system).unwrap();
        let system_id = SystemId::new("git");

        let held_id = SnapshotId::new("held-one");
        workspace
            .registry()
            .register(RegistryEntry::new(
                held_id.clone(),
                system_id.clone(),
                BranchName::new("main"),
                Hlc::new(0, 0),
            ))
            .unwrap();
        let held_sys = Box::new(MockSystem::new("git", "main", "held-one"));
        workspace.hold_ref("keep-me", held_sys).unwrap();

        let gc = GarbageCollector::new(&workspace, GcConfig { grace_period_ms: 0, dry_run: false });
        let report = gc.run_at(Hlc::new(1_000_000, 0));
        assert!(!report.candidates.contains(&held_id));
    }

    #[test]
    fn dry_run_reports_candidates_without_sweeping() {
        let workspace = workspace();
        let system = Box::new(MockSystem::new("git", "main", "g0"));
        workspace.manage(system).unwrap();
        let system_id = SystemId::new("git");

        let orphan_id = SnapshotId::new("orphan-two");
        workspace
            .registry()
            .register(RegistryEntry::new(
                orphan_id.clone(),
                system_id,
                BranchName::new("main"),
                Hlc::new(0, 0),
            ))
            .unwrap();

        let gc = GarbageCollector::new(&workspace, GcConfig { grace_period_ms: 0, dry_run: true });
        let report = gc.run_at(Hlc::new(1_000_000, 0));
        assert!(report.candidates.contains(&orphan_id));
        assert!(report.swept.is_empty());
        assert!(workspace.registry().snapshot_refs(&orphan_id).is_some());
    }
}
