//! The workspace coordinator itself.

use crate::config::{WorkspaceConfig, DEFAULT_BRANCH};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use yggdrasil_core::{
    BranchName, Error, Hlc, HlcClock, RegistryEntry, Result, SnapshotId, System, SystemId,
    WatchEvent, WatchId,
};
use yggdrasil_registry::SnapshotRegistry;

/// A system value pinned by a label, preventing GC of its current
/// snapshot until [`WorkspaceCoordinator::release_ref`] is called.
struct HeldRef {
    system_id: SystemId,
    snapshot_id: SnapshotId,
}

/// One system's commit closure for [`WorkspaceCoordinator::coordinated_commit`].
/// Borrows the system's current value, matching the `&self` receiver every
/// mutating capability method takes, and returns its replacement plus the
/// freshly minted snapshot id. On error the old value is left untouched in
/// its slot.
pub type CommitFn = Box<dyn FnOnce(&dyn System) -> Result<(Box<dyn System>, SnapshotId)> + Send>;

/// The outcome of a [`WorkspaceCoordinator::coordinated_commit`]: the
/// single HLC every participant was pinned to, and per-system
/// success/failure — partial failure is expected and never rolled back.
#[derive(Debug, Default)]
pub struct CoordinatedCommitResult {
    /// The HLC pinned for this transaction.
    pub hlc: Hlc,
    /// Systems that committed successfully, mapped to their new snapshot.
    pub results: HashMap<SystemId, SnapshotId>,
    /// Systems whose commit closure failed.
    pub errors: HashMap<SystemId, Error>,
}

/// Holds a set of managed systems, a shared HLC source, and the snapshot
/// registry, and coordinates commits and watcher events across them.
///
/// Wrapped in `Arc` so that watcher callbacks installed on managed
/// systems can hold a handle back into the coordinator without a global
/// singleton.
pub struct WorkspaceCoordinator {
    registry: SnapshotRegistry,
    clock: HlcClock,
    systems: DashMap<SystemId, Box<dyn System>>,
    held_refs: DashMap<String, HeldRef>,
    connection_cache: DashMap<String, Box<dyn System>>,
    watch_ids: DashMap<SystemId, Vec<WatchId>>,
}

impl WorkspaceCoordinator {
    /// Create a workspace backed by a brand-new registry at `store_path`.
    pub fn create(store_path: impl AsRef<Path>, config: WorkspaceConfig) -> Result<Arc<Self>> {
        let registry = SnapshotRegistry::create(store_path, config.registry)?;
        Ok(Arc::new(WorkspaceCoordinator {
            registry,
            clock: HlcClock::new(),
            systems: DashMap::new(),
            held_refs: DashMap::new(),
            connection_cache: DashMap::new(),
            watch_ids: DashMap::new(),
        }))
    }

    /// Open a workspace over an existing registry at `store_path`,
    /// seeding the HLC source so subsequent ticks exceed every
    /// previously registered entry.
    pub fn open(store_path: impl AsRef<Path>, config: WorkspaceConfig) -> Result<Arc<Self>> {
        let registry = SnapshotRegistry::open(store_path, config.registry)?;
        let highest = registry
            .entries_in_range(Hlc::ZERO, Hlc::new(i64::MAX, u32::MAX))
            .into_iter()
            .map(|e| e.hlc)
            .max()
            .unwrap_or(Hlc::ZERO);
        Ok(Arc::new(WorkspaceCoordinator {
            registry,
            clock: HlcClock::starting_at(highest),
            systems: DashMap::new(),
            held_refs: DashMap::new(),
            connection_cache: DashMap::new(),
            watch_ids: DashMap::new(),
        }))
    }

    fn branch_of(sys: &dyn System) -> BranchName {
        sys.as_branchable().map(|b| b.current_branch()).unwrap_or_else(|| BranchName::new(DEFAULT_BRANCH))
    }

    fn registry_entry_for(sys: &dyn System, hlc: Hlc) -> Option<RegistryEntry> {
        let snapshotable = sys.as_snapshotable()?;
        let snapshot_id = snapshotable.snapshot_id();
        let branch = Self::branch_of(sys);
        let mut entry =
            RegistryEntry::new(snapshot_id.clone(), sys.system_id().clone(), branch, hlc)
                .with_parents(snapshotable.parent_ids());
        if let Ok(meta) = snapshotable.snapshot_meta(&snapshot_id) {
            if let Some(message) = meta.message {
                entry = entry.with_message(message);
            }
            entry = entry.with_metadata(meta.metadata);
        }
        Some(entry)
    }

    /// Start managing `sys`: records its current snapshot and, if
    /// watchable, subscribes a callback that stamps every externally
    /// observed event with a fresh HLC and registers it. Idempotent by
    /// system id.
    pub fn manage(self: &Arc<Self>, sys: Box<dyn System>) -> Result<()> {
        let system_id = sys.system_id().clone();
        if self.systems.contains_key(&system_id) {
            return Ok(());
        }

        let hlc = self.clock.tick();
        if let Some(entry) = Self::registry_entry_for(sys.as_ref(), hlc) {
            self.registry.register(entry)?;
        }

        if let Some(watchable) = sys.as_watchable() {
            let weak_self = Arc::downgrade(self);
            let watched_id = system_id.clone();
            let watch_id = watchable.watch(Box::new(move |event: WatchEvent| {
                if let Some(workspace) = weak_self.upgrade() {
                    workspace.on_watch_event(&watched_id, event);
                }
            }));
            self.watch_ids.entry(system_id.clone()).or_default().push(watch_id);
        }

        debug!(system_id = %system_id, "managing system");
        self.systems.insert(system_id, sys);
        Ok(())
    }

    fn on_watch_event(&self, system_id: &SystemId, event: WatchEvent) {
        let hlc = self.clock.tick();
        let entry = RegistryEntry::new(event.snapshot_id, system_id.clone(), event.branch, hlc);
        if let Err(err) = self.registry.register(entry) {
            warn!(system_id = %system_id, error = %err, "failed to record watch event");
        }
    }

    /// Stop managing `system_id`: unsubscribes all of its watchers and
    /// drops it from the systems map. Registry entries persist — they're
    /// still needed for temporal queries about history that includes this
    /// system.
    pub fn unmanage(&self, system_id: &SystemId) -> Result<()> {
        if let Some((_, watch_ids)) = self.watch_ids.remove(system_id) {
            if let Some(sys) = self.systems.get(system_id) {
                if let Some(watchable) = sys.as_watchable() {
                    for id in watch_ids {
                        watchable.unwatch(id);
                    }
                }
            }
        }
        self.systems.remove(system_id);
        Ok(())
    }

    /// Pin `sys`'s current snapshot under `label`: records it in the
    /// connection cache and adds a registry entry, and marks the snapshot
    /// held so GC will not sweep it until [`Self::release_ref`].
    pub fn hold_ref(&self, label: impl Into<String>, sys: Box<dyn System>) -> Result<()> {
        let label = label.into();
        let hlc = self.clock.tick();
        if let Some(entry) = Self::registry_entry_for(sys.as_ref(), hlc) {
            self.registry.register(entry.clone())?;
            self.held_refs.insert(
                label.clone(),
                HeldRef { system_id: entry.system_id.clone(), snapshot_id: entry.snapshot_id.clone() },
            );
        }
        self.connection_cache.insert(label, sys);
        Ok(())
    }

    /// Release a held ref, returning the cached system value if `label`
    /// was held.
    pub fn release_ref(&self, label: &str) -> Option<Box<dyn System>> {
        self.held_refs.remove(label);
        self.connection_cache.remove(label).map(|(_, sys)| sys)
    }

    /// Every snapshot id currently protected by a held ref; consulted by
    /// the garbage collector.
    pub fn held_snapshot_ids(&self) -> HashSet<SnapshotId> {
        self.held_refs.iter().map(|r| r.snapshot_id.clone()).collect()
    }

    /// The system a held ref belongs to, if `label` is currently held.
    pub fn held_ref_system(&self, label: &str) -> Option<SystemId> {
        self.held_refs.get(label).map(|r| r.system_id.clone())
    }

    /// Every currently held `(label, system_id, snapshot_id)` triple.
    pub fn held_refs(&self) -> Vec<(String, SystemId, SnapshotId)> {
        self.held_refs
            .iter()
            .map(|r| (r.key().clone(), r.value().system_id.clone(), r.value().snapshot_id.clone()))
            .collect()
    }

    /// Tick the HLC and return the pinned value every participant of a
    /// logical transaction should be registered under.
    pub fn begin_transaction(&self) -> Hlc {
        self.clock.tick()
    }

    /// Replace `system_id`'s value by running `commit_fn` on it and
    /// register the result under `hlc`. Fails if `system_id` is unmanaged.
    pub fn commit_with_hlc(&self, system_id: &SystemId, hlc: Hlc, commit_fn: CommitFn) -> Result<SnapshotId> {
        let result = {
            let entry = self.systems.get(system_id).ok_or_else(|| Error::system_not_found(system_id))?;
            commit_fn(entry.value().as_ref())
        };
        let (new_sys, snapshot_id) = result?;
        if let Some(entry) = Self::registry_entry_for(new_sys.as_ref(), hlc) {
            self.registry.register(entry)?;
        }
        // Replace-in-slot: the closure already produced the new value from
        // a borrow, so this is a plain overwrite rather than a
        // remove-then-reinsert dance.
        self.systems.insert(system_id.clone(), new_sys);
        Ok(snapshot_id)
    }

    /// Replace `system_id`'s value in place by running `f` against a
    /// borrow of the current value, without touching the registry. Used by
    /// operations (like GC sweep) that mutate a managed system but record
    /// their own bookkeeping separately. Fails if `system_id` is unmanaged
    /// or `f` fails; on failure the previous value is left untouched.
    pub fn replace_system(
        &self,
        system_id: &SystemId,
        f: impl FnOnce(&dyn System) -> Result<Box<dyn System>>,
    ) -> Result<()> {
        let new_sys = {
            let entry = self.systems.get(system_id).ok_or_else(|| Error::system_not_found(system_id))?;
            f(entry.value().as_ref())?
        };
        self.systems.insert(system_id.clone(), new_sys);
        Ok(())
    }

    /// Pin a single HLC for every system in `commit_fns` and run each
    /// closure independently. Per-system outcomes are captured; a failure
    /// in one system never rolls back another.
    pub fn coordinated_commit(&self, commit_fns: HashMap<SystemId, CommitFn>) -> CoordinatedCommitResult {
        let hlc = self.begin_transaction();
        let mut result = CoordinatedCommitResult { hlc, ..Default::default() };
        for (system_id, commit_fn) in commit_fns {
            match self.commit_with_hlc(&system_id, hlc, commit_fn) {
                Ok(snapshot_id) => {
                    result.results.insert(system_id, snapshot_id);
                }
                Err(err) => {
                    result.errors.insert(system_id, err);
                }
            }
        }
        info!(
            succeeded = result.results.len(),
            failed = result.errors.len(),
            "coordinated commit complete"
        );
        result
    }

    /// Delegate to the registry's temporal `as_of` query.
    pub fn as_of_world(&self, hlc: Hlc) -> BTreeMap<(SystemId, BranchName), RegistryEntry> {
        self.registry.as_of(hlc)
    }

    /// Every currently managed system id.
    pub fn list_systems(&self) -> Vec<SystemId> {
        self.systems.iter().map(|e| e.key().clone()).collect()
    }

    /// Run `f` against the managed system `id`, if present.
    pub fn with_system<R>(&self, id: &SystemId, f: impl FnOnce(&dyn System) -> R) -> Option<R> {
        self.systems.get(id).map(|entry| f(entry.value().as_ref()))
    }

    /// A read-only handle to the underlying registry.
    pub fn registry(&self) -> &SnapshotRegistry {
        &self.registry
    }

    /// Unmanage every system, then close the registry.
    ///
    /// Takes `self` by `Arc` because [`SnapshotRegistry::close`] consumes
    /// its receiver by value. If other `Arc` clones are still outstanding
    /// the registry can't be moved out, so this falls back to a flush —
    /// callers holding no other clone (the overwhelmingly common case,
    /// since `create`/`open` are the only way to obtain one) get the full
    /// close.
    pub fn close(self: Arc<Self>) -> Result<()> {
        let ids: Vec<SystemId> = self.list_systems();
        for id in &ids {
            self.unmanage(id)?;
        }
        match Arc::try_unwrap(self) {
            Ok(inner) => inner.registry.close(),
            Err(shared) => {
                warn!("workspace still has outstanding references at close; flushing instead");
                shared.registry.flush()
            }
        }
    }
}
