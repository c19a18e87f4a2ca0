//! Workspace configuration.

use yggdrasil_pagestore::PageStoreConfig;

/// The branch name used for registry entries when a managed system
/// doesn't implement [`yggdrasil_core::Branchable`].
pub const DEFAULT_BRANCH: &str = "main";

/// Configuration for a [`crate::WorkspaceCoordinator`].
#[derive(Debug, Clone, Copy)]
pub struct WorkspaceConfig {
    /// Page store configuration for the workspace's snapshot registry.
    pub registry: PageStoreConfig,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig { registry: PageStoreConfig::default() }
    }
}
