//! The registry reuses the core error taxonomy; this module only adds the
//! encoding-level detail that doesn't have a home anywhere else and folds
//! it into [`yggdrasil_core::Error::IntegrityError`].

use yggdrasil_core::Error as CoreError;

/// Errors specific to key encoding, always folded into a core `Error`
/// before leaving this crate.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A system id, branch name, or snapshot id exceeded the 255-byte
    /// length-prefix encoding limit.
    #[error("component of {0} bytes exceeds the 255-byte length-prefix limit")]
    ComponentTooLong(usize),
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        CoreError::IntegrityError(err.to_string())
    }
}

/// Fold a B-Tree error into the core taxonomy. B-Tree failures only ever
/// arise from a corrupt or oversized node, which is an on-disk integrity
/// problem from this layer's point of view.
pub fn btree_err(err: yggdrasil_btree::BTreeError) -> CoreError {
    CoreError::IntegrityError(err.to_string())
}

/// Fold a page store error into the core taxonomy.
pub fn pagestore_err(err: yggdrasil_pagestore::PageStoreError) -> CoreError {
    CoreError::IntegrityError(err.to_string())
}

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CoreError>;
