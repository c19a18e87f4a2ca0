//! Leaf error type for this crate, folded into the core taxonomy.

use yggdrasil_core::Error as CoreError;

/// Fold a B-tree error into the core taxonomy.
pub fn btree_err(err: yggdrasil_btree::BTreeError) -> CoreError {
    CoreError::IntegrityError(err.to_string())
}

/// Fold a page store error into the core taxonomy.
pub fn pagestore_err(err: yggdrasil_pagestore::PageStoreError) -> CoreError {
    CoreError::IntegrityError(err.to_string())
}

/// Result type alias used across this crate.
pub type Result<T> = std::result::Result<T, CoreError>;
