//! Leaf error type for the B-Tree.

use thiserror::Error;

/// Errors the B-Tree can raise.
#[derive(Debug, Error)]
pub enum BTreeError {
    /// The underlying page store failed.
    #[error("page store error: {0}")]
    PageStore(#[from] yggdrasil_pagestore::PageStoreError),

    /// A node, once encoded, didn't fit in a single page. Callers should
    /// lower the configured fanout or raise the page store's page size.
    #[error("encoded node of {encoded_len} bytes exceeds the page size of {page_size} bytes")]
    NodeTooLarge {
        /// The node's encoded size.
        encoded_len: usize,
        /// The store's configured page size.
        page_size: usize,
    },

    /// A page's bytes didn't decode as a valid node.
    #[error("corrupt node at page {addr}: {message}")]
    CorruptNode {
        /// The page address that failed to decode.
        addr: u64,
        /// Decoder error detail.
        message: String,
    },
}

/// Result type alias for B-Tree operations.
pub type Result<T> = std::result::Result<T, BTreeError>;
