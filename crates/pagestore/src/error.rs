//! Leaf error type for the page store.

use thiserror::Error;

/// Errors the page store can raise.
#[derive(Debug, Error)]
pub enum PageStoreError {
    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Neither header slot has valid magic/checksum; the store cannot be
    /// opened without explicit repair.
    #[error("no valid header found in {0}: both slots failed validation")]
    NoValidHeader(std::path::PathBuf),

    /// A header slot's stored checksum didn't match its computed checksum.
    #[error("header checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum recorded in the header.
        expected: u32,
        /// Checksum computed over the header's other fields.
        computed: u32,
    },

    /// A write or read was attempted with a payload larger than the
    /// configured page size.
    #[error("payload of {len} bytes exceeds page size {page_size}")]
    PayloadTooLarge {
        /// The oversized payload's length.
        len: usize,
        /// The configured page size.
        page_size: usize,
    },

    /// A caller passed more root pointers than `MAX_ROOTS` supports.
    #[error("too many roots: {count} exceeds the maximum of {max}")]
    TooManyRoots {
        /// Roots the caller tried to commit.
        count: usize,
        /// The maximum supported.
        max: usize,
    },
}

/// Result type alias for page store operations.
pub type Result<T> = std::result::Result<T, PageStoreError>;
