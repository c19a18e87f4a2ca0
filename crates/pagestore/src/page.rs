//! Page addressing.

/// A page address: a byte offset into `data.pages`, always a multiple of
/// the store's configured page size.
pub type PageAddr = u64;

/// Sentinel meaning "no page" (an empty free-list chain head, or no
/// parent).
pub const NO_PAGE: PageAddr = u64::MAX;
