//! Page store configuration.

/// Configuration for a [`crate::store::PageStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStoreConfig {
    /// Fixed size of every page, in bytes. Defaults to 4 KiB.
    pub page_size: usize,
}

impl PageStoreConfig {
    /// The default 4 KiB page size.
    pub const DEFAULT_PAGE_SIZE: usize = 4096;
}

impl Default for PageStoreConfig {
    fn default() -> Self {
        PageStoreConfig { page_size: Self::DEFAULT_PAGE_SIZE }
    }
}
