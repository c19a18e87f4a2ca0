//! The page store itself: a fixed-size-page file with a free list and an
//! alternating-header fsync discipline.
//!
//! A store is a directory containing:
//!   - `header.0`, `header.1` — the two alternating 64-byte root headers
//!   - `data.pages` — the page file, page-aligned, grown by tail-bump
//!
//! Mutation is staged in memory ([`PageStore::write`], [`PageStore::mark_freed`])
//! and only becomes durable on [`PageStore::flush`], which is the sole
//! commit point: it fsyncs the data file, persists the merged free list as
//! a chain of tail-bumped pages, fsyncs again, then writes the new header
//! to the alternate slot and fsyncs a third time. A crash at any point
//! before that final fsync leaves the previous header's view intact.

use crate::config::PageStoreConfig;
use crate::error::{PageStoreError, Result};
use crate::freelist;
use crate::header::{HeaderSlots, RootHeader, MAX_ROOTS};
use crate::page::{PageAddr, NO_PAGE};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// A fixed-size-page store with copy-on-write-friendly allocation.
///
/// Systems above this layer (the B-Tree) are responsible for copy-on-write
/// path copying; the page store only knows how to allocate, read, write,
/// and eventually reclaim pages.
pub struct PageStore {
    dir: PathBuf,
    config: PageStoreConfig,
    data_file: File,
    header_slots: HeaderSlots,
    /// The currently-committed header (as of the last successful flush or
    /// recovery).
    committed: RootHeader,
    /// End-of-file tail-bump cursor, in pages.
    next_page: u64,
    /// Pages free as of the last committed flush and safe to hand out now.
    available: Vec<PageAddr>,
    /// Pages `mark_freed` has staged this epoch; folded into `available`
    /// only after the *next* flush commits, so readers of the
    /// still-current snapshot never see them reused.
    staged_free: Vec<PageAddr>,
    /// Chain pages backing `available`'s persisted free list as of the
    /// last flush; reclaimed into `available` on the flush after next.
    prev_chain_pages: Vec<PageAddr>,
}

impl PageStore {
    /// Create a new, empty page store rooted at `dir`, which must not
    /// already exist.
    pub fn create(dir: impl AsRef<Path>, config: PageStoreConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let (header_slots, committed) = HeaderSlots::create(&dir)?;
        let data_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(dir.join("data.pages"))?;
        debug!(dir = %dir.display(), page_size = config.page_size, "created page store");
        Ok(PageStore {
            dir,
            config,
            data_file,
            header_slots,
            committed,
            next_page: 0,
            available: Vec::new(),
            staged_free: Vec::new(),
            prev_chain_pages: Vec::new(),
        })
    }

    /// Open an existing page store, recovering the higher-epoch valid
    /// header and rebuilding the in-memory free list from its persisted
    /// chain.
    pub fn open(dir: impl AsRef<Path>, config: PageStoreConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let (header_slots, committed) = HeaderSlots::open(&dir)?;
        let data_file = OpenOptions::new().read(true).write(true).open(dir.join("data.pages"))?;
        let file_len = data_file.metadata()?.len();
        let next_page = file_len / config.page_size as u64;

        let mut store = PageStore {
            dir,
            config,
            data_file,
            header_slots,
            committed,
            next_page,
            available: Vec::new(),
            staged_free: Vec::new(),
            prev_chain_pages: Vec::new(),
        };
        store.load_free_list()?;
        debug!(dir = %store.dir.display(), epoch = store.committed.epoch, "opened page store");
        Ok(store)
    }

    fn load_free_list(&mut self) -> Result<()> {
        let mut addr = self.committed.free_head;
        let mut addrs = Vec::new();
        let mut chain_pages = Vec::new();
        let page_size = self.config.page_size;
        while addr != NO_PAGE {
            chain_pages.push(addr);
            let mut buf = vec![0u8; page_size];
            self.data_file.read_exact_at(&mut buf, addr)?;
            let (mut link_addrs, next) = freelist::decode_link(&buf)?;
            addrs.append(&mut link_addrs);
            addr = next;
        }
        self.available = addrs;
        self.prev_chain_pages = chain_pages;
        Ok(())
    }

    /// The committed root page addresses (e.g. `[tsbs, sbts, stbh]`).
    pub fn roots(&self) -> &[PageAddr] {
        self.committed.active_roots()
    }

    /// Configured fixed page size.
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Allocate a page address for a new write, preferring a reclaimed
    /// page over growing the file.
    pub fn alloc(&mut self) -> PageAddr {
        if let Some(addr) = self.available.pop() {
            trace!(addr, "allocated reclaimed page");
            return addr;
        }
        let addr = self.next_page * self.config.page_size as u64;
        self.next_page += 1;
        trace!(addr, "allocated tail page");
        addr
    }

    /// Allocate a page reserved for this flush's free-list chain,
    /// bypassing `available` so chain pages never alias pages a concurrent
    /// `alloc` caller might also be handed this epoch.
    fn alloc_tail(&mut self) -> PageAddr {
        let addr = self.next_page * self.config.page_size as u64;
        self.next_page += 1;
        addr
    }

    /// Write `data` to `addr`. `data` must not exceed the page size; it is
    /// zero-padded to a full page.
    pub fn write(&mut self, addr: PageAddr, data: &[u8]) -> Result<()> {
        if data.len() > self.config.page_size {
            return Err(PageStoreError::PayloadTooLarge { len: data.len(), page_size: self.config.page_size });
        }
        let mut buf = vec![0u8; self.config.page_size];
        buf[..data.len()].copy_from_slice(data);
        self.data_file.write_all_at(&buf, addr)?;
        Ok(())
    }

    /// Read the full page at `addr`.
    pub fn read(&self, addr: PageAddr) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.config.page_size];
        self.data_file.read_exact_at(&mut buf, addr)?;
        Ok(buf)
    }

    /// Stage `addr` as reusable after the next flush commits. Must not be
    /// handed out by `alloc` before then: callers hold the old page's
    /// contents readable (the previous committed snapshot) until the next
    /// flush makes the new root durable.
    pub fn mark_freed(&mut self, addr: PageAddr) {
        self.staged_free.push(addr);
    }

    /// Commit all writes and freed pages so far: fsync data, persist the
    /// merged free list, fsync again, then durably swap the header to
    /// reference `roots`.
    pub fn flush(&mut self, roots: &[PageAddr]) -> Result<()> {
        if roots.len() > MAX_ROOTS {
            return Err(PageStoreError::TooManyRoots { count: roots.len(), max: MAX_ROOTS });
        }
        self.data_file.sync_all()?;

        // Pages freed this epoch become reusable now; the chain pages that
        // backed the *previous* free list become reusable too, since the
        // header we're about to write will no longer reference them.
        let mut merged = std::mem::take(&mut self.available);
        merged.append(&mut self.staged_free);
        merged.append(&mut self.prev_chain_pages);

        let (free_head, new_chain_pages) = self.write_free_list_chain(&merged)?;
        self.data_file.sync_all()?;

        let mut roots_arr = [NO_PAGE; MAX_ROOTS];
        roots_arr[..roots.len()].copy_from_slice(roots);
        let header = RootHeader {
            epoch: self.committed.epoch + 1,
            roots_len: roots.len() as u8,
            roots: roots_arr,
            free_head,
        };
        self.header_slots.commit(&header)?;
        self.committed = header;

        self.available = merged;
        self.prev_chain_pages = new_chain_pages;
        debug!(epoch = self.committed.epoch, free_pages = self.available.len(), "flushed page store");
        Ok(())
    }

    /// Write `addrs` out as a free-list chain using freshly tail-bumped
    /// pages (never pages drawn from `addrs` itself), returning the head
    /// address and the list of chain page addresses used.
    fn write_free_list_chain(&mut self, addrs: &[PageAddr]) -> Result<(PageAddr, Vec<PageAddr>)> {
        if addrs.is_empty() {
            return Ok((NO_PAGE, Vec::new()));
        }
        let page_size = self.config.page_size;
        let chunks: Vec<Vec<PageAddr>> =
            freelist::chunk(addrs, page_size).into_iter().map(|c| c.to_vec()).collect();
        let chain_pages: Vec<PageAddr> = chunks.iter().map(|_| self.alloc_tail()).collect();

        for (i, chunk_addrs) in chunks.iter().enumerate() {
            let next = chain_pages.get(i + 1).copied().unwrap_or(NO_PAGE);
            let mut buf = vec![0u8; page_size];
            freelist::encode_link(&mut buf, chunk_addrs, next);
            self.data_file.write_all_at(&buf, chain_pages[i])?;
        }
        Ok((chain_pages[0], chain_pages))
    }

    /// Flush is the only durability boundary; closing just drops the
    /// handles.
    pub fn close(self) -> Result<()> {
        Ok(())
    }
}
