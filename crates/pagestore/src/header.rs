//! The alternating root header.
//!
//! `flush` is the only durability boundary: it writes a new 64-byte header
//! to whichever of `header.0`/`header.1` was *not* used last time, fsyncs
//! it, and only then is the write considered committed. Recovery reads
//! both slots and picks the one with the higher `epoch` whose checksum is
//! valid, so a crash mid-write to one slot leaves the other slot's
//! previously-committed state intact.

use crate::error::{PageStoreError, Result};
use crate::page::{PageAddr, NO_PAGE};
use byteorder::{ByteOrder, LittleEndian};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a Yggdrasil page store header: "YGPS".
pub const MAGIC: [u8; 4] = *b"YGPS";

/// Current header format version.
pub const FORMAT_VERSION: u32 = 1;

/// Maximum number of root page addresses a single header can carry. The
/// snapshot registry uses 3 (TSBS/SBTS/STBH); a standalone B-Tree or the
/// composite journal uses 1.
pub const MAX_ROOTS: usize = 4;

/// Fixed on-disk header size, in bytes.
pub const HEADER_SIZE: usize = 64;

const ROOTS_OFFSET: usize = 17;
const FREE_HEAD_OFFSET: usize = ROOTS_OFFSET + MAX_ROOTS * 8;
const CHECKSUM_OFFSET: usize = HEADER_SIZE - 4;

/// The root header: the only thing `flush` ever overwrites durably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootHeader {
    /// Monotonically increasing generation counter. Recovery picks the
    /// valid slot with the higher epoch.
    pub epoch: u64,
    /// How many of `roots` are meaningful.
    pub roots_len: u8,
    /// Root page addresses, e.g. `[tsbs, sbts, stbh, _]` for the registry.
    pub roots: [PageAddr; MAX_ROOTS],
    /// Head of the on-disk free-list chain, or `NO_PAGE` if empty.
    pub free_head: PageAddr,
}

impl RootHeader {
    /// The header for a brand-new, empty store.
    pub fn empty() -> Self {
        RootHeader { epoch: 0, roots_len: 0, roots: [NO_PAGE; MAX_ROOTS], free_head: NO_PAGE }
    }

    /// Serialize to the fixed 64-byte on-disk representation.
    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE]> {
        if self.roots_len as usize > MAX_ROOTS {
            return Err(PageStoreError::TooManyRoots {
                count: self.roots_len as usize,
                max: MAX_ROOTS,
            });
        }
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], FORMAT_VERSION);
        LittleEndian::write_u64(&mut buf[8..16], self.epoch);
        buf[16] = self.roots_len;
        for (i, root) in self.roots.iter().enumerate() {
            let off = ROOTS_OFFSET + i * 8;
            LittleEndian::write_u64(&mut buf[off..off + 8], *root);
        }
        LittleEndian::write_u64(&mut buf[FREE_HEAD_OFFSET..FREE_HEAD_OFFSET + 8], self.free_head);
        let checksum = crc32fast::hash(&buf[..CHECKSUM_OFFSET]);
        LittleEndian::write_u32(&mut buf[CHECKSUM_OFFSET..], checksum);
        Ok(buf)
    }

    /// Parse and checksum-validate a header slot.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0..4] != MAGIC {
            return Err(PageStoreError::ChecksumMismatch { expected: 0, computed: 0 });
        }
        let stored_checksum = LittleEndian::read_u32(&buf[CHECKSUM_OFFSET..]);
        let computed = crc32fast::hash(&buf[..CHECKSUM_OFFSET]);
        if stored_checksum != computed {
            return Err(PageStoreError::ChecksumMismatch { expected: stored_checksum, computed });
        }
        let epoch = LittleEndian::read_u64(&buf[8..16]);
        let roots_len = buf[16];
        let mut roots = [NO_PAGE; MAX_ROOTS];
        for (i, root) in roots.iter_mut().enumerate() {
            let off = ROOTS_OFFSET + i * 8;
            *root = LittleEndian::read_u64(&buf[off..off + 8]);
        }
        let free_head = LittleEndian::read_u64(&buf[FREE_HEAD_OFFSET..FREE_HEAD_OFFSET + 8]);
        Ok(RootHeader { epoch, roots_len, roots, free_head })
    }

    /// The committed root addresses, trimmed to `roots_len`.
    pub fn active_roots(&self) -> &[PageAddr] {
        &self.roots[..self.roots_len as usize]
    }
}

/// Manages the two alternating header slot files and picks the
/// higher-epoch valid one on open.
pub struct HeaderSlots {
    paths: [PathBuf; 2],
    /// Which slot index was written last (0 or 1); the next flush writes
    /// to the other one.
    last_written: usize,
}

impl HeaderSlots {
    /// Create a fresh pair of header slots for a new store, both holding
    /// the empty header.
    pub fn create(dir: &Path) -> Result<(Self, RootHeader)> {
        let paths = [dir.join("header.0"), dir.join("header.1")];
        let header = RootHeader::empty();
        let bytes = header.to_bytes()?;
        for path in &paths {
            let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        Ok((HeaderSlots { paths, last_written: 1 }, header))
    }

    /// Open an existing pair of header slots, recovering the higher-epoch
    /// valid one. Errors with [`PageStoreError::NoValidHeader`] if neither
    /// slot validates.
    pub fn open(dir: &Path) -> Result<(Self, RootHeader)> {
        let paths = [dir.join("header.0"), dir.join("header.1")];
        let mut candidates: Vec<(usize, RootHeader)> = Vec::new();
        for (i, path) in paths.iter().enumerate() {
            if let Ok(header) = Self::read_slot(path) {
                candidates.push((i, header));
            }
        }
        let (slot, header) = candidates
            .into_iter()
            .max_by_key(|(_, h)| h.epoch)
            .ok_or_else(|| PageStoreError::NoValidHeader(dir.to_path_buf()))?;
        Ok((HeaderSlots { paths, last_written: slot }, header))
    }

    fn read_slot(path: &Path) -> Result<RootHeader> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut buf)?;
        RootHeader::from_bytes(&buf)
    }

    /// Write and fsync `header` to the slot not used last time, then
    /// remember it as the new "last written" slot.
    pub fn commit(&mut self, header: &RootHeader) -> Result<()> {
        let next_slot = 1 - self.last_written;
        let bytes = header.to_bytes()?;
        let mut file =
            OpenOptions::new().write(true).open(&self.paths[next_slot]).or_else(|_| {
                OpenOptions::new().create(true).write(true).open(&self.paths[next_slot])
            })?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        self.last_written = next_slot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let header = RootHeader {
            epoch: 42,
            roots_len: 3,
            roots: [100, 200, 300, NO_PAGE],
            free_head: 4096,
        };
        let bytes = header.to_bytes().unwrap();
        let parsed = RootHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header, parsed);
        assert_eq!(parsed.active_roots(), &[100, 200, 300]);
    }

    #[test]
    fn detects_checksum_corruption() {
        let header = RootHeader::empty();
        let mut bytes = header.to_bytes().unwrap();
        bytes[20] ^= 0xFF;
        let err = RootHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, PageStoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn create_then_open_recovers_epoch_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (_slots, header) = HeaderSlots::create(dir.path()).unwrap();
        assert_eq!(header.epoch, 0);
        let (_slots2, reopened) = HeaderSlots::open(dir.path()).unwrap();
        assert_eq!(reopened.epoch, 0);
    }

    #[test]
    fn commit_alternates_slots_and_picks_higher_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let (mut slots, _) = HeaderSlots::create(dir.path()).unwrap();

        let h1 = RootHeader { epoch: 1, roots_len: 1, roots: [10, NO_PAGE, NO_PAGE, NO_PAGE], free_head: NO_PAGE };
        slots.commit(&h1).unwrap();
        let (_s, recovered) = HeaderSlots::open(dir.path()).unwrap();
        assert_eq!(recovered.epoch, 1);

        let h2 = RootHeader { epoch: 2, roots_len: 1, roots: [20, NO_PAGE, NO_PAGE, NO_PAGE], free_head: NO_PAGE };
        slots.commit(&h2).unwrap();
        let (_s, recovered2) = HeaderSlots::open(dir.path()).unwrap();
        assert_eq!(recovered2.epoch, 2);
        assert_eq!(recovered2.active_roots(), &[20]);
    }

    #[test]
    fn a_torn_slot_falls_back_to_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let (mut slots, _) = HeaderSlots::create(dir.path()).unwrap();
        let h1 = RootHeader { epoch: 1, roots_len: 1, roots: [10, NO_PAGE, NO_PAGE, NO_PAGE], free_head: NO_PAGE };
        slots.commit(&h1).unwrap();

        // Corrupt the slot that was just written (simulating a torn write).
        let written_path = dir.path().join(format!("header.{}", slots.last_written));
        let mut bytes = std::fs::read(&written_path).unwrap();
        bytes[30] ^= 0xFF;
        std::fs::write(&written_path, bytes).unwrap();

        let (_s, recovered) = HeaderSlots::open(dir.path()).unwrap();
        assert_eq!(recovered.epoch, 0);
    }
}
