//! On-disk free-list chain encoding.
//!
//! A free list longer than one page spills across a singly-linked chain of
//! pages, each laid out as `[next: u64][count: u32][addrs: u64 * count]`.
//! Chain pages are always allocated by tail-bump (never drawn from the
//! free list itself), which sidesteps the otherwise-recursive problem of
//! needing a free page to record which pages are free.

use crate::error::{PageStoreError, Result};
use crate::page::{PageAddr, NO_PAGE};
use byteorder::{ByteOrder, LittleEndian};

const NEXT_OFFSET: usize = 0;
const COUNT_OFFSET: usize = 8;
const ADDRS_OFFSET: usize = 12;

/// How many page addresses fit in one chain page of the given size.
pub fn capacity_per_page(page_size: usize) -> usize {
    (page_size - ADDRS_OFFSET) / 8
}

/// Encode one chain link: up to `capacity_per_page(page.len())` addresses
/// from `addrs`, plus the address of the next chain page (or `NO_PAGE` for
/// the last link). Returns the number of addresses consumed.
pub fn encode_link(page: &mut [u8], addrs: &[PageAddr], next: PageAddr) -> usize {
    let cap = capacity_per_page(page.len());
    let n = addrs.len().min(cap);
    LittleEndian::write_u64(&mut page[NEXT_OFFSET..NEXT_OFFSET + 8], next);
    LittleEndian::write_u32(&mut page[COUNT_OFFSET..COUNT_OFFSET + 4], n as u32);
    for (i, addr) in addrs[..n].iter().enumerate() {
        let off = ADDRS_OFFSET + i * 8;
        LittleEndian::write_u64(&mut page[off..off + 8], *addr);
    }
    n
}

/// Decode one chain link, returning `(addrs, next)`.
pub fn decode_link(page: &[u8]) -> Result<(Vec<PageAddr>, PageAddr)> {
    if page.len() < ADDRS_OFFSET {
        return Err(PageStoreError::PayloadTooLarge { len: page.len(), page_size: ADDRS_OFFSET });
    }
    let next = LittleEndian::read_u64(&page[NEXT_OFFSET..NEXT_OFFSET + 8]);
    let count = LittleEndian::read_u32(&page[COUNT_OFFSET..COUNT_OFFSET + 4]) as usize;
    let cap = capacity_per_page(page.len());
    let count = count.min(cap);
    let mut addrs = Vec::with_capacity(count);
    for i in 0..count {
        let off = ADDRS_OFFSET + i * 8;
        addrs.push(LittleEndian::read_u64(&page[off..off + 8]));
    }
    Ok((addrs, next))
}

/// Split `addrs` into chain links of at most `capacity_per_page(page_size)`
/// entries each, in the order they should be written (tail link first is
/// NOT required; callers assign addresses to each link and wire up `next`
/// pointers themselves).
pub fn chunk(addrs: &[PageAddr], page_size: usize) -> Vec<&[PageAddr]> {
    let cap = capacity_per_page(page_size).max(1);
    if addrs.is_empty() {
        return Vec::new();
    }
    addrs.chunks(cap).collect()
}

/// Convenience for an empty free list: no chain pages, head is `NO_PAGE`.
pub const EMPTY_HEAD: PageAddr = NO_PAGE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let page_size = 64usize;
        let mut page = vec![0u8; page_size];
        let addrs = vec![10, 20, 30];
        let n = encode_link(&mut page, &addrs, 999);
        assert_eq!(n, 3);
        let (decoded, next) = decode_link(&page).unwrap();
        assert_eq!(decoded, addrs);
        assert_eq!(next, 999);
    }

    #[test]
    fn chunk_respects_page_capacity() {
        let page_size = 4096usize;
        let cap = capacity_per_page(page_size);
        let addrs: Vec<PageAddr> = (0..(cap * 2 + 5) as u64).collect();
        let chunks = chunk(&addrs, page_size);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), cap);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn empty_addrs_chunk_to_nothing() {
        assert!(chunk(&[], 4096).is_empty());
    }
}
