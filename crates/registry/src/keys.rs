//! On-disk key encodings and their in-memory mirror equivalents.
//!
//! Each index has a byte encoding (used for the persisted B-trees, field
//! order chosen so lexicographic byte order matches the intended scan
//! order) and a structured mirror key (a plain Rust tuple-of-fields used
//! for the in-memory `BTreeMap`s, whose derived `Ord` reproduces the same
//! relative order without re-encoding on every comparison).

use crate::error::{RegistryError, Result};
use byteorder::{BigEndian, ByteOrder};
use std::cmp::Reverse;
use yggdrasil_core::{BranchName, Hlc, SnapshotId, SystemId};

fn push_len8(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    if bytes.len() > u8::MAX as usize {
        return Err(RegistryError::ComponentTooLong(bytes.len()).into());
    }
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_len8(buf: &[u8], pos: &mut usize) -> &[u8] {
    let len = buf[*pos] as usize;
    *pos += 1;
    let out = &buf[*pos..*pos + len];
    *pos += len;
    out
}

/// `be_u64(physical) || be_u32(logical) || len8(system_id) || system_id || len8(branch) || branch || snapshot_id`
pub fn encode_tsbs(hlc: Hlc, system_id: &SystemId, branch: &BranchName, snapshot_id: &SnapshotId) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut tmp8 = [0u8; 8];
    BigEndian::write_i64(&mut tmp8, hlc.physical());
    buf.extend_from_slice(&tmp8);
    let mut tmp4 = [0u8; 4];
    BigEndian::write_u32(&mut tmp4, hlc.logical());
    buf.extend_from_slice(&tmp4);
    push_len8(&mut buf, system_id.as_str().as_bytes())?;
    push_len8(&mut buf, branch.as_str().as_bytes())?;
    buf.extend_from_slice(snapshot_id.as_str().as_bytes());
    Ok(buf)
}

/// Decode a TSBS key back into its four components.
pub fn decode_tsbs(bytes: &[u8]) -> (Hlc, SystemId, BranchName, SnapshotId) {
    let physical = BigEndian::read_i64(&bytes[0..8]);
    let logical = BigEndian::read_u32(&bytes[8..12]);
    let mut pos = 12;
    let system_id = SystemId::new(String::from_utf8_lossy(read_len8(bytes, &mut pos)).into_owned());
    let branch = BranchName::new(String::from_utf8_lossy(read_len8(bytes, &mut pos)).into_owned());
    let snapshot_id = SnapshotId::new(String::from_utf8_lossy(&bytes[pos..]).into_owned());
    (Hlc::new(physical, logical), system_id, branch, snapshot_id)
}

/// `len8(system_id) || system_id || len8(branch) || branch || be_u64(~physical) || be_u32(~logical) || snapshot_id`
pub fn encode_sbts(system_id: &SystemId, branch: &BranchName, hlc: Hlc, snapshot_id: &SnapshotId) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    push_len8(&mut buf, system_id.as_str().as_bytes())?;
    push_len8(&mut buf, branch.as_str().as_bytes())?;
    let mut tmp8 = [0u8; 8];
    BigEndian::write_u64(&mut tmp8, !(hlc.physical() as u64));
    buf.extend_from_slice(&tmp8);
    let mut tmp4 = [0u8; 4];
    BigEndian::write_u32(&mut tmp4, !hlc.logical());
    buf.extend_from_slice(&tmp4);
    buf.extend_from_slice(snapshot_id.as_str().as_bytes());
    Ok(buf)
}

/// Just the `len8(system_id) || system_id || len8(branch) || branch` prefix,
/// for per-`(system, branch)` history prefix scans.
pub fn encode_sbts_prefix(system_id: &SystemId, branch: &BranchName) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    push_len8(&mut buf, system_id.as_str().as_bytes())?;
    push_len8(&mut buf, branch.as_str().as_bytes())?;
    Ok(buf)
}

/// `len8(snapshot_id) || snapshot_id || len8(system_id) || system_id || len8(branch) || branch || be_u64(physical) || be_u32(logical)`
pub fn encode_stbh(snapshot_id: &SnapshotId, system_id: &SystemId, branch: &BranchName, hlc: Hlc) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    push_len8(&mut buf, snapshot_id.as_str().as_bytes())?;
    push_len8(&mut buf, system_id.as_str().as_bytes())?;
    push_len8(&mut buf, branch.as_str().as_bytes())?;
    let mut tmp8 = [0u8; 8];
    BigEndian::write_i64(&mut tmp8, hlc.physical());
    buf.extend_from_slice(&tmp8);
    let mut tmp4 = [0u8; 4];
    BigEndian::write_u32(&mut tmp4, hlc.logical());
    buf.extend_from_slice(&tmp4);
    Ok(buf)
}

/// The in-memory mirror's TSBS ordering key: temporal, ascending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TsbsMirrorKey {
    pub hlc: Hlc,
    pub system_id: SystemId,
    pub branch: BranchName,
    pub snapshot_id: SnapshotId,
}

/// The in-memory mirror's SBTS ordering key: per-system, newest-first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SbtsMirrorKey {
    pub system_id: SystemId,
    pub branch: BranchName,
    pub hlc_desc: Reverse<Hlc>,
    pub snapshot_id: SnapshotId,
}

/// The in-memory mirror's STBH ordering key: reverse snapshot lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StbhMirrorKey {
    pub snapshot_id: SnapshotId,
    pub system_id: SystemId,
    pub branch: BranchName,
    pub hlc: Hlc,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (SystemId, BranchName, SnapshotId) {
        (SystemId::new("git"), BranchName::new("main"), SnapshotId::new("snap-1"))
    }

    #[test]
    fn tsbs_round_trips() {
        let (sys, branch, snap) = ids();
        let hlc = Hlc::new(1000, 2);
        let bytes = encode_tsbs(hlc, &sys, &branch, &snap).unwrap();
        let (d_hlc, d_sys, d_branch, d_snap) = decode_tsbs(&bytes);
        assert_eq!(d_hlc, hlc);
        assert_eq!(d_sys, sys);
        assert_eq!(d_branch, branch);
        assert_eq!(d_snap, snap);
    }

    #[test]
    fn tsbs_byte_order_matches_hlc_order() {
        let (sys, branch, snap) = ids();
        let earlier = encode_tsbs(Hlc::new(100, 0), &sys, &branch, &snap).unwrap();
        let later = encode_tsbs(Hlc::new(200, 0), &sys, &branch, &snap).unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn sbts_byte_order_is_descending_in_hlc() {
        let (sys, branch, snap) = ids();
        let earlier = encode_sbts(&sys, &branch, Hlc::new(100, 0), &snap).unwrap();
        let later = encode_sbts(&sys, &branch, Hlc::new(200, 0), &snap).unwrap();
        assert!(later < earlier, "descending time should sort the later HLC first");
    }

    #[test]
    fn sbts_prefix_is_a_true_prefix_of_the_full_key() {
        let (sys, branch, snap) = ids();
        let prefix = encode_sbts_prefix(&sys, &branch).unwrap();
        let full = encode_sbts(&sys, &branch, Hlc::new(100, 0), &snap).unwrap();
        assert!(full.starts_with(&prefix));
    }

    #[test]
    fn mirror_keys_order_consistently_with_byte_keys() {
        let (sys, branch, snap) = ids();
        let k1 = TsbsMirrorKey { hlc: Hlc::new(100, 0), system_id: sys.clone(), branch: branch.clone(), snapshot_id: snap.clone() };
        let k2 = TsbsMirrorKey { hlc: Hlc::new(200, 0), system_id: sys, branch, snapshot_id: snap };
        assert!(k1 < k2);
    }
}
