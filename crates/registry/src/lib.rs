//! The snapshot registry: a persistent, multi-index temporal database
//! cataloguing every `(snapshot, system, branch, time)` observation ever
//! made, over three B-tree-backed indices sharing one page store.

#![warn(missing_docs)]

mod error;
mod keys;
mod mirror;
mod registry;
mod value;

pub use keys::{encode_sbts, encode_sbts_prefix, encode_stbh, encode_tsbs};
pub use registry::SnapshotRegistry;
pub use value::EntryValue;
