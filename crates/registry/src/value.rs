//! The persisted value blob: everything about an entry not already
//! present in its key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use yggdrasil_core::{RegistryEntry, SnapshotId};

/// `{parent_ids, message, metadata}` — the fields of a [`RegistryEntry`]
/// that aren't already encoded into the TSBS/SBTS/STBH key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryValue {
    pub parent_ids: Vec<SnapshotId>,
    pub message: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl From<&RegistryEntry> for EntryValue {
    fn from(entry: &RegistryEntry) -> Self {
        EntryValue {
            parent_ids: entry.parent_ids.clone(),
            message: entry.message.clone(),
            metadata: entry.metadata.clone(),
        }
    }
}

impl EntryValue {
    /// Encode via MessagePack.
    pub fn encode(&self) -> Vec<u8> {
        rmp_serde::to_vec(self).expect("EntryValue encoding is infallible")
    }

    /// Decode a previously-encoded value.
    pub fn decode(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let value = EntryValue {
            parent_ids: vec![SnapshotId::new("p1")],
            message: Some("hi".into()),
            metadata: BTreeMap::from([("k".to_string(), "v".to_string())]),
        };
        let bytes = value.encode();
        let decoded = EntryValue::decode(&bytes).unwrap();
        assert_eq!(decoded.parent_ids, value.parent_ids);
        assert_eq!(decoded.message, value.message);
        assert_eq!(decoded.metadata, value.metadata);
    }
}
