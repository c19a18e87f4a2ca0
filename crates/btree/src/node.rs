//! Node layout and (de)serialization.

use crate::error::{BTreeError, Result};
use serde::{Deserialize, Serialize};
use yggdrasil_pagestore::PageAddr;

/// One B-Tree node: a leaf holding sorted key/value pairs, or an internal
/// node holding sorted separator keys and child page addresses.
///
/// Invariant: for an `Internal` node, `children.len() == keys.len() + 1`.
/// `children[i]` holds every key `< keys[i]` (for `i < keys.len()`);
/// `children[keys.len()]` holds every key `>= keys[keys.len() - 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    /// A leaf: sorted `(key, value)` pairs.
    Leaf {
        /// Sorted, unique by key.
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    },
    /// An internal routing node.
    Internal {
        /// Separator keys, sorted, `children.len() - 1` of them.
        keys: Vec<Vec<u8>>,
        /// Child page addresses.
        children: Vec<PageAddr>,
    },
}

impl Node {
    /// A new, empty leaf.
    pub fn empty_leaf() -> Self {
        Node::Leaf { entries: Vec::new() }
    }

    /// Encode to MessagePack, erroring if the result wouldn't fit in one
    /// page.
    pub fn encode(&self, page_size: usize) -> Result<Vec<u8>> {
        let bytes = rmp_serde::to_vec(self)
            .map_err(|e| BTreeError::CorruptNode { addr: 0, message: e.to_string() })?;
        if bytes.len() > page_size {
            return Err(BTreeError::NodeTooLarge { encoded_len: bytes.len(), page_size });
        }
        Ok(bytes)
    }

    /// Decode a node from a page's bytes. `page` may be longer than the
    /// encoded payload (it's zero-padded to the page size); MessagePack
    /// decoding naturally stops at the end of the real payload.
    pub fn decode(page: &[u8], addr: PageAddr) -> Result<Self> {
        rmp_serde::from_slice(page)
            .map_err(|e| BTreeError::CorruptNode { addr, message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_round_trips() {
        let node = Node::Leaf {
            entries: vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())],
        };
        let bytes = node.encode(4096).unwrap();
        let decoded = Node::decode(&bytes, 0).unwrap();
        match decoded {
            Node::Leaf { entries } => assert_eq!(entries.len(), 2),
            _ => panic!("expected leaf"),
        }
    }

    #[test]
    fn internal_round_trips() {
        let node = Node::Internal { keys: vec![b"m".to_vec()], children: vec![10, 20] };
        let bytes = node.encode(4096).unwrap();
        let decoded = Node::decode(&bytes, 0).unwrap();
        match decoded {
            Node::Internal { keys, children } => {
                assert_eq!(keys, vec![b"m".to_vec()]);
                assert_eq!(children, vec![10, 20]);
            }
            _ => panic!("expected internal"),
        }
    }

    #[test]
    fn oversized_node_is_rejected() {
        let node = Node::Leaf { entries: vec![(vec![0u8; 100], vec![0u8; 100])] };
        let err = node.encode(16).unwrap_err();
        assert!(matches!(err, BTreeError::NodeTooLarge { .. }));
    }
}
