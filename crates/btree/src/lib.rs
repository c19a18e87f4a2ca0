//! Copy-on-write B-Tree over [`yggdrasil_pagestore`].
//!
//! Mutations never overwrite a page in place: they rewrite the path from
//! root to leaf onto fresh pages and report superseded pages back to the
//! page store via `mark_freed`, so a root captured before a mutation
//! remains a fully valid, independently readable tree after it.

#![warn(missing_docs)]

mod error;
mod node;
mod tree;

pub use error::{BTreeError, Result};
pub use node::Node;
pub use tree::{BTree, DEFAULT_FANOUT};
