//! Opaque identifiers used throughout the core.
//!
//! These are thin newtypes over `String` rather than bare `String` so that
//! call sites can't accidentally pass a branch name where a system id is
//! expected. The core never interprets the contents of any of these ids;
//! uniqueness and meaning are entirely owned by the adapter that minted
//! them.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wrap a string as this id type.
            pub fn new(s: impl Into<String>) -> Self {
                $name(s.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self, returning the underlying string.
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_id!(SnapshotId, "Opaque snapshot identifier, unique only within a system.");
opaque_id!(SystemId, "Opaque stable identifier for a managed system instance.");
opaque_id!(BranchName, "Opaque branch name, scoped to a single system.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_roundtrips_inner_string() {
        let id = SystemId::new("git:main-repo");
        assert_eq!(id.as_str(), "git:main-repo");
        assert_eq!(id.to_string(), "git:main-repo");
    }

    #[test]
    fn ordering_is_lexicographic_on_inner_string() {
        let a = SnapshotId::from("a");
        let b = SnapshotId::from("b");
        assert!(a < b);
    }

    #[test]
    fn distinct_id_types_do_not_mix() {
        fn takes_system_id(_: &SystemId) {}
        let sys = SystemId::new("s1");
        takes_system_id(&sys);
    }
}
