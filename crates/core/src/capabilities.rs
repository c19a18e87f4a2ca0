//! The capability bitfield a `System` declares.
//!
//! Capabilities gate which operations the core may invoke on a system; see
//! [`crate::system`] for the traits each capability corresponds to.

use serde::{Deserialize, Serialize};

/// Flags a system declares about which optional protocols it implements.
///
/// This is a small bitfield rather than a trait-object hierarchy: a system
/// is a single concrete value whose capabilities are queried once and
/// checked before every capability-gated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    bits: u16,
}

macro_rules! capability_flag {
    ($index:expr, $flag_name:ident, $setter:ident, $doc:literal) => {
        #[doc = $doc]
        pub fn $flag_name(&self) -> bool {
            self.bits & (1 << $index) != 0
        }

        #[doc = concat!("Builder method setting the `", stringify!($flag_name), "` flag.")]
        pub fn $setter(mut self, value: bool) -> Self {
            if value {
                self.bits |= 1 << $index;
            } else {
                self.bits &= !(1 << $index);
            }
            self
        }
    };
}

impl Capabilities {
    /// The empty capability set (no optional protocol is implemented).
    pub const NONE: Capabilities = Capabilities { bits: 0 };

    capability_flag!(0, snapshotable, with_snapshotable, "Implements `Snapshotable`.");
    capability_flag!(1, branchable, with_branchable, "Implements `Branchable`.");
    capability_flag!(2, committable, with_committable, "Implements `Committable`.");
    capability_flag!(3, graphable, with_graphable, "Implements `Graphable`.");
    capability_flag!(4, mergeable, with_mergeable, "Implements `Mergeable`.");
    capability_flag!(5, watchable, with_watchable, "Implements `Watchable`.");
    capability_flag!(6, garbage_collectable, with_garbage_collectable, "Implements `GarbageCollectable`.");
    capability_flag!(7, commutable, with_commutable, "Commits commute with one another.");
    capability_flag!(8, revertable, with_revertable, "Supports reverting to a prior snapshot.");
    capability_flag!(9, closeable, with_closeable, "Implements `Closeable`.");

    /// The logical AND of two capability sets: a composite system's
    /// capabilities are the meet of its sub-systems' capabilities.
    pub fn meet(self, other: Capabilities) -> Capabilities {
        Capabilities { bits: self.bits & other.bits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_round_trips_flags() {
        let caps = Capabilities::NONE
            .with_snapshotable(true)
            .with_branchable(true)
            .with_mergeable(false);
        assert!(caps.snapshotable());
        assert!(caps.branchable());
        assert!(!caps.mergeable());
        assert!(!caps.watchable());
    }

    #[test]
    fn meet_is_logical_and() {
        let a = Capabilities::NONE.with_snapshotable(true).with_branchable(true);
        let b = Capabilities::NONE.with_snapshotable(true).with_branchable(false);
        let meet = a.meet(b);
        assert!(meet.snapshotable());
        assert!(!meet.branchable());
    }

    #[test]
    fn meet_with_none_is_none() {
        let a = Capabilities::NONE.with_snapshotable(true).with_mergeable(true);
        assert_eq!(a.meet(Capabilities::NONE), Capabilities::NONE);
    }
}
