//! Hybrid Logical Clock.
//!
//! `Hlc` is a `(physical_ms, logical)` pair giving a total, monotonic order
//! to events observed by a single process, with a `merge` operation so two
//! clocks from different processes can be reconciled into one that is `>=`
//! both inputs.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A hybrid logical clock value: wall-clock milliseconds paired with a
/// logical counter that disambiguates events within the same millisecond.
///
/// Ordered lexicographically by `(physical, logical)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hlc {
    physical: i64,
    logical: u32,
}

impl Hlc {
    /// The zero clock, earlier than any clock produced by `now`/`tick`.
    pub const ZERO: Hlc = Hlc { physical: 0, logical: 0 };

    /// Construct an `Hlc` from raw parts.
    pub const fn new(physical: i64, logical: u32) -> Self {
        Hlc { physical, logical }
    }

    /// Milliseconds since the Unix epoch.
    pub const fn physical(&self) -> i64 {
        self.physical
    }

    /// Logical tie-breaker within `physical`.
    pub const fn logical(&self) -> u32 {
        self.logical
    }

    /// A clock reading from wall-clock time with logical component zero.
    ///
    /// Does not advance any process-local state; callers that need strict
    /// monotonicity across calls should use [`HlcClock::tick`] instead.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Hlc { physical: millis, logical: 0 }
    }

    /// Merge two clocks, returning a value `>=` both inputs.
    ///
    /// If the physical components are equal, the logical component is the
    /// max of the two plus one, so `merge(h, h)` is always strictly greater
    /// than `h`.
    pub fn merge(a: Hlc, b: Hlc) -> Hlc {
        match a.physical.cmp(&b.physical) {
            std::cmp::Ordering::Greater => a,
            std::cmp::Ordering::Less => b,
            std::cmp::Ordering::Equal => Hlc {
                physical: a.physical,
                logical: a.logical.max(b.logical) + 1,
            },
        }
    }
}

impl Default for Hlc {
    fn default() -> Self {
        Hlc::ZERO
    }
}

impl std::fmt::Display for Hlc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.physical, self.logical)
    }
}

/// A process-local, monotonically ticking HLC source.
///
/// Each `Workspace` owns exactly one `HlcClock`; there is no global
/// singleton. Ticks from a single `HlcClock` are strictly increasing.
pub struct HlcClock {
    last: parking_lot::Mutex<Hlc>,
}

impl HlcClock {
    /// Create a clock starting at `Hlc::ZERO`.
    pub fn new() -> Self {
        HlcClock { last: parking_lot::Mutex::new(Hlc::ZERO) }
    }

    /// Create a clock seeded at a specific starting point, e.g. after
    /// recovering the highest HLC previously observed in a registry.
    pub fn starting_at(hlc: Hlc) -> Self {
        HlcClock { last: parking_lot::Mutex::new(hlc) }
    }

    /// Produce the next clock value, strictly greater than every value
    /// previously returned by this clock.
    ///
    /// If wall-clock time has advanced past the last tick, the physical
    /// component adopts wall-clock time and the logical component resets
    /// to zero. Otherwise (clock hasn't advanced, or went backwards) the
    /// last physical time is reused and the logical component increments.
    pub fn tick(&self) -> Hlc {
        let wall = Hlc::now().physical;
        let mut last = self.last.lock();
        let next = if wall > last.physical {
            Hlc { physical: wall, logical: 0 }
        } else {
            Hlc { physical: last.physical, logical: last.logical + 1 }
        };
        *last = next;
        next
    }

    /// Observe a remote clock, merging it into the local state so the next
    /// `tick` is guaranteed to exceed both the local and remote history.
    pub fn observe(&self, remote: Hlc) -> Hlc {
        let mut last = self.last.lock();
        let merged = Hlc::merge(*last, remote);
        *last = merged;
        merged
    }

    /// The most recent value returned by `tick` or `observe`, without
    /// advancing the clock.
    pub fn current(&self) -> Hlc {
        *self.last.lock()
    }
}

impl Default for HlcClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Hlc::new(100, 5) < Hlc::new(101, 0));
        assert!(Hlc::new(100, 5) < Hlc::new(100, 6));
        assert_eq!(Hlc::new(100, 5), Hlc::new(100, 5));
    }

    #[test]
    fn merge_is_at_least_both_inputs() {
        let a = Hlc::new(100, 3);
        let b = Hlc::new(90, 7);
        let merged = Hlc::merge(a, b);
        assert!(merged >= a);
        assert!(merged >= b);
    }

    proptest::proptest! {
        #[test]
        fn merge_dominates_both_inputs_for_any_pair(
            a_physical in 0i64..1_000_000,
            a_logical in 0u32..1000,
            b_physical in 0i64..1_000_000,
            b_logical in 0u32..1000,
        ) {
            let a = Hlc::new(a_physical, a_logical);
            let b = Hlc::new(b_physical, b_logical);
            let merged = Hlc::merge(a, b);
            proptest::prop_assert!(merged >= a);
            proptest::prop_assert!(merged >= b);
        }
    }

    #[test]
    fn merge_of_equal_physical_bumps_logical() {
        let a = Hlc::new(100, 3);
        let b = Hlc::new(100, 9);
        let merged = Hlc::merge(a, b);
        assert_eq!(merged, Hlc::new(100, 10));
    }

    #[test]
    fn clock_ticks_strictly_increase() {
        let clock = HlcClock::new();
        let mut prev = clock.tick();
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next > prev, "tick must strictly increase");
            prev = next;
        }
    }

    #[test]
    fn clock_observe_advances_past_remote() {
        let clock = HlcClock::new();
        let remote = Hlc::new(i64::MAX / 2, 0);
        let observed = clock.observe(remote);
        assert!(observed >= remote);
        let next = clock.tick();
        assert!(next > observed);
    }

    #[test]
    fn display_format() {
        assert_eq!(Hlc::new(1500, 2).to_string(), "1500.2");
    }
}
