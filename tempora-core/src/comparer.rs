//! Key comparers
//!
//! A [`KeyComparer`] supplies the total order a sorted series is built
//! on. A comparer may additionally be *diffable*: able to subtract two
//! keys into a signed 64-bit offset and add such an offset back to a
//! key. Diffable key spaces allow the series to store arithmetically
//! regular key runs as a constant-space `(first, step)` descriptor
//! instead of a dense array.

use std::cmp::Ordering;
use std::marker::PhantomData;

/// Total order over a key type, with an optional diffable capability
///
/// The diffable capability obeys three laws:
///
/// - `diff(add(a, d), a) == d` for every representable offset `d`
/// - `compare(add(a, d), add(b, d)) == compare(a, b)`
/// - `diff` is antisymmetric and additive:
///   `diff(a, c) == diff(a, b) + diff(b, c)`
///
/// Callers must check [`is_diffable`](KeyComparer::is_diffable) before
/// calling [`diff`](KeyComparer::diff) or [`add`](KeyComparer::add);
/// invoking either on a non-diffable comparer is a programmer error and
/// panics. The capability is fixed for the comparer's lifetime, so the
/// check is needed once, at series construction.
pub trait KeyComparer<K> {
    /// Compares two keys
    fn compare(&self, a: &K, b: &K) -> Ordering;

    /// True iff this comparer supports `diff`/`add`
    fn is_diffable(&self) -> bool {
        false
    }

    /// Signed distance from `b` to `a`
    fn diff(&self, _a: &K, _b: &K) -> i64 {
        panic!("comparer is not diffable");
    }

    /// The key at signed distance `delta` from `a`
    fn add(&self, _a: &K, _delta: i64) -> K {
        panic!("comparer is not diffable");
    }
}

/// Comparer backed by the key type's own `Ord`, without the diffable
/// capability
///
/// Series built over this comparer always store their keys densely.
#[derive(Debug, Clone, Copy)]
pub struct DefaultComparer<K> {
    _marker: PhantomData<fn() -> K>,
}

impl<K> DefaultComparer<K> {
    /// Creates the comparer
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K> Default for DefaultComparer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord> KeyComparer<K> for DefaultComparer<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Key types with native signed-offset arithmetic
///
/// Implemented for the primitive integer key types used for tick
/// counts, sequence numbers and epoch timestamps. Offsets use wrapping
/// arithmetic; the comparer laws hold for every offset representable
/// without overflow.
pub trait DiffableKey: Ord + Copy {
    /// Signed distance from `other` to `self`
    fn diff(self, other: Self) -> i64;
    /// The key at signed distance `delta` from `self`
    fn add(self, delta: i64) -> Self;
}

macro_rules! impl_diffable_key {
    ($($t:ty),*) => {
        $(
            impl DiffableKey for $t {
                #[inline]
                fn diff(self, other: Self) -> i64 {
                    (self as i64).wrapping_sub(other as i64)
                }

                #[inline]
                fn add(self, delta: i64) -> Self {
                    (self as i64).wrapping_add(delta) as $t
                }
            }
        )*
    };
}

impl_diffable_key!(i32, u32, i64, u64);

/// Diffable comparer for integer-like keys
///
/// This is the comparer of choice for timestamped series whose keys
/// are ticks at a fixed resolution: consecutive keys at a constant
/// spacing keep the series in its regular representation.
#[derive(Debug, Clone, Copy)]
pub struct TickComparer<K> {
    _marker: PhantomData<fn() -> K>,
}

impl<K> TickComparer<K> {
    /// Creates the comparer
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K> Default for TickComparer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: DiffableKey> KeyComparer<K> for TickComparer<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }

    fn is_diffable(&self) -> bool {
        true
    }

    fn diff(&self, a: &K, b: &K) -> i64 {
        a.diff(*b)
    }

    fn add(&self, a: &K, delta: i64) -> K {
        a.add(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_comparer_laws() {
        let cmp = TickComparer::<i64>::new();

        for (a, b) in [(0i64, 0i64), (10, 3), (-5, 40), (1_000_000, -7)] {
            let d = cmp.diff(&a, &b);
            assert_eq!(cmp.add(&b, d), a);
            assert_eq!(cmp.compare(&cmp.add(&a, 13), &cmp.add(&b, 13)), cmp.compare(&a, &b));
        }

        // additivity
        let (a, b, c) = (100i64, 40i64, -3i64);
        assert_eq!(cmp.diff(&a, &c), cmp.diff(&a, &b) + cmp.diff(&b, &c));
    }

    #[test]
    fn test_tick_comparer_unsigned() {
        let cmp = TickComparer::<u64>::new();
        assert_eq!(cmp.diff(&10u64, &4u64), 6);
        assert_eq!(cmp.diff(&4u64, &10u64), -6);
        assert_eq!(cmp.add(&4u64, 6), 10u64);
    }

    #[test]
    fn test_default_comparer_not_diffable() {
        let cmp = DefaultComparer::<String>::new();
        assert!(!cmp.is_diffable());
        assert_eq!(
            cmp.compare(&"a".to_string(), &"b".to_string()),
            Ordering::Less
        );
    }

    #[test]
    #[should_panic(expected = "not diffable")]
    fn test_default_comparer_diff_panics() {
        let cmp = DefaultComparer::<i64>::new();
        cmp.diff(&1, &2);
    }
}
