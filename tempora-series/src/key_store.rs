//! Key storage for sorted series
//!
//! Keys are stored in one of two physical shapes behind a single
//! logical "index to key" contract:
//!
//! - **Dense**: a sorted array, one slot per key.
//! - **Regular**: a two-element descriptor `[first, last]` plus the
//!   constant step between consecutive keys; the key at index `i` is
//!   `first + i * step`. Requires a diffable comparer.
//!
//! A regular store silently materialises to dense the moment an
//! operation breaks the arithmetic progression. A dense store is never
//! promoted back to regular at runtime.
//!
//! All buffers are rented from a [`BufferPool`] and handed back when
//! replaced, so optimistic readers holding a stale view keep pointing
//! at live allocations.

use std::cmp::Ordering;
use std::mem;

use tempora_core::KeyComparer;

use crate::pool::{grown_capacity, reserve_one, BufferPool};

/// Physical key storage for one series
pub(crate) enum KeyStore<K> {
    /// Sorted array of keys; `Vec` length is the live key count
    Dense(Vec<K>),
    /// `buf` holds `[first]` or `[first, last]`; `len` is the live key
    /// count and `step` the constant spacing (meaningful for `len >= 2`)
    Regular { buf: Vec<K>, step: i64, len: usize },
}

impl<K: Copy> KeyStore<K> {
    /// Creates an empty store; diffable comparers start regular
    pub(crate) fn new(diffable: bool, initial_capacity: usize, pool: &BufferPool<K>) -> Self {
        if diffable {
            KeyStore::Regular {
                buf: pool.rent(2),
                step: 0,
                len: 0,
            }
        } else {
            KeyStore::Dense(pool.rent(initial_capacity))
        }
    }

    /// Builds a dense store around an already-sorted buffer
    pub(crate) fn from_dense(buf: Vec<K>) -> Self {
        KeyStore::Dense(buf)
    }

    /// Builds a regular store from its descriptor
    ///
    /// `step` must be positive when `len >= 2`.
    pub(crate) fn from_regular<C: KeyComparer<K>>(
        first: K,
        step: i64,
        len: usize,
        cmp: &C,
        pool: &BufferPool<K>,
    ) -> Self {
        let mut buf = pool.rent(2);
        if len > 0 {
            buf.push(first);
        }
        if len > 1 {
            buf.push(cmp.add(&first, step * (len as i64 - 1)));
        }
        KeyStore::Regular {
            buf,
            step: if len > 1 { step } else { 0 },
            len,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            KeyStore::Dense(v) => v.len(),
            KeyStore::Regular { len, .. } => *len,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn is_regular(&self) -> bool {
        matches!(self, KeyStore::Regular { .. })
    }

    /// Key at index `i`, or `None` past the end
    ///
    /// Every access is bounds-checked: an optimistic reader may call
    /// this against a torn view and relies on getting `None` rather
    /// than a panic.
    pub(crate) fn get<C: KeyComparer<K>>(&self, i: usize, cmp: &C) -> Option<K> {
        match self {
            KeyStore::Dense(v) => v.get(i).copied(),
            KeyStore::Regular { buf, step, len } => {
                if i >= *len {
                    return None;
                }
                if i == 0 {
                    return buf.first().copied();
                }
                if i == *len - 1 {
                    return buf.get(1).copied();
                }
                let first = buf.first().copied()?;
                Some(cmp.add(&first, step * i as i64))
            }
        }
    }

    pub(crate) fn first(&self) -> Option<K> {
        match self {
            KeyStore::Dense(v) => v.first().copied(),
            KeyStore::Regular { buf, len, .. } => {
                if *len == 0 {
                    None
                } else {
                    buf.first().copied()
                }
            }
        }
    }

    pub(crate) fn last<C: KeyComparer<K>>(&self, cmp: &C) -> Option<K> {
        let len = self.len();
        if len == 0 {
            None
        } else {
            self.get(len - 1, cmp)
        }
    }

    /// Index of `key`, or the insertion point that would keep the
    /// store sorted
    ///
    /// Dense stores binary-search; regular stores divide the key
    /// offset by the step. Safe against torn views: a nonsensical
    /// snapshot yields a wrong-but-in-range answer, never a panic.
    pub(crate) fn index_of<C: KeyComparer<K>>(&self, key: &K, cmp: &C) -> Result<usize, usize> {
        match self {
            KeyStore::Dense(v) => {
                let mut lo = 0usize;
                let mut hi = v.len();
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    let Some(probe) = v.get(mid) else {
                        return Err(lo);
                    };
                    match cmp.compare(probe, key) {
                        Ordering::Less => lo = mid + 1,
                        Ordering::Greater => hi = mid,
                        Ordering::Equal => return Ok(mid),
                    }
                }
                Err(lo)
            }
            KeyStore::Regular { buf, step, len } => {
                if *len == 0 {
                    return Err(0);
                }
                let Some(first) = buf.first().copied() else {
                    return Err(0);
                };
                let d = cmp.diff(key, &first);
                if d == 0 {
                    return Ok(0);
                }
                if d < 0 {
                    return Err(0);
                }
                if *len == 1 {
                    return Err(1);
                }
                if *step <= 0 {
                    // torn view; the caller's version check will retry
                    return Err(0);
                }
                let q = d / *step;
                let r = d - q * *step;
                if r == 0 {
                    if (q as usize) < *len {
                        Ok(q as usize)
                    } else {
                        Err(*len)
                    }
                } else {
                    Err(((q as usize) + 1).min(*len))
                }
            }
        }
    }

    /// Appends `key` past the current last key
    ///
    /// The caller guarantees `key` is a new strict maximum. A regular
    /// store stays regular iff the new key lands one step past the
    /// last; otherwise it materialises first.
    pub(crate) fn append<C: KeyComparer<K>>(&mut self, key: K, cmp: &C, pool: &BufferPool<K>) {
        match self {
            KeyStore::Dense(v) => {
                reserve_one(v, pool);
                v.push(key);
            }
            KeyStore::Regular { buf, step, len } => match *len {
                0 => {
                    buf.push(key);
                    *len = 1;
                }
                1 => {
                    let first = buf[0];
                    *step = cmp.diff(&key, &first);
                    buf.push(key);
                    *len = 2;
                }
                _ => {
                    let last = buf[1];
                    if cmp.diff(&key, &last) == *step {
                        buf[1] = key;
                        *len += 1;
                    } else {
                        self.materialise(cmp, pool);
                        self.append(key, cmp, pool);
                    }
                }
            },
        }
    }

    /// Inserts `key` at index `i`, shifting the tail right
    ///
    /// The caller computes `i` via [`index_of`](Self::index_of) and is
    /// responsible for collision detection; inserting on top of an
    /// equal key is a programmer error and panics.
    pub(crate) fn insert_at<C: KeyComparer<K>>(
        &mut self,
        i: usize,
        key: K,
        cmp: &C,
        pool: &BufferPool<K>,
    ) {
        if let Some(existing) = self.get(i, cmp) {
            assert!(
                cmp.compare(&key, &existing) != Ordering::Equal,
                "insert collides with a live key"
            );
        }
        if i == self.len() {
            return self.append(key, cmp, pool);
        }
        match self {
            KeyStore::Dense(v) => {
                reserve_one(v, pool);
                v.insert(i, key);
            }
            KeyStore::Regular { buf, step, len } => {
                if i == 0 && *len == 1 {
                    let only = buf[0];
                    *step = cmp.diff(&only, &key);
                    buf.clear();
                    buf.push(key);
                    buf.push(only);
                    *len = 2;
                } else if i == 0 && cmp.diff(&buf[0], &key) == *step {
                    // prepend one step before first
                    buf[0] = key;
                    *len += 1;
                } else {
                    self.materialise(cmp, pool);
                    self.insert_at(i, key, cmp, pool);
                }
            }
        }
    }

    /// Removes and returns the key at index `i`
    pub(crate) fn remove_at<C: KeyComparer<K>>(
        &mut self,
        i: usize,
        cmp: &C,
        pool: &BufferPool<K>,
    ) -> K {
        match self {
            KeyStore::Dense(v) => v.remove(i),
            KeyStore::Regular { buf, step, len } => match *len {
                0 => panic!("remove from empty key store"),
                1 => {
                    let removed = buf[0];
                    buf.clear();
                    *len = 0;
                    *step = 0;
                    removed
                }
                2 => {
                    let removed = buf[i];
                    if i == 0 {
                        buf[0] = buf[1];
                    }
                    buf.truncate(1);
                    *len = 1;
                    *step = 0;
                    removed
                }
                _ => {
                    if i == 0 {
                        let removed = buf[0];
                        buf[0] = cmp.add(&removed, *step);
                        *len -= 1;
                        removed
                    } else if i == *len - 1 {
                        let removed = buf[1];
                        buf[1] = cmp.add(&removed, -*step);
                        *len -= 1;
                        removed
                    } else {
                        self.materialise(cmp, pool);
                        self.remove_at(i, cmp, pool)
                    }
                }
            },
        }
    }

    /// Removes the index range `[lo, hi)`
    pub(crate) fn remove_range<C: KeyComparer<K>>(
        &mut self,
        lo: usize,
        hi: usize,
        cmp: &C,
        pool: &BufferPool<K>,
    ) {
        debug_assert!(lo < hi && hi <= self.len());
        if lo == 0 && hi == self.len() {
            return self.clear();
        }
        match self {
            KeyStore::Dense(v) => {
                v.drain(lo..hi);
            }
            KeyStore::Regular { buf, step, len } => {
                if lo == 0 {
                    // prefix removal: advance first
                    let remaining = *len - hi;
                    if remaining == 1 {
                        buf[0] = buf[1];
                        buf.truncate(1);
                        *step = 0;
                    } else {
                        buf[0] = cmp.add(&buf[0], *step * hi as i64);
                    }
                    *len = remaining;
                } else if hi == *len {
                    // suffix removal: pull last back
                    if lo == 1 {
                        buf.truncate(1);
                        *step = 0;
                    } else {
                        buf[1] = cmp.add(&buf[0], *step * (lo as i64 - 1));
                    }
                    *len = lo;
                } else {
                    self.materialise(cmp, pool);
                    self.remove_range(lo, hi, cmp, pool);
                }
            }
        }
    }

    /// Removes every key; the physical shape is kept
    pub(crate) fn clear(&mut self) {
        match self {
            KeyStore::Dense(v) => v.clear(),
            KeyStore::Regular { buf, step, len } => {
                buf.clear();
                *step = 0;
                *len = 0;
            }
        }
    }

    /// Demotes a regular store to dense, expanding the descriptor into
    /// explicit keys
    pub(crate) fn materialise<C: KeyComparer<K>>(&mut self, cmp: &C, pool: &BufferPool<K>) {
        let KeyStore::Regular { buf, step, len } = self else {
            return;
        };
        let len = *len;
        let step = *step;
        let mut dense = pool.rent(grown_capacity(0, len.max(1)));
        if let Some(first) = buf.first().copied() {
            for j in 0..len {
                if j == len - 1 && len >= 2 {
                    dense.push(buf[1]);
                } else {
                    dense.push(cmp.add(&first, step * j as i64));
                }
            }
        }
        log::debug!("regular key store demoted to dense at {} keys", len);
        let old = mem::replace(self, KeyStore::Dense(dense));
        if let KeyStore::Regular { buf, .. } = old {
            pool.give_back(buf);
        }
    }

    /// Shrinks a dense buffer to exactly the live key count
    pub(crate) fn trim_excess(&mut self, pool: &BufferPool<K>) {
        if let KeyStore::Dense(v) = self {
            if v.capacity() > v.len() {
                let mut exact = Vec::with_capacity(v.len());
                exact.extend_from_slice(v);
                let old = mem::replace(v, exact);
                pool.give_back(old);
            }
        }
    }

    /// Copies the live keys out as a plain vector
    pub(crate) fn to_vec<C: KeyComparer<K>>(&self, cmp: &C) -> Vec<K> {
        match self {
            KeyStore::Dense(v) => v.clone(),
            KeyStore::Regular { len, .. } => {
                (0..*len).filter_map(|i| self.get(i, cmp)).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempora_core::TickComparer;

    fn regular_store(keys: &[i64]) -> (KeyStore<i64>, TickComparer<i64>, BufferPool<i64>) {
        let cmp = TickComparer::<i64>::new();
        let pool = BufferPool::default();
        let mut store = KeyStore::new(true, 8, &pool);
        for &k in keys {
            store.append(k, &cmp, &pool);
        }
        (store, cmp, pool)
    }

    #[test]
    fn test_arithmetic_keys_stay_regular() {
        let (store, cmp, _pool) = regular_store(&[10, 20, 30]);
        assert!(store.is_regular());
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(0, &cmp), Some(10));
        assert_eq!(store.get(1, &cmp), Some(20));
        assert_eq!(store.get(2, &cmp), Some(30));
        assert_eq!(store.get(3, &cmp), None);
    }

    #[test]
    fn test_irregular_insert_demotes() {
        let (mut store, cmp, pool) = regular_store(&[10, 20, 30]);

        let i = store.index_of(&25, &cmp).unwrap_err();
        assert_eq!(i, 2);
        store.insert_at(i, 25, &cmp, &pool);

        assert!(!store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![10, 20, 25, 30]);
    }

    #[test]
    fn test_irregular_append_demotes() {
        let (mut store, cmp, pool) = regular_store(&[10, 20, 30]);
        store.append(45, &cmp, &pool);
        assert!(!store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![10, 20, 30, 45]);
    }

    #[test]
    fn test_regular_prepend_keeps_shape() {
        let (mut store, cmp, pool) = regular_store(&[20, 30]);
        store.insert_at(0, 10, &cmp, &pool);
        assert!(store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![10, 20, 30]);
    }

    #[test]
    fn test_index_of_regular() {
        let (store, cmp, _pool) = regular_store(&[10, 20, 30]);
        assert_eq!(store.index_of(&20, &cmp), Ok(1));
        assert_eq!(store.index_of(&5, &cmp), Err(0));
        assert_eq!(store.index_of(&25, &cmp), Err(2));
        assert_eq!(store.index_of(&40, &cmp), Err(3));
    }

    #[test]
    fn test_index_of_dense() {
        let cmp = TickComparer::<i64>::new();
        let pool = BufferPool::default();
        let mut store = KeyStore::new(false, 8, &pool);
        for k in [10, 20, 30] {
            store.append(k, &cmp, &pool);
        }
        assert!(!store.is_regular());
        assert_eq!(store.index_of(&30, &cmp), Ok(2));
        assert_eq!(store.index_of(&15, &cmp), Err(1));
        assert_eq!(store.index_of(&35, &cmp), Err(3));
    }

    #[test]
    fn test_remove_at_edges_keeps_regular() {
        let (mut store, cmp, pool) = regular_store(&[10, 20, 30, 40]);

        assert_eq!(store.remove_at(0, &cmp, &pool), 10);
        assert!(store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![20, 30, 40]);

        assert_eq!(store.remove_at(2, &cmp, &pool), 40);
        assert!(store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![20, 30]);
    }

    #[test]
    fn test_remove_at_interior_demotes() {
        let (mut store, cmp, pool) = regular_store(&[10, 20, 30, 40]);
        assert_eq!(store.remove_at(1, &cmp, &pool), 20);
        assert!(!store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![10, 30, 40]);
    }

    #[test]
    fn test_remove_down_to_one_clears_step() {
        let (mut store, cmp, pool) = regular_store(&[10, 20]);
        assert_eq!(store.remove_at(1, &cmp, &pool), 20);
        assert!(store.is_regular());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0, &cmp), Some(10));

        // a new second key re-derives the step
        store.append(17, &cmp, &pool);
        assert!(store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![10, 17]);
    }

    #[test]
    fn test_remove_range_prefix_and_suffix() {
        let (mut store, cmp, pool) = regular_store(&[10, 20, 30, 40, 50]);
        store.remove_range(0, 2, &cmp, &pool);
        assert!(store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![30, 40, 50]);

        store.remove_range(2, 3, &cmp, &pool);
        assert!(store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![30, 40]);
    }

    #[test]
    fn test_remove_range_interior_demotes() {
        let (mut store, cmp, pool) = regular_store(&[10, 20, 30, 40, 50]);
        store.remove_range(1, 3, &cmp, &pool);
        assert!(!store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![10, 40, 50]);
    }

    #[test]
    #[should_panic(expected = "collides")]
    fn test_insert_collision_is_fatal() {
        let (mut store, cmp, pool) = regular_store(&[10, 20, 30]);
        store.insert_at(1, 20, &cmp, &pool);
    }

    #[test]
    fn test_from_regular_round_trip() {
        let cmp = TickComparer::<i64>::new();
        let pool = BufferPool::default();
        let store = KeyStore::from_regular(100, 5, 4, &cmp, &pool);
        assert!(store.is_regular());
        assert_eq!(store.to_vec(&cmp), vec![100, 105, 110, 115]);
    }
}
