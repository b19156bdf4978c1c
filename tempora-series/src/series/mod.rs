//! Mutable sorted keyed series
//!
//! A [`SortedSeries`] is an ordered mapping from strictly increasing
//! keys to values, designed for a single writer and any number of
//! optimistic readers:
//!
//! - Mutations run inside a write section of the embedded
//!   [`VersionedLock`]; readers validate their snapshot against the
//!   version pair and retry instead of blocking.
//! - A separate *order version* is bumped only by mutations that move
//!   existing entries. Pure tail appends leave it alone, which is what
//!   lets forward-iterating cursors keep moving while a writer streams
//!   data in.
//! - Keys are held in a [`KeyStore`], which keeps arithmetically
//!   regular key runs in constant space.
//!
//! # Thread Safety
//!
//! Keys and values must be `Copy`: an optimistic read section may
//! observe a torn view of the buffers, and the version check can only
//! discard a snapshot that was safe to take in the first place. Buffer
//! replacements go through the shared pool, so a stale reader always
//! points at a live allocation. A series starts in synchronized mode
//! and leaves it only when sealed.
//!
//! # Example
//!
//! ```
//! use tempora_core::TickComparer;
//! use tempora_series::SortedSeries;
//!
//! let series = SortedSeries::new(TickComparer::<i64>::new());
//! series.set(10, 1.0)?;
//! series.set(20, 2.0)?;
//! assert_eq!(series.get(&10)?, 1.0);
//! assert!(series.is_regular());
//! # Ok::<(), tempora_core::Error>(())
//! ```

use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tempora_core::{AppendPolicy, Error, FindResult, Gap, KeyComparer, Lookup, Result};

use crate::config::SeriesConfig;
use crate::key_store::KeyStore;
use crate::lock::VersionedLock;
use crate::notify::UpdateNotifier;
use crate::pool::{reserve_one, BufferPool};

mod cursor;

pub use cursor::{CursorState, SeriesCursor, SeriesIter};

/// The buffers a series protects with its lock
pub(crate) struct SeriesCore<K, V> {
    pub(crate) keys: KeyStore<K>,
    pub(crate) values: Vec<V>,
}

impl<K: Copy, V: Copy> SeriesCore<K, V> {
    /// Entry at index `i`; `None` past the end or on a torn view
    pub(crate) fn entry<C: KeyComparer<K>>(&self, i: usize, cmp: &C) -> Option<(K, V)> {
        let key = self.keys.get(i, cmp)?;
        let value = self.values.get(i).copied()?;
        Some((key, value))
    }
}

/// A consistent single-epoch view of a series, as the serializer
/// consumes it
pub(crate) struct SeriesSnapshot<K, V> {
    pub(crate) len: usize,
    /// Full key array; empty when `regular` carries the descriptor
    pub(crate) keys: Vec<K>,
    pub(crate) values: Vec<V>,
    /// `(first, second)` when the keys are regular with at least two
    /// entries
    pub(crate) regular: Option<(K, K)>,
    pub(crate) version: u64,
    pub(crate) sealed: bool,
}

/// An ordered mapping with versioned lock-free reads and cursors
///
/// See the [module documentation](self) for the concurrency model.
pub struct SortedSeries<K, V, C> {
    core: UnsafeCell<SeriesCore<K, V>>,
    lock: VersionedLock,
    order_version: AtomicU64,
    synchronized: AtomicBool,
    sealed: AtomicBool,
    owner: ThreadId,
    pub(crate) comparer: C,
    notifier: UpdateNotifier,
    key_pool: Arc<BufferPool<K>>,
    value_pool: Arc<BufferPool<V>>,
}

// Readers copy elements out by value and discard any snapshot that
// overlapped a writer, so sharing requires only that the element types
// themselves can move between threads.
unsafe impl<K: Copy + Send, V: Copy + Send, C: Send> Send for SortedSeries<K, V, C> {}
unsafe impl<K: Copy + Send, V: Copy + Send, C: Sync> Sync for SortedSeries<K, V, C> {}

impl<K, V, C> SortedSeries<K, V, C>
where
    K: Copy,
    V: Copy,
    C: KeyComparer<K>,
{
    /// Creates an empty series owned by the calling thread
    pub fn new(comparer: C) -> Self {
        Self::with_config(comparer, SeriesConfig::default())
    }

    /// Creates an empty series with explicit configuration
    pub fn with_config(comparer: C, config: SeriesConfig) -> Self {
        let key_pool = Arc::new(BufferPool::new(config.pool.max_retained));
        let value_pool = Arc::new(BufferPool::new(config.pool.max_retained));
        let keys = KeyStore::new(comparer.is_diffable(), config.initial_capacity, &key_pool);
        let values = value_pool.rent(config.initial_capacity);
        Self::from_parts(keys, values, comparer, 0, false, key_pool, value_pool)
    }

    /// Builds a series from an existing mapping
    ///
    /// The input is sorted and deduplicated (the last value for a
    /// repeated key wins). If the comparer is diffable and the keys
    /// form an arithmetic progression, the series starts regular.
    pub fn from_sorted(pairs: impl IntoIterator<Item = (K, V)>, comparer: C) -> Self {
        Self::from_sorted_with_config(pairs, comparer, SeriesConfig::default())
    }

    /// [`from_sorted`](Self::from_sorted) with explicit configuration
    pub fn from_sorted_with_config(
        pairs: impl IntoIterator<Item = (K, V)>,
        comparer: C,
        config: SeriesConfig,
    ) -> Self {
        let mut pairs: Vec<(K, V)> = pairs.into_iter().collect();
        pairs.sort_by(|a, b| comparer.compare(&a.0, &b.0));

        let mut deduped: Vec<(K, V)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match deduped.last_mut() {
                Some(last) if comparer.compare(&last.0, &key) == Ordering::Equal => {
                    *last = (key, value);
                }
                _ => deduped.push((key, value)),
            }
        }

        let key_pool = Arc::new(BufferPool::new(config.pool.max_retained));
        let value_pool = Arc::new(BufferPool::new(config.pool.max_retained));

        let keys = Self::ingest_keys(&deduped, &comparer, config.initial_capacity, &key_pool);
        let mut values = value_pool.rent(deduped.len().max(config.initial_capacity));
        values.extend(deduped.iter().map(|pair| pair.1));

        Self::from_parts(keys, values, comparer, 0, false, key_pool, value_pool)
    }

    fn ingest_keys(
        pairs: &[(K, V)],
        comparer: &C,
        initial_capacity: usize,
        pool: &BufferPool<K>,
    ) -> KeyStore<K> {
        if comparer.is_diffable() {
            match pairs.len() {
                0 => return KeyStore::new(true, initial_capacity, pool),
                1 => return KeyStore::from_regular(pairs[0].0, 0, 1, comparer, pool),
                _ => {
                    let step = comparer.diff(&pairs[1].0, &pairs[0].0);
                    let regular = pairs
                        .windows(2)
                        .all(|w| comparer.diff(&w[1].0, &w[0].0) == step);
                    if regular {
                        return KeyStore::from_regular(
                            pairs[0].0,
                            step,
                            pairs.len(),
                            comparer,
                            pool,
                        );
                    }
                }
            }
        }
        let mut buf = pool.rent(pairs.len().max(initial_capacity));
        buf.extend(pairs.iter().map(|pair| pair.0));
        KeyStore::from_dense(buf)
    }

    pub(crate) fn from_parts(
        keys: KeyStore<K>,
        values: Vec<V>,
        comparer: C,
        version: u64,
        sealed: bool,
        key_pool: Arc<BufferPool<K>>,
        value_pool: Arc<BufferPool<V>>,
    ) -> Self {
        let notifier = UpdateNotifier::new();
        if sealed {
            notifier.seal();
        }
        Self {
            core: UnsafeCell::new(SeriesCore { keys, values }),
            lock: VersionedLock::with_version(version),
            order_version: AtomicU64::new(0),
            synchronized: AtomicBool::new(!sealed),
            sealed: AtomicBool::new(sealed),
            owner: thread::current().id(),
            comparer,
            notifier,
            key_pool,
            value_pool,
        }
    }

    // ---- read side ----

    /// Runs `f` against a consistent snapshot of the series buffers
    ///
    /// In synchronized mode this is an optimistic read section that
    /// retries on writer overlap; `f` must be read-only and may run
    /// several times.
    pub(crate) fn read<T>(&self, mut f: impl FnMut(&SeriesCore<K, V>) -> T) -> T {
        self.read_with_order(|core, _| f(core))
    }

    /// As [`read`](Self::read), also handing `f` the order version
    /// observed within the same snapshot
    pub(crate) fn read_with_order<T>(
        &self,
        mut f: impl FnMut(&SeriesCore<K, V>, u64) -> T,
    ) -> T {
        if self.synchronized.load(AtomicOrdering::Acquire) {
            self.lock.read_seq(|| {
                let core = unsafe { &*self.core.get() };
                f(core, self.order_version.load(AtomicOrdering::Acquire))
            })
        } else {
            let core = unsafe { &*self.core.get() };
            f(core, self.order_version.load(AtomicOrdering::Acquire))
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.read(|core| core.keys.len())
    }

    /// True iff the series has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while the keys are held in the regular `(first, step)`
    /// representation
    pub fn is_regular(&self) -> bool {
        self.read(|core| core.keys.is_regular())
    }

    /// True once [`complete`](Self::complete) has run
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(AtomicOrdering::Acquire)
    }

    /// The last committed mutation version
    pub fn version(&self) -> u64 {
        self.lock.version()
    }

    /// The structural-change counter consumed by cursors
    pub fn order_version(&self) -> u64 {
        self.order_version.load(AtomicOrdering::Acquire)
    }

    /// The notifier streaming consumers await between reads
    pub fn notifier(&self) -> &UpdateNotifier {
        &self.notifier
    }

    /// Value stored at `key`
    pub fn get(&self, key: &K) -> Result<V> {
        self.read(|core| match core.keys.index_of(key, &self.comparer) {
            Ok(i) => core.values.get(i).copied(),
            Err(_) => None,
        })
        .ok_or(Error::KeyNotFound)
    }

    /// True iff `key` has an entry
    pub fn contains_key(&self, key: &K) -> bool {
        self.read(|core| core.keys.index_of(key, &self.comparer).is_ok())
    }

    /// Entry at position `index`, if any
    pub fn get_at(&self, index: usize) -> Option<(K, V)> {
        self.read(|core| core.entry(index, &self.comparer))
    }

    /// The smallest entry
    pub fn first(&self) -> Result<(K, V)> {
        self.read(|core| core.entry(0, &self.comparer)).ok_or(Error::Empty)
    }

    /// The largest entry
    pub fn last(&self) -> Result<(K, V)> {
        self.read(|core| {
            let len = core.keys.len();
            if len == 0 {
                None
            } else {
                core.entry(len - 1, &self.comparer)
            }
        })
        .ok_or(Error::Empty)
    }

    /// Directional lookup
    ///
    /// Finds the entry satisfying `dir` relative to `key`, or reports
    /// where the key falls so a streaming caller can decide whether a
    /// later append could ever satisfy the lookup.
    pub fn try_find(&self, key: &K, dir: Lookup) -> FindResult<K, V> {
        self.read(|core| match Self::locate_in(core, key, dir, &self.comparer) {
            Ok(i) => match core.entry(i, &self.comparer) {
                Some((key, value)) => FindResult::Found { key, value },
                // torn view; the enclosing read section retries
                None => FindResult::Missing(Gap::AfterEnd),
            },
            Err(gap) => FindResult::Missing(gap),
        })
    }

    /// Copies the live entries out in order
    pub fn to_vec(&self) -> Vec<(K, V)> {
        self.read(|core| {
            (0..core.keys.len())
                .filter_map(|i| core.entry(i, &self.comparer))
                .collect()
        })
    }

    /// Copies the live keys out in order
    pub fn keys(&self) -> Vec<K> {
        self.read(|core| core.keys.to_vec(&self.comparer))
    }

    /// Copies the live values out in key order
    pub fn values(&self) -> Vec<V> {
        self.read(|core| core.values.clone())
    }

    /// Index-level lookup shared by reads, cursors and range removal
    pub(crate) fn locate_in(
        core: &SeriesCore<K, V>,
        key: &K,
        dir: Lookup,
        cmp: &C,
    ) -> std::result::Result<usize, Gap> {
        let len = core.keys.len();
        let probed = core.keys.index_of(key, cmp);
        match dir {
            Lookup::Eq => probed.map_err(|ip| gap_at(ip, len)),
            Lookup::Le => match probed {
                Ok(i) => Ok(i),
                Err(0) => Err(gap_at(0, len)),
                Err(ip) => Ok(ip - 1),
            },
            Lookup::Lt => match probed {
                Ok(0) | Err(0) => Err(gap_at(0, len)),
                Ok(i) => Ok(i - 1),
                Err(ip) => Ok(ip - 1),
            },
            Lookup::Ge => match probed {
                Ok(i) => Ok(i),
                Err(ip) if ip >= len => Err(gap_at(ip, len)),
                Err(ip) => Ok(ip),
            },
            Lookup::Gt => match probed {
                Ok(i) if i + 1 >= len => Err(Gap::AfterEnd),
                Ok(i) => Ok(i + 1),
                Err(ip) if ip >= len => Err(gap_at(ip, len)),
                Err(ip) => Ok(ip),
            },
        }
    }

    // ---- write side ----

    fn ensure_unsealed(&self) -> Result<()> {
        if self.is_sealed() {
            Err(Error::Sealed)
        } else {
            Ok(())
        }
    }

    fn bump_order(&self) {
        self.order_version.fetch_add(1, AtomicOrdering::Release);
    }

    /// Inserts a fresh entry at index `i`, maintaining the order
    /// version economy: only a non-tail insert or a demotion of the
    /// regular key representation invalidates cursor positions.
    fn insert_new(&self, core: &mut SeriesCore<K, V>, i: usize, key: K, value: V) {
        let was_regular = core.keys.is_regular();
        let at_end = i == core.keys.len();
        core.keys.insert_at(i, key, &self.comparer, &self.key_pool);
        reserve_one(&mut core.values, &self.value_pool);
        core.values.insert(i, value);
        if !at_end || (was_regular && !core.keys.is_regular()) {
            self.bump_order();
        }
    }

    fn remove_index(&self, core: &mut SeriesCore<K, V>, i: usize) -> (K, V) {
        let key = core.keys.remove_at(i, &self.comparer, &self.key_pool);
        let value = core.values.remove(i);
        self.bump_order();
        (key, value)
    }

    /// Inserts or updates the entry for `key`
    ///
    /// A value-only update of an existing key does not move any index,
    /// so cursors are not invalidated by it.
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.ensure_unsealed()?;
        let section = self.lock.write_section();
        let core = unsafe { &mut *self.core.get() };
        match core.keys.index_of(&key, &self.comparer) {
            Ok(i) => core.values[i] = value,
            Err(i) => self.insert_new(core, i, key, value),
        }
        section.commit();
        self.notifier.notify_updated();
        Ok(())
    }

    /// Inserts the entry iff `key` is absent
    pub fn add(&self, key: K, value: V) -> Result<()> {
        self.ensure_unsealed()?;
        let section = self.lock.write_section();
        let core = unsafe { &mut *self.core.get() };
        let result = match core.keys.index_of(&key, &self.comparer) {
            Ok(_) => Err(Error::DuplicateKey),
            Err(i) => {
                self.insert_new(core, i, key, value);
                Ok(())
            }
        };
        section.commit();
        if result.is_ok() {
            self.notifier.notify_updated();
        }
        result
    }

    /// Appends an entry whose key must be a new strict maximum
    pub fn add_last(&self, key: K, value: V) -> Result<()> {
        self.ensure_unsealed()?;
        let section = self.lock.write_section();
        let core = unsafe { &mut *self.core.get() };
        let result = match core.keys.last(&self.comparer) {
            Some(last) if self.comparer.compare(&key, &last) != Ordering::Greater => {
                Err(Error::OutOfOrder)
            }
            _ => {
                let at = core.keys.len();
                self.insert_new(core, at, key, value);
                Ok(())
            }
        };
        section.commit();
        if result.is_ok() {
            self.notifier.notify_updated();
        }
        result
    }

    /// Prepends an entry whose key must be a new strict minimum
    pub fn add_first(&self, key: K, value: V) -> Result<()> {
        self.ensure_unsealed()?;
        let section = self.lock.write_section();
        let core = unsafe { &mut *self.core.get() };
        let result = match core.keys.first() {
            Some(first) if self.comparer.compare(&key, &first) != Ordering::Less => {
                Err(Error::OutOfOrder)
            }
            _ => {
                self.insert_new(core, 0, key, value);
                Ok(())
            }
        };
        section.commit();
        if result.is_ok() {
            self.notifier.notify_updated();
        }
        result
    }

    /// Removes the entry for `key`, reporting whether anything changed
    pub fn remove(&self, key: &K) -> Result<bool> {
        self.ensure_unsealed()?;
        let section = self.lock.write_section();
        let core = unsafe { &mut *self.core.get() };
        let removed = match core.keys.index_of(key, &self.comparer) {
            Ok(i) => {
                self.remove_index(core, i);
                true
            }
            Err(_) => false,
        };
        section.commit();
        if removed {
            self.notifier.notify_updated();
        }
        Ok(removed)
    }

    /// Removes and returns the smallest entry
    pub fn remove_first(&self) -> Result<(K, V)> {
        self.ensure_unsealed()?;
        let section = self.lock.write_section();
        let core = unsafe { &mut *self.core.get() };
        let result = if core.keys.is_empty() {
            Err(Error::Empty)
        } else {
            Ok(self.remove_index(core, 0))
        };
        section.commit();
        if result.is_ok() {
            self.notifier.notify_updated();
        }
        result
    }

    /// Removes and returns the largest entry
    pub fn remove_last(&self) -> Result<(K, V)> {
        self.ensure_unsealed()?;
        let section = self.lock.write_section();
        let core = unsafe { &mut *self.core.get() };
        let result = if core.keys.is_empty() {
            Err(Error::Empty)
        } else {
            let last = core.keys.len() - 1;
            Ok(self.remove_index(core, last))
        };
        section.commit();
        if result.is_ok() {
            self.notifier.notify_updated();
        }
        result
    }

    /// Removes the pivot entry selected by `dir` together with every
    /// entry strictly on the named side of it
    ///
    /// `Lookup::Eq` removes exactly the pivot; `Lt`/`Le` remove the
    /// pivot and everything below it, `Gt`/`Ge` the pivot and
    /// everything above it. Reports whether anything was removed.
    pub fn remove_range(&self, key: &K, dir: Lookup) -> Result<bool> {
        self.ensure_unsealed()?;
        let section = self.lock.write_section();
        let core = unsafe { &mut *self.core.get() };
        let len = core.keys.len();
        let range = match Self::locate_in(core, key, dir, &self.comparer) {
            Err(_) => None,
            Ok(i) => Some(match dir {
                Lookup::Eq => (i, i + 1),
                Lookup::Lt | Lookup::Le => (0, i + 1),
                Lookup::Gt | Lookup::Ge => (i, len),
            }),
        };
        if let Some((lo, hi)) = range {
            core.keys.remove_range(lo, hi, &self.comparer, &self.key_pool);
            core.values.drain(lo..hi);
            self.bump_order();
        }
        section.commit();
        let removed = range.is_some();
        if removed {
            self.notifier.notify_updated();
        }
        Ok(removed)
    }

    /// Appends the contents of `other`, resolving key overlap per
    /// `policy`; returns the number of entries appended
    pub fn append(&self, other: &Self, policy: AppendPolicy) -> Result<usize>
    where
        V: PartialEq,
    {
        self.ensure_unsealed()?;
        let incoming = other.to_vec();
        if incoming.is_empty() {
            return Ok(0);
        }
        let section = self.lock.write_section();
        let core = unsafe { &mut *self.core.get() };
        let result = self.append_in(core, &incoming, policy);
        section.commit();
        if let Ok(count) = result {
            if count > 0 {
                self.notifier.notify_updated();
            }
        }
        result
    }

    fn append_in(
        &self,
        core: &mut SeriesCore<K, V>,
        incoming: &[(K, V)],
        policy: AppendPolicy,
    ) -> Result<usize>
    where
        V: PartialEq,
    {
        let len = core.keys.len();
        if len == 0 {
            self.push_tail(core, incoming);
            return Ok(incoming.len());
        }

        let last = core.keys.last(&self.comparer).expect("non-empty");
        let other_first = incoming[0].0;
        if self.comparer.compare(&other_first, &last) == Ordering::Greater {
            // disjoint tail
            if policy == AppendPolicy::RequireEqualOverlap {
                return Err(Error::OverlapMismatch);
            }
            self.push_tail(core, incoming);
            return Ok(incoming.len());
        }

        match policy {
            AppendPolicy::ThrowOnOverlap => Err(Error::OutOfOrder),
            AppendPolicy::DropOldOverlap => {
                let start = Self::locate_in(core, &other_first, Lookup::Ge, &self.comparer)
                    .expect("overlap implies a key at or after other's first");
                core.keys
                    .remove_range(start, len, &self.comparer, &self.key_pool);
                core.values.drain(start..len);
                self.bump_order();
                self.push_tail(core, incoming);
                Ok(incoming.len())
            }
            AppendPolicy::IgnoreEqualOverlap | AppendPolicy::RequireEqualOverlap => {
                let start = Self::locate_in(core, &other_first, Lookup::Ge, &self.comparer)
                    .expect("overlap implies a key at or after other's first");
                let overlap = len - start;
                if overlap > incoming.len() {
                    return Err(Error::OverlapMismatch);
                }
                for (j, (key, value)) in incoming.iter().take(overlap).enumerate() {
                    let live = core
                        .entry(start + j, &self.comparer)
                        .expect("index within live range");
                    if self.comparer.compare(&live.0, key) != Ordering::Equal
                        || live.1 != *value
                    {
                        return Err(Error::OverlapMismatch);
                    }
                }
                self.push_tail(core, &incoming[overlap..]);
                Ok(incoming.len() - overlap)
            }
        }
    }

    /// Appends already-validated, strictly increasing pairs at the tail
    fn push_tail(&self, core: &mut SeriesCore<K, V>, pairs: &[(K, V)]) {
        let was_regular = core.keys.is_regular();
        for &(key, value) in pairs {
            core.keys.append(key, &self.comparer, &self.key_pool);
            reserve_one(&mut core.values, &self.value_pool);
            core.values.push(value);
        }
        if was_regular && !core.keys.is_regular() {
            self.bump_order();
        }
    }

    /// Seals the series: a one-way transition after which every
    /// mutation fails with [`Error::Sealed`]
    ///
    /// Sealing turns synchronization off (the data can no longer
    /// change under a reader) and fires the update notifier one final
    /// time. Idempotent.
    pub fn complete(&self) {
        if self.is_sealed() {
            return;
        }
        let section = self.lock.write_section();
        self.sealed.store(true, AtomicOrdering::Release);
        section.commit();
        self.synchronized.store(false, AtomicOrdering::Release);
        log::debug!("series sealed at version {}", self.lock.version());
        self.notifier.seal();
    }

    /// Shrinks the key and value buffers to exactly the live entry
    /// count; a no-op on a sealed series
    pub fn trim_excess(&self) {
        if self.is_sealed() {
            return;
        }
        let section = self.lock.write_section();
        let core = unsafe { &mut *self.core.get() };
        core.keys.trim_excess(&self.key_pool);
        if core.values.capacity() > core.values.len() {
            let mut exact = Vec::with_capacity(core.values.len());
            exact.extend_from_slice(&core.values);
            let old = mem::replace(&mut core.values, exact);
            self.value_pool.give_back(old);
        }
        section.commit();
    }

    /// One-epoch snapshot of everything the serializer writes
    pub(crate) fn codec_snapshot(&self) -> SeriesSnapshot<K, V> {
        self.read(|core| {
            let len = core.keys.len();
            let regular = if core.keys.is_regular() && len >= 2 {
                core.keys
                    .get(0, &self.comparer)
                    .zip(core.keys.get(1, &self.comparer))
            } else {
                None
            };
            SeriesSnapshot {
                len,
                keys: if regular.is_some() {
                    Vec::new()
                } else {
                    core.keys.to_vec(&self.comparer)
                },
                values: core.values.clone(),
                regular,
                version: self.lock.version(),
                sealed: self.is_sealed(),
            }
        })
    }

    // ---- cursor support ----

    pub(crate) fn owner_thread(&self) -> ThreadId {
        self.owner
    }

    /// Called when a cursor is created on a foreign thread: from then
    /// on reads must use the versioned protocol (until sealing, after
    /// which the data is frozen anyway)
    pub(crate) fn mark_shared(&self) {
        if !self.is_sealed() {
            self.synchronized.store(true, AtomicOrdering::Release);
        }
    }
}

impl<K, V, C> Drop for SortedSeries<K, V, C> {
    fn drop(&mut self) {
        // release the buffers back to the pool
        let core = self.core.get_mut();
        let values = mem::take(&mut core.values);
        self.value_pool.give_back(values);
        let keys = mem::replace(&mut core.keys, KeyStore::Dense(Vec::new()));
        let buf = match keys {
            KeyStore::Dense(v) => v,
            KeyStore::Regular { buf, .. } => buf,
        };
        self.key_pool.give_back(buf);
    }
}

fn gap_at(insertion_point: usize, len: usize) -> Gap {
    if len == 0 || insertion_point >= len {
        Gap::AfterEnd
    } else if insertion_point == 0 {
        Gap::BeforeFirst
    } else {
        Gap::Inside
    }
}
