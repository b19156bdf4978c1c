//! Bidirectional cursors over a sorted series
//!
//! A cursor is an independent positional observer: it holds a shared
//! reference to the series, a position, and a snapshot of the series'
//! order version. Moves run under the optimistic read protocol, so a
//! cursor never blocks a writer and never sees a half-applied
//! mutation. As long as the writer only appends at the tail the order
//! version does not change and the cursor keeps advancing; any
//! structural change (insert that shifts entries, removal, demotion of
//! the regular key representation) invalidates the cursor on its next
//! move, which fails with [`Error::OutOfOrder`] while
//! [`last_key`](SeriesCursor::last_key) keeps the resume point.
//!
//! A fresh cursor over a sealed series can instead surrender the whole
//! series as one batch, which is how bulk consumers drain a finished
//! block without per-element overhead.

use std::sync::Arc;
use std::thread;

use tempora_core::{Error, KeyComparer, Lookup, Result};

use super::SortedSeries;

/// Cursor position and mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No position yet; the next forward move starts at the head
    BeforeStart,
    /// Positioned on the entry at this index
    At(usize),
    /// Ran off the tail; `next` is the index a later append will fill
    AfterEnd { next: usize },
    /// Presenting the whole sealed series as a single batch
    Batch,
    /// Observed a structural change; terminal
    Invalid,
}

/// A bidirectional positional iterator over a [`SortedSeries`]
pub struct SeriesCursor<K, V, C> {
    series: Arc<SortedSeries<K, V, C>>,
    state: CursorState,
    current: Option<(K, V)>,
    order_version: u64,
}

impl<K, V, C> SeriesCursor<K, V, C>
where
    K: Copy,
    V: Copy,
    C: KeyComparer<K>,
{
    /// Opens a cursor before the first entry of `series`
    ///
    /// Creating (or cloning) a cursor from a thread other than the
    /// series' owner switches the series to synchronized reads.
    pub fn new(series: Arc<SortedSeries<K, V, C>>) -> Self {
        if thread::current().id() != series.owner_thread() {
            series.mark_shared();
        }
        let order_version = series.order_version();
        Self {
            series,
            state: CursorState::BeforeStart,
            current: None,
            order_version,
        }
    }

    /// The cursor's position and mode
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// The entry the cursor is positioned on
    pub fn current(&self) -> Option<(K, V)> {
        self.current
    }

    /// Key of the current entry
    pub fn current_key(&self) -> Option<K> {
        self.current.map(|(key, _)| key)
    }

    /// Value of the current entry
    pub fn current_value(&self) -> Option<V> {
        self.current.map(|(_, value)| value)
    }

    /// The last key this cursor observed
    ///
    /// Remains readable after invalidation: a caller that received
    /// [`Error::OutOfOrder`] resumes by taking a fresh cursor and
    /// calling [`move_at`](Self::move_at) with this key and
    /// `Lookup::Gt` (or `Lt` when iterating backwards).
    pub fn last_key(&self) -> Option<K> {
        self.current_key()
    }

    /// The series this cursor observes
    pub fn series(&self) -> &Arc<SortedSeries<K, V, C>> {
        &self.series
    }

    fn fail_if_invalid(&self) -> Result<()> {
        if self.state == CursorState::Invalid {
            Err(Error::OutOfOrder)
        } else {
            Ok(())
        }
    }

    /// Positions on the first entry; `Ok(false)` iff the series is
    /// empty. Takes a fresh order snapshot.
    pub fn move_first(&mut self) -> Result<bool> {
        self.fail_if_invalid()?;
        let snapshot = self
            .series
            .read_with_order(|core, order| core.entry(0, &self.series.comparer).map(|e| (e, order)));
        match snapshot {
            Some((entry, order)) => {
                self.state = CursorState::At(0);
                self.current = Some(entry);
                self.order_version = order;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Positions on the last entry; `Ok(false)` iff the series is
    /// empty. Takes a fresh order snapshot.
    pub fn move_last(&mut self) -> Result<bool> {
        self.fail_if_invalid()?;
        let snapshot = self.series.read_with_order(|core, order| {
            let len = core.keys.len();
            if len == 0 {
                None
            } else {
                core.entry(len - 1, &self.series.comparer)
                    .map(|e| (e, len - 1, order))
            }
        });
        match snapshot {
            Some((entry, index, order)) => {
                self.state = CursorState::At(index);
                self.current = Some(entry);
                self.order_version = order;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Advances by one entry
    ///
    /// Returns `Ok(false)` at the tail; a later tail append makes the
    /// next call succeed. Fails with [`Error::OutOfOrder`] if the
    /// series' order changed since this cursor was positioned.
    pub fn move_next(&mut self) -> Result<bool> {
        match self.state {
            CursorState::Invalid => Err(Error::OutOfOrder),
            CursorState::BeforeStart => self.move_first(),
            CursorState::At(i) => self.advance_to(i + 1),
            CursorState::AfterEnd { next } => self.advance_to(next),
            CursorState::Batch => {
                // the batch stands for the whole sealed series
                let len = self.series.len();
                self.state = CursorState::AfterEnd { next: len };
                Ok(false)
            }
        }
    }

    /// Retreats by one entry
    ///
    /// From a fresh cursor this positions on the last entry, making it
    /// the symmetric twin of [`move_next`](Self::move_next) after
    /// construction. Returns `Ok(false)` at the head.
    pub fn move_previous(&mut self) -> Result<bool> {
        match self.state {
            CursorState::Invalid => Err(Error::OutOfOrder),
            CursorState::BeforeStart => self.move_last(),
            CursorState::At(i) => {
                if i == 0 {
                    self.check_order()?;
                    self.state = CursorState::BeforeStart;
                    Ok(false)
                } else {
                    self.retreat_to(i - 1)
                }
            }
            CursorState::AfterEnd { next } => {
                if next == 0 {
                    self.state = CursorState::BeforeStart;
                    Ok(false)
                } else {
                    self.retreat_to(next - 1)
                }
            }
            CursorState::Batch => {
                let len = self.series.len();
                if len >= 2 {
                    self.retreat_to(len - 2)
                } else {
                    self.state = CursorState::BeforeStart;
                    Ok(false)
                }
            }
        }
    }

    /// Positions on the entry selected by a directional lookup
    ///
    /// On a hit the cursor re-snapshots the order version, which makes
    /// this the resume path after invalidation (on a fresh cursor). On
    /// a miss the cursor stays where it was.
    pub fn move_at(&mut self, key: &K, dir: Lookup) -> Result<bool> {
        self.fail_if_invalid()?;
        let snapshot = self.series.read_with_order(|core, order| {
            match SortedSeries::locate_in(core, key, dir, &self.series.comparer) {
                Ok(i) => core
                    .entry(i, &self.series.comparer)
                    .map(|entry| (i, entry, order)),
                Err(_) => None,
            }
        });
        match snapshot {
            Some((index, entry, order)) => {
                self.state = CursorState::At(index);
                self.current = Some(entry);
                self.order_version = order;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Presents the whole series as a single batch
    ///
    /// Succeeds exactly once, on a fresh cursor over a sealed
    /// non-empty series; `false` in every other situation.
    pub fn move_next_batch(&mut self) -> bool {
        if self.state != CursorState::BeforeStart
            || !self.series.is_sealed()
            || self.series.is_empty()
        {
            return false;
        }
        self.current = self.series.last().ok();
        self.state = CursorState::Batch;
        true
    }

    /// The batched entries; defined only in batch mode
    pub fn current_batch(&self) -> Option<Vec<(K, V)>> {
        if self.state == CursorState::Batch {
            Some(self.series.to_vec())
        } else {
            None
        }
    }

    fn advance_to(&mut self, target: usize) -> Result<bool> {
        let (entry, order) = self
            .series
            .read_with_order(|core, order| (core.entry(target, &self.series.comparer), order));
        if order != self.order_version {
            self.state = CursorState::Invalid;
            return Err(Error::OutOfOrder);
        }
        match entry {
            Some(entry) => {
                self.state = CursorState::At(target);
                self.current = Some(entry);
                Ok(true)
            }
            None => {
                self.state = CursorState::AfterEnd { next: target };
                Ok(false)
            }
        }
    }

    fn retreat_to(&mut self, target: usize) -> Result<bool> {
        let (entry, order) = self
            .series
            .read_with_order(|core, order| (core.entry(target, &self.series.comparer), order));
        if order != self.order_version {
            self.state = CursorState::Invalid;
            return Err(Error::OutOfOrder);
        }
        match entry {
            Some(entry) => {
                self.state = CursorState::At(target);
                self.current = Some(entry);
                Ok(true)
            }
            None => {
                self.state = CursorState::BeforeStart;
                Ok(false)
            }
        }
    }

    fn check_order(&mut self) -> Result<()> {
        let order = self.series.order_version();
        if order != self.order_version {
            self.state = CursorState::Invalid;
            Err(Error::OutOfOrder)
        } else {
            Ok(())
        }
    }
}

impl<K, V, C> Clone for SeriesCursor<K, V, C>
where
    K: Copy,
    V: Copy,
    C: KeyComparer<K>,
{
    /// An independent handle at the same position, carrying its own
    /// order snapshot from here on
    fn clone(&self) -> Self {
        if thread::current().id() != self.series.owner_thread() {
            self.series.mark_shared();
        }
        Self {
            series: Arc::clone(&self.series),
            state: self.state,
            current: self.current,
            order_version: self.order_version,
        }
    }
}

/// Forward iterator adapter over a cursor
///
/// Built on the cursor protocol; intended for sealed series, where
/// iteration is deterministic. On a live series the iterator ends
/// early with an error item if a structural change interleaves.
pub struct SeriesIter<K, V, C> {
    cursor: SeriesCursor<K, V, C>,
    done: bool,
}

impl<K, V, C> SeriesIter<K, V, C>
where
    K: Copy,
    V: Copy,
    C: KeyComparer<K>,
{
    /// Iterates `series` front to back
    pub fn new(series: Arc<SortedSeries<K, V, C>>) -> Self {
        Self {
            cursor: SeriesCursor::new(series),
            done: false,
        }
    }
}

impl<K, V, C> SortedSeries<K, V, C>
where
    K: Copy,
    V: Copy,
    C: KeyComparer<K>,
{
    /// Iterates the series front to back
    ///
    /// Sugar over [`SeriesIter::new`]. Takes a shared handle, so call
    /// it as `Arc::clone(&series).iter()` when the series stays in
    /// use afterwards.
    pub fn iter(self: Arc<Self>) -> SeriesIter<K, V, C> {
        SeriesIter::new(self)
    }
}

impl<K, V, C> Iterator for SeriesIter<K, V, C>
where
    K: Copy,
    V: Copy,
    C: KeyComparer<K>,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.move_next() {
            Ok(true) => self.cursor.current().map(Ok),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempora_core::TickComparer;

    fn series_of(entries: &[(i64, i64)]) -> Arc<SortedSeries<i64, i64, TickComparer<i64>>> {
        let series = SortedSeries::new(TickComparer::<i64>::new());
        for &(k, v) in entries {
            series.set(k, v).unwrap();
        }
        Arc::new(series)
    }

    #[test]
    fn test_forward_walk() {
        let series = series_of(&[(10, 1), (20, 2), (30, 3)]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));

        assert_eq!(cursor.state(), CursorState::BeforeStart);
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.current(), Some((10, 1)));
        assert!(cursor.move_next().unwrap());
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.current(), Some((30, 3)));
        assert!(!cursor.move_next().unwrap());
        assert_eq!(cursor.state(), CursorState::AfterEnd { next: 3 });
        // current survives running off the end
        assert_eq!(cursor.current_key(), Some(30));
    }

    #[test]
    fn test_backward_walk_from_fresh_cursor() {
        let series = series_of(&[(10, 1), (20, 2), (30, 3)]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));

        // the symmetric twin of move_next after construction
        assert!(cursor.move_previous().unwrap());
        assert_eq!(cursor.current(), Some((30, 3)));
        assert!(cursor.move_previous().unwrap());
        assert!(cursor.move_previous().unwrap());
        assert_eq!(cursor.current(), Some((10, 1)));
        assert!(!cursor.move_previous().unwrap());
        assert_eq!(cursor.state(), CursorState::BeforeStart);
    }

    #[test]
    fn test_moves_on_empty_series() {
        let series = series_of(&[]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));
        assert!(!cursor.move_first().unwrap());
        assert!(!cursor.move_last().unwrap());
        assert!(!cursor.move_next().unwrap());
        assert!(!cursor.move_previous().unwrap());
        assert_eq!(cursor.current(), None);
    }

    #[test]
    fn test_move_at_directions() {
        let series = series_of(&[(10, 1), (20, 2), (30, 3)]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));

        assert!(cursor.move_at(&20, Lookup::Eq).unwrap());
        assert_eq!(cursor.current_key(), Some(20));

        assert!(cursor.move_at(&25, Lookup::Gt).unwrap());
        assert_eq!(cursor.current_key(), Some(30));

        assert!(cursor.move_at(&25, Lookup::Le).unwrap());
        assert_eq!(cursor.current_key(), Some(20));

        // a miss leaves the cursor where it was
        assert!(!cursor.move_at(&25, Lookup::Eq).unwrap());
        assert_eq!(cursor.current_key(), Some(20));
        assert_eq!(cursor.state(), CursorState::At(1));
    }

    #[test]
    fn test_cursor_survives_tail_append() {
        let series = series_of(&[(10, 1), (20, 2), (30, 3)]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));
        cursor.move_at(&20, Lookup::Eq).unwrap();

        series.add_last(40, 4).unwrap();

        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.current(), Some((30, 3)));
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.current(), Some((40, 4)));
    }

    #[test]
    fn test_cursor_waiting_at_end_picks_up_append() {
        let series = series_of(&[(10, 1)]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));
        assert!(cursor.move_next().unwrap());
        assert!(!cursor.move_next().unwrap());

        series.add_last(20, 2).unwrap();
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.current(), Some((20, 2)));
    }

    #[test]
    fn test_cursor_invalidated_by_mid_remove() {
        let series = series_of(&[(10, 1), (20, 2), (30, 3), (40, 4)]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));
        cursor.move_at(&20, Lookup::Eq).unwrap();

        series.remove(&30).unwrap();

        assert!(matches!(cursor.move_next(), Err(Error::OutOfOrder)));
        assert_eq!(cursor.state(), CursorState::Invalid);
        // the resume point survives invalidation
        assert_eq!(cursor.last_key(), Some(20));

        // terminal: every further move keeps failing
        assert!(matches!(cursor.move_next(), Err(Error::OutOfOrder)));
        assert!(matches!(cursor.move_first(), Err(Error::OutOfOrder)));

        // a fresh cursor resumes after the last-seen key
        let mut fresh = SeriesCursor::new(Arc::clone(&series));
        assert!(fresh.move_at(&20, Lookup::Gt).unwrap());
        assert_eq!(fresh.current_key(), Some(40));
    }

    #[test]
    fn test_cursor_invalidated_by_shifting_insert() {
        let series = series_of(&[(10, 1), (30, 3)]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));
        cursor.move_first().unwrap();

        series.set(20, 2).unwrap();
        assert!(matches!(cursor.move_next(), Err(Error::OutOfOrder)));
    }

    #[test]
    fn test_move_at_resnapshots_order() {
        let series = series_of(&[(10, 1), (20, 2), (30, 3)]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));
        cursor.move_first().unwrap();

        series.remove(&10).unwrap();

        // the hit re-snapshots, so the cursor keeps working
        assert!(cursor.move_at(&20, Lookup::Eq).unwrap());
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.current_key(), Some(30));
    }

    #[test]
    fn test_batch_mode_on_sealed_series() {
        let series = series_of(&[(10, 1), (20, 2)]);
        series.complete();

        let mut cursor = SeriesCursor::new(Arc::clone(&series));
        assert!(cursor.move_next_batch());
        assert_eq!(
            cursor.current_batch(),
            Some(vec![(10, 1), (20, 2)])
        );
        assert_eq!(cursor.current_key(), Some(20));

        // the batch is surrendered exactly once
        assert!(!cursor.move_next_batch());
        assert!(!cursor.move_next().unwrap());
        assert_eq!(cursor.current_batch(), None);
    }

    #[test]
    fn test_batch_mode_needs_sealed_non_empty() {
        let live = series_of(&[(10, 1)]);
        assert!(!SeriesCursor::new(Arc::clone(&live)).move_next_batch());

        let empty = series_of(&[]);
        empty.complete();
        assert!(!SeriesCursor::new(Arc::clone(&empty)).move_next_batch());

        // a positioned cursor no longer batches
        let sealed = series_of(&[(10, 1)]);
        sealed.complete();
        let mut cursor = SeriesCursor::new(Arc::clone(&sealed));
        cursor.move_first().unwrap();
        assert!(!cursor.move_next_batch());
    }

    #[test]
    fn test_sealed_series_iterates_deterministically() {
        let series = series_of(&[(10, 1), (20, 2), (30, 3)]);
        series.complete();

        let collected: Result<Vec<(i64, i64)>> = Arc::clone(&series).iter().collect();
        assert_eq!(collected.unwrap(), vec![(10, 1), (20, 2), (30, 3)]);
    }

    #[test]
    fn test_clone_is_independent() {
        let series = series_of(&[(10, 1), (20, 2), (30, 3)]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));
        cursor.move_first().unwrap();

        let mut twin = cursor.clone();
        assert_eq!(twin.current(), Some((10, 1)));

        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.current_key(), Some(20));
        // the twin did not move
        assert_eq!(twin.current_key(), Some(10));
        assert!(twin.move_next().unwrap());
        assert_eq!(twin.current_key(), Some(20));
    }

    #[test]
    fn test_clone_of_stale_cursor_is_stale() {
        let series = series_of(&[(10, 1), (20, 2)]);
        let mut cursor = SeriesCursor::new(Arc::clone(&series));
        cursor.move_first().unwrap();

        series.add_first(5, 0).unwrap();

        let mut twin = cursor.clone();
        assert!(matches!(twin.move_next(), Err(Error::OutOfOrder)));
    }
}
