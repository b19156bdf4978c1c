//! Shared buffer pool
//!
//! Key and value buffers come from a pool rather than the global
//! allocator so that a replaced buffer keeps its allocation alive for
//! any optimistic reader still holding a stale view of it. The pool
//! contract follows the renting scheme of the series: a rented buffer
//! may be larger than requested, and buffers are handed back once a
//! replacement is installed.

use parking_lot::Mutex;

/// Hard cap on buffer capacity, in elements
pub const MAX_CAPACITY: usize = (1 << 31) - 1;

/// Number of buffers a pool retains per instance by default
pub const DEFAULT_MAX_RETAINED: usize = 8;

/// Doubling growth schedule for a buffer that must hold `min` elements
///
/// Capacity doubles from `current` until it covers `min`, clamped to
/// [`MAX_CAPACITY`]. Panics if `min` itself exceeds the cap.
pub fn grown_capacity(current: usize, min: usize) -> usize {
    assert!(min <= MAX_CAPACITY, "capacity over 2^31-1 elements");
    let mut capacity = current.max(4);
    while capacity < min {
        capacity = (capacity * 2).min(MAX_CAPACITY);
    }
    capacity
}

/// A pool of reusable `Vec<T>` buffers
///
/// `rent` prefers a retained buffer with enough capacity and falls
/// back to a fresh allocation; `give_back` clears the buffer and
/// retains it up to the configured limit. Buffers never shrink while
/// pooled, so a renter may receive more capacity than it asked for.
pub struct BufferPool<T> {
    shelves: Mutex<Vec<Vec<T>>>,
    max_retained: usize,
}

impl<T> BufferPool<T> {
    /// Creates a pool retaining up to `max_retained` buffers
    pub fn new(max_retained: usize) -> Self {
        Self {
            shelves: Mutex::new(Vec::new()),
            max_retained,
        }
    }

    /// Rents a buffer with capacity of at least `min_capacity`
    pub fn rent(&self, min_capacity: usize) -> Vec<T> {
        assert!(
            min_capacity <= MAX_CAPACITY,
            "capacity over 2^31-1 elements"
        );
        let mut shelves = self.shelves.lock();
        if let Some(pos) = shelves.iter().position(|b| b.capacity() >= min_capacity) {
            return shelves.swap_remove(pos);
        }
        drop(shelves);
        Vec::with_capacity(min_capacity)
    }

    /// Returns a buffer to the pool
    ///
    /// The buffer is cleared; its allocation is retained for the next
    /// renter unless the pool is already full.
    pub fn give_back(&self, mut buf: Vec<T>) {
        if buf.capacity() == 0 {
            return;
        }
        buf.clear();
        let mut shelves = self.shelves.lock();
        if shelves.len() < self.max_retained {
            shelves.push(buf);
        } else {
            log::trace!("pool full, dropping buffer of capacity {}", buf.capacity());
        }
    }

    /// Number of buffers currently retained
    pub fn retained(&self) -> usize {
        self.shelves.lock().len()
    }
}

impl<T> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETAINED)
    }
}

/// Makes room for one more element without letting `Vec` reallocate on
/// its own: replacement buffers must come from the pool so the old
/// allocation survives for optimistic readers holding a stale view.
pub(crate) fn reserve_one<T: Copy>(v: &mut Vec<T>, pool: &BufferPool<T>) {
    if v.len() < v.capacity() {
        return;
    }
    let mut bigger = pool.rent(grown_capacity(v.capacity(), v.len() + 1));
    bigger.extend_from_slice(v);
    log::trace!(
        "buffer grown from {} to {}",
        v.capacity(),
        bigger.capacity()
    );
    let old = std::mem::replace(v, bigger);
    pool.give_back(old);
}
