//! Update notification for streaming consumers
//!
//! A series carries a single edge-triggered signal: "a write happened"
//! or "the series is now sealed". A consumer awaits
//! [`UpdateNotifier::updated`] each time it drains the series dry and
//! reattaches after every completion. This is the only suspension
//! point in the cursor protocol; cancelling the wait is dropping the
//! future, which never touches series state.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// What a completed wait observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesUpdate {
    /// At least one mutation happened since the wait was attached
    Updated,
    /// The series has been sealed; no further data will ever arrive
    Sealed,
}

/// Single-consumer edge trigger for series mutations
///
/// Backed by [`tokio::sync::Notify`], whose stored permit makes the
/// signal edge-triggered with memory: a mutation that lands between
/// two waits is not lost. The signal is intended for one consumer;
/// with several, a mutation wakes only one of them.
pub struct UpdateNotifier {
    notify: Notify,
    sealed: AtomicBool,
}

impl UpdateNotifier {
    pub(crate) fn new() -> Self {
        Self {
            notify: Notify::new(),
            sealed: AtomicBool::new(false),
        }
    }

    /// Signals that a mutation was committed
    pub(crate) fn notify_updated(&self) {
        self.notify.notify_one();
    }

    /// Latches the sealed state and fires the signal one final time
    pub(crate) fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Completes once after the next mutation, or immediately when the
    /// series is already sealed
    pub async fn updated(&self) -> SeriesUpdate {
        if self.sealed.load(Ordering::Acquire) {
            return SeriesUpdate::Sealed;
        }
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // a seal may have landed between the check and registration
        if self.sealed.load(Ordering::Acquire) {
            return SeriesUpdate::Sealed;
        }
        notified.await;
        if self.sealed.load(Ordering::Acquire) {
            SeriesUpdate::Sealed
        } else {
            SeriesUpdate::Updated
        }
    }
}
