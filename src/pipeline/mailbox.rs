//! Single-slot frame handoff between acquisition and render

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, TryLockError};

use crossbeam::utils::CachePadded;

use crate::capture::FramePair;

/// Freshest-wins mailbox holding at most one [`FramePair`].
///
/// The producer never waits: if the consumer is detaching the slot the new
/// pair is dropped. An unread pair is silently replaced by the next one.
pub struct FrameMailbox {
    slot: Mutex<Option<FramePair>>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    published: AtomicU64,
    overwritten: AtomicU64,
    dropped: AtomicU64,
    taken: AtomicU64,
}

/// Snapshot of mailbox counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStats {
    pub published: u64,
    pub overwritten: u64,
    pub dropped: u64,
    pub taken: u64,
}

impl Default for FrameMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: replace the slot contents unless a read is in progress.
    pub fn try_publish(&self, pair: FramePair) -> bool {
        let mut slot = match self.slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("mailbox_dropped").increment(1);
                return false;
            }
        };

        if slot.replace(pair).is_some() {
            self.stats.overwritten.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("mailbox_overwritten").increment(1);
        }
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mailbox_published").increment(1);
        true
    }

    /// Consumer: detach the current pair, leaving the slot empty.
    pub fn take_if_present(&self) -> Option<FramePair> {
        let pair = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if pair.is_some() {
            self.stats.taken.fetch_add(1, Ordering::Relaxed);
        }
        pair
    }

    pub fn is_empty(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn stats(&self) -> MailboxStats {
        MailboxStats {
            published: self.stats.published.load(Ordering::Relaxed),
            overwritten: self.stats.overwritten.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            taken: self.stats.taken.load(Ordering::Relaxed),
        }
    }
}
