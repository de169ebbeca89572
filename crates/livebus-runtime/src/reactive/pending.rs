#![forbid(unsafe_code)]

//! Single-slot coalescing buffer for cross-thread publishes.
//!
//! Any thread may [`offer`](PendingSlot::offer) a value; only the offer that
//! finds the slot empty is told to schedule a drain. Later offers overwrite
//! the buffered value, so one drain delivers the last value written.
//! The lock is held only for the read-modify-write.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Last-writer-wins slot holding at most one value.
#[derive(Debug)]
pub struct PendingSlot<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for PendingSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingSlot<T> {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Store `value`, replacing any unconsumed one.
    ///
    /// Returns `true` if the slot was empty, meaning the caller must schedule
    /// exactly one drain.
    pub fn offer(&self, value: T) -> bool {
        let mut slot = self.lock();
        let was_empty = slot.is_none();
        *slot = Some(value);
        was_empty
    }

    /// Read and clear the slot.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Whether a value is waiting to be drained.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn first_offer_requests_drain() {
        let slot = PendingSlot::new();
        assert!(!slot.is_occupied());
        assert!(slot.offer(1));
        assert!(!slot.offer(2));
        assert!(!slot.offer(3));
        assert!(slot.is_occupied());
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn offer_after_drain_requests_again() {
        let slot = PendingSlot::new();
        assert!(slot.offer("a"));
        assert_eq!(slot.take(), Some("a"));
        assert!(slot.offer("b"));
    }

    #[test]
    fn concurrent_offers_schedule_once() {
        let slot = Arc::new(PendingSlot::new());
        let schedules = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let slot = Arc::clone(&slot);
                let schedules = Arc::clone(&schedules);
                thread::spawn(move || {
                    for i in 0..100 {
                        if slot.offer(t * 1000 + i) {
                            schedules.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(schedules.load(Ordering::SeqCst), 1);
        let last = slot.take().unwrap();
        assert_eq!(last % 1000, 99);
    }
}
