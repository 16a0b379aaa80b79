//! Exclusive byte-range lock
//!
//! Two holders never own overlapping ranges at the same time. Guards are
//! owned (they keep the lock alive through an `Arc`) so a guard can move
//! into a spawned task and outlive the caller that acquired it.

use mirrorio_common::IoRange;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Default)]
struct Held {
    next_ticket: u64,
    ranges: HashMap<u64, IoRange>,
}

/// Lock table keyed by `[offset, offset + length)`
#[derive(Default)]
pub struct RangeLock {
    held: Mutex<Held>,
    released: Notify,
}

impl RangeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `range` overlaps no held range, then take it
    ///
    /// Waiters are not queued in arrival order; a waiter retries every time
    /// any guard is released.
    pub async fn lock(self: &Arc<Self>, range: IoRange) -> RangeGuard {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not lost.
            released.as_mut().enable();

            if let Some(guard) = self.try_lock(range) {
                return guard;
            }
            trace!(
                "Waiting for range [{}, {})",
                range.offset,
                range.end()
            );
            released.await;
        }
    }

    /// Take `range` if nothing overlapping is held
    pub fn try_lock(self: &Arc<Self>, range: IoRange) -> Option<RangeGuard> {
        let mut held = self.held.lock();
        if held.ranges.values().any(|r| r.overlaps(&range)) {
            return None;
        }
        let ticket = held.next_ticket;
        held.next_ticket += 1;
        held.ranges.insert(ticket, range);
        Some(RangeGuard {
            lock: Arc::clone(self),
            ticket,
            range,
        })
    }

    /// Number of ranges currently held
    pub fn held(&self) -> usize {
        self.held.lock().ranges.len()
    }

    fn release(&self, ticket: u64) {
        self.held.lock().ranges.remove(&ticket);
        self.released.notify_waiters();
    }
}

/// Ownership of one locked range; released on drop
pub struct RangeGuard {
    lock: Arc<RangeLock>,
    ticket: u64,
    range: IoRange,
}

impl RangeGuard {
    pub const fn range(&self) -> IoRange {
        self.range
    }
}

impl Drop for RangeGuard {
    fn drop(&mut self) {
        self.lock.release(self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_disjoint_ranges() {
        let lock = Arc::new(RangeLock::new());
        let a = lock.try_lock(IoRange::new(0, 10)).unwrap();
        let b = lock.try_lock(IoRange::new(10, 10)).unwrap();
        assert_eq!(lock.held(), 2);
        assert!(lock.try_lock(IoRange::new(5, 10)).is_none());
        drop(a);
        drop(b);
        assert_eq!(lock.held(), 0);
    }

    #[test]
    fn test_release_on_drop() {
        let lock = Arc::new(RangeLock::new());
        let guard = lock.try_lock(IoRange::new(0, 100)).unwrap();
        assert_eq!(guard.range(), IoRange::new(0, 100));
        assert!(lock.try_lock(IoRange::new(99, 1)).is_none());
        drop(guard);
        assert!(lock.try_lock(IoRange::new(99, 1)).is_some());
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_release() {
        let lock = Arc::new(RangeLock::new());
        let guard = lock.lock(IoRange::new(0, 4096)).await;

        let waiter = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _g = lock.lock(IoRange::new(1024, 1024)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lock.held(), 0);
    }
}
