//! Per-id in-flight markers.

use crate::types::ContentId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

/// Set of per-id locks shared by the fetch coordinator and eviction
///
/// At most one [`FetchSlot`] exists per id. Entries are created on demand and
/// removed once nobody holds or waits on them, including waiters that were
/// cancelled before they got the slot.
#[derive(Default)]
pub struct FetchSlots {
    slots: Mutex<HashMap<ContentId, SlotEntry>>,
}

struct SlotEntry {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Holders plus waiters
    users: usize,
}

impl FetchSlots {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the slot of `id` and take it
    ///
    /// Cancel-safe: dropping the future before it completes leaves no entry behind.
    pub async fn acquire(&self, id: ContentId) -> FetchSlot<'_> {
        let user = self.enter(id);
        let guard = user.lock.clone().lock_owned().await;
        FetchSlot {
            _guard: guard,
            user,
        }
    }

    /// Take the slot of `id` only if nobody holds it
    pub fn try_acquire(&self, id: ContentId) -> Option<FetchSlot<'_>> {
        let user = self.enter(id);
        let guard = user.lock.clone().try_lock_owned().ok()?;
        Some(FetchSlot {
            _guard: guard,
            user,
        })
    }

    /// True if a slot for `id` is held or awaited
    pub fn is_busy(&self, id: ContentId) -> bool {
        self.map().contains_key(&id)
    }

    /// Number of ids with a held or awaited slot
    pub fn in_flight(&self) -> usize {
        self.map().len()
    }

    fn enter(&self, id: ContentId) -> SlotUser<'_> {
        let mut map = self.map();
        let entry = map.entry(id).or_insert_with(|| SlotEntry {
            lock: Arc::default(),
            users: 0,
        });
        entry.users += 1;
        SlotUser {
            id,
            lock: entry.lock.clone(),
            slots: self,
        }
    }

    fn leave(&self, id: ContentId) {
        let mut map = self.map();
        if let Some(entry) = map.get_mut(&id) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                map.remove(&id);
            }
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<ContentId, SlotEntry>> {
        // The map holds no invariant a panicking holder could break
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Registration of one holder or waiter; dropping it unregisters
struct SlotUser<'a> {
    id: ContentId,
    lock: Arc<tokio::sync::Mutex<()>>,
    slots: &'a FetchSlots,
}

impl Drop for SlotUser<'_> {
    fn drop(&mut self) {
        self.slots.leave(self.id);
    }
}

/// Exclusive hold on one id; released on drop
pub struct FetchSlot<'a> {
    // Field order matters: the lock is released before the entry is unregistered
    _guard: OwnedMutexGuard<()>,
    user: SlotUser<'a>,
}

impl FetchSlot<'_> {
    /// Id this slot guards
    pub fn id(&self) -> ContentId {
        self.user.id
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn slot_is_exclusive_per_id() {
        let slots = FetchSlots::new();
        let held = slots.acquire(ContentId(1)).await;

        assert!(slots.try_acquire(ContentId(1)).is_none());
        assert!(slots.try_acquire(ContentId(2)).is_some());
        assert!(slots.is_busy(ContentId(1)));

        drop(held);
        assert!(!slots.is_busy(ContentId(1)));
        assert!(slots.try_acquire(ContentId(1)).is_some());
        assert_eq!(slots.in_flight(), 0);
    }

    #[tokio::test]
    async fn waiters_run_one_at_a_time() {
        let slots = Arc::new(FetchSlots::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let slots = slots.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let _slot = slots.acquire(ContentId(42)).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(slots.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_no_entry() {
        let slots = Arc::new(FetchSlots::new());
        let held = slots.acquire(ContentId(5)).await;

        let waiter = {
            let slots = slots.clone();
            tokio::spawn(async move {
                let _slot = slots.acquire(ContentId(5)).await;
                std::future::pending::<()>().await;
            })
        };
        // Let the waiter queue up behind the holder
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Release, then cancel the waiter before it is polled again
        drop(held);
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        assert_eq!(slots.in_flight(), 0);
        assert!(!slots.is_busy(ContentId(5)));
        assert!(slots.try_acquire(ContentId(5)).is_some());
    }

    #[tokio::test]
    async fn cancelled_waiter_keeps_the_holder_registered() {
        let slots = Arc::new(FetchSlots::new());
        let held = slots.acquire(ContentId(6)).await;

        let waiter = {
            let slots = slots.clone();
            tokio::spawn(async move {
                let _slot = slots.acquire(ContentId(6)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;

        assert!(slots.is_busy(ContentId(6)));
        assert!(slots.try_acquire(ContentId(6)).is_none());
        drop(held);
        assert_eq!(slots.in_flight(), 0);
    }
}
