//! Trailing-edge debounce scheduler.
//!
//! Each key holds at most one pending timer. Scheduling again under the same
//! key aborts the pending timer and arms a fresh one, so only the last action
//! in a burst ever runs. Once a timer fires, its action is detached from the
//! key: a later `schedule` starts a new timer rather than aborting work that's
//! already underway.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use n0_future::task::JoinHandle;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingMap<K> = Arc<Mutex<HashMap<K, Pending>>>;

/// Cancel-and-reschedule timers keyed by `K`.
///
/// Must be used from within a tokio runtime.
pub struct Debouncer<K> {
    name: &'static str,
    pending: PendingMap<K>,
    next_generation: AtomicU64,
}

impl<K> Debouncer<K>
where
    K: Hash + Eq + Clone + Debug + Send + 'static,
{
    /// Create an empty scheduler. `name` only shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Arm a timer for `key`, replacing any timer still pending under it.
    ///
    /// `action` is called exactly once if `delay` elapses without another
    /// `schedule` or `cancel` for the same key.
    pub fn schedule<F, Fut>(&self, key: K, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = lock(&self.pending);

        if let Some(previous) = pending.remove(&key) {
            previous.handle.abort();
            tracing::trace!(debouncer = self.name, ?key, "re-armed pending timer");
        }

        let slots = Arc::clone(&self.pending);
        let task_key = key.clone();
        let name = self.name;
        let handle = n0_future::task::spawn(async move {
            n0_future::time::sleep(delay).await;

            // Claim the slot before running. If it's gone or belongs to a newer
            // generation we were superseded between waking and locking.
            {
                let mut slots = lock(&slots);
                match slots.get(&task_key) {
                    Some(slot) if slot.generation == generation => {
                        slots.remove(&task_key);
                    }
                    _ => return,
                }
            }

            tracing::trace!(debouncer = name, key = ?task_key, "timer fired");
            action().await;
        });

        pending.insert(key, Pending { generation, handle });
    }

    /// Clear the pending timer for `key` without running it.
    ///
    /// Returns whether a timer was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.pending).remove(key) {
            Some(pending) => {
                pending.handle.abort();
                tracing::trace!(debouncer = self.name, ?key, "cancelled pending timer");
                true
            }
            None => false,
        }
    }

    /// Clear every pending timer.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        let count = drained.len();
        for (_, pending) in drained {
            pending.handle.abort();
        }
        if count > 0 {
            tracing::trace!(debouncer = self.name, count, "cancelled all pending timers");
        }
        count
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        let mut pending = lock(&self.pending);
        for (_, p) in pending.drain() {
            p.handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(count: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let count = Arc::clone(count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let debouncer = Debouncer::new("test");
        let count = counter();

        debouncer.schedule("k", Duration::from_millis(100), bump(&count));
        assert!(debouncer.is_pending(&"k"));

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending(&"k"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_defers_and_replaces() {
        let debouncer = Debouncer::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let push = |i: usize| {
            let seen = Arc::clone(&seen);
            move || async move {
                seen.lock().unwrap().push(i);
            }
        };

        debouncer.schedule("k", Duration::from_millis(100), push(0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        debouncer.schedule("k", Duration::from_millis(100), push(1));
        tokio::time::sleep(Duration::from_millis(40)).await;
        debouncer.schedule("k", Duration::from_millis(100), push(2));

        // Last schedule at t=90, so nothing before t=190.
        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_action() {
        let debouncer = Debouncer::new("test");
        let count = counter();

        debouncer.schedule(1u32, Duration::from_millis(100), bump(&count));
        assert!(debouncer.cancel(&1));
        assert!(!debouncer.cancel(&1));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = Debouncer::new("test");
        let a = counter();
        let b = counter();

        debouncer.schedule("a", Duration::from_millis(100), bump(&a));
        debouncer.schedule("b", Duration::from_millis(100), bump(&b));
        assert_eq!(debouncer.pending_count(), 2);

        debouncer.cancel(&"a");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_instances_do_not_interfere() {
        let fast = Debouncer::new("fast");
        let slow = Debouncer::new("slow");
        let fast_count = counter();
        let slow_count = counter();

        fast.schedule("k", Duration::from_millis(20), bump(&fast_count));
        slow.schedule("k", Duration::from_millis(100), bump(&slow_count));
        fast.cancel(&"k");
        fast.schedule("k", Duration::from_millis(20), bump(&fast_count));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fast_count.load(Ordering::SeqCst), 1);
        assert_eq!(slow_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_action_not_aborted_by_reschedule() {
        let debouncer = Debouncer::new("test");
        let finished = counter();

        let done = Arc::clone(&finished);
        debouncer.schedule("k", Duration::from_millis(10), move || async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            done.fetch_add(1, Ordering::SeqCst);
        });

        // Fire the first timer, then re-arm while its action is still running.
        tokio::time::sleep(Duration::from_millis(20)).await;
        debouncer.schedule("k", Duration::from_millis(10), bump(&finished));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending() {
        let count = counter();
        {
            let debouncer = Debouncer::new("test");
            debouncer.schedule("k", Duration::from_millis(10), bump(&count));
            debouncer.schedule("j", Duration::from_millis(10), bump(&count));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let debouncer = Debouncer::new("test");
        let count = counter();
        debouncer.schedule("a", Duration::from_millis(10), bump(&count));
        debouncer.schedule("b", Duration::from_millis(10), bump(&count));
        assert_eq!(debouncer.cancel_all(), 2);
        assert_eq!(debouncer.pending_count(), 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
