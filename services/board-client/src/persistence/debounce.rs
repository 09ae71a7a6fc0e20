//! Per-key trailing-edge debouncer.
//!
//! Scheduling a task for a key replaces the pending task for that key. Only
//! the newest task fires, once the window has passed without another edit.
//! A task that has fired is never cancelled. Fired tasks of the same key run
//! one after another, oldest first.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

/// Outcome of [`Debouncer::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    /// A scheduled task was dropped before it fired.
    Dropped,
    /// Nothing was scheduled, but a task for the key is running.
    InFlight,
    /// Nothing was scheduled or running.
    Idle,
}

struct Scheduled {
    generation: u64,
    handle: JoinHandle<()>,
    fire_now: Option<oneshot::Sender<()>>,
}

struct Table<K> {
    scheduled: HashMap<K, Scheduled>,
    in_flight: HashMap<K, usize>,
    lanes: HashMap<K, Arc<tokio::sync::Mutex<()>>>,
}

impl<K> Default for Table<K> {
    fn default() -> Self {
        Self {
            scheduled: HashMap::new(),
            in_flight: HashMap::new(),
            lanes: HashMap::new(),
        }
    }
}

struct Shared<K> {
    table: Mutex<Table<K>>,
    idle: Notify,
}

impl<K> Shared<K> {
    fn lock(&self) -> MutexGuard<'_, Table<K>> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Trailing-edge debouncer keyed by `K`.
pub struct Debouncer<K> {
    window: Duration,
    next_generation: AtomicU64,
    shared: Arc<Shared<K>>,
}

impl<K> std::fmt::Debug for Debouncer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl<K> Debouncer<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            next_generation: AtomicU64::new(0),
            shared: Arc::new(Shared {
                table: Mutex::new(Table::default()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedules `task` for `key`, replacing any task still waiting for it.
    pub fn schedule<F>(&self, key: K, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (fire_tx, fire_rx) = oneshot::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let window = self.window;

        let mut table = self.shared.lock();
        if let Some(previous) = table.scheduled.remove(&key) {
            previous.handle.abort();
        }

        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(window) => {}
                _ = fire_rx => {}
            }

            let lane = {
                let mut table = shared.lock();
                match table.scheduled.get(&task_key) {
                    Some(s) if s.generation == generation => {
                        table.scheduled.remove(&task_key);
                    }
                    _ => return,
                }
                *table.in_flight.entry(task_key.clone()).or_insert(0) += 1;
                Arc::clone(table.lanes.entry(task_key.clone()).or_default())
            };

            {
                let _turn = lane.lock().await;
                task.await;
            }

            let mut table = shared.lock();
            let remaining = match table.in_flight.get_mut(&task_key) {
                Some(count) => {
                    *count -= 1;
                    *count
                }
                None => 0,
            };
            if remaining == 0 {
                table.in_flight.remove(&task_key);
                table.lanes.remove(&task_key);
            }
            drop(table);
            shared.idle.notify_waiters();
        });

        table.scheduled.insert(
            key,
            Scheduled {
                generation,
                handle,
                fire_now: Some(fire_tx),
            },
        );
    }

    /// Drops the scheduled task for `key`, if it has not fired yet.
    pub fn cancel(&self, key: &K) -> Cancelled {
        let mut table = self.shared.lock();
        if let Some(scheduled) = table.scheduled.remove(key) {
            scheduled.handle.abort();
            drop(table);
            self.shared.idle.notify_waiters();
            return Cancelled::Dropped;
        }
        if table.in_flight.contains_key(key) {
            Cancelled::InFlight
        } else {
            Cancelled::Idle
        }
    }

    /// Whether a task for `key` is scheduled or running.
    pub fn is_pending(&self, key: &K) -> bool {
        let table = self.shared.lock();
        table.scheduled.contains_key(key) || table.in_flight.contains_key(key)
    }

    /// Keys with a scheduled or running task.
    pub fn pending_keys(&self) -> Vec<K> {
        let table = self.shared.lock();
        let mut keys: Vec<K> = table.scheduled.keys().cloned().collect();
        keys.extend(
            table
                .in_flight
                .keys()
                .filter(|k| !table.scheduled.contains_key(k))
                .cloned(),
        );
        keys
    }

    /// Scheduled plus running tasks, across all keys.
    pub fn pending_count(&self) -> usize {
        let table = self.shared.lock();
        table.scheduled.len() + table.in_flight.values().sum::<usize>()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_count() == 0
    }

    /// Fires every scheduled task now and waits until nothing is pending.
    pub async fn flush(&self) {
        {
            let mut table = self.shared.lock();
            for scheduled in table.scheduled.values_mut() {
                if let Some(fire) = scheduled.fire_now.take() {
                    let _ = fire.send(());
                }
            }
        }

        loop {
            let idle = self.shared.idle.notified();
            if self.is_idle() {
                return;
            }
            idle.await;
        }
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        let mut table = self.shared.lock();
        for (_, scheduled) in table.scheduled.drain() {
            scheduled.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |value: &str| {
            let sink = Arc::clone(&sink);
            let value = value.to_string();
            Box::pin(async move {
                sink.lock().unwrap().push(value);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (log, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_edge_coalesces() {
        let debouncer = Debouncer::new(Duration::from_millis(1000));
        let (log, make) = recorder();

        debouncer.schedule("a", make("one"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        debouncer.schedule("a", make("two"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        debouncer.schedule("a", make("three"));

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(log.lock().unwrap().is_empty());
        assert!(debouncer.is_pending(&"a"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*log.lock().unwrap(), vec!["three"]);
        assert!(debouncer.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let (log, make) = recorder();

        debouncer.schedule("a", make("a1"));
        debouncer.schedule("b", make("b1"));
        assert_eq!(debouncer.pending_count(), 2);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let mut fired = log.lock().unwrap().clone();
        fired.sort();
        assert_eq!(fired, vec!["a1", "b1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_flush() {
        let debouncer = Debouncer::new(Duration::from_secs(60));
        let (log, make) = recorder();

        debouncer.schedule("a", make("dropped"));
        assert_eq!(debouncer.cancel(&"a"), Cancelled::Dropped);
        assert_eq!(debouncer.cancel(&"a"), Cancelled::Idle);

        debouncer.schedule("b", make("flushed"));
        debouncer.flush().await;
        assert_eq!(*log.lock().unwrap(), vec!["flushed"]);
        assert!(debouncer.pending_keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_runs_in_order() {
        let debouncer = Debouncer::new(Duration::ZERO);
        let running = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        for value in ["first", "second"] {
            let running = Arc::clone(&running);
            let overlap = Arc::clone(&overlap);
            let log = Arc::clone(&log);
            debouncer.schedule("k", async move {
                if running.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                log.lock().unwrap().push(value);
                running.fetch_sub(1, Ordering::SeqCst);
            });
            // Let the first task fire before the second is scheduled.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(debouncer.cancel(&"k"), Cancelled::InFlight);
        debouncer.flush().await;
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
    }
}
