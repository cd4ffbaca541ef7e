use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::info;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SingleflightError {
    #[error("in-flight call ended without producing a result; the task panicked or the runtime is shutting down")]
    NoResult,
}

type Waiters<T> = Vec<oneshot::Sender<T>>;

/// A single-flight group: concurrent calls to [`Group::work`] with the same key coalesce so
/// that only one instance of the work executes; every caller receives a clone of its result.
///
/// - The first caller for a key spawns the work as its own tokio task and registers itself as
///   a waiter. Later callers for the same key register as waiters on the same call.
/// - Because the work runs detached from the callers, dropping every waiting future does not
///   cancel it: it runs to completion and its side effects are applied.
/// - Once the work completes, the key is released; the next call starts a fresh flight.
///
/// Requires a tokio runtime.
pub struct Group<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    calls: Arc<Mutex<HashMap<K, Waiters<T>>>>,
}

impl<K, T> Default for Group<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Group<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `work` for `key` unless a call for `key` is already in flight, in which case this
    /// waits for that call's result instead. `work` is only polled if this caller is the leader.
    pub async fn work<Fut>(&self, key: K, work: Fut) -> Result<T, SingleflightError>
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let is_leader = {
            let mut calls = self.calls.lock();
            match calls.get_mut(&key) {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                },
                None => {
                    calls.insert(key.clone(), vec![tx]);
                    true
                },
            }
        };

        if is_leader {
            let mut call = InFlightCall {
                calls: self.calls.clone(),
                key: Some(key),
            };
            tokio::spawn(async move {
                let value = work.await;
                call.complete(value);
            });
        }

        rx.await.map_err(|e| {
            info!("singleflight call dropped before broadcasting a result: {e:?}");
            SingleflightError::NoResult
        })
    }

    /// Number of keys with a call currently in flight.
    pub fn num_in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

/// Owns the registration of one in-flight key. Completing it broadcasts the value; dropping it
/// without completing (the work panicked or the runtime shut down) releases the key so waiters
/// observe an error rather than hanging.
struct InFlightCall<K, T>
where
    K: Eq + Hash,
{
    calls: Arc<Mutex<HashMap<K, Waiters<T>>>>,
    key: Option<K>,
}

impl<K, T> InFlightCall<K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    fn complete(&mut self, value: T) {
        let Some(key) = self.key.take() else {
            return;
        };
        let waiters = self.calls.lock().remove(&key).unwrap_or_default();
        for tx in waiters {
            // Receivers may have been dropped.
            let _ = tx.send(value.clone());
        }
    }
}

impl<K, T> Drop for InFlightCall<K, T>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.calls.lock().remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn coalesces_concurrent_calls_and_returns_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let group = Arc::new(Group::<String, usize>::new());

        let mut handles: Vec<JoinHandle<Result<usize, SingleflightError>>> = Vec::new();
        for _ in 0..32 {
            let group = group.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                group
                    .work("users:123".to_string(), async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Give followers time to enqueue before we finish.
                        sleep(Duration::from_millis(50)).await;
                        42usize
                    })
                    .await
            }));
        }

        let mut results = HashSet::new();
        for h in handles {
            results.insert(h.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "only one call runs");
        assert_eq!(results.len(), 1);
        assert!(results.contains(&42));
        assert_eq!(group.num_in_flight(), 0);
    }

    #[tokio::test]
    async fn resets_between_sequential_runs() {
        let group = Group::<&'static str, u32>::new();

        assert_eq!(group.work("k", async { 7 }).await.unwrap(), 7);
        // a new flight starts once the previous one has completed
        assert_eq!(group.work("k", async { 9 }).await.unwrap(), 9);
        assert_eq!(group.num_in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn different_keys_do_not_coalesce() {
        let calls = Arc::new(AtomicUsize::new(0));
        let group = Arc::new(Group::<u32, u32>::new());

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let group = group.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                group
                    .work(i, async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        i * 2
                    })
                    .await
            }));
        }
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.await.unwrap().unwrap(), i as u32 * 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_callers_do_not_cancel_work() {
        let finished = Arc::new(AtomicUsize::new(0));
        let group = Arc::new(Group::<u8, ()>::new());

        let waiter = {
            let group = group.clone();
            let finished = finished.clone();
            tokio::spawn(async move {
                group
                    .work(1, async move {
                        sleep(Duration::from_millis(30)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
            })
        };

        sleep(Duration::from_millis(5)).await;
        waiter.abort();

        sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(group.num_in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_work_releases_waiters() {
        let group = Group::<u8, u8>::new();
        let result = group
            .work(3, async {
                if group_should_fail() {
                    panic!("work failed");
                }
                0u8
            })
            .await;
        assert_eq!(result, Err(SingleflightError::NoResult));
        assert_eq!(group.num_in_flight(), 0);

        // the key is usable again
        assert_eq!(group.work(3, async { 5 }).await.unwrap(), 5);
    }

    fn group_should_fail() -> bool {
        true
    }
}
