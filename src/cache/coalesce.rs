//! Cache-or-compute wrapper that collapses concurrent identical requests.
//!
//! The in-flight future for a key is registered while the pending-map lock is
//! held and before anything is awaited, so N concurrent callers for the same
//! uncached key share a single producer invocation. Failures are handed to
//! every waiter and never stored.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use super::ExpiringCacheStore;

type InFlight<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;
type StoreHook<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

pub struct CoalescingCache<K, V, E> {
    store: Arc<ExpiringCacheStore<K, V>>,
    pending: Arc<Mutex<HashMap<K, InFlight<V, E>>>>,
    on_store: Option<StoreHook<K, V>>,
}

impl<K, V, E> CoalescingCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<ExpiringCacheStore<K, V>>) -> Self {
        Self {
            store,
            pending: Arc::new(Mutex::new(HashMap::new())),
            on_store: None,
        }
    }

    /// Register a callback run once per successful producer call, after the
    /// result has been written to the store.
    pub fn on_store(mut self, hook: impl Fn(&K, &V) + Send + Sync + 'static) -> Self {
        self.on_store = Some(Arc::new(hook));
        self
    }

    pub fn store(&self) -> &Arc<ExpiringCacheStore<K, V>> {
        &self.store
    }

    /// Number of producer calls currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    /// Return the cached value for `key`, join an outstanding call for it, or
    /// start `producer` and share its outcome with every concurrent caller.
    pub async fn resolve<F, Fut>(&self, key: K, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if let Some(value) = self.store.get(&key) {
            return Ok(value);
        }

        let in_flight = {
            let mut pending = self.pending.lock();
            // A producer may have settled between the miss above and taking the lock.
            if let Some(value) = self.store.get(&key) {
                return Ok(value);
            }
            match pending.get(&key) {
                Some(existing) => {
                    debug!("joining in-flight request");
                    existing.clone()
                }
                None => {
                    let shared = self.settle(key.clone(), producer()).boxed().shared();
                    pending.insert(key, shared.clone());
                    shared
                }
            }
        };

        in_flight.await
    }

    fn settle<Fut>(&self, key: K, work: Fut) -> impl Future<Output = Result<V, E>> + Send + 'static
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        let on_store = self.on_store.clone();

        async move {
            let outcome = work.await;
            if let Ok(value) = &outcome {
                store.set(key.clone(), value.clone());
                if let Some(hook) = &on_store {
                    hook(&key, value);
                }
            }
            pending.lock().remove(&key);
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cache() -> CoalescingCache<String, String, String> {
        CoalescingCache::new(Arc::new(ExpiringCacheStore::new(
            16,
            Duration::from_secs(60),
        )))
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_producer_call() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..5).map(|_| {
            let calls = Arc::clone(&calls);
            cache.resolve("k".to_string(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, String>("value".to_string())
            })
        });
        let results = futures_util::future::join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_deref() == Ok("value")));
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.store().get("k").as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn concurrent_callers_across_tasks_share_one_producer_call() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .resolve("k".to_string(), move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, String>("v".to_string())
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Ok("v"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let attempt = |calls: Arc<AtomicUsize>| {
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("boom".to_string())
                } else {
                    Ok("ok".to_string())
                }
            }
        };

        let first = cache.resolve("k".to_string(), attempt(Arc::clone(&calls))).await;
        assert_eq!(first, Err("boom".to_string()));
        assert!(!cache.store().has("k"));
        assert_eq!(cache.in_flight(), 0);

        let second = cache.resolve("k".to_string(), attempt(Arc::clone(&calls))).await;
        assert_eq!(second, Ok("ok".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cached_value_skips_producer() {
        let cache = cache();
        cache.store().set("k".to_string(), "stored".to_string());

        let value = cache
            .resolve("k".to_string(), || async {
                Err::<String, _>("producer must not run".to_string())
            })
            .await;
        assert_eq!(value.as_deref(), Ok("stored"));
    }

    #[tokio::test]
    async fn store_hook_runs_once_per_success() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hook_hits = Arc::clone(&hits);
        let cache = cache().on_store(move |key: &String, value: &String| {
            assert_eq!(key, "k");
            assert_eq!(value, "v");
            hook_hits.fetch_add(1, Ordering::SeqCst);
        });

        let callers = (0..3).map(|_| {
            cache.resolve("k".to_string(), || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, String>("v".to_string())
            })
        });
        futures_util::future::join_all(callers).await;
        cache
            .resolve("k".to_string(), || async { Ok::<_, String>("v".to_string()) })
            .await
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
