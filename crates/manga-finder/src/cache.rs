//! In-memory query cache for API responses.
//!
//! Responses are memoized by [`QueryKey`] and served without a refetch while
//! they are younger than the caller's freshness window. Concurrent requests
//! for one key share a single in-flight fetch, which runs on its own task.
//! Values are kept as JSON so a single store can hold every endpoint's
//! response shape.

use crate::api::{ApiError, QueryKey};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

type FetchResult = Result<Arc<Value>, ApiError>;
type InFlight = Shared<BoxFuture<'static, FetchResult>>;

/// Tri-state view of a key, as the screens render it
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// Never requested (or invalidated)
    Idle,
    /// A fetch is in flight
    Loading,
    /// The last fetch failed
    Failed(ApiError),
    /// Data is available
    Ready(T),
}

impl<T> From<Result<T, ApiError>> for QueryState<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(data) => QueryState::Ready(data),
            Err(e) => QueryState::Failed(e),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    result: FetchResult,
    stored_at: Instant,
}

impl Entry {
    fn is_fresh(&self, freshness: Duration) -> bool {
        self.result.is_ok() && self.stored_at.elapsed() < freshness
    }
}

#[derive(Default)]
struct Store {
    entries: HashMap<QueryKey, Entry>,
    in_flight: HashMap<QueryKey, InFlight>,
}

/// Cache retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first failure
    pub retries: u32,
    /// Fixed wait before each retry
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            delay: Duration::from_millis(1000),
        }
    }
}

/// Shared query cache handle. Clones refer to the same store.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<Mutex<Store>>,
    retry: RetryPolicy,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl QueryCache {
    /// Create an empty cache
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            retry,
        }
    }

    /// Return the cached value for `key` if fresh, otherwise fetch it.
    ///
    /// When a fetch for `key` is already running the caller waits for that
    /// one instead of starting another. The outcome (value or error) is
    /// stored under `key`; errors never count as fresh.
    pub async fn get<T, F, Fut>(
        &self,
        key: &QueryKey,
        freshness: Duration,
        fetcher: F,
    ) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let in_flight = {
            let mut store = self.store.lock().await;

            if let Some(entry) = store.entries.get(key) {
                if entry.is_fresh(freshness) {
                    debug!(key = %key, "Cache hit");
                    let value = entry.result.clone()?;
                    drop(store);
                    return decode(&value);
                }
            }

            match store.in_flight.get(key) {
                Some(pending) => {
                    debug!(key = %key, "Joining in-flight request");
                    pending.clone()
                }
                None => {
                    debug!(key = %key, "Cache miss");
                    let pending = self.spawn_fetch(key.clone(), fetcher);
                    store.in_flight.insert(key.clone(), pending.clone());
                    pending
                }
            }
        };

        let value = in_flight.await?;
        decode(&value)
    }

    /// Start the fetch for `key` on its own task and return a shared handle
    /// to its outcome. The task records the outcome itself, so the entry
    /// settles even when every waiter is dropped.
    fn spawn_fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> InFlight
    where
        T: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let cleanup = (Arc::clone(&self.store), key.clone());
        let retry = self.retry;

        let task = tokio::spawn(async move {
            let mut attempt = 0;
            let result = loop {
                match fetcher().await {
                    Ok(data) => break encode(&data),
                    Err(e) if attempt < retry.retries => {
                        attempt += 1;
                        warn!(
                            key = %key,
                            error = %e,
                            attempt = attempt,
                            "Fetch failed, retrying"
                        );
                        sleep(retry.delay).await;
                    }
                    Err(e) => break Err(e),
                }
            };

            let mut store = store.lock().await;
            store.in_flight.remove(&key);
            store.entries.insert(
                key,
                Entry {
                    result: result.clone(),
                    stored_at: Instant::now(),
                },
            );
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let (store, key) = cleanup;
                    store.lock().await.in_flight.remove(&key);
                    Err(ApiError::Network(format!("fetch task failed: {}", e)))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Write a value directly, bypassing any fetcher. Last writer wins.
    pub async fn set<T: Serialize>(&self, key: &QueryKey, value: &T) -> Result<(), ApiError> {
        let result = encode(value)?;
        let mut store = self.store.lock().await;
        store.entries.insert(
            key.clone(),
            Entry {
                result: Ok(result),
                stored_at: Instant::now(),
            },
        );
        debug!(key = %key, "Cache stored");
        Ok(())
    }

    /// Current state of `key` without triggering a fetch
    pub async fn state<T: DeserializeOwned>(&self, key: &QueryKey) -> QueryState<T> {
        let store = self.store.lock().await;
        if store.in_flight.contains_key(key) {
            return QueryState::Loading;
        }
        match store.entries.get(key) {
            None => QueryState::Idle,
            Some(Entry { result: Err(e), .. }) => QueryState::Failed(e.clone()),
            Some(Entry { result: Ok(v), .. }) => decode(v).into(),
        }
    }

    /// Cached value for `key` regardless of age
    pub async fn peek<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let store = self.store.lock().await;
        match store.entries.get(key) {
            Some(Entry { result: Ok(v), .. }) => decode(v).ok(),
            _ => None,
        }
    }

    /// Drop the stored entry for `key`
    pub async fn invalidate(&self, key: &QueryKey) {
        self.store.lock().await.entries.remove(key);
    }

    /// Drop every stored entry. In-flight fetches still complete and store.
    pub async fn clear(&self) {
        self.store.lock().await.entries.clear();
        debug!("Cache cleared");
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.lock().await;
        CacheStats {
            entries: store.entries.len(),
            failed: store.entries.values().filter(|e| e.result.is_err()).count(),
            in_flight: store.in_flight.len(),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> FetchResult {
    serde_json::to_value(value)
        .map(Arc::new)
        .map_err(ApiError::from)
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, ApiError> {
    <T as Deserialize>::deserialize(value).map_err(ApiError::from)
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub failed: usize,
    pub in_flight: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FRESH: Duration = Duration::from_secs(300);

    fn counting_fetcher(
        calls: Arc<AtomicUsize>,
        value: u32,
    ) -> impl Fn() -> BoxFuture<'static, Result<u32, ApiError>> + Send + Sync + 'static {
        move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(100)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_served_without_fetch() {
        let cache = QueryCache::default();
        let key = QueryKey::from("/manga?q=berserk");
        let calls = Arc::new(AtomicUsize::new(0));

        let first: u32 = cache
            .get(&key, FRESH, counting_fetcher(Arc::clone(&calls), 7))
            .await
            .unwrap();
        let second: u32 = cache
            .get(&key, FRESH, counting_fetcher(Arc::clone(&calls), 8))
            .await
            .unwrap();

        assert_eq!(first, 7);
        assert_eq!(second, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_share_one_fetch() {
        let cache = QueryCache::default();
        let key = QueryKey::from("/top/manga?limit=4");
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.get::<u32, _, _>(&key, FRESH, counting_fetcher(Arc::clone(&calls), 1)),
            cache.get::<u32, _, _>(&key, FRESH, counting_fetcher(Arc::clone(&calls), 2)),
        );

        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().await.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_refetched_once() {
        let cache = QueryCache::default();
        let key = QueryKey::from("/manga/2/full");
        let calls = Arc::new(AtomicUsize::new(0));

        let _: u32 = cache
            .get(&key, FRESH, counting_fetcher(Arc::clone(&calls), 1))
            .await
            .unwrap();

        tokio::time::advance(FRESH + Duration::from_secs(1)).await;

        let refreshed: u32 = cache
            .get(&key, FRESH, counting_fetcher(Arc::clone(&calls), 2))
            .await
            .unwrap();
        let again: u32 = cache
            .get(&key, FRESH, counting_fetcher(Arc::clone(&calls), 3))
            .await
            .unwrap();

        assert_eq!(refreshed, 2);
        assert_eq!(again, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_retry_then_success() {
        let cache = QueryCache::default();
        let key = QueryKey::from("/genres/manga");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let start = Instant::now();
        let value: u32 = cache
            .get(&key, FRESH, move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ApiError::Network("connection reset".to_string()))
                    } else {
                        Ok(5)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_stored_and_refetched() {
        let cache = QueryCache::default();
        let key = QueryKey::from("/manga/1/full");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let err = cache
            .get::<u32, _, _>(&key, FRESH, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ApiError::Http {
                        status: 500,
                        message: "Internal Server Error".to_string(),
                    })
                }
            })
            .await
            .unwrap_err();

        // One attempt plus one retry
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.status(), Some(500));
        assert_eq!(cache.state::<u32>(&key).await, QueryState::Failed(err));

        // Errors are never fresh
        let value: u32 = cache
            .get(&key, FRESH, counting_fetcher(Arc::clone(&calls), 9))
            .await
            .unwrap();
        assert_eq!(value, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_write_is_served() {
        let cache = QueryCache::default();
        let key = QueryKey::from("/manga?genres=1");
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.state::<Vec<u32>>(&key).await, QueryState::Idle);
        cache.set(&key, &vec![1u32, 2, 3]).await.unwrap();
        assert_eq!(
            cache.state::<Vec<u32>>(&key).await,
            QueryState::Ready(vec![1, 2, 3])
        );

        let calls_inner = Arc::clone(&calls);
        let value: Vec<u32> = cache
            .get(&key, FRESH, move || {
                calls_inner.fetch_add(1, Ordering::SeqCst);
                async { Ok(Vec::new()) }
            })
            .await
            .unwrap();
        assert_eq!(value, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_state_while_in_flight() {
        let cache = QueryCache::default();
        let key = QueryKey::from("/top/manga");
        let calls = Arc::new(AtomicUsize::new(0));

        let background = cache.clone();
        let background_key = key.clone();
        let fetcher = counting_fetcher(Arc::clone(&calls), 3);
        let handle = tokio::spawn(async move {
            background.get::<u32, _, _>(&background_key, FRESH, fetcher).await
        });

        // Let the spawned task register its fetch
        tokio::task::yield_now().await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.state::<u32>(&key).await, QueryState::Loading);

        assert_eq!(handle.await.unwrap().unwrap(), 3);
        assert_eq!(cache.state::<u32>(&key).await, QueryState::Ready(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_settles_after_caller_dropped() {
        let cache = QueryCache::default();
        let key = QueryKey::from("/manga/13/full");
        let calls = Arc::new(AtomicUsize::new(0));

        // The only caller gives up long before the 100ms fetch completes
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get::<u32, _, _>(&key, FRESH, counting_fetcher(Arc::clone(&calls), 4)),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cache.state::<u32>(&key).await, QueryState::Loading);

        sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.state::<u32>(&key).await, QueryState::Ready(4));
        assert_eq!(cache.stats().await.in_flight, 0);

        // Served from the stored result, no second fetch
        let value: u32 = cache
            .get(&key, FRESH, counting_fetcher(Arc::clone(&calls), 5))
            .await
            .unwrap();
        assert_eq!(value, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = QueryCache::default();
        let a = QueryKey::from("a");
        let b = QueryKey::from("b");
        cache.set(&a, &1u32).await.unwrap();
        cache.set(&b, &2u32).await.unwrap();
        assert_eq!(cache.stats().await.entries, 2);

        cache.invalidate(&a).await;
        assert_eq!(cache.peek::<u32>(&a).await, None);
        assert_eq!(cache.peek::<u32>(&b).await, Some(2));

        cache.clear().await;
        assert_eq!(
            cache.stats().await,
            CacheStats {
                entries: 0,
                failed: 0,
                in_flight: 0
            }
        );
    }
}
