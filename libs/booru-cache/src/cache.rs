//! Read-through memoization over a [`CacheBackend`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::backend::{CacheBackend, NoopBackend};
use crate::{CacheError, CacheKey};

type Flights = DashMap<String, Arc<Mutex<()>>>;

/// Cheap to clone; clones share the backend and the in-flight table.
///
/// Without single-flight, concurrent misses on one key each run the
/// computation and the last write wins.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    flights: Option<Arc<Flights>>,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.name())
            .field("single_flight", &self.flights.is_some())
            .finish()
    }
}

impl Cache {
    #[must_use]
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    #[must_use]
    pub fn from_arc(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            flights: None,
        }
    }

    /// Every read misses and every computation runs.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(NoopBackend)
    }

    /// Serialize concurrent misses per key so one caller computes and the
    /// rest read its result.
    #[must_use]
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.flights = enabled.then(|| Arc::new(Flights::new()));
        self
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// `Ok(None)` is a miss. A stored JSON `null` is a hit, so for
    /// `T = Option<_>` it comes back as `Ok(Some(None))`.
    ///
    /// # Errors
    /// Backend failures and payloads that do not deserialize into `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.backend.get(key).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Store `value` under `key`, replacing whatever was there.
    ///
    /// # Errors
    /// Backend failures and values that do not serialize.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: impl Into<u32>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        self.backend.set(key, payload, ttl.into()).await
    }

    /// Return the cached value for `key`, or run `compute`, store its result
    /// and return it.
    ///
    /// Cache failures are logged and treated as a miss (on read) or ignored
    /// (on write).
    ///
    /// # Errors
    /// Only what `compute` returns. Failed computations are not cached.
    pub async fn fetch_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: impl Into<u32>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ttl = ttl.into();
        if let Some(hit) = self.lookup(key).await {
            return Ok(hit);
        }

        let _flight = match &self.flights {
            Some(flights) => {
                let flight = Flight::join(flights, key).await;
                if let Some(hit) = self.lookup(key).await {
                    return Ok(hit);
                }
                Some(flight)
            }
            None => None,
        };

        debug!(key, backend = self.backend.name(), "cache miss");
        let value = compute().await?;
        if let Err(e) = self.set(key, &value, ttl).await {
            warn!(key, backend = self.backend.name(), error = %e, "cache unavailable; result not stored");
        }
        Ok(value)
    }

    /// [`Self::fetch_or_compute`] under the key `key` derives from `arg`.
    ///
    /// # Errors
    /// Only what `compute` returns.
    pub async fn memoize<A, T, E, F, Fut>(
        &self,
        key: &CacheKey,
        arg: &A,
        ttl: impl Into<u32>,
        compute: F,
    ) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = key.derive(arg);
        self.fetch_or_compute(&key, ttl, compute).await
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(key, backend = self.backend.name(), error = %e, "cache unavailable; computing directly");
                None
            }
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.flights.as_ref().map_or(0, |f| f.len())
    }
}

/// Holds the per-key lock; the table entry goes away with the last holder.
struct Flight {
    flights: Arc<Flights>,
    key: String,
    _held: OwnedMutexGuard<()>,
}

impl Flight {
    async fn join(flights: &Arc<Flights>, key: &str) -> Self {
        let lock = Arc::clone(flights.entry(key.to_owned()).or_default().value());
        let held = lock.lock_owned().await;
        Self {
            flights: Arc::clone(flights),
            key: key.to_owned(),
            _held: held,
        }
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        // One reference in the table, one in our guard; more means waiters.
        self.flights
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::CacheDuration;
    use crate::backend::InMemoryBackend;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn set(&self, _key: &str, _payload: String, _ttl: u32) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn memory() -> Cache {
        Cache::new(InMemoryBackend::default())
    }

    async fn counted(
        cache: &Cache,
        calls: &AtomicUsize,
        value: u32,
    ) -> Result<u32, CacheError> {
        cache
            .fetch_or_compute("answer", CacheDuration::Short, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(value)
            })
            .await
    }

    #[tokio::test]
    async fn hit_skips_compute() {
        // Arrange
        let cache = memory();
        let calls = AtomicUsize::new(0);

        // Act
        let first = counted(&cache, &calls, 42).await.unwrap();
        let second = counted(&cache, &calls, 7).await.unwrap();

        // Assert
        assert_eq!((first, second), (42, 42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stored_null_is_a_hit() {
        let cache = memory();
        assert_eq!(cache.get::<Option<u32>>("k").await.unwrap(), None);

        cache.set("k", &Option::<u32>::None, 60_u32).await.unwrap();
        assert_eq!(cache.get::<Option<u32>>("k").await.unwrap(), Some(None));

        let calls = AtomicUsize::new(0);
        let got: Result<Option<u32>, CacheError> = cache
            .fetch_or_compute("k", 60_u32, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(1))
            })
            .await;
        assert_eq!(got.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn broken_backend_degrades_to_compute() {
        let cache = Cache::new(BrokenBackend);
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, &calls, 1).await.unwrap(), 1);
        assert_eq!(counted(&cache, &calls, 2).await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(logs_contain("computing directly"));
        assert!(logs_contain("result not stored"));
    }

    #[tokio::test]
    async fn failed_compute_is_not_cached() {
        let cache = memory();
        let err = cache
            .fetch_or_compute("k", CacheDuration::Medium, || async {
                Err::<u32, _>("upstream down")
            })
            .await
            .unwrap_err();
        assert_eq!(err, "upstream down");
        assert_eq!(cache.get::<u32>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_miss() {
        let cache = memory();
        cache.set("k", "not a number", 60_u32).await.unwrap();
        assert!(cache.get::<u32>("k").await.is_err());

        let got: Result<u32, CacheError> = cache
            .fetch_or_compute("k", 60_u32, || async { Ok(5) })
            .await;
        assert_eq!(got.unwrap(), 5);
        assert_eq!(cache.get::<u32>("k").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn without_single_flight_every_miss_computes() {
        let cache = memory();
        let calls = AtomicUsize::new(0);
        let results =
            futures::future::join_all((0..8).map(|_| counted(&cache, &calls, 9))).await;

        assert!(results.iter().all(|r| matches!(r, Ok(9))));
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn single_flight_computes_once() {
        let cache = memory().with_single_flight(true);
        let calls = AtomicUsize::new(0);
        let results =
            futures::future::join_all((0..8).map(|_| counted(&cache, &calls, 9))).await;

        assert!(results.iter().all(|r| matches!(r, Ok(9))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn memoize_uses_derived_key() {
        const BY_SOURCE: CacheKey = CacheKey::new("sourceById", &["sourceId"]);
        let cache = memory();

        let got: Result<String, CacheError> = cache
            .memoize(&BY_SOURCE, &json!({ "sourceId": 3 }), CacheDuration::Medium, || async {
                Ok("gelbooru".to_owned())
            })
            .await;

        assert_eq!(got.unwrap(), "gelbooru");
        assert_eq!(
            cache.get::<String>("sourceById_3").await.unwrap().as_deref(),
            Some("gelbooru")
        );
    }

    #[test]
    fn disabled_cache_reports_none_backend() {
        let cache = Cache::disabled();
        assert_eq!(cache.backend_name(), "none");
        assert!(format!("{cache:?}").contains("single_flight: false"));
    }
}
