use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::CacheBackend;
use crate::CacheError;

#[derive(Debug, Clone)]
struct Entry {
    payload: String,
    ttl: Option<Duration>,
}

/// Each entry expires after its own TTL; `0` never expires.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// In-process cache for development and tests.
#[derive(Clone)]
pub struct InMemoryBackend {
    cache: Cache<String, Entry>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(key).await.map(|e| e.payload))
    }

    async fn set(&self, key: &str, payload: String, ttl_secs: u32) -> Result<(), CacheError> {
        let ttl = (ttl_secs > 0).then(|| Duration::from_secs(u64::from(ttl_secs)));
        self.cache.insert(key.to_owned(), Entry { payload, ttl }).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
