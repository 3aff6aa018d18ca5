//! Storage behind [`crate::Cache`].

use async_trait::async_trait;

use crate::CacheError;

mod memcache;
mod memory;
mod noop;

pub use memcache::MemcacheBackend;
pub use memory::InMemoryBackend;
pub use noop::NoopBackend;

/// String key → JSON text payload with a TTL in seconds (`0` = no expiry).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, payload: String, ttl_secs: u32) -> Result<(), CacheError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
