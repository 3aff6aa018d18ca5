use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{InMemoryBackend, MemcacheBackend};
use crate::{Cache, CacheError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memcache,
    #[default]
    Memory,
    None,
}

/// The `cache` config section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub backend: BackendKind,
    /// memcached endpoints as `host:port`.
    pub servers: Vec<String>,
    /// Per memcached call.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub single_flight: bool,
    /// Capacity of the in-memory backend.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            servers: vec!["127.0.0.1:11211".to_owned()],
            timeout: Duration::from_millis(500),
            single_flight: false,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// # Errors
    /// Returns `CacheError::Config` for a memcache backend without servers.
    pub fn build(&self) -> Result<Cache, CacheError> {
        let cache = match self.backend {
            BackendKind::Memcache => Cache::new(MemcacheBackend::new(self.servers.as_slice(), self.timeout)?),
            BackendKind::Memory => Cache::new(InMemoryBackend::new(self.max_entries)),
            BackendKind::None => Cache::disabled(),
        };
        info!(
            backend = cache.backend_name(),
            single_flight = self.single_flight,
            "cache ready"
        );
        Ok(cache.with_single_flight(self.single_flight))
    }
}
