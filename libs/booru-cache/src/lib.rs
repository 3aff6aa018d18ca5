#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Memoization of expensive reads.
//!
//! A [`Cache`] wraps one [`CacheBackend`] (memcached, in-process, or none) and
//! answers `fetch_or_compute`: return the stored JSON value for a key or run
//! the computation and store its result. Keys for memoized calls come from a
//! [`CacheKey`] template applied to the call's first argument.
//!
//! The cache never fails a read: backend errors are logged and the
//! computation runs as if caching were off.

pub mod backend;
mod cache;
mod config;
mod duration;
mod error;
mod key;

pub use backend::{CacheBackend, InMemoryBackend, MemcacheBackend, NoopBackend};
pub use cache::Cache;
pub use config::{BackendKind, CacheConfig};
pub use duration::CacheDuration;
pub use error::CacheError;
pub use key::CacheKey;
