use thiserror::Error;

/// Cache failures. [`crate::Cache::fetch_or_compute`] logs these and falls
/// through to the computation; they never fail a read on their own.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache payload error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("cache configuration error: {0}")]
    Config(String),
}
