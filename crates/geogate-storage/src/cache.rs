//! Short-lived key/value state: SMS codes, rate-limit windows.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Expiring key/value cache. Entries past their TTL behave as absent.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Insert or replace, resetting the TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Add one and return the new value. A missing or expired key starts a
    /// fresh window of `ttl`; an existing key keeps its expiry.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CacheError>;
}
