//! Cache store abstraction
//!
//! The minimal command set the read path and the invalidator need:
//! GET, SET EX, SET NX EX and DEL over UTF-8 text values.

use crate::error::CacheResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Key/value store backing the catalog cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Whether the backend is currently considered reachable.
    ///
    /// Callers skip the cache entirely when this is false.
    fn is_available(&self) -> bool;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// `SET key value EX ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// `SET key value NX EX ttl`. Returns true iff this call created the key.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// Deleting a missing key is not an error.
    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Delete `key` only while it still holds `expected`, atomically.
    /// Returns true iff the key was deleted.
    async fn del_if_eq(&self, key: &str, expected: &str) -> CacheResult<bool>;
}

/// Shared handle built once at startup and cloned into every consumer.
pub type SharedCacheStore = Arc<dyn CacheStore>;

/// Whole seconds for an `EX` argument: rounded up, never below 1.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_secs_rounds_up() {
        assert_eq!(ttl_secs(Duration::from_secs(1800)), 1800);
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::ZERO), 1);
    }
}
