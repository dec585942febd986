//! Catalog caching layer
//!
//! Read-optimized cache for the album/song catalog with:
//! - Cache-aside reads guarded by a per-key refill lock (stampede protection)
//! - Write-path invalidation of the keys a write made stale
//! - Redis-backed store that degrades to direct source reads when Redis is down
//! - In-memory store for tests and local development
//! - Metrics integration
//!
//! ```no_run
//! use catalog_cache::{CacheConfig, ReadThroughCache, RedisCacheStore};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheConfig::from_env();
//! let store = Arc::new(RedisCacheStore::connect(&config).await?);
//! let cache = ReadThroughCache::new(store, config.read_through());
//!
//! let albums: Vec<String> = cache
//!     .albums(|| async { Ok::<_, std::io::Error>(vec!["Blue".to_string()]) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod keys;
mod metrics;

pub mod invalidation;
pub mod memory;
pub mod read_through;
pub mod redis_store;
pub mod store;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use invalidation::{CacheInvalidator, CatalogWrite};
pub use keys::CacheKey;
pub use memory::MemoryCacheStore;
pub use metrics::CacheMetrics;
pub use read_through::{ReadThroughCache, ReadThroughConfig};
pub use redis_store::RedisCacheStore;
pub use store::{CacheStore, SharedCacheStore};

/// Default TTL values
pub mod ttl {
    pub const CATALOG: u64 = 1800; // 30 minutes
    pub const LOCK: u64 = 10; // seconds
    pub const LOCK_WAIT_MS: u64 = 200;
}
