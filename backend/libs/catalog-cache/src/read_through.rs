//! Cache-aside reads with stampede protection
//!
//! On a miss only the caller that wins `SET <key>_lock NX EX` loads from the
//! source and fills the cache. Everyone else waits briefly and re-reads.
//! The lock holds a token unique to the acquisition, and release only
//! deletes the key while it still holds that token.
//!
//! Capacity assumption: a loser that still misses after its wait loads from
//! the source itself, once, without writing the cache. While a slow winner
//! holds the lock, every concurrent loser therefore costs one source query.
//! `catalog_cache_fallback_loads_total` tracks how often that happens.

use crate::keys::CacheKey;
use crate::metrics::CacheMetrics;
use crate::store::SharedCacheStore;
use crate::ttl;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct ReadThroughConfig {
    /// TTL for cached values
    pub cache_ttl: Duration,
    /// TTL for the refill lock; bounds how long a crashed winner blocks refills
    pub lock_ttl: Duration,
    /// How long a loser waits before re-reading
    pub lock_wait: Duration,
}

impl Default for ReadThroughConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(ttl::CATALOG),
            lock_ttl: Duration::from_secs(ttl::LOCK),
            lock_wait: Duration::from_millis(ttl::LOCK_WAIT_MS),
        }
    }
}

enum LockAttempt {
    /// Holds the token written under the lock key
    Acquired(String),
    Contended,
    Unavailable,
}

#[derive(Clone)]
pub struct ReadThroughCache {
    store: SharedCacheStore,
    config: ReadThroughConfig,
    metrics: CacheMetrics,
}

impl ReadThroughCache {
    pub fn new(store: SharedCacheStore, config: ReadThroughConfig) -> Self {
        Self {
            store,
            config,
            metrics: CacheMetrics::new(),
        }
    }

    pub fn config(&self) -> &ReadThroughConfig {
        &self.config
    }

    /// Read `key` with the configured TTL. See [`Self::read_with_ttl`].
    pub async fn read<T, E, F, Fut>(&self, key: &str, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.read_with_ttl(key, self.config.cache_ttl, load).await
    }

    /// Return the cached value for `key`, or load it from the source.
    ///
    /// Cache failures are logged and never returned; the only error a caller
    /// sees is one produced by `load`.
    pub async fn read_with_ttl<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.store.is_available() {
            debug!(key = %key, "Cache unavailable, loading from source");
            self.metrics.record_bypass(key);
            return load().await;
        }

        if let Some(value) = self.lookup(key).await {
            return Ok(value);
        }

        let lock_key = CacheKey::lock(key);
        match self.try_lock(&lock_key).await {
            LockAttempt::Acquired(token) => {
                self.metrics.record_lock_win(key);
                let result = load().await;
                if let Ok(value) = &result {
                    self.fill(key, value, ttl).await;
                }
                self.release(&lock_key, &token).await;
                result
            }
            LockAttempt::Contended => {
                debug!(key = %key, "Refill lock held elsewhere, waiting");
                self.metrics.record_lock_contention(key);
                tokio::time::sleep(self.config.lock_wait).await;

                if let Some(value) = self.lookup(key).await {
                    return Ok(value);
                }

                debug!(key = %key, "Still missing after wait, loading without cache write");
                self.metrics.record_fallback_load(key);
                load().await
            }
            LockAttempt::Unavailable => load().await,
        }
    }

    /// All albums. Key: `albums`
    pub async fn albums<T, E, F, Fut>(&self, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.read(&CacheKey::albums(), load).await
    }

    /// All songs. Key: `songs`
    pub async fn songs<T, E, F, Fut>(&self, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.read(&CacheKey::songs(), load).await
    }

    /// One album with its songs. Key: `album_songs_{album_id}`
    pub async fn album_songs<T, E, F, Fut>(&self, album_id: i64, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.read(&CacheKey::album_songs(album_id), load).await
    }

    /// Cached value for `key`. Errors and undecodable entries count as a miss.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    self.metrics.record_hit(key);
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    self.metrics.record_error(key, "decode");
                    if let Err(e) = self.store.del(key).await {
                        debug!(key = %key, error = %e, "Failed to delete undecodable entry");
                    }
                    self.metrics.record_miss(key);
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss(key);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                self.metrics.record_error(key, "get");
                self.metrics.record_miss(key);
                None
            }
        }
    }

    async fn try_lock(&self, lock_key: &str) -> LockAttempt {
        let token = Uuid::new_v4().to_string();
        match self
            .store
            .set_nx_ex(lock_key, &token, self.config.lock_ttl)
            .await
        {
            Ok(true) => LockAttempt::Acquired(token),
            Ok(false) => LockAttempt::Contended,
            Err(e) => {
                warn!(key = %lock_key, error = %e, "Failed to take refill lock, loading directly");
                self.metrics.record_error(lock_key, "lock");
                LockAttempt::Unavailable
            }
        }
    }

    async fn fill<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        // Serialize fully before touching the store so no partial value is written
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize value for cache");
                self.metrics.record_error(key, "encode");
                return;
            }
        };

        match self.store.set_ex(key, &raw, ttl).await {
            Ok(()) => {
                debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache filled");
                self.metrics.record_write(key);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to write cache entry");
                self.metrics.record_error(key, "set");
            }
        }
    }

    async fn release(&self, lock_key: &str, token: &str) {
        match self.store.del_if_eq(lock_key, token).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(key = %lock_key, "Refill lock expired before release, leaving it alone");
            }
            Err(e) => {
                // Expires on its own after lock_ttl
                warn!(key = %lock_key, error = %e, "Failed to release refill lock");
                self.metrics.record_error(lock_key, "unlock");
            }
        }
    }
}
