use crate::read_through::ReadThroughConfig;
use crate::ttl;
use std::time::Duration;

/// Redis and read-path settings, read from the environment.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub redis_url: String,
    pub cache_ttl: Duration,
    pub lock_ttl: Duration,
    pub lock_wait: Duration,
    /// How long an unreachable backend is skipped before one operation is
    /// let through to probe it again.
    pub probe_interval: Duration,
    /// Upper bound on a single Redis command, so a hung backend degrades
    /// reads instead of stalling them.
    pub op_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://redis:6379".to_string(),
            cache_ttl: Duration::from_secs(ttl::CATALOG),
            lock_ttl: Duration::from_secs(ttl::LOCK),
            lock_wait: Duration::from_millis(ttl::LOCK_WAIT_MS),
            probe_interval: Duration::from_millis(5000),
            op_timeout: Duration::from_millis(1000),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            cache_ttl: env_u64("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            lock_ttl: env_u64("CACHE_LOCK_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_ttl),
            lock_wait: env_u64("CACHE_LOCK_WAIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_wait),
            probe_interval: env_u64("CACHE_PROBE_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.probe_interval),
            op_timeout: env_u64("CACHE_OP_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.op_timeout),
        }
    }

    pub fn read_through(&self) -> ReadThroughConfig {
        ReadThroughConfig {
            cache_ttl: self.cache_ttl,
            lock_ttl: self.lock_ttl,
            lock_wait: self.lock_wait,
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
