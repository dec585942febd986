//! Redis-backed cache store
//!
//! Wraps a multiplexed `ConnectionManager`. An unreachable Redis never fails
//! the process: the store flips to unavailable, callers bypass the cache, and
//! once per probe interval a single operation is let through to find out
//! whether the backend is back.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::store::{ttl_secs, CacheStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, FromRedisValue, RedisResult, Script};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Compare-and-delete: only the holder of the expected value may remove it
const DEL_IF_EQ_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

pub struct RedisCacheStore {
    client: Client,
    manager: RwLock<Option<ConnectionManager>>,
    available: AtomicBool,
    /// When the backend was last seen failing. Doubles as the probe slot:
    /// the caller that advances it past the interval gets to probe.
    last_failure: Mutex<Option<Instant>>,
    probe_interval: Duration,
    op_timeout: Duration,
}

impl RedisCacheStore {
    /// Build the store and try an initial connection.
    ///
    /// Only an unparsable URL is an error. A backend that cannot be reached
    /// yet leaves the store in degraded mode.
    pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.redis_url.as_str())?;

        let store = Self {
            client,
            manager: RwLock::new(None),
            available: AtomicBool::new(false),
            last_failure: Mutex::new(None),
            probe_interval: config.probe_interval,
            op_timeout: config.op_timeout,
        };

        match store.build_manager().await {
            Ok(manager) => {
                *store.manager.write().await = Some(manager);
                store.available.store(true, Ordering::SeqCst);
                info!("Redis cache connected");
            }
            Err(e) => {
                error!(
                    error = %e,
                    "Redis cache unreachable at startup; reads will bypass the cache"
                );
                store.note_failure();
            }
        }

        Ok(store)
    }

    async fn build_manager(&self) -> CacheResult<ConnectionManager> {
        match tokio::time::timeout(self.op_timeout, ConnectionManager::new(self.client.clone()))
            .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout(self.op_timeout.as_millis() as u64)),
        }
    }

    /// Current connection manager, rebuilding it if the startup connect
    /// never succeeded.
    async fn connection(&self) -> CacheResult<ConnectionManager> {
        if let Some(manager) = self.manager.read().await.as_ref() {
            return Ok(manager.clone());
        }

        let mut slot = self.manager.write().await;
        if let Some(manager) = slot.as_ref() {
            return Ok(manager.clone());
        }

        let manager = self.build_manager().await?;
        *slot = Some(manager.clone());
        Ok(manager)
    }

    async fn query<T: FromRedisValue>(
        &self,
        op: &str,
        key: &str,
        cmd: redis::Cmd,
    ) -> CacheResult<T> {
        self.run(op, key, |mut conn| async move {
            cmd.query_async::<_, T>(&mut conn).await
        })
        .await
    }

    /// Run one round trip under the op timeout and track availability.
    async fn run<T, F, Fut>(&self, op: &str, key: &str, f: F) -> CacheResult<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let result = async {
            let conn = self.connection().await?;
            match tokio::time::timeout(self.op_timeout, f(conn)).await {
                Ok(reply) => reply.map_err(CacheError::from),
                Err(_) => Err(CacheError::Timeout(self.op_timeout.as_millis() as u64)),
            }
        }
        .await;

        match &result {
            Ok(_) => self.mark_available(),
            Err(e) if e.is_connection_error() => {
                debug!(op = op, key = %key, error = %e, "Redis command failed");
                self.mark_unavailable(e);
            }
            Err(_) => {}
        }

        result
    }

    fn mark_available(&self) {
        if !self.available.swap(true, Ordering::SeqCst) {
            info!("Redis cache reachable again");
        }
    }

    fn mark_unavailable(&self, err: &CacheError) {
        self.note_failure();
        if self.available.swap(false, Ordering::SeqCst) {
            warn!(error = %err, "Redis cache unavailable; bypassing cache");
        }
    }

    fn note_failure(&self) {
        if let Ok(mut last) = self.last_failure.lock() {
            *last = Some(Instant::now());
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    fn is_available(&self) -> bool {
        if self.available.load(Ordering::SeqCst) {
            return true;
        }

        let Ok(mut last) = self.last_failure.lock() else {
            return false;
        };
        match *last {
            Some(at) if at.elapsed() < self.probe_interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query("get", key, cmd).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl_secs(ttl));
        self.query("set_ex", key, cmd).await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl));
        // Nil reply when the key already exists
        let reply: Option<String> = self.query("set_nx_ex", key, cmd).await?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let _removed: i64 = self.query("del", key, cmd).await?;
        Ok(())
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> CacheResult<bool> {
        let owned_key = key.to_string();
        let expected = expected.to_string();
        let removed: i64 = self
            .run("del_if_eq", key, |mut conn| async move {
                Script::new(DEL_IF_EQ_SCRIPT)
                    .key(owned_key)
                    .arg(expected)
                    .invoke_async::<_, i64>(&mut conn)
                    .await
            })
            .await?;
        Ok(removed == 1)
    }
}
