//! Process-local cache store
//!
//! Honors TTLs and the atomic set-if-absent contract, so the read path
//! behaves the same as against Redis. Used by tests and local development.
//! Expiry follows `tokio::time`, so paused-clock tests can advance past a
//! lock's TTL without sleeping.

use crate::error::{CacheError, CacheResult};
use crate::store::CacheStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
struct CallCounters {
    get: AtomicUsize,
    set: AtomicUsize,
    set_nx: AtomicUsize,
    del: AtomicUsize,
}

pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, Entry>>,
    available: AtomicBool,
    calls: CallCounters,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            calls: CallCounters::default(),
        }
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether `key` holds a live value, without counting as a `get`.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.get(key).is_some_and(|e| e.is_live(now)))
            .unwrap_or(false)
    }

    pub fn get_calls(&self) -> usize {
        self.calls.get.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.calls.set.load(Ordering::SeqCst)
    }

    pub fn set_nx_calls(&self) -> usize {
        self.calls.set_nx.load(Ordering::SeqCst)
    }

    pub fn del_calls(&self) -> usize {
        self.calls.del.load(Ordering::SeqCst)
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> CacheResult<T> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable);
        }
        let mut entries = self.entries.lock().map_err(|_| CacheError::Unavailable)?;
        Ok(f(&mut entries))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        self.with_entries(|entries| match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.calls.set.fetch_add(1, Ordering::SeqCst);
        let expires_at = Instant::now() + ttl;
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at,
                },
            );
        })
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        self.calls.set_nx.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        self.with_entries(|entries| {
            if entries.get(key).is_some_and(|e| e.is_live(now)) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: now + ttl,
                },
            );
            true
        })
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.calls.del.fetch_add(1, Ordering::SeqCst);
        self.with_entries(|entries| {
            entries.remove(key);
        })
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> CacheResult<bool> {
        self.calls.del.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        self.with_entries(|entries| {
            let owned = entries
                .get(key)
                .is_some_and(|e| e.is_live(now) && e.value == expected);
            if owned {
                entries.remove(key);
            }
            owned
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_nx_only_once() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(10);

        assert!(store.set_nx_ex("albums_lock", "locked", ttl).await.unwrap());
        assert!(!store.set_nx_ex("albums_lock", "locked", ttl).await.unwrap());
        assert_eq!(store.set_nx_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryCacheStore::new();
        store
            .set_ex("songs", "[]", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.get("songs").await.unwrap().as_deref(), Some("[]"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("songs").await.unwrap(), None);
        assert!(!store.contains("songs"));
    }

    #[tokio::test]
    async fn test_del_if_eq_only_removes_matching_value() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(10);
        store.set_nx_ex("songs_lock", "token-b", ttl).await.unwrap();

        assert!(!store.del_if_eq("songs_lock", "token-a").await.unwrap());
        assert!(store.contains("songs_lock"));

        assert!(store.del_if_eq("songs_lock", "token-b").await.unwrap());
        assert!(!store.contains("songs_lock"));
        assert!(!store.del_if_eq("songs_lock", "token-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_del_missing_key_is_ok() {
        let store = MemoryCacheStore::new();
        assert!(store.del("nothing_here").await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_rejects_and_still_counts() {
        let store = MemoryCacheStore::new();
        store.set_available(false);

        assert!(!store.is_available());
        assert!(matches!(
            store.get("albums").await,
            Err(CacheError::Unavailable)
        ));
        assert_eq!(store.get_calls(), 1);
    }
}
