//! Write-path cache invalidation
//!
//! After a successful catalog write the writer deletes every key whose
//! contents the write could have changed. The next read refills them.
//! Invalidation is best effort: the write has already committed, so a
//! failing delete is logged and never surfaced.

use crate::keys::CacheKey;
use crate::metrics::CacheMetrics;
use crate::store::SharedCacheStore;
use tracing::{debug, warn};

/// A committed catalog write, described by what it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogWrite {
    AlbumCreated,
    SongAdded { album_id: Option<i64> },
    ThumbnailSet { album_id: Option<i64> },
    AlbumDeleted { album_id: i64 },
    SongDeleted { album_id: Option<i64> },
}

impl CatalogWrite {
    /// Cache keys made stale by this write.
    pub fn affected_keys(&self) -> Vec<String> {
        match *self {
            CatalogWrite::AlbumCreated => vec![CacheKey::albums()],
            CatalogWrite::SongAdded { album_id }
            | CatalogWrite::ThumbnailSet { album_id }
            | CatalogWrite::SongDeleted { album_id } => {
                let mut keys = vec![CacheKey::songs()];
                keys.extend(album_id.map(CacheKey::album_songs));
                keys
            }
            CatalogWrite::AlbumDeleted { album_id } => vec![
                CacheKey::albums(),
                CacheKey::songs(),
                CacheKey::album_songs(album_id),
            ],
        }
    }
}

#[derive(Clone)]
pub struct CacheInvalidator {
    store: SharedCacheStore,
    metrics: CacheMetrics,
}

impl CacheInvalidator {
    pub fn new(store: SharedCacheStore) -> Self {
        Self {
            store,
            metrics: CacheMetrics::new(),
        }
    }

    /// Delete each key. Returns how many deletes succeeded.
    ///
    /// Does nothing when the store is unavailable. A failed delete does not
    /// stop the remaining keys.
    pub async fn invalidate<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        if !self.store.is_available() {
            debug!("Cache unavailable, skipping invalidation");
            return 0;
        }

        let mut deleted = 0;
        for key in keys {
            let key = key.as_ref();
            match self.store.del(key).await {
                Ok(()) => {
                    debug!(key = %key, "Cache invalidated");
                    self.metrics.record_invalidation(key);
                    deleted += 1;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache invalidation failed");
                    self.metrics.record_error(key, "del");
                }
            }
        }
        deleted
    }

    pub async fn invalidate_for(&self, write: &CatalogWrite) -> usize {
        self.invalidate(write.affected_keys()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCacheStore;
    use crate::store::CacheStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_affected_keys_per_write() {
        assert_eq!(CatalogWrite::AlbumCreated.affected_keys(), vec!["albums"]);
        assert_eq!(
            CatalogWrite::SongAdded { album_id: Some(4) }.affected_keys(),
            vec!["songs", "album_songs_4"]
        );
        assert_eq!(
            CatalogWrite::ThumbnailSet { album_id: Some(4) }.affected_keys(),
            vec!["songs", "album_songs_4"]
        );
        assert_eq!(
            CatalogWrite::AlbumDeleted { album_id: 4 }.affected_keys(),
            vec!["albums", "songs", "album_songs_4"]
        );
        assert_eq!(
            CatalogWrite::SongDeleted { album_id: None }.affected_keys(),
            vec!["songs"]
        );
    }

    #[tokio::test]
    async fn test_invalidate_removes_keys_and_ignores_missing() {
        let store = Arc::new(MemoryCacheStore::new());
        store
            .set_ex("albums", "[]", Duration::from_secs(60))
            .await
            .unwrap();
        let invalidator = CacheInvalidator::new(store.clone());

        let deleted = invalidator
            .invalidate_for(&CatalogWrite::AlbumDeleted { album_id: 1 })
            .await;

        assert_eq!(deleted, 3);
        assert!(!store.contains("albums"));
    }

    #[tokio::test]
    async fn test_unavailable_store_is_skipped() {
        let store = Arc::new(MemoryCacheStore::new());
        store.set_available(false);
        let invalidator = CacheInvalidator::new(store.clone());

        assert_eq!(invalidator.invalidate(["albums", "songs"]).await, 0);
        assert_eq!(store.del_calls(), 0);
    }
}
