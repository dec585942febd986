//! Stampede protection and invalidation behaviour of the read path,
//! exercised against the in-memory store with a paused clock.

use catalog_cache::{
    CacheInvalidator, CacheStore, CatalogWrite, MemoryCacheStore, ReadThroughCache,
    ReadThroughConfig,
};
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const READERS: usize = 25;

fn setup() -> (Arc<MemoryCacheStore>, ReadThroughCache) {
    let store = Arc::new(MemoryCacheStore::new());
    let cache = ReadThroughCache::new(store.clone(), ReadThroughConfig::default());
    (store, cache)
}

async fn load_albums(loads: &AtomicUsize, latency: Duration) -> Result<Vec<String>, String> {
    loads.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(latency).await;
    Ok(vec!["Kind of Blue".to_string(), "Blue Train".to_string()])
}

#[tokio::test(start_paused = true)]
async fn concurrent_cold_reads_load_once_with_fast_winner() {
    let (store, cache) = setup();
    let loads = AtomicUsize::new(0);

    let results = join_all((0..READERS).map(|_| {
        cache.albums(|| load_albums(&loads, Duration::from_millis(20)))
    }))
    .await;

    assert!(results.iter().all(|r| r.as_ref().map(|v| v.len()) == Ok(2)));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(store.contains("albums"));
    assert!(!store.contains("albums_lock"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_cold_reads_never_load_per_reader() {
    let (_store, cache) = setup();
    let loads = AtomicUsize::new(0);

    // Winner finishes just inside the losers' wait
    let results = join_all((0..READERS).map(|_| {
        cache.songs(|| load_albums(&loads, Duration::from_millis(190)))
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(loads.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(start_paused = true)]
async fn slow_winner_costs_each_loser_one_load_at_most() {
    let (store, cache) = setup();
    let loads = AtomicUsize::new(0);

    let results = join_all((0..READERS).map(|_| {
        cache.albums(|| load_albums(&loads, Duration::from_millis(500)))
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    // Winner plus one fallback per loser, never a retry loop
    assert_eq!(loads.load(Ordering::SeqCst), READERS);
    // Losers never write; only the winner filled the cache
    assert_eq!(store.set_calls(), 1);
}

#[tokio::test]
async fn invalidate_then_read_loads_fresh() {
    let (store, cache) = setup();
    let invalidator = CacheInvalidator::new(store.clone());
    let loads = AtomicUsize::new(0);

    let first: Vec<String> = cache
        .album_songs(5, || load_albums(&loads, Duration::ZERO))
        .await
        .unwrap();
    let cached: Vec<String> = cache
        .album_songs(5, || load_albums(&loads, Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(first, cached);
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let deleted = invalidator
        .invalidate_for(&CatalogWrite::SongAdded { album_id: Some(5) })
        .await;
    assert_eq!(deleted, 2);

    let _: Vec<String> = cache
        .album_songs(5, || load_albums(&loads, Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn lock_expires_without_release() {
    let (store, _cache) = setup();
    let ttl = Duration::from_secs(10);

    assert!(store.set_nx_ex("albums_lock", "locked", ttl).await.unwrap());
    assert!(!store.set_nx_ex("albums_lock", "locked", ttl).await.unwrap());

    tokio::time::advance(Duration::from_secs(9)).await;
    assert!(!store.set_nx_ex("albums_lock", "locked", ttl).await.unwrap());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(store.set_nx_ex("albums_lock", "locked", ttl).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn crashed_holder_stops_blocking_refills_after_lock_ttl() {
    let (store, cache) = setup();
    let loads = AtomicUsize::new(0);

    // A holder that took the lock and died before filling or releasing
    store
        .set_nx_ex("songs_lock", "locked", Duration::from_secs(10))
        .await
        .unwrap();

    // While the stale lock lives, a reader loads but does not fill
    let _: Vec<String> = cache
        .songs(|| load_albums(&loads, Duration::ZERO))
        .await
        .unwrap();
    assert!(!store.contains("songs"));

    tokio::time::advance(Duration::from_secs(11)).await;

    let _: Vec<String> = cache
        .songs(|| load_albums(&loads, Duration::ZERO))
        .await
        .unwrap();
    assert!(store.contains("songs"));
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn winner_outliving_its_lock_leaves_the_next_holder_alone() {
    let (store, cache) = setup();
    let loads = AtomicUsize::new(0);

    // Takes the lock once the winner's 10s lock has expired mid-load
    let next_holder = {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10_500)).await;
            store
                .set_nx_ex("albums_lock", "holder-b", Duration::from_secs(10))
                .await
                .unwrap()
        })
    };

    let albums: Vec<String> = cache
        .albums(|| load_albums(&loads, Duration::from_secs(11)))
        .await
        .unwrap();
    assert_eq!(albums.len(), 2);
    assert!(next_holder.await.unwrap());

    assert_eq!(
        store.get("albums_lock").await.unwrap().as_deref(),
        Some("holder-b")
    );
    assert!(!store
        .set_nx_ex("albums_lock", "holder-c", Duration::from_secs(10))
        .await
        .unwrap());
}

#[tokio::test]
async fn backend_down_always_loads_and_never_locks() {
    let (store, cache) = setup();
    store.set_available(false);
    let loads = AtomicUsize::new(0);

    for _ in 0..3 {
        let albums: Vec<String> = cache
            .albums(|| load_albums(&loads, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(albums.len(), 2);
    }

    assert_eq!(loads.load(Ordering::SeqCst), 3);
    assert_eq!(store.set_nx_calls(), 0);
    assert_eq!(store.get_calls(), 0);
    assert_eq!(store.set_calls(), 0);
}

#[tokio::test]
async fn source_error_reaches_caller() {
    let (store, cache) = setup();

    let result: Result<Vec<String>, String> = cache
        .albums(|| async { Err("connection reset".to_string()) })
        .await;

    assert_eq!(result.unwrap_err(), "connection reset");
    assert!(!store.contains("albums_lock"));
}
