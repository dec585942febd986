//! Cache metrics for observability

use crate::keys::CacheKey;
use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    bypasses: CounterVec,
    lock_wins: CounterVec,
    lock_contention: CounterVec,
    fallback_loads: CounterVec,
    writes: CounterVec,
    invalidations: CounterVec,
    errors: CounterVec,
}

fn counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    CounterVec::new(Opts::new(name, help), labels).expect("valid metric definition")
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: counter("catalog_cache_hits_total", "Total cache hits", &["collection"]),
            misses: counter(
                "catalog_cache_misses_total",
                "Total cache misses",
                &["collection"],
            ),
            bypasses: counter(
                "catalog_cache_bypasses_total",
                "Reads served straight from the loader because the backend was unavailable",
                &["collection"],
            ),
            lock_wins: counter(
                "catalog_cache_lock_wins_total",
                "Refill locks acquired",
                &["collection"],
            ),
            lock_contention: counter(
                "catalog_cache_lock_contention_total",
                "Reads that found the refill lock already held",
                &["collection"],
            ),
            fallback_loads: counter(
                "catalog_cache_fallback_loads_total",
                "Loads performed by readers that lost the refill lock and still missed",
                &["collection"],
            ),
            writes: counter(
                "catalog_cache_writes_total",
                "Total cache writes",
                &["collection"],
            ),
            invalidations: counter(
                "catalog_cache_invalidations_total",
                "Total cache invalidations",
                &["collection"],
            ),
            errors: counter(
                "catalog_cache_errors_total",
                "Total cache errors",
                &["collection", "op"],
            ),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.bypasses.clone()))?;
        registry.register(Box::new(self.lock_wins.clone()))?;
        registry.register(Box::new(self.lock_contention.clone()))?;
        registry.register(Box::new(self.fallback_loads.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, key: &str) {
        inc(&get_metrics().hits, key);
    }

    pub fn record_miss(&self, key: &str) {
        inc(&get_metrics().misses, key);
    }

    pub fn record_bypass(&self, key: &str) {
        inc(&get_metrics().bypasses, key);
    }

    pub fn record_lock_win(&self, key: &str) {
        inc(&get_metrics().lock_wins, key);
    }

    pub fn record_lock_contention(&self, key: &str) {
        inc(&get_metrics().lock_contention, key);
    }

    pub fn record_fallback_load(&self, key: &str) {
        inc(&get_metrics().fallback_loads, key);
    }

    pub fn record_write(&self, key: &str) {
        inc(&get_metrics().writes, key);
    }

    pub fn record_invalidation(&self, key: &str) {
        inc(&get_metrics().invalidations, key);
    }

    pub fn record_error(&self, key: &str, op: &str) {
        get_metrics()
            .errors
            .with_label_values(&[CacheKey::collection(key), op])
            .inc();
    }
}

fn inc(vec: &CounterVec, key: &str) {
    vec.with_label_values(&[CacheKey::collection(key)]).inc();
}
