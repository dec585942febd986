//! Event bus metrics

use prometheus::{CounterVec, IntCounter, IntGauge, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<BusMetricsInner> = OnceLock::new();

struct BusMetricsInner {
    published: CounterVec,
    publish_failures: CounterVec,
    acked: CounterVec,
    requeued: CounterVec,
    dead_lettered: CounterVec,
    handler_failures: CounterVec,
    reconnects: IntCounter,
    connected: IntGauge,
}

impl BusMetricsInner {
    fn new() -> Self {
        Self {
            published: CounterVec::new(
                Opts::new("event_bus_published_total", "Events confirmed by the broker"),
                &["routing_key"],
            )
            .expect("valid metric definition"),
            publish_failures: CounterVec::new(
                Opts::new(
                    "event_bus_publish_failures_total",
                    "Events that could not be published",
                ),
                &["routing_key", "reason"],
            )
            .expect("valid metric definition"),
            acked: CounterVec::new(
                Opts::new("event_bus_acked_total", "Deliveries acknowledged"),
                &["queue"],
            )
            .expect("valid metric definition"),
            requeued: CounterVec::new(
                Opts::new("event_bus_requeued_total", "Deliveries rejected for one retry"),
                &["queue"],
            )
            .expect("valid metric definition"),
            dead_lettered: CounterVec::new(
                Opts::new(
                    "event_bus_dead_lettered_total",
                    "Deliveries rejected without requeue",
                ),
                &["queue"],
            )
            .expect("valid metric definition"),
            handler_failures: CounterVec::new(
                Opts::new("event_bus_handler_failures_total", "Failed handler runs"),
                &["handler", "kind"],
            )
            .expect("valid metric definition"),
            reconnects: IntCounter::new(
                "event_bus_reconnects_total",
                "Broker reconnect attempts after a lost connection",
            )
            .expect("valid metric definition"),
            connected: IntGauge::new(
                "event_bus_connected",
                "1 while the broker connection is established",
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.published.clone()))?;
        registry.register(Box::new(self.publish_failures.clone()))?;
        registry.register(Box::new(self.acked.clone()))?;
        registry.register(Box::new(self.requeued.clone()))?;
        registry.register(Box::new(self.dead_lettered.clone()))?;
        registry.register(Box::new(self.handler_failures.clone()))?;
        registry.register(Box::new(self.reconnects.clone()))?;
        registry.register(Box::new(self.connected.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static BusMetricsInner {
    METRICS.get_or_init(BusMetricsInner::new)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BusMetrics;

impl BusMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_published(&self, routing_key: &str) {
        get_metrics()
            .published
            .with_label_values(&[routing_key])
            .inc();
    }

    pub fn record_publish_failure(&self, routing_key: &str, reason: &str) {
        get_metrics()
            .publish_failures
            .with_label_values(&[routing_key, reason])
            .inc();
    }

    pub fn record_ack(&self, queue: &str) {
        get_metrics().acked.with_label_values(&[queue]).inc();
    }

    pub fn record_requeue(&self, queue: &str) {
        get_metrics().requeued.with_label_values(&[queue]).inc();
    }

    pub fn record_dead_letter(&self, queue: &str) {
        get_metrics().dead_lettered.with_label_values(&[queue]).inc();
    }

    pub fn record_handler_failure(&self, handler: &str, kind: &str) {
        get_metrics()
            .handler_failures
            .with_label_values(&[handler, kind])
            .inc();
    }

    pub fn record_reconnect(&self) {
        get_metrics().reconnects.inc();
    }

    pub fn set_connected(&self, connected: bool) {
        get_metrics().connected.set(i64::from(connected));
    }
}
