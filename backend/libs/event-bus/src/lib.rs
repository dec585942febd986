//! Catalog event bus
//!
//! At-least-once distribution of catalog events over a durable RabbitMQ
//! topic exchange:
//! - Supervised broker connection with fixed-delay reconnect
//! - Idempotent topology declaration on every connect
//! - Persistent JSON publishing that never fails the caller
//! - Per-queue consumers with prefetch 1 and manual acknowledgment
//! - Concurrent handler fan-out with one retry before dead-lettering

mod config;
mod error;
mod metrics;

pub mod connection;
pub mod consumer;
pub mod dispatcher;
pub mod events;
pub mod producer;
pub mod publisher;
pub mod topology;

pub use config::BrokerConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use consumer::EventConsumer;
pub use dispatcher::{
    settle, Acknowledger, Dispatcher, Disposition, EventHandler, HandlerOutcome, HandlerRegistry,
};
pub use error::{BusError, BusResult};
pub use events::{
    routing_key_for, AlbumCreated, CatalogEvent, EventType, SongDeleted, SongUploaded,
    EXCHANGE_NAME,
};
pub use metrics::BusMetrics;
pub use producer::CatalogProducer;
pub use publisher::EventPublisher;
pub use topology::Topology;
