//! Event publishing
//!
//! Publishing never fails the caller's write: every problem is logged and
//! reported as `false`.

use crate::connection::ConnectionManager;
use crate::events::CatalogEvent;
use crate::metrics::BusMetrics;
use chrono::Utc;
use lapin::options::BasicPublishOptions;
use lapin::publisher_confirm::Confirmation;
use lapin::BasicProperties;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// AMQP delivery mode for messages that survive a broker restart
const PERSISTENT: u8 = 2;

#[derive(Clone)]
pub struct EventPublisher {
    connection: Arc<ConnectionManager>,
    exchange: String,
    metrics: BusMetrics,
}

impl EventPublisher {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        let exchange = connection.config().exchange.clone();
        Self {
            connection,
            exchange,
            metrics: BusMetrics::new(),
        }
    }

    /// Publish `event` as persistent JSON under `routing_key`.
    ///
    /// Returns true once the broker has taken the message (confirmed, when
    /// publisher confirms are enabled).
    pub async fn publish<T: Serialize + ?Sized>(&self, routing_key: &str, event: &T) -> bool {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(routing_key = %routing_key, error = %e, "Failed to serialize event");
                self.metrics.record_publish_failure(routing_key, "serialize");
                return false;
            }
        };

        let channel = match self.connection.channel().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(routing_key = %routing_key, error = %e, "Event not published");
                self.metrics.record_publish_failure(routing_key, "not_ready");
                return false;
            }
        };

        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into())
            .with_timestamp(Utc::now().timestamp_millis() as u64);

        let confirm = match channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
        {
            Ok(confirm) => confirm,
            Err(e) => {
                error!(routing_key = %routing_key, error = %e, "Event publish failed");
                self.metrics.record_publish_failure(routing_key, "publish");
                return false;
            }
        };

        match confirm.await {
            Ok(Confirmation::Nack(_)) => {
                error!(routing_key = %routing_key, "Broker rejected event");
                self.metrics.record_publish_failure(routing_key, "nack");
                false
            }
            Ok(_) => {
                debug!(
                    routing_key = %routing_key,
                    exchange = %self.exchange,
                    bytes = payload.len(),
                    "Event published"
                );
                self.metrics.record_published(routing_key);
                true
            }
            Err(e) => {
                error!(routing_key = %routing_key, error = %e, "Publish confirmation failed");
                self.metrics.record_publish_failure(routing_key, "confirm");
                false
            }
        }
    }

    /// Publish under the event's own routing key.
    pub async fn publish_event(&self, event: &CatalogEvent) -> bool {
        self.publish(&event.routing_key(), event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::events::SongDeleted;

    #[tokio::test]
    async fn test_publish_without_connection_returns_false() {
        let connection = Arc::new(ConnectionManager::new(BrokerConfig::default()));
        let publisher = EventPublisher::new(connection);

        let event = CatalogEvent::from(SongDeleted {
            song_id: 1,
            album_id: Some(2),
            deleted_at: None,
        });

        assert!(!publisher.publish_event(&event).await);
        assert!(!publisher.publish("song.deleted", &serde_json::json!({})).await);
    }
}
