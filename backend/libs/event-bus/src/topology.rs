//! Exchange, queue and binding declarations
//!
//! Every declaration is idempotent, so both publishers and consumers run
//! the full set on each (re)connect and startup order between services
//! does not matter.

use crate::error::{BusError, BusResult};
use crate::events::EventType;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub queue: String,
    pub routing_key: String,
}

#[derive(Debug, Clone)]
pub struct Topology {
    exchange: String,
    dead_letter: bool,
}

impl Topology {
    pub fn new(exchange: impl Into<String>, dead_letter: bool) -> Self {
        Self {
            exchange: exchange.into(),
            dead_letter,
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// One queue per event type, bound under exactly its routing key.
    pub fn bindings(&self) -> Vec<Binding> {
        EventType::ALL
            .iter()
            .map(|event_type| Binding {
                queue: event_type.queue_name(),
                routing_key: event_type.routing_key(),
            })
            .collect()
    }

    pub fn dead_letter_exchange(queue: &str) -> String {
        format!("{}.dlx", queue)
    }

    pub fn dead_letter_queue(queue: &str) -> String {
        format!("{}.dlq", queue)
    }

    pub async fn declare(&self, channel: &Channel) -> BusResult<()> {
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(BusError::topology(&self.exchange))?;

        for binding in self.bindings() {
            let mut args = FieldTable::default();
            if self.dead_letter {
                self.declare_dead_letter(channel, &binding.queue).await?;
                args.insert(
                    "x-dead-letter-exchange".into(),
                    AMQPValue::LongString(Self::dead_letter_exchange(&binding.queue).into()),
                );
            }

            channel
                .queue_declare(
                    &binding.queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    args,
                )
                .await
                .map_err(BusError::topology(&binding.queue))?;

            channel
                .queue_bind(
                    &binding.queue,
                    &self.exchange,
                    &binding.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(BusError::topology(&binding.queue))?;

            debug!(
                queue = %binding.queue,
                routing_key = %binding.routing_key,
                exchange = %self.exchange,
                "Queue bound"
            );
        }

        Ok(())
    }

    /// Fanout exchange plus queue that keep what the work queue rejects.
    async fn declare_dead_letter(&self, channel: &Channel, queue: &str) -> BusResult<()> {
        let dlx = Self::dead_letter_exchange(queue);
        let dlq = Self::dead_letter_queue(queue);

        channel
            .exchange_declare(
                &dlx,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(BusError::topology(&dlx))?;

        channel
            .queue_declare(
                &dlq,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(BusError::topology(&dlq))?;

        channel
            .queue_bind(
                &dlq,
                &dlx,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(BusError::topology(&dlq))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_cover_every_event_type() {
        let topology = Topology::new("music-platform-exchange", false);
        let bindings = topology.bindings();

        assert_eq!(bindings.len(), 3);
        assert!(bindings.contains(&Binding {
            queue: "song.uploaded.queue".to_string(),
            routing_key: "song.uploaded".to_string(),
        }));
        assert!(bindings.contains(&Binding {
            queue: "album.created.queue".to_string(),
            routing_key: "album.created".to_string(),
        }));
        assert!(bindings.contains(&Binding {
            queue: "song.deleted.queue".to_string(),
            routing_key: "song.deleted".to_string(),
        }));
    }

    #[test]
    fn test_dead_letter_names() {
        assert_eq!(
            Topology::dead_letter_exchange("song.deleted.queue"),
            "song.deleted.queue.dlx"
        );
        assert_eq!(
            Topology::dead_letter_queue("song.deleted.queue"),
            "song.deleted.queue.dlq"
        );
    }
}
