//! Queue consumers
//!
//! One task per queue that has handlers. Each task waits for the broker,
//! subscribes with manual acknowledgment on its own prefetch-limited
//! channel, and processes deliveries one at a time. When the subscription
//! ends (connection lost, channel closed) the task waits for the next
//! connection and subscribes again.

use crate::connection::ConnectionManager;
use crate::dispatcher::{settle, Dispatcher};
use crate::error::BusResult;
use crate::events::EventType;
use futures::StreamExt;
use lapin::options::{BasicCancelOptions, BasicConsumeOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Consumer};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum StreamEnd {
    Shutdown,
    /// Stream ended without an error
    Lost,
    /// Stream yielded an error
    Failed,
}

pub struct EventConsumer {
    connection: Arc<ConnectionManager>,
    dispatcher: Arc<Dispatcher>,
}

impl EventConsumer {
    pub fn new(connection: Arc<ConnectionManager>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            connection,
            dispatcher,
        }
    }

    /// Start one consumer task per handled queue. Tasks exit once
    /// `shutdown` turns true, after finishing the delivery in hand.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.dispatcher
            .registry()
            .event_types()
            .into_iter()
            .map(|event_type| {
                let consumer = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { consumer.run_queue(event_type, shutdown).await })
            })
            .collect()
    }

    async fn run_queue(&self, event_type: EventType, mut shutdown: watch::Receiver<bool>) {
        let queue = event_type.queue_name();
        let retry_delay = self.connection.config().reconnect_delay;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let connected = tokio::select! {
                result = self.connection.wait_until_connected() => result,
                _ = shutdown.changed() => break,
            };
            if connected.is_err() {
                break;
            }

            let generation = self.connection.generation();
            match self.subscribe(&queue).await {
                Ok((channel, consumer)) => {
                    info!(queue = %queue, "Consuming");
                    let end = self
                        .drain(event_type, &queue, consumer.clone(), &mut shutdown)
                        .await;
                    cancel(&channel, &consumer, &queue).await;
                    match end {
                        StreamEnd::Shutdown => break,
                        StreamEnd::Failed => {
                            // on_error does not fire for every stream failure
                            self.connection.report_lost(generation);
                        }
                        StreamEnd::Lost => {}
                    }
                    warn!(queue = %queue, "Consumer stopped; resubscribing after reconnect");
                }
                Err(e) => {
                    warn!(queue = %queue, error = %e, "Failed to subscribe");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(retry_delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(queue = %queue, "Consumer exited");
    }

    async fn subscribe(&self, queue: &str) -> BusResult<(Channel, Consumer)> {
        let channel = self.connection.open_channel().await?;
        let consumer = channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok((channel, consumer))
    }

    async fn drain(
        &self,
        event_type: EventType,
        queue: &str,
        mut consumer: Consumer,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        loop {
            let next = tokio::select! {
                delivery = consumer.next() => delivery,
                _ = shutdown.changed() => return StreamEnd::Shutdown,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(queue = %queue, error = %e, "Consumer error");
                    return StreamEnd::Failed;
                }
                None => return StreamEnd::Lost,
            };

            debug!(
                queue = %queue,
                delivery_tag = delivery.delivery_tag,
                redelivered = delivery.redelivered,
                "Delivery received"
            );

            let disposition = self
                .dispatcher
                .dispatch(event_type, &delivery.data, delivery.redelivered)
                .await;

            if let Err(e) = settle(&delivery.acker, disposition).await {
                // The broker redelivers unsettled messages once the channel closes
                error!(
                    queue = %queue,
                    delivery_tag = delivery.delivery_tag,
                    disposition = ?disposition,
                    error = %e,
                    "Failed to settle delivery"
                );
                return StreamEnd::Failed;
            }
        }
    }
}

async fn cancel(channel: &Channel, consumer: &Consumer, queue: &str) {
    if !channel.status().connected() {
        return;
    }
    if let Err(e) = channel
        .basic_cancel(consumer.tag().as_str(), BasicCancelOptions::default())
        .await
    {
        debug!(queue = %queue, error = %e, "Consumer cancel failed");
    }
    if let Err(e) = channel.close(200, "OK").await {
        debug!(queue = %queue, error = %e, "Consumer channel close failed");
    }
}
