//! Delivery dispatch and settlement
//!
//! Each delivery is decoded, fanned out to every handler registered for its
//! event type, and settled from the combined outcome:
//!
//! | outcome   | first delivery | redelivered |
//! |-----------|----------------|-------------|
//! | Ok        | ack            | ack         |
//! | Retryable | requeue        | dead-letter |
//! | Fatal     | dead-letter    | dead-letter |
//!
//! Handlers must be idempotent: a requeued event is handled again by every
//! handler, including the ones that already succeeded.

use crate::error::BusResult;
use crate::events::{CatalogEvent, EventType};
use crate::metrics::BusMetrics;
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of one handler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Ok,
    /// Worth one more attempt
    Retryable(String),
    /// Will never succeed; skip the retry
    Fatal(String),
}

impl HandlerOutcome {
    pub fn retryable(reason: impl fmt::Display) -> Self {
        HandlerOutcome::Retryable(reason.to_string())
    }

    pub fn fatal(reason: impl fmt::Display) -> Self {
        HandlerOutcome::Fatal(reason.to_string())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, HandlerOutcome::Ok)
    }

    fn severity(&self) -> u8 {
        match self {
            HandlerOutcome::Ok => 0,
            HandlerOutcome::Retryable(_) => 1,
            HandlerOutcome::Fatal(_) => 2,
        }
    }

    /// The more severe of two outcomes
    pub fn worst(self, other: HandlerOutcome) -> HandlerOutcome {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            HandlerOutcome::Ok => "ok",
            HandlerOutcome::Retryable(_) => "retryable",
            HandlerOutcome::Fatal(_) => "fatal",
        }
    }
}

impl<E: fmt::Display> From<Result<(), E>> for HandlerOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => HandlerOutcome::Ok,
            Err(e) => HandlerOutcome::retryable(e),
        }
    }
}

/// What to tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// nack with requeue
    Requeue,
    /// nack without requeue
    DeadLetter,
}

impl Disposition {
    pub fn decide(outcome: &HandlerOutcome, redelivered: bool) -> Self {
        match outcome {
            HandlerOutcome::Ok => Disposition::Ack,
            HandlerOutcome::Retryable(_) if !redelivered => Disposition::Requeue,
            HandlerOutcome::Retryable(_) | HandlerOutcome::Fatal(_) => Disposition::DeadLetter,
        }
    }
}

/// A downstream side effect run for every event of the types it is
/// registered for.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &CatalogEvent) -> HandlerOutcome;
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventType, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event_type: EventType, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.handlers.entry(event_type).or_default().push(handler);
        self
    }

    pub fn handlers_for(&self, event_type: EventType) -> &[Arc<dyn EventHandler>] {
        self.handlers
            .get(&event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Event types with at least one handler, in declaration order.
    pub fn event_types(&self) -> Vec<EventType> {
        EventType::ALL
            .into_iter()
            .filter(|event_type| !self.handlers_for(*event_type).is_empty())
            .collect()
    }
}

pub struct Dispatcher {
    registry: HandlerRegistry,
    metrics: BusMetrics,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            metrics: BusMetrics::new(),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Decide the fate of one delivery from `event_type`'s queue.
    pub async fn dispatch(
        &self,
        event_type: EventType,
        body: &[u8],
        redelivered: bool,
    ) -> Disposition {
        let queue = event_type.queue_name();

        if self.registry.handlers_for(event_type).is_empty() {
            warn!(event_type = %event_type, "No handlers registered; acknowledging");
            self.metrics.record_ack(&queue);
            return Disposition::Ack;
        }

        let outcome = match CatalogEvent::decode(event_type, body) {
            Ok(event) => self.run_handlers(&event).await,
            Err(e) => {
                error!(event_type = %event_type, error = %e, "Failed to decode event");
                HandlerOutcome::retryable(format!("undecodable body: {}", e))
            }
        };

        let disposition = Disposition::decide(&outcome, redelivered);
        match disposition {
            Disposition::Ack => {
                debug!(event_type = %event_type, "Event processed");
                self.metrics.record_ack(&queue);
            }
            Disposition::Requeue => {
                warn!(
                    event_type = %event_type,
                    outcome = ?outcome,
                    "Event failed; requeueing for one retry"
                );
                self.metrics.record_requeue(&queue);
            }
            Disposition::DeadLetter => {
                error!(
                    event_type = %event_type,
                    redelivered,
                    outcome = ?outcome,
                    "Event failed permanently; dead-lettering"
                );
                self.metrics.record_dead_letter(&queue);
            }
        }
        disposition
    }

    /// Run every handler for the event concurrently and wait for all of them.
    pub async fn run_handlers(&self, event: &CatalogEvent) -> HandlerOutcome {
        let event_type = event.event_type();
        let handlers = self.registry.handlers_for(event_type);

        let outcomes = join_all(handlers.iter().map(|handler| async move {
            let outcome = AssertUnwindSafe(handler.handle(event))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| HandlerOutcome::retryable("handler panicked"));

            match &outcome {
                HandlerOutcome::Ok => {
                    debug!(handler = handler.name(), event_type = %event_type, "Handler succeeded");
                }
                HandlerOutcome::Retryable(reason) | HandlerOutcome::Fatal(reason) => {
                    error!(
                        handler = handler.name(),
                        event_type = %event_type,
                        kind = outcome.kind(),
                        error = %reason,
                        "Handler failed"
                    );
                    self.metrics
                        .record_handler_failure(handler.name(), outcome.kind());
                }
            }
            outcome
        }))
        .await;

        outcomes
            .into_iter()
            .fold(HandlerOutcome::Ok, HandlerOutcome::worst)
    }
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack_message(&self) -> BusResult<()>;

    async fn nack_message(&self, requeue: bool) -> BusResult<()>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn ack_message(&self) -> BusResult<()> {
        self.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack_message(&self, requeue: bool) -> BusResult<()> {
        self.nack(BasicNackOptions {
            requeue,
            ..Default::default()
        })
        .await?;
        Ok(())
    }
}

pub async fn settle<A: Acknowledger + ?Sized>(
    acker: &A,
    disposition: Disposition,
) -> BusResult<()> {
    match disposition {
        Disposition::Ack => acker.ack_message().await,
        Disposition::Requeue => acker.nack_message(true).await,
        Disposition::DeadLetter => acker.nack_message(false).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_table() {
        let retry = HandlerOutcome::retryable("boom");
        let fatal = HandlerOutcome::fatal("bad payload");

        assert_eq!(Disposition::decide(&HandlerOutcome::Ok, false), Disposition::Ack);
        assert_eq!(Disposition::decide(&HandlerOutcome::Ok, true), Disposition::Ack);
        assert_eq!(Disposition::decide(&retry, false), Disposition::Requeue);
        assert_eq!(Disposition::decide(&retry, true), Disposition::DeadLetter);
        assert_eq!(Disposition::decide(&fatal, false), Disposition::DeadLetter);
        assert_eq!(Disposition::decide(&fatal, true), Disposition::DeadLetter);
    }

    #[test]
    fn test_worst_outcome_wins() {
        let combined = [
            HandlerOutcome::Ok,
            HandlerOutcome::retryable("a"),
            HandlerOutcome::fatal("b"),
            HandlerOutcome::retryable("c"),
        ]
        .into_iter()
        .fold(HandlerOutcome::Ok, HandlerOutcome::worst);

        assert_eq!(combined, HandlerOutcome::Fatal("b".to_string()));
    }

    #[test]
    fn test_outcome_from_result() {
        assert!(HandlerOutcome::from(Ok::<(), String>(())).is_ok());
        assert_eq!(
            HandlerOutcome::from(Err::<(), _>("timeout")),
            HandlerOutcome::Retryable("timeout".to_string())
        );
    }

    #[test]
    fn test_registry_lists_only_handled_types() {
        struct Noop;

        #[async_trait]
        impl EventHandler for Noop {
            fn name(&self) -> &'static str {
                "noop"
            }

            async fn handle(&self, _event: &CatalogEvent) -> HandlerOutcome {
                HandlerOutcome::Ok
            }
        }

        let mut registry = HandlerRegistry::new();
        registry
            .register(EventType::SongDeleted, Arc::new(Noop))
            .register(EventType::SongUploaded, Arc::new(Noop));

        assert_eq!(
            registry.event_types(),
            vec![EventType::SongUploaded, EventType::SongDeleted]
        );
        assert!(registry.handlers_for(EventType::AlbumCreated).is_empty());
    }
}
