//! Catalog worker
//!
//! Consumes catalog events and runs their side effects: subscriber
//! notifications, search index maintenance and media derivation.

pub mod config;
pub mod error;
pub mod handlers;

use event_bus::{EventHandler, EventType, HandlerRegistry};
use handlers::{
    LoggingMediaSink, LoggingSearchBackend, LoggingSink, MediaProcessingHandler, MediaSink,
    NotificationHandler, NotificationSink, SearchBackend, SearchIndexHandler,
};
use std::sync::Arc;

pub use config::{LogFormat, WorkerConfig};
pub use error::HandlerError;

/// Backends the handlers write through.
#[derive(Clone)]
pub struct Backends {
    pub notifications: Arc<dyn NotificationSink>,
    pub search: Vec<Arc<dyn SearchBackend>>,
    pub media: Arc<dyn MediaSink>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            notifications: Arc::new(LoggingSink),
            search: vec![Arc::new(LoggingSearchBackend)],
            media: Arc::new(LoggingMediaSink),
        }
    }
}

/// Handler table for the worker:
/// - `song.uploaded`: notification, search-index, media-processing
/// - `album.created`: notification, search-index
/// - `song.deleted`: search-index
pub fn build_registry(backends: Backends) -> HandlerRegistry {
    let notification: Arc<dyn EventHandler> =
        Arc::new(NotificationHandler::new(backends.notifications));
    let search: Arc<dyn EventHandler> = Arc::new(SearchIndexHandler::new(backends.search));
    let media: Arc<dyn EventHandler> = Arc::new(MediaProcessingHandler::new(backends.media));

    let mut registry = HandlerRegistry::new();
    registry
        .register(EventType::SongUploaded, notification.clone())
        .register(EventType::SongUploaded, search.clone())
        .register(EventType::SongUploaded, media)
        .register(EventType::AlbumCreated, notification)
        .register(EventType::AlbumCreated, search.clone())
        .register(EventType::SongDeleted, search);
    registry
}
