//! Typed producers for the catalog write path

use crate::events::{AlbumCreated, CatalogEvent, SongDeleted, SongUploaded};
use crate::publisher::EventPublisher;
use chrono::Utc;
use tracing::{info, warn};

/// Stamps and publishes catalog events after a committed write.
///
/// A failed publish is logged and reported but never undoes the write.
#[derive(Clone)]
pub struct CatalogProducer {
    publisher: EventPublisher,
}

impl CatalogProducer {
    pub fn new(publisher: EventPublisher) -> Self {
        Self { publisher }
    }

    pub async fn song_uploaded(&self, mut event: SongUploaded) -> bool {
        event.created_at = Some(Utc::now());
        let song_id = event.song_id;
        self.send(CatalogEvent::SongUploaded(event), song_id).await
    }

    pub async fn album_created(&self, mut event: AlbumCreated) -> bool {
        event.created_at = Some(Utc::now());
        let album_id = event.album_id;
        self.send(CatalogEvent::AlbumCreated(event), album_id).await
    }

    pub async fn song_deleted(&self, mut event: SongDeleted) -> bool {
        event.deleted_at = Some(Utc::now());
        let song_id = event.song_id;
        self.send(CatalogEvent::SongDeleted(event), song_id).await
    }

    async fn send(&self, event: CatalogEvent, entity_id: i64) -> bool {
        let event_type = event.event_type();
        let published = self.publisher.publish_event(&event).await;
        if published {
            info!(event_type = %event_type, entity_id, "Catalog event published");
        } else {
            warn!(
                event_type = %event_type,
                entity_id,
                "Catalog event not published; downstream side effects will be missing"
            );
        }
        published
    }
}
