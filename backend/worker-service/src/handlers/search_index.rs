//! Search index maintenance
//!
//! Documents are keyed by `(index, id)`, so replaying an event overwrites the
//! same document and a repeated removal is a no-op.

use crate::error::{outcome, HandlerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_bus::{AlbumCreated, CatalogEvent, EventHandler, HandlerOutcome, SongUploaded};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub const SONGS_INDEX: &str = "songs";
pub const ALBUMS_INDEX: &str = "albums";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Song,
    Album,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub audio: Option<String>,
    pub album_id: Option<i64>,
    pub searchable_text: String,
    pub indexed_at: DateTime<Utc>,
}

impl SearchDocument {
    pub fn song(event: &SongUploaded) -> Self {
        Self {
            id: event.song_id,
            kind: DocumentKind::Song,
            title: event.title.clone(),
            description: event.description.clone(),
            thumbnail: event.thumbnail.clone(),
            audio: Some(event.audio.clone()),
            album_id: event.album_id,
            searchable_text: searchable_text(&event.title, &event.description),
            indexed_at: Utc::now(),
        }
    }

    pub fn album(event: &AlbumCreated) -> Self {
        Self {
            id: event.album_id,
            kind: DocumentKind::Album,
            title: event.title.clone(),
            description: event.description.clone(),
            thumbnail: Some(event.thumbnail.clone()).filter(|t| !t.is_empty()),
            audio: None,
            album_id: None,
            searchable_text: searchable_text(&event.title, &event.description),
            indexed_at: Utc::now(),
        }
    }
}

fn searchable_text(title: &str, description: &str) -> String {
    format!("{} {}", title, description).trim().to_string()
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn upsert(&self, index: &str, document: &SearchDocument) -> Result<(), HandlerError>;

    async fn remove(&self, index: &str, id: i64) -> Result<(), HandlerError>;
}

/// Logs index operations without a search engine behind them.
#[derive(Debug, Default)]
pub struct LoggingSearchBackend;

#[async_trait]
impl SearchBackend for LoggingSearchBackend {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn upsert(&self, index: &str, document: &SearchDocument) -> Result<(), HandlerError> {
        info!(index = %index, id = document.id, title = %document.title, "Document indexed");
        Ok(())
    }

    async fn remove(&self, index: &str, id: i64) -> Result<(), HandlerError> {
        info!(index = %index, id = id, "Document removed from index");
        Ok(())
    }
}

/// In-process index, used by tests and local runs.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    documents: Mutex<HashMap<(String, i64), SearchDocument>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: &str, id: i64) -> Option<SearchDocument> {
        self.lock()
            .ok()
            .and_then(|docs| docs.get(&(index.to_string(), id)).cloned())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, i64), SearchDocument>>, HandlerError>
    {
        self.documents
            .lock()
            .map_err(|_| HandlerError::Search("index lock poisoned".to_string()))
    }
}

#[async_trait]
impl SearchBackend for InMemorySearchIndex {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn upsert(&self, index: &str, document: &SearchDocument) -> Result<(), HandlerError> {
        self.lock()?
            .insert((index.to_string(), document.id), document.clone());
        Ok(())
    }

    async fn remove(&self, index: &str, id: i64) -> Result<(), HandlerError> {
        self.lock()?.remove(&(index.to_string(), id));
        Ok(())
    }
}

/// Writes every change to each configured backend in turn.
pub struct SearchIndexHandler {
    backends: Vec<Arc<dyn SearchBackend>>,
}

impl SearchIndexHandler {
    pub fn new(backends: Vec<Arc<dyn SearchBackend>>) -> Self {
        Self { backends }
    }

    async fn index(&self, index: &str, document: SearchDocument) -> Result<(), HandlerError> {
        for backend in &self.backends {
            backend.upsert(index, &document).await?;
            debug!(backend = backend.name(), index = %index, id = document.id, "Upserted");
        }
        Ok(())
    }

    async fn remove(&self, index: &str, id: i64) -> Result<(), HandlerError> {
        for backend in &self.backends {
            backend.remove(index, id).await?;
            debug!(backend = backend.name(), index = %index, id = id, "Removed");
        }
        Ok(())
    }

    async fn apply(&self, event: &CatalogEvent) -> Result<(), HandlerError> {
        match event {
            CatalogEvent::SongUploaded(song) => {
                self.index(SONGS_INDEX, SearchDocument::song(song)).await?;
                info!(song_id = song.song_id, "Song indexed");
            }
            CatalogEvent::AlbumCreated(album) => {
                self.index(ALBUMS_INDEX, SearchDocument::album(album)).await?;
                info!(album_id = album.album_id, "Album indexed");
            }
            CatalogEvent::SongDeleted(deleted) => {
                self.remove(SONGS_INDEX, deleted.song_id).await?;
                info!(song_id = deleted.song_id, "Song removed from search index");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for SearchIndexHandler {
    fn name(&self) -> &'static str {
        "search-index"
    }

    async fn handle(&self, event: &CatalogEvent) -> HandlerOutcome {
        outcome(self.apply(event).await)
    }
}
