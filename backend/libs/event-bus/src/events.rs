//! Catalog domain events and their routing
//!
//! Wire format is the JSON the write-path service has always produced:
//! camelCase fields, an `eventType` discriminator, ISO-8601 timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single durable topic exchange every catalog event goes through
pub const EXCHANGE_NAME: &str = "music-platform-exchange";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    SongUploaded,
    AlbumCreated,
    SongDeleted,
}

impl EventType {
    pub const ALL: [EventType; 3] = [
        EventType::SongUploaded,
        EventType::AlbumCreated,
        EventType::SongDeleted,
    ];

    /// camelCase identifier the routing key is derived from
    pub fn identifier(&self) -> &'static str {
        match self {
            EventType::SongUploaded => "songUploaded",
            EventType::AlbumCreated => "albumCreated",
            EventType::SongDeleted => "songDeleted",
        }
    }

    pub fn routing_key(&self) -> String {
        routing_key_for(self.identifier())
    }

    /// Durable queue bound under this type's routing key
    pub fn queue_name(&self) -> String {
        format!("{}.queue", self.routing_key())
    }

    pub fn from_routing_key(routing_key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.routing_key() == routing_key)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.routing_key())
    }
}

/// Insert `.` before every uppercase letter and lowercase it.
///
/// `songUploaded` -> `song.uploaded`
pub fn routing_key_for(identifier: &str) -> String {
    let mut key = String::with_capacity(identifier.len() + 4);
    for c in identifier.chars() {
        if c.is_ascii_uppercase() {
            key.push('.');
            key.push(c.to_ascii_lowercase());
        } else {
            key.push(c);
        }
    }
    key
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongUploaded {
    pub song_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub audio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub album_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumCreated {
    pub album_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDeleted {
    pub song_id: i64,
    #[serde(default)]
    pub album_id: Option<i64>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A catalog event as it travels over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum CatalogEvent {
    #[serde(rename = "song.uploaded")]
    SongUploaded(SongUploaded),
    #[serde(rename = "album.created")]
    AlbumCreated(AlbumCreated),
    #[serde(rename = "song.deleted")]
    SongDeleted(SongDeleted),
}

impl CatalogEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            CatalogEvent::SongUploaded(_) => EventType::SongUploaded,
            CatalogEvent::AlbumCreated(_) => EventType::AlbumCreated,
            CatalogEvent::SongDeleted(_) => EventType::SongDeleted,
        }
    }

    pub fn routing_key(&self) -> String {
        self.event_type().routing_key()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a body whose type is known from the queue it arrived on.
    ///
    /// The `eventType` field is not required, so bodies from producers that
    /// omit it still decode.
    pub fn decode(event_type: EventType, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match event_type {
            EventType::SongUploaded => CatalogEvent::SongUploaded(serde_json::from_slice(body)?),
            EventType::AlbumCreated => CatalogEvent::AlbumCreated(serde_json::from_slice(body)?),
            EventType::SongDeleted => CatalogEvent::SongDeleted(serde_json::from_slice(body)?),
        })
    }
}

impl From<SongUploaded> for CatalogEvent {
    fn from(event: SongUploaded) -> Self {
        CatalogEvent::SongUploaded(event)
    }
}

impl From<AlbumCreated> for CatalogEvent {
    fn from(event: AlbumCreated) -> Self {
        CatalogEvent::AlbumCreated(event)
    }
}

impl From<SongDeleted> for CatalogEvent {
    fn from(event: SongDeleted) -> Self {
        CatalogEvent::SongDeleted(event)
    }
}
