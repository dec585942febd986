//! Subscriber notifications for new songs and albums

use crate::error::{outcome, HandlerError};
use async_trait::async_trait;
use event_bus::{CatalogEvent, EventHandler, HandlerOutcome};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Mailing list every release announcement goes to
pub const SUBSCRIBER_LIST: &str = "subscribers@example.com";

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Email {
        to: String,
        subject: String,
        body: String,
    },
    Push {
        title: String,
        body: String,
        data: serde_json::Value,
    },
}

/// Delivery channel for composed notifications (mail relay, push gateway).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), HandlerError>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), HandlerError> {
        match notification {
            Notification::Email { to, subject, .. } => {
                info!(to = %to, subject = %subject, "Email notification sent");
            }
            Notification::Push { title, data, .. } => {
                info!(title = %title, data = %data, "Push notification sent");
            }
        }
        Ok(())
    }
}

pub struct NotificationHandler {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationHandler {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Email and push announcements for a release. Deletions announce nothing.
    pub fn compose(event: &CatalogEvent) -> Vec<Notification> {
        match event {
            CatalogEvent::SongUploaded(song) => vec![
                Notification::Email {
                    to: SUBSCRIBER_LIST.to_string(),
                    subject: format!("New Song: {}", song.title),
                    body: format!(
                        "A new song \"{}\" has been uploaded! Listen now.",
                        song.title
                    ),
                },
                Notification::Push {
                    title: "New Music Available!".to_string(),
                    body: format!("Check out \"{}\" in the latest releases.", song.title),
                    data: json!({ "songId": song.song_id, "type": "new_song" }),
                },
            ],
            CatalogEvent::AlbumCreated(album) => vec![
                Notification::Email {
                    to: SUBSCRIBER_LIST.to_string(),
                    subject: format!("New Album: {}", album.title),
                    body: format!(
                        "A new album \"{}\" is now available! Check it out.",
                        album.title
                    ),
                },
                Notification::Push {
                    title: "New Album Released!".to_string(),
                    body: format!("Discover \"{}\" now on the platform.", album.title),
                    data: json!({ "albumId": album.album_id, "type": "new_album" }),
                },
            ],
            CatalogEvent::SongDeleted(_) => Vec::new(),
        }
    }

    async fn notify(&self, event: &CatalogEvent) -> Result<(), HandlerError> {
        let notifications = Self::compose(event);
        if notifications.is_empty() {
            debug!(event_type = %event.event_type(), "Nothing to announce");
            return Ok(());
        }

        for notification in &notifications {
            self.sink.deliver(notification).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, event: &CatalogEvent) -> HandlerOutcome {
        outcome(self.notify(event).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::{AlbumCreated, SongDeleted, SongUploaded};

    fn song() -> CatalogEvent {
        CatalogEvent::from(SongUploaded {
            song_id: 7,
            title: "So What".to_string(),
            description: String::new(),
            audio: "https://cdn.example.com/so-what.mp3".to_string(),
            thumbnail: None,
            album_id: Some(2),
            created_at: None,
        })
    }

    #[test]
    fn test_song_upload_announces_by_email_and_push() {
        let notifications = NotificationHandler::compose(&song());
        assert_eq!(notifications.len(), 2);

        match &notifications[0] {
            Notification::Email { to, subject, .. } => {
                assert_eq!(to, SUBSCRIBER_LIST);
                assert_eq!(subject, "New Song: So What");
            }
            other => panic!("expected email, got {:?}", other),
        }
        match &notifications[1] {
            Notification::Push { data, .. } => {
                assert_eq!(data["songId"], 7);
                assert_eq!(data["type"], "new_song");
            }
            other => panic!("expected push, got {:?}", other),
        }
    }

    #[test]
    fn test_album_created_push_carries_album_id() {
        let event = CatalogEvent::from(AlbumCreated {
            album_id: 4,
            title: "Blue".to_string(),
            description: String::new(),
            thumbnail: String::new(),
            created_at: None,
        });

        let notifications = NotificationHandler::compose(&event);
        assert!(matches!(
            &notifications[1],
            Notification::Push { data, .. } if data["albumId"] == 4
        ));
    }

    #[test]
    fn test_deletion_announces_nothing() {
        let event = CatalogEvent::from(SongDeleted {
            song_id: 1,
            album_id: None,
            deleted_at: None,
        });
        assert!(NotificationHandler::compose(&event).is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_is_retryable() {
        struct Down;

        #[async_trait]
        impl NotificationSink for Down {
            async fn deliver(&self, _: &Notification) -> Result<(), HandlerError> {
                Err(HandlerError::Notification("relay refused".into()))
            }
        }

        let handler = NotificationHandler::new(Arc::new(Down));
        assert!(matches!(
            handler.handle(&song()).await,
            HandlerOutcome::Retryable(_)
        ));
    }
}
