//! Worker handler wiring, driven through the dispatcher without a broker.

use event_bus::{Dispatcher, Disposition, EventHandler, EventType};
use std::sync::Arc;
use worker_service::handlers::media_processing::{InMemoryMediaSink, MediaArtefact};
use worker_service::handlers::search_index::{DocumentKind, InMemorySearchIndex, SONGS_INDEX};
use worker_service::handlers::{LoggingSink, MediaSink, SearchBackend};
use worker_service::{build_registry, Backends};

const SCENARIO_UPLOAD: &[u8] = br#"{"songId":1,"title":"A","audio":"u"}"#;

struct Fixture {
    dispatcher: Dispatcher,
    index: Arc<InMemorySearchIndex>,
    media: Arc<InMemoryMediaSink>,
}

fn fixture() -> Fixture {
    let index = Arc::new(InMemorySearchIndex::new());
    let media = Arc::new(InMemoryMediaSink::new());
    let search: Arc<dyn SearchBackend> = index.clone();
    let media_sink: Arc<dyn MediaSink> = media.clone();

    let registry = build_registry(Backends {
        notifications: Arc::new(LoggingSink),
        search: vec![search],
        media: media_sink,
    });

    Fixture {
        dispatcher: Dispatcher::new(registry),
        index,
        media,
    }
}

#[test]
fn registry_matches_the_handler_table() {
    let registry = build_registry(Backends::default());
    let names = |event_type: EventType| {
        registry
            .handlers_for(event_type)
            .iter()
            .map(|handler| handler.name())
            .collect::<Vec<_>>()
    };

    assert_eq!(
        names(EventType::SongUploaded),
        vec!["notification", "search-index", "media-processing"]
    );
    assert_eq!(
        names(EventType::AlbumCreated),
        vec!["notification", "search-index"]
    );
    assert_eq!(names(EventType::SongDeleted), vec!["search-index"]);
}

#[tokio::test]
async fn minimal_upload_runs_every_handler_and_acks() {
    let fx = fixture();

    let disposition = fx
        .dispatcher
        .dispatch(EventType::SongUploaded, SCENARIO_UPLOAD, false)
        .await;

    assert_eq!(disposition, Disposition::Ack);

    let doc = fx.index.get(SONGS_INDEX, 1).expect("song indexed");
    assert_eq!(doc.kind, DocumentKind::Song);
    assert_eq!(doc.title, "A");

    let artefacts = fx.media.artefacts_for(1);
    assert_eq!(artefacts.len(), 4);
    assert!(artefacts.iter().any(|a| matches!(
        a,
        MediaArtefact::Waveform { url, .. } if url == "https://cdn.example.com/waveforms/1.png"
    )));
}

#[tokio::test]
async fn upload_without_audio_is_dead_lettered_without_retry() {
    let fx = fixture();
    let body = br#"{"songId":2,"title":"Silent","audio":""}"#;

    let disposition = fx
        .dispatcher
        .dispatch(EventType::SongUploaded, body, false)
        .await;

    assert_eq!(disposition, Disposition::DeadLetter);
    assert!(fx.media.artefacts_for(2).is_empty());
}

#[tokio::test]
async fn redelivered_events_leave_the_index_unchanged() {
    let fx = fixture();

    for redelivered in [false, true] {
        let disposition = fx
            .dispatcher
            .dispatch(EventType::SongUploaded, SCENARIO_UPLOAD, redelivered)
            .await;
        assert_eq!(disposition, Disposition::Ack);
    }
    assert_eq!(fx.index.len(), 1);

    let deleted = br#"{"songId":1,"albumId":null,"deletedAt":"2024-05-01T10:00:00Z"}"#;
    for redelivered in [false, true] {
        let disposition = fx
            .dispatcher
            .dispatch(EventType::SongDeleted, deleted, redelivered)
            .await;
        assert_eq!(disposition, Disposition::Ack);
    }
    assert!(fx.index.is_empty());
}

#[tokio::test]
async fn album_created_is_indexed() {
    let fx = fixture();
    let body = br#"{
        "albumId": 5,
        "title": "Kind of Blue",
        "description": "modal",
        "thumbnail": "t.jpg",
        "createdAt": "2024-05-01T10:00:00Z"
    }"#;

    let disposition = fx
        .dispatcher
        .dispatch(EventType::AlbumCreated, body, false)
        .await;

    assert_eq!(disposition, Disposition::Ack);
    let doc = fx.index.get("albums", 5).expect("album indexed");
    assert_eq!(doc.kind, DocumentKind::Album);
    assert_eq!(doc.searchable_text, "Kind of Blue modal");
}
