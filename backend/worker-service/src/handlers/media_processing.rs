//! Derived media for uploaded songs
//!
//! Waveform, metadata, preview clip and transcoded formats are produced
//! concurrently. Each artefact has a stable URL derived from the song id, so
//! reprocessing a redelivered upload overwrites rather than duplicates.

use crate::error::{outcome, HandlerError};
use async_trait::async_trait;
use event_bus::{CatalogEvent, EventHandler, HandlerOutcome, SongUploaded};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub const CDN_BASE: &str = "https://cdn.example.com";

const WAVEFORM_PEAKS: usize = 1000;
const PREVIEW_SECS: u32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct AudioMetadata {
    pub duration_secs: u32,
    pub bitrate_kbps: u32,
    pub sample_rate_hz: u32,
    pub codec: String,
    pub channels: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaArtefact {
    Waveform { url: String, peaks: Vec<f32> },
    Metadata(AudioMetadata),
    Preview { url: String, duration_secs: u32 },
    Formats(BTreeMap<&'static str, String>),
}

impl MediaArtefact {
    pub fn kind(&self) -> &'static str {
        match self {
            MediaArtefact::Waveform { .. } => "waveform",
            MediaArtefact::Metadata(_) => "metadata",
            MediaArtefact::Preview { .. } => "preview",
            MediaArtefact::Formats(_) => "formats",
        }
    }
}

/// Persists artefacts against the song they were derived from.
#[async_trait]
pub trait MediaSink: Send + Sync {
    async fn save(&self, song_id: i64, artefact: &MediaArtefact) -> Result<(), HandlerError>;
}

#[derive(Debug, Default)]
pub struct LoggingMediaSink;

#[async_trait]
impl MediaSink for LoggingMediaSink {
    async fn save(&self, song_id: i64, artefact: &MediaArtefact) -> Result<(), HandlerError> {
        info!(song_id = song_id, artefact = artefact.kind(), "Media artefact saved");
        Ok(())
    }
}

/// Keeps the latest artefact of each kind per song.
#[derive(Debug, Default)]
pub struct InMemoryMediaSink {
    saved: Mutex<BTreeMap<(i64, &'static str), MediaArtefact>>,
}

impl InMemoryMediaSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artefacts_for(&self, song_id: i64) -> Vec<MediaArtefact> {
        match self.saved.lock() {
            Ok(saved) => saved
                .iter()
                .filter(|((id, _), _)| *id == song_id)
                .map(|(_, artefact)| artefact.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl MediaSink for InMemoryMediaSink {
    async fn save(&self, song_id: i64, artefact: &MediaArtefact) -> Result<(), HandlerError> {
        self.saved
            .lock()
            .map_err(|_| HandlerError::Media("media sink lock poisoned".to_string()))?
            .insert((song_id, artefact.kind()), artefact.clone());
        Ok(())
    }
}

pub struct MediaProcessingHandler {
    sink: Arc<dyn MediaSink>,
}

impl MediaProcessingHandler {
    pub fn new(sink: Arc<dyn MediaSink>) -> Self {
        Self { sink }
    }

    async fn process(&self, song: &SongUploaded) -> Result<(), HandlerError> {
        if song.audio.trim().is_empty() {
            return Err(HandlerError::InvalidEvent(format!(
                "song {} has no audio",
                song.song_id
            )));
        }

        info!(song_id = song.song_id, title = %song.title, "Processing song media");

        futures::try_join!(
            self.store(song.song_id, waveform(song.song_id)),
            self.store(song.song_id, MediaArtefact::Metadata(metadata(&song.audio))),
            self.store(song.song_id, preview(song.song_id)),
            self.store(song.song_id, formats(song.song_id)),
        )
        .map_err(|err| {
            warn!(song_id = song.song_id, error = %err, "Media processing failed");
            err
        })?;

        info!(song_id = song.song_id, "Media processing completed");
        Ok(())
    }

    async fn store(&self, song_id: i64, artefact: MediaArtefact) -> Result<(), HandlerError> {
        debug!(song_id = song_id, artefact = artefact.kind(), "Artefact derived");
        self.sink.save(song_id, &artefact).await
    }
}

fn waveform(song_id: i64) -> MediaArtefact {
    // Placeholder envelope; a real decoder replaces this
    let seed = song_id.unsigned_abs() as usize;
    let peaks = (0..WAVEFORM_PEAKS)
        .map(|i| ((i * 37 + seed) % 100) as f32 / 100.0)
        .collect();

    MediaArtefact::Waveform {
        url: format!("{}/waveforms/{}.png", CDN_BASE, song_id),
        peaks,
    }
}

fn metadata(audio: &str) -> AudioMetadata {
    let codec = audio
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && !ext.contains('/'))
        .unwrap_or_else(|| "mp3".to_string());

    AudioMetadata {
        duration_secs: 245,
        bitrate_kbps: 320,
        sample_rate_hz: 44_100,
        codec,
        channels: 2,
    }
}

fn preview(song_id: i64) -> MediaArtefact {
    MediaArtefact::Preview {
        url: format!("{}/previews/{}_preview.mp3", CDN_BASE, song_id),
        duration_secs: PREVIEW_SECS,
    }
}

fn formats(song_id: i64) -> MediaArtefact {
    let base = format!("{}/songs/{}", CDN_BASE, song_id);
    MediaArtefact::Formats(BTreeMap::from([
        ("mp3_320", format!("{}/320.mp3", base)),
        ("mp3_128", format!("{}/128.mp3", base)),
        ("aac", format!("{}/audio.aac", base)),
        ("ogg", format!("{}/audio.ogg", base)),
    ]))
}

#[async_trait]
impl EventHandler for MediaProcessingHandler {
    fn name(&self) -> &'static str {
        "media-processing"
    }

    async fn handle(&self, event: &CatalogEvent) -> HandlerOutcome {
        match event {
            CatalogEvent::SongUploaded(song) => outcome(self.process(song).await),
            other => {
                debug!(event_type = %other.event_type(), "No media to process");
                HandlerOutcome::Ok
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artefact_urls() {
        match preview(12) {
            MediaArtefact::Preview { url, duration_secs } => {
                assert_eq!(url, "https://cdn.example.com/previews/12_preview.mp3");
                assert_eq!(duration_secs, 30);
            }
            other => panic!("unexpected {:?}", other),
        }

        match formats(12) {
            MediaArtefact::Formats(formats) => {
                assert_eq!(formats.len(), 4);
                assert_eq!(formats["aac"], "https://cdn.example.com/songs/12/audio.aac");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_waveform_is_stable_per_song() {
        assert_eq!(waveform(5), waveform(5));
        match waveform(5) {
            MediaArtefact::Waveform { peaks, .. } => {
                assert_eq!(peaks.len(), WAVEFORM_PEAKS);
                assert!(peaks.iter().all(|p| (0.0..1.0).contains(p)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_codec_from_extension() {
        assert_eq!(metadata("https://cdn.example.com/a.FLAC").codec, "flac");
        assert_eq!(metadata("u").codec, "mp3");
        assert_eq!(metadata("https://cdn.example.com/raw").codec, "mp3");
    }
}
