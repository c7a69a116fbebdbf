use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use quizcast_core::{TimedSpan, TranscriptSegment, TranscriptionService, window_transcript};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::Catalog;

/// Whisper JSON output
#[derive(Debug, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: String,
    pub segments: Vec<TimedSpan>,
    #[serde(default)]
    pub language: String,
}

impl Transcript {
    pub fn duration_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.end).fold(0.0, f64::max)
    }
}

/// Load a transcript from a cached file
pub async fn load_transcript(path: &Path) -> Result<Transcript> {
    let json_content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read transcript {}", path.display()))?;
    let transcript: Transcript = serde_json::from_str(&json_content)
        .with_context(|| format!("Invalid transcript JSON in {}", path.display()))?;
    Ok(transcript)
}

/// Serves a pre-computed Whisper transcript, windowed into fixed segments.
pub struct WhisperTranscripts {
    path: PathBuf,
    window_secs: f64,
    catalog: Catalog,
}

impl WhisperTranscripts {
    pub fn new(path: impl Into<PathBuf>, window_secs: f64, catalog: Catalog) -> Self {
        Self {
            path: path.into(),
            window_secs,
            catalog,
        }
    }
}

#[async_trait]
impl TranscriptionService for WhisperTranscripts {
    async fn get_segments(&self, video_id: &str) -> Result<Vec<TranscriptSegment>> {
        let transcript = load_transcript(&self.path).await?;
        let segments =
            window_transcript(&transcript.segments, self.window_secs).map_err(|e| anyhow!(e))?;

        tracing::info!(
            video_id,
            language = %transcript.language,
            duration_secs = transcript.duration_secs(),
            segments = segments.len(),
            "transcript windowed"
        );
        self.catalog.record_segments(video_id, segments.clone());
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twelve_minutes() -> Transcript {
        Transcript {
            text: String::new(),
            segments: (0..12)
                .map(|m| TimedSpan {
                    start: m as f64 * 60.0,
                    end: (m + 1) as f64 * 60.0,
                    text: format!("minute {m}"),
                })
                .collect(),
            language: "en".into(),
        }
    }

    #[tokio::test]
    async fn windows_file_and_records_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        fs::write(&path, serde_json::to_vec(&twelve_minutes()).unwrap())
            .await
            .unwrap();

        let catalog = Catalog::new();
        let service = WhisperTranscripts::new(&path, 300.0, catalog.clone());
        let segments = service.get_segments("video-1").await.unwrap();

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].start_time, 600.0);
        assert_eq!(segments[2].end_time, 720.0);
        assert!(segments[1].text.contains("minute 5"));
        assert_eq!(catalog.segments("video-1").unwrap(), segments);
        assert_eq!(
            catalog.segment_text("segment-0").as_deref(),
            Some(segments[0].text.as_str())
        );
    }

    #[tokio::test]
    async fn unreadable_transcript_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let service = WhisperTranscripts::new(&path, 300.0, Catalog::new());
        assert!(service.get_segments("video-1").await.is_err());
    }

    #[tokio::test]
    async fn huge_span_end_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.json");
        let transcript = Transcript {
            text: String::new(),
            segments: vec![TimedSpan {
                start: 0.0,
                end: 1e30,
                text: "forever".into(),
            }],
            language: "en".into(),
        };
        fs::write(&path, serde_json::to_vec(&transcript).unwrap())
            .await
            .unwrap();

        let catalog = Catalog::new();
        let service = WhisperTranscripts::new(&path, 300.0, catalog.clone());
        assert!(service.get_segments("video-1").await.is_err());
        assert!(catalog.segments("video-1").is_none());
    }
}
