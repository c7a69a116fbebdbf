//! Local collaborators backing the CLI session: a cache-dir upload, Whisper
//! transcripts from disk, question banks or an LLM provider, and JSON export.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use quizcast_core::{McQuestion, TranscriptSegment};

pub mod export;
pub mod questions;
pub mod transcript;
pub mod upload;

pub use export::JsonExporter;
pub use questions::{LlmQuestions, QuestionBank};
pub use transcript::WhisperTranscripts;
pub use upload::CacheUpload;

/// What the collaborators have produced so far, shared between them so the
/// question service can see segment text and the exporter can see both.
/// Segment ids repeat across videos, so everything is keyed by video too.
/// Questions belong to the most recently transcribed video.
#[derive(Clone, Default)]
pub struct Catalog {
    inner: Arc<Mutex<CatalogInner>>,
}

#[derive(Default)]
struct CatalogInner {
    current_video: Option<String>,
    segments: HashMap<String, Vec<TranscriptSegment>>,
    questions: HashMap<(String, String), Vec<McQuestion>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_segments(&self, video_id: &str, segments: Vec<TranscriptSegment>) {
        let mut inner = self.lock();
        inner.current_video = Some(video_id.to_string());
        inner.segments.insert(video_id.to_string(), segments);
    }

    /// Store a segment's questions under the current video. Returns `false`
    /// when no video has been transcribed yet.
    pub fn record_questions(&self, segment_id: &str, questions: Vec<McQuestion>) -> bool {
        let mut inner = self.lock();
        let Some(video_id) = inner.current_video.clone() else {
            return false;
        };
        inner
            .questions
            .insert((video_id, segment_id.to_string()), questions);
        true
    }

    pub fn segments(&self, video_id: &str) -> Option<Vec<TranscriptSegment>> {
        self.lock().segments.get(video_id).cloned()
    }

    /// Text of a segment of the current video.
    pub fn segment_text(&self, segment_id: &str) -> Option<String> {
        let inner = self.lock();
        let video_id = inner.current_video.as_ref()?;
        inner
            .segments
            .get(video_id)?
            .iter()
            .find(|s| s.id == segment_id)
            .map(|s| s.text.clone())
    }

    pub fn questions(&self, video_id: &str, segment_id: &str) -> Option<Vec<McQuestion>> {
        self.lock()
            .questions
            .get(&(video_id.to_string(), segment_id.to_string()))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CatalogInner> {
        // entries are plain inserts, a poisoned lock still holds consistent data
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
