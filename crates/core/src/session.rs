use serde::{Deserialize, Serialize};

use crate::{
    config::QuestionPolicy,
    error::{QuizcastError, Result},
    pipeline::Ingested,
    questions::QuestionCache,
    segments::SegmentStore,
    services::ProgressUpdate,
    sync::{PlaybackSynchronizer, SyncChange},
    types::{
        ExportScope, McQuestion, ProcessingState, ProcessingStatus, QuestionStatus,
        TranscriptSegment, VideoAsset,
    },
};

/// All in-memory state of the one live session. Mutated only through the
/// transitions below; the session worker is its single owner.
#[derive(Debug, Default)]
pub struct Session {
    epoch: u64,
    asset: Option<VideoAsset>,
    state: ProcessingState,
    segments: SegmentStore,
    questions: QuestionCache,
    playback: PlaybackSynchronizer,
}

/// Result of applying a finished ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestApplied {
    /// The ingestion belonged to an older epoch and was dropped.
    Stale,
    Completed { segments: usize, questions: usize },
    Failed { message: String },
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    pub fn asset(&self) -> Option<&VideoAsset> {
        self.asset.as_ref()
    }

    pub fn segments(&self) -> &SegmentStore {
        &self.segments
    }

    pub fn questions(&self) -> &QuestionCache {
        &self.questions
    }

    pub fn playback(&self) -> &PlaybackSynchronizer {
        &self.playback
    }

    /// Accept a new submission and return the epoch its work is tagged with.
    /// A completed session is discarded first; an in-flight one rejects.
    pub fn begin_submission(&mut self) -> Result<u64> {
        if self.state.status.is_in_flight() {
            return Err(QuizcastError::SubmissionInFlight {
                status: self.state.status,
            });
        }
        if self.state.status == ProcessingStatus::Complete {
            self.reset();
        }

        self.clear_data();
        self.state.begin()?;
        self.epoch += 1;
        Ok(self.epoch)
    }

    pub fn apply_progress(&mut self, epoch: u64, update: &ProgressUpdate) -> bool {
        epoch == self.epoch && self.state.advance(update)
    }

    pub fn finish_ingest(
        &mut self,
        epoch: u64,
        outcome: Result<Ingested>,
        policy: QuestionPolicy,
    ) -> IngestApplied {
        if epoch != self.epoch || !self.state.status.is_in_flight() {
            return IngestApplied::Stale;
        }

        match outcome {
            Ok(ingested) => {
                let segments = ingested.segments.len();
                let questions = ingested.questions.total_questions();
                self.asset = Some(ingested.asset);
                self.segments = ingested.segments;
                self.questions = ingested.questions;
                self.playback = PlaybackSynchronizer::new();

                let message = match policy {
                    QuestionPolicy::Strict => {
                        format!("Ready: {segments} segments, {questions} questions")
                    }
                    QuestionPolicy::Progressive => {
                        format!("Transcript ready: {segments} segments, questions pending")
                    }
                };
                self.state.complete(message);
                IngestApplied::Completed {
                    segments,
                    questions,
                }
            }
            Err(e) => {
                let message = e.to_string();
                self.clear_data();
                self.state.fail(message.clone());
                IngestApplied::Failed { message }
            }
        }
    }

    /// Record one segment's question outcome (progressive policy).
    pub fn settle_questions(
        &mut self,
        epoch: u64,
        segment_id: &str,
        outcome: Result<Vec<McQuestion>>,
    ) -> bool {
        epoch == self.epoch && self.questions.settle(segment_id, outcome)
    }

    pub fn update_time(&mut self, time: f64) -> SyncChange {
        self.playback.on_time_update(time, &self.segments)
    }

    pub fn select_segment(&mut self, segment_id: &str) -> Result<SyncChange> {
        self.playback.on_segment_select(segment_id, &self.segments)
    }

    /// The video an export for `scope` runs against.
    pub fn export_target(&self, scope: &ExportScope) -> Result<&VideoAsset> {
        let asset = self.asset.as_ref().ok_or(QuizcastError::NoVideo)?;
        if let ExportScope::Segment(segment_id) = scope {
            if self.segments.get(segment_id).is_none() {
                return Err(QuizcastError::UnknownSegment {
                    segment_id: segment_id.clone(),
                });
            }
        }
        Ok(asset)
    }

    /// Drop everything and return to `idle`. Work tagged with the previous
    /// epoch is ignored from here on.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.clear_data();
        self.state.reset();
    }

    fn clear_data(&mut self) {
        self.asset = None;
        self.segments = SegmentStore::new();
        self.questions = QuestionCache::new();
        self.playback = PlaybackSynchronizer::new();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            epoch: self.epoch,
            asset: self.asset.clone(),
            processing: self.state.clone(),
            segments: self.segments.segments().to_vec(),
            questions: self
                .segments
                .segments()
                .iter()
                .filter_map(|s| {
                    self.questions.status(&s.id).map(|status| SegmentQuestions {
                        segment_id: s.id.clone(),
                        status: status.clone(),
                    })
                })
                .collect(),
            active_segment: self.playback.active_segment().map(str::to_string),
            playback_time: self.playback.time(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentQuestions {
    pub segment_id: String,
    pub status: QuestionStatus,
}

/// What the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub epoch: u64,
    pub asset: Option<VideoAsset>,
    pub processing: ProcessingState,
    pub segments: Vec<TranscriptSegment>,
    /// In segment order.
    pub questions: Vec<SegmentQuestions>,
    pub active_segment: Option<String>,
    pub playback_time: f64,
}

impl SessionSnapshot {
    pub fn active(&self) -> Option<&TranscriptSegment> {
        let id = self.active_segment.as_deref()?;
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn question_status(&self, segment_id: &str) -> Option<&QuestionStatus> {
        self.questions
            .iter()
            .find(|q| q.segment_id == segment_id)
            .map(|q| &q.status)
    }

    pub fn questions_settled(&self) -> bool {
        self.segments.len() == self.questions.len()
            && self.questions.iter().all(|q| q.status.is_settled())
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{
        config::SegmentPolicy,
        services::TranscriptionService,
    };
    use async_trait::async_trait;

    struct Fixed(Vec<TranscriptSegment>);

    #[async_trait]
    impl TranscriptionService for Fixed {
        async fn get_segments(&self, _video_id: &str) -> anyhow::Result<Vec<TranscriptSegment>> {
            Ok(self.0.clone())
        }
    }

    async fn ingested() -> Ingested {
        let segs: Vec<TranscriptSegment> = (0..3)
            .map(|i| TranscriptSegment {
                id: format!("segment-{i}"),
                start_time: i as f64 * 300.0,
                end_time: ((i + 1) as f64 * 300.0).min(720.0),
                text: format!("part {i}"),
            })
            .collect();
        let mut segments = SegmentStore::new();
        segments
            .load("video-1", &Fixed(segs.clone()), SegmentPolicy::Reject)
            .await
            .unwrap();
        Ingested {
            asset: VideoAsset {
                id: "video-1".into(),
                name: "lecture.mp4".into(),
                size_bytes: 42,
                url: "file:///tmp/lecture.mp4".into(),
                uploaded_at: SystemTime::now(),
            },
            segments,
            questions: QuestionCache::pending(&segs),
        }
    }

    #[tokio::test]
    async fn complete_then_reset_clears_everything() {
        let mut session = Session::new();
        let epoch = session.begin_submission().unwrap();
        let applied = session.finish_ingest(epoch, Ok(ingested().await), QuestionPolicy::Progressive);
        assert!(matches!(applied, IngestApplied::Completed { segments: 3, .. }));

        session.update_time(301.0);
        let snap = session.snapshot();
        assert_eq!(snap.processing.status, ProcessingStatus::Complete);
        assert_eq!(snap.active_segment.as_deref(), Some("segment-1"));
        assert_eq!(snap.questions.len(), 3);

        session.reset();
        let snap = session.snapshot();
        assert!(snap.asset.is_none());
        assert!(snap.segments.is_empty());
        assert!(snap.questions.is_empty());
        assert!(snap.active_segment.is_none());
        assert_eq!(snap.processing, ProcessingState::default());
    }

    #[tokio::test]
    async fn stale_results_are_dropped() {
        let mut session = Session::new();
        let old = session.begin_submission().unwrap();
        session.reset();
        let current = session.begin_submission().unwrap();
        assert_ne!(old, current);

        let update = ProgressUpdate {
            status: ProcessingStatus::Uploading,
            progress: 0.5,
            message: None,
        };
        assert!(!session.apply_progress(old, &update));
        assert_eq!(
            session.finish_ingest(old, Ok(ingested().await), QuestionPolicy::Strict),
            IngestApplied::Stale
        );
        assert!(session.asset().is_none());
        assert_eq!(session.state().status, ProcessingStatus::Uploading);
    }

    #[test]
    fn failure_moves_to_error_and_accepts_resubmission() {
        let mut session = Session::new();
        let epoch = session.begin_submission().unwrap();
        assert!(session.begin_submission().is_err());

        let applied = session.finish_ingest(
            epoch,
            Err(QuizcastError::QuestionGenerationFailed {
                segment_id: "segment-2".into(),
                reason: "timeout".into(),
            }),
            QuestionPolicy::Strict,
        );
        assert!(matches!(applied, IngestApplied::Failed { .. }));
        assert_eq!(session.state().status, ProcessingStatus::Error);
        assert_eq!(session.state().progress, 0.0);
        assert!(session.segments().is_empty());

        assert!(session.begin_submission().is_ok());
    }

    #[tokio::test]
    async fn export_target_requires_video_and_known_segment() {
        let mut session = Session::new();
        assert!(matches!(
            session.export_target(&ExportScope::All),
            Err(QuizcastError::NoVideo)
        ));

        let epoch = session.begin_submission().unwrap();
        session.finish_ingest(epoch, Ok(ingested().await), QuestionPolicy::Progressive);
        assert!(session.export_target(&ExportScope::All).is_ok());
        assert!(session
            .export_target(&ExportScope::Segment("segment-1".into()))
            .is_ok());
        assert!(matches!(
            session.export_target(&ExportScope::Segment("segment-9".into())),
            Err(QuizcastError::UnknownSegment { .. })
        ));
    }
}
