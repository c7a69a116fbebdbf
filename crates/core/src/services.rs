//! Contracts for the external collaborators the session sequences.
//!
//! Implementations live outside the core (the CLI ships local ones). Their
//! failures are plain `anyhow` errors; the pipeline maps them onto the
//! stage-specific variants of [`QuizcastError`](crate::QuizcastError).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{
    ExportBundle, ExportFormat, McQuestion, ProcessingStatus, TranscriptSegment, UploadFile,
    VideoAsset,
};

#[async_trait]
pub trait ProcessingService: Send + Sync {
    /// Upload and process a file, reporting incremental progress.
    async fn process(
        &self,
        file: &UploadFile,
        progress: &ProgressReporter,
    ) -> anyhow::Result<VideoAsset>;
}

#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn get_segments(&self, video_id: &str) -> anyhow::Result<Vec<TranscriptSegment>>;
}

#[async_trait]
pub trait QuestionService: Send + Sync {
    async fn get_questions(&self, segment_id: &str) -> anyhow::Result<Vec<McQuestion>>;
}

#[async_trait]
pub trait ExportService: Send + Sync {
    async fn export(&self, video_id: &str, format: ExportFormat) -> anyhow::Result<ExportBundle>;
}

/// The full set of collaborators one session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub processing: Arc<dyn ProcessingService>,
    pub transcription: Arc<dyn TranscriptionService>,
    pub questions: Arc<dyn QuestionService>,
    pub export: Arc<dyn ExportService>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub status: ProcessingStatus,
    pub progress: f64,
    pub message: Option<String>,
}

/// Handed to [`ProcessingService::process`]. Maps the service's own `[0, 1]`
/// ratio into the slice of overall progress owned by the current stage.
#[derive(Clone)]
pub struct ProgressReporter {
    status: ProcessingStatus,
    start: f64,
    end: f64,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ProgressReporter {
    pub fn new(
        status: ProcessingStatus,
        start: f64,
        end: f64,
        tx: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Self {
        Self {
            status,
            start,
            end,
            tx,
        }
    }

    /// Report progress as a ratio of this stage.
    pub fn report(&self, ratio: f64, message: Option<String>) {
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.send(self.status, self.start + ratio * (self.end - self.start), message);
    }

    /// Switch the reported status, e.g. once bytes are uploaded and the
    /// service starts processing.
    pub fn set_status(&mut self, status: ProcessingStatus) {
        self.status = status;
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    fn send(&self, status: ProcessingStatus, progress: f64, message: Option<String>) {
        // the receiver is gone once the session moved on; nothing to report to
        let _ = self.tx.send(ProgressUpdate {
            status,
            progress,
            message,
        });
    }
}
