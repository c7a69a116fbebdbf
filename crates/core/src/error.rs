use thiserror::Error;

use crate::types::ProcessingStatus;

#[derive(Error, Debug)]
pub enum QuizcastError {
    #[error("Upload failed for {name}: {reason}")]
    UploadFailed { name: String, reason: String },

    #[error("Transcription failed for video {video_id}: {reason}")]
    TranscriptionFailed { video_id: String, reason: String },

    #[error("Question generation failed for segment {segment_id}: {reason}")]
    QuestionGenerationFailed { segment_id: String, reason: String },

    #[error("Ingestion of {name} stopped unexpectedly: {reason}")]
    IngestionAborted { name: String, reason: String },

    #[error("Export failed for video {video_id}: {reason}")]
    ExportFailed { video_id: String, reason: String },

    #[error("A submission is already in flight (status: {status})")]
    SubmissionInFlight { status: ProcessingStatus },

    #[error("Unknown segment: {segment_id}")]
    UnknownSegment { segment_id: String },

    #[error("No video in the current session")]
    NoVideo,

    #[error("Session worker is no longer running")]
    SessionClosed,

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl QuizcastError {
    /// Ingestion failures move the session to `error`; everything else is
    /// reported to the caller only.
    pub fn is_ingestion_failure(&self) -> bool {
        matches!(
            self,
            QuizcastError::UploadFailed { .. }
                | QuizcastError::TranscriptionFailed { .. }
                | QuizcastError::QuestionGenerationFailed { .. }
                | QuizcastError::IngestionAborted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, QuizcastError>;
