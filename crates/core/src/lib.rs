//! Quizcast Core Library
//!
//! Keeps a lecture video's transcript segments, their generated questions and
//! the playback position consistent across ingestion, scrubbing, segment
//! selection and reset.

pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod pipeline;
pub mod questions;
pub mod segments;
pub mod services;
pub mod session;
pub mod sync;
pub mod types;
pub mod worker;

// Re-export commonly used items at crate root
pub use config::{QuestionPolicy, SegmentPolicy, SessionConfig};
pub use error::{QuizcastError, Result};
pub use export::{ExportRecord, build_records, encode_records};
pub use format::{format_segment_range, format_session_readable, format_timestamp};
pub use pipeline::{Ingested, PipelineController};
pub use questions::QuestionCache;
pub use segments::{SegmentStore, TimedSpan, window_transcript};
pub use services::{
    Collaborators, ExportService, ProcessingService, ProgressReporter, ProgressUpdate,
    QuestionService, TranscriptionService,
};
pub use session::{Session, SessionSnapshot};
pub use sync::{PlaybackSynchronizer, SyncChange};
pub use types::{
    ExportBundle, ExportFormat, ExportScope, McQuestion, Notification, NotificationLevel,
    ProcessingState, ProcessingStatus, QuestionStatus, TranscriptSegment, UploadFile, VideoAsset,
};
pub use worker::SessionHandle;
