use tokio::sync::mpsc;

use crate::{
    config::{QuestionPolicy, SessionConfig},
    error::{QuizcastError, Result},
    questions::QuestionCache,
    segments::SegmentStore,
    services::{Collaborators, ProgressReporter, ProgressUpdate},
    types::{ProcessingState, ProcessingStatus, UploadFile, VideoAsset},
};

/// Share of overall progress owned by the upload/processing service.
pub const UPLOAD_SHARE: f64 = 0.6;
/// Overall progress once the transcript is fetched.
pub const TRANSCRIBED_AT: f64 = 0.7;

impl ProcessingState {
    /// Start a submission. Only `idle` and `error` accept one.
    pub fn begin(&mut self) -> Result<()> {
        if !matches!(self.status, ProcessingStatus::Idle | ProcessingStatus::Error) {
            return Err(QuizcastError::SubmissionInFlight {
                status: self.status,
            });
        }
        *self = ProcessingState {
            status: ProcessingStatus::Uploading,
            progress: 0.0,
            message: Some("Uploading video".to_string()),
        };
        Ok(())
    }

    /// Apply an intermediate update. Progress never decreases and the status
    /// only moves forward from `uploading` to `processing`. Returns whether
    /// anything changed.
    pub fn advance(&mut self, update: &ProgressUpdate) -> bool {
        if !self.status.is_in_flight() || !update.status.is_in_flight() {
            return false;
        }

        let status = match (self.status, update.status) {
            (ProcessingStatus::Processing, ProcessingStatus::Uploading) => self.status,
            (_, next) => next,
        };
        let progress = if update.progress.is_finite() {
            update.progress.clamp(0.0, 1.0).max(self.progress)
        } else {
            self.progress
        };
        let message = update.message.clone().or_else(|| self.message.clone());

        let changed =
            status != self.status || progress != self.progress || message != self.message;
        self.status = status;
        self.progress = progress;
        self.message = message;
        changed
    }

    pub fn complete(&mut self, message: impl Into<String>) {
        *self = ProcessingState {
            status: ProcessingStatus::Complete,
            progress: 1.0,
            message: Some(message.into()),
        };
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        *self = ProcessingState {
            status: ProcessingStatus::Error,
            progress: 0.0,
            message: Some(message.into()),
        };
    }

    pub fn reset(&mut self) {
        *self = ProcessingState::default();
    }
}

/// Everything one successful ingestion produced.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub asset: VideoAsset,
    pub segments: SegmentStore,
    pub questions: QuestionCache,
}

/// Sequences the external services for one submission: upload/process,
/// then segments, then (under the strict policy) every segment's questions.
#[derive(Clone)]
pub struct PipelineController {
    services: Collaborators,
    config: SessionConfig,
}

impl PipelineController {
    pub fn new(services: Collaborators, config: SessionConfig) -> Self {
        Self { services, config }
    }

    pub fn services(&self) -> &Collaborators {
        &self.services
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the ingestion stages, streaming progress into `progress`. On any
    /// failure nothing produced so far is returned.
    pub async fn ingest(
        &self,
        file: &UploadFile,
        progress: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Result<Ingested> {
        tracing::info!(name = %file.name, size_bytes = file.size_bytes, "ingestion started");

        let reporter =
            ProgressReporter::new(ProcessingStatus::Uploading, 0.0, UPLOAD_SHARE, progress.clone());
        let asset = self
            .services
            .processing
            .process(file, &reporter)
            .await
            .map_err(|e| QuizcastError::UploadFailed {
                name: file.name.clone(),
                reason: format!("{e:#}"),
            })?;
        tracing::info!(video_id = %asset.id, "video processed");

        let stage = ProgressReporter::new(
            ProcessingStatus::Processing,
            UPLOAD_SHARE,
            TRANSCRIBED_AT,
            progress.clone(),
        );
        stage.report(0.0, Some("Transcribing".to_string()));

        let mut segments = SegmentStore::new();
        segments
            .load(
                &asset.id,
                self.services.transcription.as_ref(),
                self.config.segment_policy,
            )
            .await?;

        let questions_stage =
            ProgressReporter::new(ProcessingStatus::Processing, TRANSCRIBED_AT, 1.0, progress);
        questions_stage.report(
            0.0,
            Some(format!("Transcript ready: {} segments", segments.len())),
        );

        let questions = match self.config.question_policy {
            QuestionPolicy::Strict => {
                QuestionCache::load_all(
                    segments.segments(),
                    self.services.questions.as_ref(),
                    |done, total| {
                        questions_stage.report(
                            done as f64 / total as f64,
                            Some(format!("Generating questions ({done}/{total})")),
                        );
                    },
                )
                .await?
            }
            QuestionPolicy::Progressive => QuestionCache::pending(segments.segments()),
        };

        tracing::info!(
            video_id = %asset.id,
            segments = segments.len(),
            questions = questions.total_questions(),
            "ingestion finished"
        );

        Ok(Ingested {
            asset,
            segments,
            questions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(status: ProcessingStatus, progress: f64) -> ProgressUpdate {
        ProgressUpdate {
            status,
            progress,
            message: None,
        }
    }

    #[test]
    fn begin_only_from_idle_or_error() {
        let mut state = ProcessingState::default();
        state.begin().unwrap();
        assert_eq!(state.status, ProcessingStatus::Uploading);

        let err = state.begin().unwrap_err();
        assert!(matches!(
            err,
            QuizcastError::SubmissionInFlight {
                status: ProcessingStatus::Uploading
            }
        ));

        state.fail("boom");
        assert_eq!(state.progress, 0.0);
        assert!(state.begin().is_ok());

        state.complete("done");
        assert!(state.begin().is_err());
    }

    #[test]
    fn progress_never_decreases() {
        let mut state = ProcessingState::default();
        state.begin().unwrap();

        assert!(state.advance(&update(ProcessingStatus::Uploading, 0.4)));
        assert!(!state.advance(&update(ProcessingStatus::Uploading, 0.2)));
        assert_eq!(state.progress, 0.4);

        assert!(state.advance(&update(ProcessingStatus::Processing, 0.65)));
        state.advance(&update(ProcessingStatus::Uploading, 0.7));
        assert_eq!(state.status, ProcessingStatus::Processing);
        assert_eq!(state.progress, 0.7);

        state.advance(&update(ProcessingStatus::Processing, 3.0));
        assert_eq!(state.progress, 1.0);
    }

    #[test]
    fn terminal_states_ignore_updates() {
        let mut state = ProcessingState::default();
        assert!(!state.advance(&update(ProcessingStatus::Processing, 0.5)));
        assert_eq!(state.status, ProcessingStatus::Idle);

        state.begin().unwrap();
        state.complete("done");
        assert!(!state.advance(&update(ProcessingStatus::Processing, 0.5)));
        assert_eq!(state.status, ProcessingStatus::Complete);
        assert_eq!(state.progress, 1.0);

        state.reset();
        assert_eq!(state, ProcessingState::default());
    }
}
