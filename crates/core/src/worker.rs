//! The task that owns the live [`Session`] and the handle used to drive it.
//!
//! Every entry point is a message to one task, so state transitions happen in
//! arrival order and no field has more than one writer. Long-running service
//! calls run in spawned tasks that report back through the same inbox, tagged
//! with the session epoch they were started under.

use std::{any::Any, path::Path};

use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::{JoinError, JoinHandle, JoinSet},
};

use crate::{
    config::{QuestionPolicy, SessionConfig},
    error::{QuizcastError, Result},
    pipeline::{Ingested, PipelineController},
    questions::fetch_questions,
    services::{Collaborators, ProgressUpdate},
    session::{IngestApplied, Session, SessionSnapshot},
    sync::SyncChange,
    types::{ExportBundle, ExportFormat, ExportScope, McQuestion, Notification, UploadFile},
};

enum Command {
    Submit {
        file: UploadFile,
        reply: oneshot::Sender<Result<u64>>,
    },
    UpdateTime {
        time: f64,
        reply: oneshot::Sender<SyncChange>,
    },
    SelectSegment {
        segment_id: String,
        reply: oneshot::Sender<Result<SyncChange>>,
    },
    Export {
        scope: ExportScope,
        format: ExportFormat,
        reply: oneshot::Sender<Result<ExportBundle>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
}

enum Internal {
    Progress {
        epoch: u64,
        update: ProgressUpdate,
    },
    IngestFinished {
        epoch: u64,
        outcome: Result<Ingested>,
    },
    QuestionsSettled {
        epoch: u64,
        segment_id: String,
        outcome: Result<Vec<McQuestion>>,
    },
}

struct SessionWorker {
    session: Session,
    pipeline: PipelineController,
    state_tx: watch::Sender<SessionSnapshot>,
    notify_tx: broadcast::Sender<Notification>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    in_flight: Option<JoinHandle<()>>,
}

impl SessionWorker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(msg) = internal.recv() => self.handle_internal(msg),
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }

        self.abort_in_flight();
        tracing::debug!("session worker stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit { file, reply } => {
                let _ = reply.send(self.submit(file));
            }
            Command::UpdateTime { time, reply } => {
                let change = self.session.update_time(time);
                self.publish();
                let _ = reply.send(change);
            }
            Command::SelectSegment { segment_id, reply } => {
                let result = self.session.select_segment(&segment_id);
                match &result {
                    Ok(_) => self.publish(),
                    Err(e) => tracing::warn!("segment selection rejected: {e}"),
                }
                let _ = reply.send(result);
            }
            Command::Export {
                scope,
                format,
                reply,
            } => self.export(scope, format, reply),
            Command::Reset { reply } => {
                self.abort_in_flight();
                self.session.reset();
                tracing::info!(epoch = self.session.epoch(), "session reset");
                self.publish();
                let _ = reply.send(());
            }
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Progress { epoch, update } => {
                if self.session.apply_progress(epoch, &update) {
                    self.publish();
                }
            }
            Internal::IngestFinished { epoch, outcome } => {
                let policy = self.pipeline.config().question_policy;
                match self.session.finish_ingest(epoch, outcome, policy) {
                    IngestApplied::Stale => {
                        tracing::debug!(epoch, "dropped stale ingestion result");
                        return;
                    }
                    IngestApplied::Completed {
                        segments,
                        questions,
                    } => {
                        tracing::info!(epoch, segments, questions, "session ready");
                        self.in_flight = None;
                        if policy == QuestionPolicy::Progressive {
                            self.spawn_question_fetch(epoch);
                        }
                        let message = self
                            .session
                            .state()
                            .message
                            .clone()
                            .unwrap_or_else(|| "Processing complete".to_string());
                        self.notify(Notification::info(message));
                    }
                    IngestApplied::Failed { message } => {
                        tracing::warn!(epoch, "ingestion failed: {message}");
                        self.in_flight = None;
                        self.notify(Notification::error(message));
                    }
                }
                self.publish();
            }
            Internal::QuestionsSettled {
                epoch,
                segment_id,
                outcome,
            } => {
                let failure = outcome.as_ref().err().map(ToString::to_string);
                if !self.session.settle_questions(epoch, &segment_id, outcome) {
                    return;
                }
                if let Some(message) = failure {
                    tracing::warn!(segment_id = %segment_id, "question generation failed: {message}");
                    self.notify(Notification::error(message));
                }
                self.publish();
            }
        }
    }

    fn submit(&mut self, file: UploadFile) -> Result<u64> {
        let epoch = match self.session.begin_submission() {
            Ok(epoch) => epoch,
            Err(e) => {
                tracing::warn!("submission rejected: {e}");
                return Err(e);
            }
        };
        self.abort_in_flight();
        self.publish();

        let pipeline = self.pipeline.clone();
        let internal = self.internal_tx.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let name = file.name.clone();
            // the set aborts the ingestion when this task is aborted
            let mut ingest = JoinSet::new();
            ingest.spawn(async move { pipeline.ingest(&file, progress_tx).await });

            let outcome = loop {
                tokio::select! {
                    biased;
                    Some(update) = progress_rx.recv() => {
                        let _ = internal.send(Internal::Progress { epoch, update });
                    }
                    joined = ingest.join_next() => {
                        let aborted = |reason| QuizcastError::IngestionAborted {
                            name: name.clone(),
                            reason,
                        };
                        break joined_outcome(joined, aborted);
                    }
                }
            };
            while let Ok(update) = progress_rx.try_recv() {
                let _ = internal.send(Internal::Progress { epoch, update });
            }
            let _ = internal.send(Internal::IngestFinished { epoch, outcome });
        }));

        Ok(epoch)
    }

    fn spawn_question_fetch(&mut self, epoch: u64) {
        let segment_ids: Vec<String> = self
            .session
            .segments()
            .segments()
            .iter()
            .map(|s| s.id.clone())
            .collect();
        let service = self.pipeline.services().questions.clone();
        let internal = self.internal_tx.clone();

        self.in_flight = Some(tokio::spawn(async move {
            for segment_id in segment_ids {
                let mut fetch = JoinSet::new();
                let task_service = service.clone();
                let task_segment = segment_id.clone();
                fetch.spawn(async move {
                    fetch_questions(task_service.as_ref(), &task_segment).await
                });
                let outcome = joined_outcome(fetch.join_next().await, |reason| {
                    QuizcastError::QuestionGenerationFailed {
                        segment_id: segment_id.clone(),
                        reason,
                    }
                });
                let _ = internal.send(Internal::QuestionsSettled {
                    epoch,
                    segment_id,
                    outcome,
                });
            }
        }));
    }

    fn export(
        &self,
        scope: ExportScope,
        format: ExportFormat,
        reply: oneshot::Sender<Result<ExportBundle>>,
    ) {
        let asset = match self.session.export_target(&scope) {
            Ok(asset) => asset.clone(),
            Err(e) => {
                tracing::warn!("export rejected: {e}");
                self.notify(Notification::error(e.to_string()));
                let _ = reply.send(Err(e));
                return;
            }
        };

        let service = self.pipeline.services().export.clone();
        let notify_tx = self.notify_tx.clone();
        tokio::spawn(async move {
            // both scopes export the whole session; the scope only names the file
            let result = service
                .export(&asset.id, format)
                .await
                .map(|mut bundle| {
                    bundle.file_name = export_file_name(&asset.name, &scope, format);
                    bundle
                })
                .map_err(|e| QuizcastError::ExportFailed {
                    video_id: asset.id.clone(),
                    reason: format!("{e:#}"),
                });

            match &result {
                Ok(bundle) => {
                    tracing::info!(file_name = %bundle.file_name, bytes = bundle.bytes.len(), "export finished");
                    let _ = notify_tx.send(Notification::info(format!(
                        "Exported {}",
                        bundle.file_name
                    )));
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    let _ = notify_tx.send(Notification::error(e.to_string()));
                }
            }
            let _ = reply.send(result);
        });
    }

    fn abort_in_flight(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.session.snapshot());
    }

    fn notify(&self, notification: Notification) {
        // no subscribers is fine
        let _ = self.notify_tx.send(notification);
    }
}

/// Flatten a task joined from a [`JoinSet`]. A panicked or vanished task
/// becomes the error built by `failed`.
fn joined_outcome<T>(
    joined: Option<std::result::Result<Result<T>, JoinError>>,
    failed: impl FnOnce(String) -> QuizcastError,
) -> Result<T> {
    match joined {
        Some(Ok(outcome)) => outcome,
        Some(Err(e)) if e.is_panic() => {
            let reason = panic_message(e.into_panic());
            tracing::error!("task panicked: {reason}");
            Err(failed(format!("task panicked: {reason}")))
        }
        Some(Err(_)) => Err(failed("task was cancelled".to_string())),
        None => Err(failed("task was never started".to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub fn export_file_name(video_name: &str, scope: &ExportScope, format: ExportFormat) -> String {
    let stem = Path::new(video_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "session".to_string());
    match scope {
        ExportScope::Segment(segment_id) => {
            format!("{stem}-{segment_id}-questions.{}", format.extension())
        }
        ExportScope::All => format!("{stem}-questions.{}", format.extension()),
    }
}

/// Client side of the session worker. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<SessionSnapshot>,
    notify_tx: broadcast::Sender<Notification>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionHandle {
    /// Start a session worker on the current tokio runtime.
    pub fn spawn(services: Collaborators, config: SessionConfig) -> (Self, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::default());
        let (notify_tx, _) = broadcast::channel(config.notification_buffer);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let worker = SessionWorker {
            session: Session::new(),
            pipeline: PipelineController::new(services, config),
            state_tx,
            notify_tx: notify_tx.clone(),
            internal_tx,
            in_flight: None,
        };
        let task = tokio::spawn(worker.run(commands_rx, internal_rx, shutdown_rx));

        (
            Self {
                commands: commands_tx,
                state_rx,
                notify_tx,
                shutdown_tx,
            },
            task,
        )
    }

    /// Start ingesting `file`. Returns once the submission is accepted; watch
    /// [`subscribe`](Self::subscribe) for progress and completion.
    pub async fn submit(&self, file: UploadFile) -> Result<u64> {
        self.request(|reply| Command::Submit { file, reply }).await?
    }

    pub async fn update_time(&self, time: f64) -> Result<SyncChange> {
        self.request(|reply| Command::UpdateTime { time, reply }).await
    }

    pub async fn select_segment(&self, segment_id: impl Into<String>) -> Result<SyncChange> {
        let segment_id = segment_id.into();
        self.request(|reply| Command::SelectSegment { segment_id, reply })
            .await?
    }

    pub async fn export_segment(
        &self,
        segment_id: impl Into<String>,
        format: ExportFormat,
    ) -> Result<ExportBundle> {
        let scope = ExportScope::Segment(segment_id.into());
        self.request(|reply| Command::Export {
            scope,
            format,
            reply,
        })
        .await?
    }

    pub async fn export_all(&self, format: ExportFormat) -> Result<ExportBundle> {
        self.request(|reply| Command::Export {
            scope: ExportScope::All,
            format,
            reply,
        })
        .await?
    }

    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_rx.clone()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    /// Wait for the first snapshot matching `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot> {
        let mut rx = self.state_rx.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| QuizcastError::SessionClosed)?;
        Ok(snapshot.clone())
    }

    /// Wait until ingestion reaches `complete` or `error`.
    pub async fn wait_until_settled(&self) -> Result<SessionSnapshot> {
        self.wait_for(|s| s.processing.status.is_terminal()).await
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| QuizcastError::SessionClosed)?;
        rx.await.map_err(|_| QuizcastError::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_names_follow_scope() {
        assert_eq!(
            export_file_name("intro.mp4", &ExportScope::All, ExportFormat::Json),
            "intro-questions.json"
        );
        assert_eq!(
            export_file_name(
                "intro.mp4",
                &ExportScope::Segment("segment-1".into()),
                ExportFormat::Json
            ),
            "intro-segment-1-questions.json"
        );
        assert_eq!(
            export_file_name("", &ExportScope::All, ExportFormat::Json),
            "session-questions.json"
        );
    }
}
