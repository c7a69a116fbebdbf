use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use quizcast_core::{
    Collaborators, ExportBundle, ExportFormat, Notification, NotificationLevel, ProcessingStatus,
    QuestionPolicy, QuestionService, SessionConfig, SessionHandle, SyncChange, UploadFile,
    format_session_readable, format_timestamp,
};
use tokio::{fs, sync::broadcast::error::RecvError};
use tracing_subscriber::EnvFilter;

use crate::{
    cache::get_root_cache_dir,
    provider::Provider,
    services::{CacheUpload, Catalog, JsonExporter, LlmQuestions, QuestionBank, WhisperTranscripts},
};

mod cache;
mod provider;
mod services;

const DEFAULT_LOG_FILTER: &str = "quizcast=info,quizcast_core=info";

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Default, ValueEnum)]
enum CliProvider {
    #[default]
    Grok,
    Openai,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Grok => Provider::Grok,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum CliPolicy {
    Strict,
    Progressive,
}

impl From<CliPolicy> for QuestionPolicy {
    fn from(cli: CliPolicy) -> Self {
        match cli {
            CliPolicy::Strict => QuestionPolicy::Strict,
            CliPolicy::Progressive => QuestionPolicy::Progressive,
        }
    }
}

#[derive(Parser)]
#[command(name = "quizcast")]
#[command(about = "Upload a lecture video, segment its transcript and quiz each segment")]
struct Cli {
    /// Video file
    video: PathBuf,

    /// Whisper JSON transcript of the video
    #[arg(short, long)]
    transcript: PathBuf,

    /// Question bank JSON keyed by segment id (skips the AI provider)
    #[arg(short, long, conflicts_with = "provider")]
    questions: Option<PathBuf>,

    /// AI provider for question generation
    #[arg(short, long)]
    provider: Option<CliProvider>,

    /// Segment length in seconds
    #[arg(short, long)]
    window: Option<f64>,

    /// When ingestion counts as complete
    #[arg(long)]
    policy: Option<CliPolicy>,

    /// Playback positions (seconds) to replay after ingestion
    #[arg(long = "at", value_name = "SECS")]
    at: Vec<f64>,

    /// Segment to select after replaying positions
    #[arg(short, long, value_name = "SEGMENT_ID")]
    select: Option<String>,

    /// Write the exported questions to this file or directory
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Export only the named segment's scope
    #[arg(long, value_name = "SEGMENT_ID", requires = "export")]
    export_segment: Option<String>,

    /// JSON session config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force re-upload even if a cached copy exists
    #[arg(short, long)]
    force: bool,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(1000);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );
    pb
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path).await?,
        None => SessionConfig::default(),
    }
    .apply_env()?;

    if let Some(window) = cli.window {
        config.segment_window_secs = window;
    }
    if let Some(policy) = &cli.policy {
        config.question_policy = policy.clone().into();
    }
    Ok(config.validate()?)
}

fn print_notification(notification: &Notification) {
    match notification.level {
        NotificationLevel::Info => {
            eprintln!("{} {}", style("✓").green().bold(), notification.message)
        }
        NotificationLevel::Error => {
            eprintln!("{} {}", style("Error:").red().bold(), notification.message)
        }
    }
}

async fn write_export(bundle: &ExportBundle, target: &Path) -> Result<PathBuf> {
    let path = if fs::metadata(target).await.map(|m| m.is_dir()).unwrap_or(false) {
        target.join(&bundle.file_name)
    } else {
        target.to_path_buf()
    };
    fs::write(&path, &bundle.bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli).await?;
    let catalog = Catalog::new();

    let questions: Arc<dyn QuestionService> = match &cli.questions {
        Some(path) => Arc::new(QuestionBank::load(path, catalog.clone()).await?),
        None => {
            let provider: Provider = cli.provider.clone().unwrap_or_default().into();
            // Validate API key early
            match LlmQuestions::new(provider, catalog.clone()) {
                Ok(service) => Arc::new(service),
                Err(e) => {
                    eprintln!("{} {}", style("Error:").red().bold(), e);
                    std::process::exit(1);
                }
            }
        }
    };

    let services = Collaborators {
        processing: Arc::new(CacheUpload::new(get_root_cache_dir(), cli.force)),
        transcription: Arc::new(WhisperTranscripts::new(
            &cli.transcript,
            config.segment_window_secs,
            catalog.clone(),
        )),
        questions,
        export: Arc::new(JsonExporter::new(catalog)),
    };
    let policy = config.question_policy;

    println!(
        "\n{}  {}\n",
        style("quizcast").cyan().bold(),
        style("Lecture Quiz Builder").dim()
    );

    let (session, worker) = SessionHandle::spawn(services, config);
    let mut notifications = session.notifications();
    let printer = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => print_notification(&notification),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notifications dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let total_start = Instant::now();
    let file = UploadFile::from_path(&cli.video)
        .await
        .with_context(|| format!("Cannot read {}", cli.video.display()))?;
    session.submit(file).await?;

    // Step 1: Ingest
    let bar = create_progress_bar();
    let mut state = session.subscribe();
    let snapshot = loop {
        let snapshot = state.borrow_and_update().clone();
        bar.set_position((snapshot.processing.progress * 1000.0).round() as u64);
        if let Some(message) = &snapshot.processing.message {
            bar.set_message(message.clone());
        }
        if snapshot.processing.status.is_terminal() {
            break snapshot;
        }
        if state.changed().await.is_err() {
            bail!("session closed during ingestion");
        }
    };
    bar.finish_and_clear();

    if snapshot.processing.status == ProcessingStatus::Error {
        let reason = snapshot
            .processing
            .message
            .unwrap_or_else(|| "ingestion failed".to_string());
        session.shutdown();
        let _ = worker.await;
        printer.abort();
        bail!(reason);
    }
    println!(
        "{} Ingested: {} segments {}",
        style("✓").green().bold(),
        snapshot.segments.len(),
        style(format!("[{}]", format_duration(total_start.elapsed()))).dim()
    );

    // Step 2: Questions (already settled under the strict policy)
    if policy == QuestionPolicy::Progressive {
        let step_start = Instant::now();
        let spinner = create_spinner("Generating questions...");
        session.wait_for(|s| s.questions_settled()).await?;
        spinner.finish_with_message(format!(
            "{} Questions generated {}",
            style("✓").green().bold(),
            style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
        ));
    }

    // Step 3: Replay playback
    for time in &cli.at {
        let change = session.update_time(*time).await?;
        let current = session.snapshot();
        let active = current.active_segment.as_deref().unwrap_or("none");
        match change {
            SyncChange::ActiveSegmentChanged => println!(
                "{} {} → {}",
                style("▶").cyan(),
                format_timestamp(*time),
                style(active).yellow()
            ),
            SyncChange::Unchanged => println!(
                "{} {} → {} {}",
                style("▶").cyan(),
                format_timestamp(*time),
                active,
                style("(unchanged)").dim()
            ),
        }
    }
    if let Some(segment_id) = &cli.select {
        session.select_segment(segment_id.as_str()).await?;
        let current = session.snapshot();
        println!(
            "{} Selected {} at {}",
            style("▶").cyan(),
            style(segment_id).yellow(),
            format_timestamp(current.playback_time)
        );
    }

    // Step 4: Export
    let saved = match &cli.export {
        Some(target) => {
            let bundle = match &cli.export_segment {
                Some(segment_id) => {
                    session
                        .export_segment(segment_id.as_str(), ExportFormat::Json)
                        .await?
                }
                None => session.export_all(ExportFormat::Json).await?,
            };
            Some(write_export(&bundle, target).await?)
        }
        None => None,
    };

    println!(
        "\n{} {}\n",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );
    if let Some(path) = saved {
        println!("{} {}\n", style("Saved:").dim(), style(path.display()).cyan());
    }
    println!("{}", style("─".repeat(60)).dim());

    // Human-readable output
    println!("{}", format_session_readable(&session.snapshot()));

    session.shutdown();
    worker.await?;
    printer.abort();
    Ok(())
}
