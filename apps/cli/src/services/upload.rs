use std::{path::PathBuf, time::SystemTime};

use anyhow::{Context, Result};
use async_trait::async_trait;
use quizcast_core::{
    ProcessingService, ProcessingStatus, ProgressReporter, UploadFile, VideoAsset,
};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncWriteExt},
};

use crate::cache::{get_cache_dir_in, get_upload_path};

const CHUNK_SIZE: usize = 256 * 1024;

/// "Uploads" a video by copying it into the per-video cache directory.
pub struct CacheUpload {
    root: PathBuf,
    force: bool,
}

impl CacheUpload {
    pub fn new(root: impl Into<PathBuf>, force: bool) -> Self {
        Self {
            root: root.into(),
            force,
        }
    }
}

#[async_trait]
impl ProcessingService for CacheUpload {
    async fn process(&self, file: &UploadFile, progress: &ProgressReporter) -> Result<VideoAsset> {
        let cache_dir = get_cache_dir_in(&self.root, &file.path);
        fs::create_dir_all(&cache_dir)
            .await
            .with_context(|| format!("Failed to create {}", cache_dir.display()))?;
        let dest = get_upload_path(&cache_dir, &file.name);

        let cached = !self.force
            && fs::metadata(&dest)
                .await
                .map(|m| m.len() == file.size_bytes)
                .unwrap_or(false);

        if cached {
            tracing::info!(path = %dest.display(), "upload cached");
            progress.report(1.0, Some("Uploaded (cached)".to_string()));
        } else {
            copy_with_progress(file, &dest, progress).await?;
        }

        let mut processing = progress.clone();
        processing.set_status(ProcessingStatus::Processing);
        processing.report(1.0, Some("Processing video".to_string()));

        Ok(VideoAsset {
            id: uuid::Uuid::new_v4().to_string(),
            name: file.name.clone(),
            size_bytes: file.size_bytes,
            url: format!("file://{}", dest.display()),
            uploaded_at: SystemTime::now(),
        })
    }
}

async fn copy_with_progress(
    file: &UploadFile,
    dest: &std::path::Path,
    progress: &ProgressReporter,
) -> Result<()> {
    let mut src = fs::File::open(&file.path)
        .await
        .with_context(|| format!("Failed to open {}", file.path.display()))?;
    let mut out = fs::File::create(dest)
        .await
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    let total = file.size_bytes.max(1) as f64;
    let mut copied: u64 = 0;
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).await?;
        copied += n as u64;
        progress.report(
            copied as f64 / total,
            Some(format!("Uploading {}", file.name)),
        );
    }
    out.flush().await?;

    tracing::info!(bytes = copied, path = %dest.display(), "upload copied");
    Ok(())
}
