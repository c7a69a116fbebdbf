use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use quizcast_core::{ExportBundle, ExportFormat, ExportService, build_records, encode_records};

use super::Catalog;

/// Exports whatever segments and questions the session's collaborators
/// produced for a video.
pub struct JsonExporter {
    catalog: Catalog,
}

impl JsonExporter {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ExportService for JsonExporter {
    async fn export(&self, video_id: &str, format: ExportFormat) -> Result<ExportBundle> {
        let segments = self
            .catalog
            .segments(video_id)
            .ok_or_else(|| anyhow!("No transcript recorded for video {video_id}"))?;
        let questions: HashMap<String, _> = segments
            .iter()
            .filter_map(|s| {
                self.catalog
                    .questions(video_id, &s.id)
                    .map(|q| (s.id.clone(), q))
            })
            .collect();

        let records = build_records(&segments, |id| questions.get(id).map(Vec::as_slice));
        tracing::info!(video_id, records = records.len(), "export encoded");

        let bundle = encode_records(&records, format, format!("questions.{}", format.extension()))?;
        Ok(bundle)
    }
}
