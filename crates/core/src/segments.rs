use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    config::SegmentPolicy,
    error::{QuizcastError, Result},
    services::TranscriptionService,
    types::TranscriptSegment,
};

/// Ordered transcript segments of the active video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentStore {
    video_id: Option<String>,
    segments: Vec<TranscriptSegment>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and validate the segments of `video_id`. Calling again with the
    /// same id returns the cached sequence without touching the service.
    pub async fn load(
        &mut self,
        video_id: &str,
        service: &dyn TranscriptionService,
        policy: SegmentPolicy,
    ) -> Result<&[TranscriptSegment]> {
        if self.video_id.as_deref() == Some(video_id) {
            tracing::debug!(video_id, "segments already loaded");
            return Ok(&self.segments);
        }

        let fetched = service.get_segments(video_id).await.map_err(|e| {
            QuizcastError::TranscriptionFailed {
                video_id: video_id.to_string(),
                reason: format!("{e:#}"),
            }
        })?;

        let segments = validate_segments(fetched, policy).map_err(|reason| {
            QuizcastError::TranscriptionFailed {
                video_id: video_id.to_string(),
                reason,
            }
        })?;

        tracing::info!(video_id, count = segments.len(), "segments loaded");
        self.video_id = Some(video_id.to_string());
        self.segments = segments;
        Ok(&self.segments)
    }

    /// The unique segment with `start <= time < end`, if any.
    pub fn resolve(&self, time: f64) -> Option<&TranscriptSegment> {
        if !time.is_finite() {
            return None;
        }
        let idx = self.segments.partition_point(|s| s.start_time <= time);
        let candidate = self.segments.get(idx.checked_sub(1)?)?;
        candidate.contains(time).then_some(candidate)
    }

    pub fn get(&self, segment_id: &str) -> Option<&TranscriptSegment> {
        self.segments.iter().find(|s| s.id == segment_id)
    }

    pub fn index_of(&self, segment_id: &str) -> Option<usize> {
        self.segments.iter().position(|s| s.id == segment_id)
    }

    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.segments
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }
}

/// Check ordering invariants, sorting first under [`SegmentPolicy::Sort`].
pub fn validate_segments(
    mut segments: Vec<TranscriptSegment>,
    policy: SegmentPolicy,
) -> std::result::Result<Vec<TranscriptSegment>, String> {
    if policy == SegmentPolicy::Sort {
        segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    }

    let mut seen = HashSet::new();
    for (i, seg) in segments.iter().enumerate() {
        if !seg.start_time.is_finite() || !seg.end_time.is_finite() {
            return Err(format!("segment {} has non-finite bounds", seg.id));
        }
        if seg.start_time >= seg.end_time {
            return Err(format!(
                "segment {} starts at {} but ends at {}",
                seg.id, seg.start_time, seg.end_time
            ));
        }
        if !seen.insert(seg.id.as_str()) {
            return Err(format!("duplicate segment id {}", seg.id));
        }
        if let Some(next) = segments.get(i + 1) {
            if seg.end_time > next.start_time {
                return Err(format!(
                    "segment {} (ends {}) overlaps segment {} (starts {})",
                    seg.id, seg.end_time, next.id, next.start_time
                ));
            }
        }
    }

    Ok(segments)
}

/// A fine-grained piece of transcript, as produced by Whisper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSpan {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

pub fn segment_id(index: usize) -> String {
    format!("segment-{index}")
}

/// Upper bound on windows per transcript (about 35 days at five minutes).
pub const MAX_WINDOWS: usize = 10_000;

/// Bucket spans into fixed windows of `window_secs` covering the whole
/// duration. A span belongs to the window its start falls in. Fails when the
/// duration needs more than [`MAX_WINDOWS`] windows.
pub fn window_transcript(
    spans: &[TimedSpan],
    window_secs: f64,
) -> std::result::Result<Vec<TranscriptSegment>, String> {
    if !window_secs.is_finite() || window_secs <= 0.0 {
        return Ok(Vec::new());
    }

    let duration = spans
        .iter()
        .map(|s| s.end)
        .filter(|end| end.is_finite())
        .fold(0.0_f64, f64::max);
    if duration <= 0.0 {
        return Ok(Vec::new());
    }

    let windows = (duration / window_secs).ceil();
    if windows > MAX_WINDOWS as f64 {
        return Err(format!(
            "transcript lasts {duration}s, more than {MAX_WINDOWS} windows of {window_secs}s"
        ));
    }
    let count = windows as usize;
    let mut texts: Vec<Vec<&str>> = vec![Vec::new(); count];

    for span in spans {
        let start = if span.start.is_finite() {
            span.start.max(0.0)
        } else {
            0.0
        };
        let idx = ((start / window_secs).floor() as usize).min(count - 1);
        let text = span.text.trim();
        if !text.is_empty() {
            texts[idx].push(text);
        }
    }

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(k, parts)| TranscriptSegment {
            id: segment_id(k),
            start_time: k as f64 * window_secs,
            end_time: ((k + 1) as f64 * window_secs).min(duration),
            text: parts.join(" "),
        })
        .collect())
}
