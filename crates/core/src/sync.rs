use serde::{Deserialize, Serialize};

use crate::{
    error::{QuizcastError, Result},
    segments::SegmentStore,
};

/// Reducer over `(playback time, active segment)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSynchronizer {
    time: f64,
    active_segment: Option<String>,
}

/// What a sync call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncChange {
    Unchanged,
    ActiveSegmentChanged,
}

impl PlaybackSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the playback time and follow it into the containing segment.
    /// A time outside every segment keeps the current active segment.
    pub fn on_time_update(&mut self, time: f64, store: &SegmentStore) -> SyncChange {
        self.time = time;

        let Some(segment) = store.resolve(time) else {
            return SyncChange::Unchanged;
        };
        if self.active_segment.as_deref() == Some(segment.id.as_str()) {
            return SyncChange::Unchanged;
        }

        tracing::debug!(time, segment_id = %segment.id, "active segment follows playback");
        self.active_segment = Some(segment.id.clone());
        SyncChange::ActiveSegmentChanged
    }

    /// Jump to a segment: it becomes active and playback moves to its start.
    pub fn on_segment_select(&mut self, segment_id: &str, store: &SegmentStore) -> Result<SyncChange> {
        let segment = store
            .get(segment_id)
            .ok_or_else(|| QuizcastError::UnknownSegment {
                segment_id: segment_id.to_string(),
            })?;

        self.time = segment.start_time;
        if self.active_segment.as_deref() == Some(segment_id) {
            return Ok(SyncChange::Unchanged);
        }

        tracing::debug!(segment_id, start = segment.start_time, "segment selected");
        self.active_segment = Some(segment.id.clone());
        Ok(SyncChange::ActiveSegmentChanged)
    }

    pub fn active_segment(&self) -> Option<&str> {
        self.active_segment.as_deref()
    }

    pub fn time(&self) -> f64 {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SegmentPolicy,
        services::TranscriptionService,
        types::TranscriptSegment,
    };
    use async_trait::async_trait;

    struct Fixed(Vec<TranscriptSegment>);

    #[async_trait]
    impl TranscriptionService for Fixed {
        async fn get_segments(&self, _video_id: &str) -> anyhow::Result<Vec<TranscriptSegment>> {
            Ok(self.0.clone())
        }
    }

    async fn store() -> SegmentStore {
        let segments = [(0.0, 300.0), (300.0, 600.0), (600.0, 720.0)]
            .iter()
            .enumerate()
            .map(|(i, (start, end))| TranscriptSegment {
                id: format!("segment-{i}"),
                start_time: *start,
                end_time: *end,
                text: String::new(),
            })
            .collect();
        let mut store = SegmentStore::new();
        store
            .load("video", &Fixed(segments), SegmentPolicy::Reject)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn time_update_switches_to_containing_segment() {
        let store = store().await;
        let mut sync = PlaybackSynchronizer::new();

        assert_eq!(
            sync.on_time_update(301.0, &store),
            SyncChange::ActiveSegmentChanged
        );
        assert_eq!(sync.active_segment(), Some("segment-1"));
        assert_eq!(sync.on_time_update(450.0, &store), SyncChange::Unchanged);
        assert_eq!(sync.time(), 450.0);
    }

    #[tokio::test]
    async fn time_outside_segments_keeps_active() {
        let store = store().await;
        let mut sync = PlaybackSynchronizer::new();

        sync.on_time_update(650.0, &store);
        assert_eq!(sync.on_time_update(900.0, &store), SyncChange::Unchanged);
        assert_eq!(sync.active_segment(), Some("segment-2"));
        assert_eq!(sync.time(), 900.0);

        let mut fresh = PlaybackSynchronizer::new();
        fresh.on_time_update(-3.0, &store);
        assert_eq!(fresh.active_segment(), None);
    }

    #[tokio::test]
    async fn select_moves_time_to_segment_start() {
        let store = store().await;
        let mut sync = PlaybackSynchronizer::new();

        sync.on_time_update(301.0, &store);
        let change = sync.on_segment_select("segment-0", &store).unwrap();
        assert_eq!(change, SyncChange::ActiveSegmentChanged);
        assert_eq!(sync.active_segment(), Some("segment-0"));
        assert_eq!(sync.time(), 0.0);

        sync.on_time_update(120.0, &store);
        assert_eq!(
            sync.on_segment_select("segment-0", &store).unwrap(),
            SyncChange::Unchanged
        );
        assert_eq!(sync.time(), 0.0);
    }

    #[tokio::test]
    async fn unknown_selection_leaves_state() {
        let store = store().await;
        let mut sync = PlaybackSynchronizer::new();
        sync.on_time_update(10.0, &store);

        let err = sync.on_segment_select("segment-42", &store).unwrap_err();
        assert!(matches!(err, QuizcastError::UnknownSegment { .. }));
        assert_eq!(sync.active_segment(), Some("segment-0"));
        assert_eq!(sync.time(), 10.0);
    }
}
