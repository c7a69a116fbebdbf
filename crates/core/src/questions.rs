use std::collections::HashMap;

use crate::{
    error::{QuizcastError, Result},
    services::QuestionService,
    types::{McQuestion, QuestionStatus, TranscriptSegment},
};

/// Segment id → question status for the active video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionCache {
    entries: HashMap<String, QuestionStatus>,
}

impl QuestionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// An entry for every segment, all still pending.
    pub fn pending(segments: &[TranscriptSegment]) -> Self {
        Self {
            entries: segments
                .iter()
                .map(|s| (s.id.clone(), QuestionStatus::Pending))
                .collect(),
        }
    }

    /// Fetch questions for every segment in order. The first failure aborts
    /// the whole load; no partial cache is returned.
    pub async fn load_all(
        segments: &[TranscriptSegment],
        service: &dyn QuestionService,
        mut on_fetched: impl FnMut(usize, usize),
    ) -> Result<Self> {
        let mut entries = HashMap::with_capacity(segments.len());

        for (i, segment) in segments.iter().enumerate() {
            let questions = fetch_questions(service, &segment.id).await?;
            entries.insert(segment.id.clone(), QuestionStatus::Ready { questions });
            on_fetched(i + 1, segments.len());
        }

        Ok(Self { entries })
    }

    /// Record the outcome of one segment's fetch. Returns false when the
    /// segment is not part of this cache.
    pub fn settle(&mut self, segment_id: &str, outcome: Result<Vec<McQuestion>>) -> bool {
        let Some(entry) = self.entries.get_mut(segment_id) else {
            return false;
        };

        *entry = match outcome {
            Ok(questions) => QuestionStatus::Ready { questions },
            Err(e) => QuestionStatus::Failed {
                reason: e.to_string(),
            },
        };
        true
    }

    pub fn status(&self, segment_id: &str) -> Option<&QuestionStatus> {
        self.entries.get(segment_id)
    }

    pub fn questions(&self, segment_id: &str) -> Option<&[McQuestion]> {
        self.entries.get(segment_id).and_then(QuestionStatus::questions)
    }

    /// Every segment has an entry (possibly pending or empty).
    pub fn covers(&self, segments: &[TranscriptSegment]) -> bool {
        segments.iter().all(|s| self.entries.contains_key(&s.id))
    }

    /// Every segment has a settled entry.
    pub fn is_ready(&self, segments: &[TranscriptSegment]) -> bool {
        segments.iter().all(|s| {
            self.entries
                .get(&s.id)
                .is_some_and(QuestionStatus::is_settled)
        })
    }

    pub fn entries(&self) -> &HashMap<String, QuestionStatus> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_questions(&self) -> usize {
        self.entries
            .values()
            .filter_map(QuestionStatus::questions)
            .map(<[McQuestion]>::len)
            .sum()
    }
}

/// Fetch and validate the questions of a single segment.
pub async fn fetch_questions(
    service: &dyn QuestionService,
    segment_id: &str,
) -> Result<Vec<McQuestion>> {
    let questions = service.get_questions(segment_id).await.map_err(|e| {
        QuizcastError::QuestionGenerationFailed {
            segment_id: segment_id.to_string(),
            reason: format!("{e:#}"),
        }
    })?;

    if let Some(bad) = questions.iter().find(|q| !q.is_valid()) {
        return Err(QuizcastError::QuestionGenerationFailed {
            segment_id: segment_id.to_string(),
            reason: format!(
                "question {} has correct answer {} but {} options",
                bad.id,
                bad.correct_answer,
                bad.options.len()
            ),
        });
    }

    tracing::debug!(segment_id, count = questions.len(), "questions fetched");
    Ok(questions)
}
