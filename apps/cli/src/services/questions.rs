use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use quizcast_core::{McQuestion, QuestionService};
use serde::Deserialize;
use tokio::fs;

use super::Catalog;
use crate::provider::Provider;

const QUESTIONS_PER_SEGMENT: usize = 3;

/// Pre-written questions keyed by segment id. Segments missing from the bank
/// have no questions.
pub struct QuestionBank {
    questions: HashMap<String, Vec<McQuestion>>,
    catalog: Catalog,
}

impl QuestionBank {
    pub async fn load(path: &Path, catalog: Catalog) -> Result<Self> {
        let json_content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read question bank {}", path.display()))?;
        let questions: HashMap<String, Vec<McQuestion>> = serde_json::from_str(&json_content)
            .with_context(|| format!("Invalid question bank JSON in {}", path.display()))?;

        tracing::info!(segments = questions.len(), "question bank loaded");
        Ok(Self { questions, catalog })
    }
}

#[async_trait]
impl QuestionService for QuestionBank {
    async fn get_questions(&self, segment_id: &str) -> Result<Vec<McQuestion>> {
        let questions = self.questions.get(segment_id).cloned().unwrap_or_default();
        let questions = checked(segment_id, questions)?;
        self.catalog.record_questions(segment_id, questions.clone());
        Ok(questions)
    }
}

/// Generates questions for a segment's text with a chat-completions provider.
pub struct LlmQuestions {
    provider: Provider,
    api_key: String,
    client: reqwest::Client,
    catalog: Catalog,
}

impl LlmQuestions {
    pub fn new(provider: Provider, catalog: Catalog) -> Result<Self> {
        let api_key = provider.api_key()?;
        Ok(Self {
            provider,
            api_key,
            client: reqwest::Client::new(),
            catalog,
        })
    }
}

#[async_trait]
impl QuestionService for LlmQuestions {
    async fn get_questions(&self, segment_id: &str) -> Result<Vec<McQuestion>> {
        let text = self
            .catalog
            .segment_text(segment_id)
            .ok_or_else(|| anyhow!("No transcript text for {segment_id}"))?;
        if text.trim().is_empty() {
            self.catalog.record_questions(segment_id, Vec::new());
            return Ok(Vec::new());
        }

        let endpoint = self.provider.endpoint();
        let system_prompt = format!(
            r#"You write multiple-choice quiz questions about a lecture excerpt.

  OUTPUT: Return ONLY a valid JSON array of {count} items:
  [
    {{
      "question": "A question answerable from the excerpt",
      "options": ["option A", "option B", "option C", "option D"],
      "correct_answer": <index of the correct option>
    }}
  ]

  RULES:
  - Ask about what the excerpt actually says
  - Exactly one option is correct
  - Write in the excerpt's language
  - Output ONLY JSON, nothing else"#,
            count = QUESTIONS_PER_SEGMENT
        );

        tracing::debug!(segment_id, provider = self.provider.name(), "requesting questions");
        let response = self
            .client
            .post(endpoint.url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": endpoint.model,
                "messages": [
                    { "role": "system", "content": &system_prompt },
                    { "role": "user", "content": &text },
                ],
                "temperature": 0.3,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid API response structure: {:?}", response))?;

        let questions = checked(segment_id, parse_questions(content, segment_id)?)?;
        self.catalog.record_questions(segment_id, questions.clone());
        Ok(questions)
    }
}

#[derive(Deserialize)]
struct GeneratedQuestion {
    question: String,
    options: Vec<String>,
    #[serde(alias = "correctAnswer")]
    correct_answer: usize,
}

/// Parse a model reply into questions with ids `<segment>-q<i>`.
pub fn parse_questions(content: &str, segment_id: &str) -> Result<Vec<McQuestion>> {
    let json = strip_code_fence(content);
    let generated: Vec<GeneratedQuestion> =
        serde_json::from_str(json).context("Model did not return a JSON question list")?;

    Ok(generated
        .into_iter()
        .enumerate()
        .map(|(i, q)| McQuestion {
            id: format!("{segment_id}-q{i}"),
            question: q.question,
            options: q.options,
            correct_answer: q.correct_answer,
        })
        .collect())
}

/// Refuse a set with an out-of-range answer so it never reaches the catalog.
fn checked(segment_id: &str, questions: Vec<McQuestion>) -> Result<Vec<McQuestion>> {
    if let Some(bad) = questions.iter().find(|q| !q.is_valid()) {
        bail!(
            "question {} of {segment_id} has correct answer {} but {} options",
            bad.id,
            bad.correct_answer,
            bad.options.len()
        );
    }
    Ok(questions)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use quizcast_core::{ExportFormat, ExportRecord, ExportService, TranscriptSegment};

    use super::*;
    use crate::services::JsonExporter;

    fn transcript() -> Vec<TranscriptSegment> {
        (0..2)
            .map(|i| TranscriptSegment {
                id: format!("segment-{i}"),
                start_time: i as f64 * 300.0,
                end_time: (i + 1) as f64 * 300.0,
                text: format!("part {i}"),
            })
            .collect()
    }

    #[test]
    fn parses_fenced_reply() {
        let reply = "```json\n[{\"question\":\"What is Rust?\",\"options\":[\"A language\",\"A metal oxide\"],\"correct_answer\":0}]\n```";
        let questions = parse_questions(reply, "segment-1").unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "segment-1-q0");
        assert_eq!(questions[0].options.len(), 2);
        assert_eq!(questions[0].correct_answer, 0);
    }

    #[test]
    fn rejects_prose() {
        assert!(parse_questions("Sure! Here are some questions.", "segment-0").is_err());
    }

    #[tokio::test]
    async fn bank_returns_empty_for_missing_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.json");
        fs::write(
            &path,
            r#"{ "segment-0": [{ "id": "q1", "question": "Topic?", "options": ["Rust", "Go"], "correctAnswer": 0 }] }"#,
        )
        .await
        .unwrap();

        let catalog = Catalog::new();
        catalog.record_segments("video-1", transcript());
        let bank = QuestionBank::load(&path, catalog.clone()).await.unwrap();

        assert_eq!(bank.get_questions("segment-0").await.unwrap().len(), 1);
        assert!(bank.get_questions("segment-1").await.unwrap().is_empty());
        assert_eq!(catalog.questions("video-1", "segment-0").unwrap()[0].id, "q1");
    }

    #[tokio::test]
    async fn invalid_bank_questions_are_never_exported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.json");
        fs::write(
            &path,
            r#"{
                "segment-0": [{ "id": "ok", "question": "Topic?", "options": ["Rust", "Go"], "correctAnswer": 1 }],
                "segment-1": [{ "id": "bad", "question": "Topic?", "options": ["a"], "correctAnswer": 5 }]
            }"#,
        )
        .await
        .unwrap();

        let catalog = Catalog::new();
        catalog.record_segments("video-1", transcript());
        let bank = QuestionBank::load(&path, catalog.clone()).await.unwrap();

        assert!(bank.get_questions("segment-0").await.is_ok());
        let err = bank.get_questions("segment-1").await.unwrap_err();
        assert!(err.to_string().contains("correct answer 5 but 1 options"));
        assert!(catalog.questions("video-1", "segment-1").is_none());

        let bundle = JsonExporter::new(catalog)
            .export("video-1", ExportFormat::Json)
            .await
            .unwrap();
        let records: Vec<ExportRecord> = serde_json::from_slice(&bundle.bytes).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question_id, "ok");
        assert!(
            records
                .iter()
                .all(|r| r.correct_answer < r.options.len())
        );
    }

    #[test]
    fn generated_answer_out_of_range_is_rejected() {
        let reply = r#"[{"question":"Q?","options":["a","b"],"correct_answer":2}]"#;
        let questions = parse_questions(reply, "segment-0").unwrap();
        assert!(checked("segment-0", questions).is_err());
    }
}
