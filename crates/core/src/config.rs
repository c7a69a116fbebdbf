use std::{path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{QuizcastError, Result};

pub const DEFAULT_SEGMENT_WINDOW_SECS: f64 = 300.0;

pub const ENV_WINDOW_SECS: &str = "QUIZCAST_WINDOW_SECS";
pub const ENV_QUESTION_POLICY: &str = "QUIZCAST_QUESTION_POLICY";
pub const ENV_SEGMENT_POLICY: &str = "QUIZCAST_SEGMENT_POLICY";

/// When questions are fetched relative to the pipeline reporting `complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionPolicy {
    /// Every segment's questions are fetched before `complete`; one failure
    /// fails the ingestion.
    #[default]
    Strict,
    /// `complete` means the transcript is ready; questions settle per segment
    /// afterwards.
    Progressive,
}

/// How a segment sequence from the transcription service is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentPolicy {
    #[default]
    Reject,
    Sort,
}

impl FromStr for QuestionPolicy {
    type Err = QuizcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(QuestionPolicy::Strict),
            "progressive" => Ok(QuestionPolicy::Progressive),
            other => Err(QuizcastError::Config {
                reason: format!("unknown question policy '{other}'"),
            }),
        }
    }
}

impl FromStr for SegmentPolicy {
    type Err = QuizcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(SegmentPolicy::Reject),
            "sort" => Ok(SegmentPolicy::Sort),
            other => Err(QuizcastError::Config {
                reason: format!("unknown segment policy '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub segment_window_secs: f64,
    pub question_policy: QuestionPolicy,
    pub segment_policy: SegmentPolicy,
    pub command_buffer: usize,
    pub notification_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            segment_window_secs: DEFAULT_SEGMENT_WINDOW_SECS,
            question_policy: QuestionPolicy::default(),
            segment_policy: SegmentPolicy::default(),
            command_buffer: 64,
            notification_buffer: 32,
        }
    }
}

impl SessionConfig {
    /// Load a JSON config file. Missing keys keep their defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let json_content = fs::read_to_string(path).await?;
        let config: SessionConfig = serde_json::from_str(&json_content)?;
        config.validate()
    }

    /// Overlay `QUIZCAST_*` environment variables.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    pub fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(ENV_WINDOW_SECS) {
            self.segment_window_secs =
                raw.trim().parse::<f64>().map_err(|_| QuizcastError::Config {
                    reason: format!("{ENV_WINDOW_SECS}='{raw}' is not a number"),
                })?;
        }
        if let Some(raw) = lookup(ENV_QUESTION_POLICY) {
            self.question_policy = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_SEGMENT_POLICY) {
            self.segment_policy = raw.parse()?;
        }
        self.validate()
    }

    pub fn validate(self) -> Result<Self> {
        if !self.segment_window_secs.is_finite() || self.segment_window_secs <= 0.0 {
            return Err(QuizcastError::Config {
                reason: format!(
                    "segment window must be a positive number of seconds, got {}",
                    self.segment_window_secs
                ),
            });
        }
        if self.command_buffer == 0 || self.notification_buffer == 0 {
            return Err(QuizcastError::Config {
                reason: "channel buffers must be > 0".to_string(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        let config = SessionConfig::default()
            .apply_vars(|key| match key {
                ENV_WINDOW_SECS => Some("120".to_string()),
                ENV_QUESTION_POLICY => Some("Progressive".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.segment_window_secs, 120.0);
        assert_eq!(config.question_policy, QuestionPolicy::Progressive);
        assert_eq!(config.segment_policy, SegmentPolicy::Reject);
    }

    #[test]
    fn rejects_bad_window() {
        let err = SessionConfig::default()
            .apply_vars(|key| (key == ENV_WINDOW_SECS).then(|| "-5".to_string()))
            .unwrap_err();
        assert!(matches!(err, QuizcastError::Config { .. }));

        let err = SessionConfig::default()
            .apply_vars(|key| (key == ENV_WINDOW_SECS).then(|| "five".to_string()))
            .unwrap_err();
        assert!(matches!(err, QuizcastError::Config { .. }));
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!("lenient".parse::<QuestionPolicy>().is_err());
        assert_eq!("sort".parse::<SegmentPolicy>().unwrap(), SegmentPolicy::Sort);
    }

    #[tokio::test]
    async fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quizcast.json");
        tokio::fs::write(&path, r#"{ "questionPolicy": "progressive" }"#)
            .await
            .unwrap();

        let config = SessionConfig::load(&path).await.unwrap();
        assert_eq!(config.question_policy, QuestionPolicy::Progressive);
        assert_eq!(config.segment_window_secs, DEFAULT_SEGMENT_WINDOW_SECS);
    }
}
