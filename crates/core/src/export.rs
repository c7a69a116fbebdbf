use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    types::{ExportBundle, ExportFormat, McQuestion, TranscriptSegment},
};

/// One row of the structured export: a question with its segment's bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub segment_id: String,
    pub segment_start: f64,
    pub segment_end: f64,
    pub question_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
}

/// Flatten segments and their questions into records, in segment order.
/// Segments without questions contribute no rows.
pub fn build_records<'a>(
    segments: &[TranscriptSegment],
    questions_for: impl Fn(&str) -> Option<&'a [McQuestion]>,
) -> Vec<ExportRecord> {
    segments
        .iter()
        .flat_map(|segment| {
            questions_for(&segment.id)
                .unwrap_or_default()
                .iter()
                .map(move |q| ExportRecord {
                    segment_id: segment.id.clone(),
                    segment_start: segment.start_time,
                    segment_end: segment.end_time,
                    question_id: q.id.clone(),
                    question: q.question.clone(),
                    options: q.options.clone(),
                    correct_answer: q.correct_answer,
                })
        })
        .collect()
}

pub fn encode_records(
    records: &[ExportRecord],
    format: ExportFormat,
    file_name: impl Into<String>,
) -> Result<ExportBundle> {
    let bytes = match format {
        ExportFormat::Json => serde_json::to_vec_pretty(records)?,
    };
    Ok(ExportBundle {
        format,
        file_name: file_name.into(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn records_follow_segment_order_and_skip_empty() {
        let segments: Vec<TranscriptSegment> = (0..3)
            .map(|i| TranscriptSegment {
                id: format!("segment-{i}"),
                start_time: i as f64 * 300.0,
                end_time: (i + 1) as f64 * 300.0,
                text: String::new(),
            })
            .collect();
        let question = |id: &str| McQuestion {
            id: id.to_string(),
            question: format!("{id}?"),
            options: vec!["yes".into(), "no".into()],
            correct_answer: 0,
        };
        let bank: HashMap<String, Vec<McQuestion>> = HashMap::from([
            ("segment-2".to_string(), vec![question("c")]),
            ("segment-0".to_string(), vec![question("a"), question("b")]),
            ("segment-1".to_string(), Vec::new()),
        ]);

        let records = build_records(&segments, |id| bank.get(id).map(Vec::as_slice));
        let ids: Vec<&str> = records.iter().map(|r| r.question_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(records[2].segment_start, 600.0);

        let bundle = encode_records(&records, ExportFormat::Json, "out.json").unwrap();
        let decoded: Vec<ExportRecord> = serde_json::from_slice(&bundle.bytes).unwrap();
        assert_eq!(decoded.len(), 3);
        let raw = String::from_utf8(bundle.bytes).unwrap();
        assert!(raw.contains("\"correctAnswer\""));
    }
}
