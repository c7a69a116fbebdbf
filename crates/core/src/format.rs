use crate::{
    session::SessionSnapshot,
    types::{McQuestion, QuestionStatus, TranscriptSegment},
};

/// Format seconds as MM:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", mins, secs)
}

/// `[MM:SS–MM:SS]` label for a segment
pub fn format_segment_range(segment: &TranscriptSegment) -> String {
    format!(
        "[{}–{}]",
        format_timestamp(segment.start_time),
        format_timestamp(segment.end_time)
    )
}

pub fn format_question(index: usize, question: &McQuestion) -> String {
    let mut output = format!("{}. {}\n", index + 1, question.question);
    for (i, option) in question.options.iter().enumerate() {
        let marker = if i == question.correct_answer { '*' } else { ' ' };
        let letter = (b'A' + (i % 26) as u8) as char;
        output.push_str(&format!("   {marker} {letter}) {option}\n"));
    }
    output
}

/// Transcript and questions of a session as markdown.
pub fn format_session_readable(snapshot: &SessionSnapshot) -> String {
    let mut output = String::new();

    if let Some(asset) = &snapshot.asset {
        output.push_str(&format!("# {}\n\n", asset.name));
    }

    for segment in &snapshot.segments {
        let active = snapshot.active_segment.as_deref() == Some(segment.id.as_str());
        output.push_str(&format!(
            "## {} {}{}\n\n",
            format_segment_range(segment),
            segment.id,
            if active { " (active)" } else { "" }
        ));
        output.push_str(segment.text.trim());
        output.push_str("\n\n");

        match snapshot.question_status(&segment.id) {
            Some(QuestionStatus::Ready { questions }) if questions.is_empty() => {
                output.push_str("_No questions for this segment._\n\n");
            }
            Some(QuestionStatus::Ready { questions }) => {
                for (i, question) in questions.iter().enumerate() {
                    output.push_str(&format_question(i, question));
                }
                output.push('\n');
            }
            Some(QuestionStatus::Pending) => output.push_str("_Questions pending…_\n\n"),
            Some(QuestionStatus::Failed { reason }) => {
                output.push_str(&format!("_Question generation failed: {reason}_\n\n"));
            }
            None => {}
        }
    }

    output
}
