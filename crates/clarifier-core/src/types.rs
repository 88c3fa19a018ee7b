//! Shared value types for the clarification dialogue.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Text recorded for a human turn when the question was left unanswered.
pub const SKIPPED_RESPONSE: &str = "Question skipped.";

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Speaker {
    /// The question generator
    Ai,
    /// The person clarifying their problem
    Human,
}

impl Speaker {
    /// Label used in prompts and exported documents.
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Ai => "AI",
            Speaker::Human => "Human",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One speaker-labeled transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    /// An AI question turn.
    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Ai,
            text: text.into(),
        }
    }

    /// A human response turn. Blank responses become [`SKIPPED_RESPONSE`].
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Human,
            text: normalize_response(text.into()),
        }
    }

    /// Whether this turn records a skipped question.
    pub fn is_skipped(&self) -> bool {
        self.speaker == Speaker::Human && self.text == SKIPPED_RESPONSE
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker, self.text)
    }
}

/// Map a blank response to the skip sentinel; keep anything else verbatim.
pub fn normalize_response(text: String) -> String {
    if text.trim().is_empty() {
        SKIPPED_RESPONSE.to_string()
    } else {
        text
    }
}

/// State-machine state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    NotStarted,
    IssueSelection,
    Clarifying,
    Ended,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::NotStarted => "NOT_STARTED",
            Phase::IssueSelection => "ISSUE_SELECTION",
            Phase::Clarifying => "CLARIFYING",
            Phase::Ended => "ENDED",
        };
        f.write_str(name)
    }
}

/// Derived artifacts computed when the dialogue ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Short title for the refined problem statement
    pub title: String,

    /// Refined statement, including the inference disclosure paragraph
    pub refined_statement: String,

    /// Evaluation and feedback paragraphs from the critic
    pub feedback: String,
}

/// Classification of a block of free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Safe,
    Suspect { reason: String },
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }

    pub fn is_suspect(&self) -> bool {
        !self.is_safe()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Safe => f.write_str("SAFE"),
            Verdict::Suspect { reason } => write!(f, "SUSPECT ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_human_turn_is_skipped() {
        let turn = Turn::human("   \n\t");
        assert_eq!(turn.text, SKIPPED_RESPONSE);
        assert!(turn.is_skipped());

        let turn = Turn::human("Attendance dropped");
        assert_eq!(turn.text, "Attendance dropped");
        assert!(!turn.is_skipped());
    }

    #[test]
    fn test_ai_turn_keeps_text() {
        let turn = Turn::ai("");
        assert_eq!(turn.speaker, Speaker::Ai);
        assert!(!turn.is_skipped());
    }

    #[test]
    fn test_turn_display_uses_labels() {
        assert_eq!(Turn::ai("Why?").to_string(), "AI: Why?");
        assert_eq!(Turn::human("Because.").to_string(), "Human: Because.");
    }

    #[test]
    fn test_phase_serializes_screaming() {
        let json = serde_json::to_string(&Phase::IssueSelection).unwrap();
        assert_eq!(json, "\"ISSUE_SELECTION\"");
        assert_eq!(Phase::default(), Phase::NotStarted);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Safe.to_string(), "SAFE");
        let suspect = Verdict::Suspect {
            reason: "keyword 'password'".to_string(),
        };
        assert!(suspect.is_suspect());
        assert_eq!(suspect.to_string(), "SUSPECT (keyword 'password')");
    }
}
