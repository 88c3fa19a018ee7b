//! Summary document rendering.
//!
//! An ended session is rendered into a portable document with a fixed
//! section order: title, initial statement, focused issues, transcript,
//! refined statement, feedback. Rendering is a pure function of the
//! session; it never feeds back into the state machine.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

use crate::session::Session;
use crate::types::{Phase, Turn};

/// Subtitle printed under the document title.
pub const DOCUMENT_SUBTITLE: &str = "Problem Statement Clarification Summary";

/// Maximum number of slug characters in an export filename.
pub const MAX_SLUG_CHARS: usize = 50;

lazy_static! {
    static ref DISALLOWED_CHARS: Regex = Regex::new(r"[^\w\s-]").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Errors from document export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Only ended sessions can be exported (phase is {0})")]
    NotEnded(Phase),

    #[error("Unknown export format: {0}")]
    UnknownFormat(String),

    #[error("Failed to serialize document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output format of an exported document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Everything the export needs, detached from the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub title: String,
    pub initial_statement: String,
    pub focused_issues: Vec<String>,
    pub transcript: Vec<Turn>,
    pub refined_statement: Vec<String>,
    pub feedback: Vec<String>,
}

impl SummaryDocument {
    /// Build the document for an ended session.
    pub fn from_session(session: &Session) -> Result<Self, ExportError> {
        let outcome = match (session.phase(), session.outcome()) {
            (Phase::Ended, Some(outcome)) => outcome,
            (phase, _) => return Err(ExportError::NotEnded(phase)),
        };

        Ok(Self {
            title: outcome.title.clone(),
            initial_statement: session.initial_statement().unwrap_or_default().to_string(),
            focused_issues: session.selected_issues().to_vec(),
            transcript: session.transcript().to_vec(),
            refined_statement: split_paragraphs(&outcome.refined_statement),
            feedback: split_paragraphs(&outcome.feedback),
        })
    }

    /// Render as Markdown.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        // Writing into a String cannot fail
        let _ = writeln!(out, "# {}\n", self.title);
        let _ = writeln!(out, "## {}\n", DOCUMENT_SUBTITLE);

        let _ = writeln!(out, "### Initial Problem Statement\n");
        let _ = writeln!(out, "{}\n", self.initial_statement.trim());

        let _ = writeln!(out, "### Focused Issues\n");
        for issue in &self.focused_issues {
            let _ = writeln!(out, "- {}", issue);
        }
        out.push('\n');

        let _ = writeln!(out, "### Clarification Process\n");
        for turn in &self.transcript {
            let _ = writeln!(out, "**{}:** {}\n", turn.speaker, turn.text);
        }

        let _ = writeln!(out, "### Refined Problem Statement\n");
        for paragraph in &self.refined_statement {
            let _ = writeln!(out, "{}\n", paragraph);
        }

        let _ = writeln!(out, "### Feedback on Refined Problem Statement\n");
        for paragraph in &self.feedback {
            let _ = writeln!(out, "{}\n", paragraph);
        }

        out.truncate(out.trim_end().len());
        out.push('\n');
        out
    }

    /// Render in the requested format.
    pub fn render(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Markdown => Ok(self.to_markdown()),
            ExportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

/// A rendered document ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDocument {
    pub filename: String,
    pub format: ExportFormat,
    pub content: String,
}

/// Render an ended session in the given format.
pub fn export_session(session: &Session, format: ExportFormat) -> Result<ExportedDocument, ExportError> {
    let document = SummaryDocument::from_session(session)?;
    Ok(ExportedDocument {
        filename: export_filename(&document.initial_statement, format.extension()),
        content: document.render(format)?,
        format,
    })
}

/// Split text on blank lines into trimmed, non-empty paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.trim()
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Derive `problem_statement_<slug>.<ext>` from the initial statement.
pub fn export_filename(statement: &str, extension: &str) -> String {
    let stripped = DISALLOWED_CHARS.replace_all(statement.trim(), "");
    let slug = WHITESPACE_RUN.replace_all(&stripped, "_");
    let slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    format!("problem_statement_{}.{}", slug, extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;

    fn ended_session() -> Session {
        let mut session = Session::new();
        session
            .begin(
                "Students are not engaged",
                vec!["Low funding".to_string(), "Staff turnover".to_string()],
            )
            .unwrap();
        session.toggle_issue("Staff turnover").unwrap();
        session.confirm_issues().unwrap();
        session.set_pending_question("What has changed?").unwrap();
        session.answer("Attendance has dropped 15% this term").unwrap();
        session.set_pending_question("Since when?").unwrap();
        session
            .end(
                "",
                Outcome {
                    title: "Declining Student Engagement".to_string(),
                    refined_statement: "  Engagement fell.\n\nInferred: timeframe.  \n\n\n".to_string(),
                    feedback: "Evaluation paragraph.\n\nFeedback paragraph.".to_string(),
                },
            )
            .unwrap();
        session
    }

    #[test]
    fn test_filename_from_statement() {
        assert_eq!(
            export_filename("Students are not engaged", "md"),
            "problem_statement_Students_are_not_engaged.md"
        );
    }

    #[test]
    fn test_filename_strips_and_collapses() {
        assert_eq!(
            export_filename("  Why?!  Budgets   (2024) - cut\tagain. ", "json"),
            "problem_statement_Why_Budgets_2024_-_cut_again.json"
        );
    }

    #[test]
    fn test_filename_truncates_chars() {
        let statement = "é".repeat(80);
        let filename = export_filename(&statement, "md");
        let slug = filename
            .trim_start_matches("problem_statement_")
            .trim_end_matches(".md");
        assert_eq!(slug.chars().count(), MAX_SLUG_CHARS);
    }

    #[test]
    fn test_split_paragraphs() {
        assert_eq!(
            split_paragraphs("  One.\n\n Two. \n\n\n\nThree."),
            vec!["One.", "Two.", "Three."]
        );
        assert!(split_paragraphs("   ").is_empty());
    }

    #[test]
    fn test_export_requires_ended_session() {
        let session = Session::new();
        assert!(matches!(
            export_session(&session, ExportFormat::Markdown),
            Err(ExportError::NotEnded(Phase::NotStarted))
        ));
    }

    #[test]
    fn test_markdown_section_order() {
        let exported = export_session(&ended_session(), ExportFormat::Markdown).unwrap();
        assert_eq!(exported.filename, "problem_statement_Students_are_not_engaged.md");

        let md = &exported.content;
        let positions: Vec<usize> = [
            "# Declining Student Engagement",
            DOCUMENT_SUBTITLE,
            "### Initial Problem Statement",
            "### Focused Issues",
            "- Staff turnover",
            "### Clarification Process",
            "**AI:** What has changed?",
            "**Human:** Attendance has dropped 15% this term",
            "**Human:** Question skipped.",
            "### Refined Problem Statement",
            "Inferred: timeframe.",
            "### Feedback on Refined Problem Statement",
            "Feedback paragraph.",
        ]
        .iter()
        .map(|needle| md.find(needle).unwrap_or_else(|| panic!("missing {}", needle)))
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]), "sections out of order");
        assert!(!md.contains("Low funding"));
    }

    #[test]
    fn test_json_export() {
        let exported = export_session(&ended_session(), ExportFormat::Json).unwrap();
        assert!(exported.filename.ends_with(".json"));

        let doc: SummaryDocument = serde_json::from_str(&exported.content).unwrap();
        assert_eq!(doc.refined_statement, vec!["Engagement fell.", "Inferred: timeframe."]);
        assert_eq!(doc.feedback.len(), 2);
        assert_eq!(doc.transcript.len(), 4);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("MD".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }
}
