//! # clarifier-core
//!
//! Deterministic core of the Clarifier problem-statement dialogue.
//!
//! This crate holds everything that does not need a language model:
//! - The [`Session`] value and its state-machine transitions
//! - Rule-based screening of free text (the first screener stage)
//! - Parsing of numbered issue lists
//! - Rendering of the final summary document
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **No LLM calls**: Model-backed work lives in `clarifier-runtime`
//! 3. **All-or-nothing transitions**: A rejected transition never mutates the session
//!
//! ## Example
//!
//! ```rust
//! use clarifier_core::{parse_numbered_list, Phase, Session};
//!
//! let issues = parse_numbered_list("1. Low funding\n2. Staff turnover");
//! let mut session = Session::new();
//! session.begin("Students are not engaged", issues).unwrap();
//! session.toggle_issue("Low funding").unwrap();
//! session.confirm_issues().unwrap();
//! assert_eq!(session.phase(), Phase::Clarifying);
//! ```

pub mod export;
pub mod issues;
pub mod screening;
pub mod session;
pub mod types;

// Re-export main types at crate root
pub use export::{
    export_filename, export_session, split_paragraphs, ExportError, ExportFormat,
    ExportedDocument, SummaryDocument,
};
pub use issues::parse_numbered_list;
pub use screening::{RuleCategory, RuleHit};
pub use session::{Session, TransitionError};
pub use types::{normalize_response, Outcome, Phase, Speaker, Turn, Verdict, SKIPPED_RESPONSE};

/// Render a transcript as `AI: ...` / `Human: ...` lines.
pub fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(Turn::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
