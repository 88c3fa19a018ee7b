//! The clarification session and its transition functions.
//!
//! A [`Session`] is a plain value owned by the caller. Every transition either
//! applies completely or returns a [`TransitionError`] and leaves the session
//! untouched. No transition talks to a model: the runtime generates text
//! first and hands the result in, so a failed generation never reaches here.
//!
//! ## Transitions
//!
//! | From | Operation | To |
//! |------|-----------|----|
//! | NOT_STARTED | `begin` | ISSUE_SELECTION |
//! | ISSUE_SELECTION | `add_manual_issue`, `toggle_issue`, `set_issue_selected` | ISSUE_SELECTION |
//! | ISSUE_SELECTION | `confirm_issues` (non-empty selection) | CLARIFYING |
//! | CLARIFYING | `set_pending_question`, `answer`, `edit_response`, `set_focus` | CLARIFYING |
//! | CLARIFYING | `end` | ENDED |
//! | any | `restart` | NOT_STARTED |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{Outcome, Phase, Speaker, Turn};

/// A transition that would break a session invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{operation} is not allowed in phase {actual} (requires {expected})")]
    WrongPhase {
        operation: &'static str,
        expected: Phase,
        actual: Phase,
    },

    #[error("{0} must not be blank")]
    BlankInput(&'static str),

    #[error("At least one issue must be selected")]
    NoIssuesSelected,

    #[error("Unknown issue: {0}")]
    UnknownIssue(String),

    #[error("Issue is not selected: {0}")]
    IssueNotSelected(String),

    #[error("A question is already pending")]
    QuestionPending,

    #[error("No question is pending")]
    NoPendingQuestion,

    #[error("Turn {index} does not exist (transcript has {len} turns)")]
    TurnOutOfRange { index: usize, len: usize },

    #[error("Turn {0} is not a human response")]
    NotHumanTurn(usize),

    #[error("Nothing to end: no question was asked")]
    NothingToEnd,
}

/// One user's clarification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    phase: Phase,
    initial_statement: Option<String>,
    started_at: Option<DateTime<Utc>>,
    candidate_issues: Vec<String>,
    manual_issues: Vec<String>,
    selected_issues: Vec<String>,
    focus: Option<String>,
    transcript: Vec<Turn>,
    pending_question: Option<String>,
    outcome: Option<Outcome>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh session in NOT_STARTED.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: Phase::NotStarted,
            initial_statement: None,
            started_at: None,
            candidate_issues: Vec::new(),
            manual_issues: Vec::new(),
            selected_issues: Vec::new(),
            focus: None,
            transcript: Vec::new(),
            pending_question: None,
            outcome: None,
        }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn initial_statement(&self) -> Option<&str> {
        self.initial_statement.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn candidate_issues(&self) -> &[String] {
        &self.candidate_issues
    }

    pub fn manual_issues(&self) -> &[String] {
        &self.manual_issues
    }

    /// Selected issues in the order they were selected.
    pub fn selected_issues(&self) -> &[String] {
        &self.selected_issues
    }

    pub fn focus(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn pending_question(&self) -> Option<&str> {
        self.pending_question.as_deref()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Candidate issues followed by manual issues, without repeats.
    ///
    /// This is the numbering shown to the user during issue selection.
    pub fn all_issues(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self.candidate_issues.iter().map(String::as_str).collect();
        for issue in &self.manual_issues {
            if !all.contains(&issue.as_str()) {
                all.push(issue);
            }
        }
        all
    }

    pub fn is_known_issue(&self, issue: &str) -> bool {
        self.candidate_issues.iter().any(|i| i == issue)
            || self.manual_issues.iter().any(|i| i == issue)
    }

    pub fn is_selected(&self, issue: &str) -> bool {
        self.selected_issues.iter().any(|i| i == issue)
    }

    /// Number of answered (or skipped) questions.
    pub fn rounds(&self) -> usize {
        self.transcript
            .iter()
            .filter(|turn| turn.speaker == Speaker::Human)
            .count()
    }

    /// Previous AI questions, oldest first.
    pub fn previous_questions(&self) -> Vec<&str> {
        self.turn_texts(Speaker::Ai)
    }

    /// Previous human responses, oldest first.
    pub fn previous_responses(&self) -> Vec<&str> {
        self.turn_texts(Speaker::Human)
    }

    fn turn_texts(&self, speaker: Speaker) -> Vec<&str> {
        self.transcript
            .iter()
            .filter(|turn| turn.speaker == speaker)
            .map(|turn| turn.text.as_str())
            .collect()
    }

    // ---------------------------------------------------------------------
    // NOT_STARTED
    // ---------------------------------------------------------------------

    /// Start the session with a screened statement and its generated issues.
    pub fn begin(
        &mut self,
        statement: impl Into<String>,
        candidate_issues: Vec<String>,
    ) -> Result<(), TransitionError> {
        self.require_phase("begin", Phase::NotStarted)?;

        let statement = statement.into();
        if statement.trim().is_empty() {
            return Err(TransitionError::BlankInput("statement"));
        }

        let mut candidates: Vec<String> = Vec::with_capacity(candidate_issues.len());
        for issue in candidate_issues {
            if !candidates.contains(&issue) {
                candidates.push(issue);
            }
        }

        self.initial_statement = Some(statement);
        self.candidate_issues = candidates;
        self.started_at = Some(Utc::now());
        self.phase = Phase::IssueSelection;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // ISSUE_SELECTION
    // ---------------------------------------------------------------------

    /// Add a screened, rephrased issue and select it.
    ///
    /// Returns `false` when the issue already existed; it is selected but not
    /// stored twice.
    pub fn add_manual_issue(&mut self, issue: impl Into<String>) -> Result<bool, TransitionError> {
        self.require_phase("add_manual_issue", Phase::IssueSelection)?;

        let issue = issue.into();
        if issue.trim().is_empty() {
            return Err(TransitionError::BlankInput("issue"));
        }

        let added = !self.is_known_issue(&issue);
        if added {
            self.manual_issues.push(issue.clone());
        }
        if !self.is_selected(&issue) {
            self.selected_issues.push(issue);
        }
        Ok(added)
    }

    /// Flip the selection of a known issue; returns the new selection state.
    pub fn toggle_issue(&mut self, issue: &str) -> Result<bool, TransitionError> {
        let selected = !self.is_selected(issue);
        self.set_issue_selected(issue, selected)?;
        Ok(selected)
    }

    /// Select or deselect a known issue.
    pub fn set_issue_selected(&mut self, issue: &str, selected: bool) -> Result<(), TransitionError> {
        self.require_phase("select_issue", Phase::IssueSelection)?;

        if !self.is_known_issue(issue) {
            return Err(TransitionError::UnknownIssue(issue.to_string()));
        }

        if selected {
            if !self.is_selected(issue) {
                self.selected_issues.push(issue.to_string());
            }
        } else {
            self.selected_issues.retain(|i| i != issue);
        }
        Ok(())
    }

    /// Freeze the selection and move to CLARIFYING.
    pub fn confirm_issues(&mut self) -> Result<(), TransitionError> {
        self.require_phase("confirm_issues", Phase::IssueSelection)?;

        if self.selected_issues.is_empty() {
            return Err(TransitionError::NoIssuesSelected);
        }

        self.phase = Phase::Clarifying;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // CLARIFYING
    // ---------------------------------------------------------------------

    /// Steer the next questions toward one selected issue, or all of them.
    pub fn set_focus(&mut self, issue: Option<&str>) -> Result<(), TransitionError> {
        self.require_phase("focus", Phase::Clarifying)?;

        match issue {
            Some(issue) if !self.is_selected(issue) => {
                Err(TransitionError::IssueNotSelected(issue.to_string()))
            }
            _ => {
                self.focus = issue.map(str::to_string);
                Ok(())
            }
        }
    }

    /// Record a freshly generated question as the outstanding one.
    pub fn set_pending_question(&mut self, question: impl Into<String>) -> Result<(), TransitionError> {
        self.require_phase("request_question", Phase::Clarifying)?;

        if self.pending_question.is_some() {
            return Err(TransitionError::QuestionPending);
        }

        let question = question.into();
        if question.trim().is_empty() {
            return Err(TransitionError::BlankInput("question"));
        }

        self.pending_question = Some(question);
        Ok(())
    }

    /// Answer the pending question and continue.
    ///
    /// A blank answer is recorded as a skipped question.
    pub fn answer(&mut self, response: impl Into<String>) -> Result<(), TransitionError> {
        self.require_phase("answer", Phase::Clarifying)?;

        let question = self
            .pending_question
            .take()
            .ok_or(TransitionError::NoPendingQuestion)?;

        self.transcript.push(Turn::ai(question));
        self.transcript.push(Turn::human(response));
        Ok(())
    }

    /// Replace the text of an earlier human response.
    pub fn edit_response(
        &mut self,
        index: usize,
        response: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.check_editable(index)?;
        self.transcript[index] = Turn::human(response);
        Ok(())
    }

    /// Fail unless `edit_response(index, ..)` would be accepted.
    pub fn check_editable(&self, index: usize) -> Result<(), TransitionError> {
        self.require_phase("edit_response", Phase::Clarifying)?;

        let len = self.transcript.len();
        let turn = self
            .transcript
            .get(index)
            .ok_or(TransitionError::TurnOutOfRange { index, len })?;

        if turn.speaker != Speaker::Human {
            return Err(TransitionError::NotHumanTurn(index));
        }
        Ok(())
    }

    /// The transcript `end` would produce for this final answer.
    ///
    /// The pending question, if any, is paired with the answer (blank
    /// answers become a skipped turn). The session is not modified.
    pub fn transcript_for_end(&self, final_response: &str) -> Result<Vec<Turn>, TransitionError> {
        self.require_phase("end", Phase::Clarifying)?;

        let mut transcript = self.transcript.clone();
        match &self.pending_question {
            Some(question) => {
                transcript.push(Turn::ai(question.clone()));
                transcript.push(Turn::human(final_response));
            }
            None if transcript.is_empty() => return Err(TransitionError::NothingToEnd),
            None => {}
        }
        Ok(transcript)
    }

    /// Close the dialogue with its final answer and derived outcome.
    pub fn end(&mut self, final_response: &str, outcome: Outcome) -> Result<(), TransitionError> {
        let transcript = self.transcript_for_end(final_response)?;

        self.transcript = transcript;
        self.pending_question = None;
        self.outcome = Some(outcome);
        self.phase = Phase::Ended;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Any phase
    // ---------------------------------------------------------------------

    /// Discard everything and return to NOT_STARTED under a new id.
    pub fn restart(&mut self) {
        *self = Self::new();
    }

    /// Fail with `WrongPhase` unless the session is in `expected`.
    pub fn require_phase(&self, operation: &'static str, expected: Phase) -> Result<(), TransitionError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(TransitionError::WrongPhase {
                operation,
                expected,
                actual: self.phase,
            })
        }
    }

    /// Describe every broken invariant. Empty means the session is consistent.
    pub fn invariant_violations(&self) -> Vec<&'static str> {
        let mut violations = Vec::new();

        if self
            .selected_issues
            .iter()
            .any(|issue| !self.is_known_issue(issue))
        {
            violations.push("selected issue outside candidate and manual issues");
        }

        if self
            .transcript
            .windows(2)
            .any(|pair| pair[0].speaker == pair[1].speaker)
        {
            violations.push("consecutive turns share a speaker");
        }

        if self.pending_question.is_some() {
            let last_is_human = self
                .transcript
                .last()
                .map_or(true, |turn| turn.speaker == Speaker::Human);
            if self.phase != Phase::Clarifying || !last_is_human {
                violations.push("pending question outside an open clarifying round");
            }
        }

        if self.transcript.iter().any(|turn| turn.text.is_empty()) {
            violations.push("empty transcript turn");
        }

        if self.outcome.is_some() != (self.phase == Phase::Ended) {
            violations.push("outcome present outside ENDED");
        }

        if self.phase != Phase::NotStarted && self.initial_statement.is_none() {
            violations.push("started session without a statement");
        }

        violations
    }
}
