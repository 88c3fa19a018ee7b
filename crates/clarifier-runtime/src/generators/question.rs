//! Next clarifying question.

use std::sync::Arc;

use clarifier_core::Session;

use super::{GenerationClient, GenerationError, GenerationTask};
use crate::prompts::{self, QuestionContext};

/// Produces one clarifying question from the session so far.
#[derive(Debug, Clone)]
pub struct QuestionGenerator {
    client: Arc<GenerationClient>,
}

impl QuestionGenerator {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    /// Ask the next question for a session in the dialogue phase.
    ///
    /// The focus issue, when set, is the current issue; otherwise the whole
    /// selection is.
    pub async fn next_question(&self, session: &Session) -> Result<String, GenerationError> {
        let selected = session.selected_issues();
        let current_issue = match session.focus() {
            Some(focus) => focus.to_string(),
            None => selected.join("; "),
        };
        let previous_questions = session.previous_questions();
        let previous_responses = session.previous_responses();

        let prompt = prompts::question_prompt(&QuestionContext {
            statement: session.initial_statement().unwrap_or_default(),
            selected_issues: selected,
            current_issue: &current_issue,
            previous_questions: &previous_questions,
            previous_responses: &previous_responses,
        });

        self.client.generate(GenerationTask::Question, prompt).await
    }
}
