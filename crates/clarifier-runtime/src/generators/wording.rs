//! Short rewordings: document titles and manually added issues.

use std::sync::Arc;

use super::{GenerationClient, GenerationError, GenerationTask};
use crate::prompts;

const QUOTE_CHARS: &[char] = &['"', '\'', '*', '`', '“', '”'];

/// Produces a short title for the refined statement.
#[derive(Debug, Clone)]
pub struct TitleGenerator {
    client: Arc<GenerationClient>,
}

impl TitleGenerator {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    pub async fn title(&self, statement: &str) -> Result<String, GenerationError> {
        let task = GenerationTask::Title;
        let reply = self
            .client
            .generate(task, prompts::title_prompt(statement))
            .await?;

        let title = clean_title(&reply);
        if title.is_empty() {
            return Err(GenerationError::EmptyOutput { task });
        }
        Ok(title)
    }
}

/// Rewords a user-authored issue before it is stored.
#[derive(Debug, Clone)]
pub struct IssueRephraser {
    client: Arc<GenerationClient>,
}

impl IssueRephraser {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    pub async fn rephrase(&self, issue: &str) -> Result<String, GenerationError> {
        let task = GenerationTask::Rephrase;
        let reply = self
            .client
            .generate(task, prompts::rephrase_prompt(issue))
            .await?;

        let rephrased = strip_label(first_line(&reply), "rephrased issue:")
            .trim_matches(QUOTE_CHARS)
            .trim()
            .to_string();
        if rephrased.is_empty() {
            return Err(GenerationError::EmptyOutput { task });
        }
        Ok(rephrased)
    }
}

/// First non-empty line, a leading `Title:` label and wrapping quotes removed.
pub fn clean_title(reply: &str) -> String {
    let line = first_line(reply).trim_start_matches('#').trim();
    let line = line.trim_matches(QUOTE_CHARS).trim();
    strip_label(line, "title:")
        .trim_matches(QUOTE_CHARS)
        .trim()
        .to_string()
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

fn strip_label<'a>(line: &'a str, label: &str) -> &'a str {
    match line.get(..label.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(label) => line[label.len()..].trim(),
        _ => line,
    }
}
