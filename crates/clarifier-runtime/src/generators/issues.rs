//! Candidate issue listing.

use std::sync::Arc;

use clarifier_core::parse_numbered_list;

use super::{GenerationClient, GenerationError, GenerationTask};
use crate::prompts;

/// Lists potential issues behind a problem statement.
#[derive(Debug, Clone)]
pub struct IssueGenerator {
    client: Arc<GenerationClient>,
}

impl IssueGenerator {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    /// Ask for issues and keep every numbered line of the reply.
    ///
    /// The prompt asks for at least twelve; fewer are accepted. A reply with
    /// no numbered line at all is malformed.
    pub async fn generate(&self, statement: &str) -> Result<Vec<String>, GenerationError> {
        let task = GenerationTask::Issues;
        let reply = self
            .client
            .generate(task, prompts::issues_prompt(statement))
            .await?;

        let issues = parse_numbered_list(&reply);
        if issues.is_empty() {
            return Err(GenerationError::Malformed {
                task,
                reason: "no numbered items in reply".to_string(),
            });
        }

        tracing::debug!(count = issues.len(), "Parsed candidate issues");
        Ok(issues)
    }
}
