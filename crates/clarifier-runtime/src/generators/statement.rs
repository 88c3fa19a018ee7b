//! Refinement and critique of the problem statement.

use std::sync::Arc;

use clarifier_core::{render_transcript, Turn};

use super::{GenerationClient, GenerationError, GenerationTask};
use crate::prompts;

/// Rewrites the original statement using the dialogue.
#[derive(Debug, Clone)]
pub struct StatementRefiner {
    client: Arc<GenerationClient>,
}

impl StatementRefiner {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    pub async fn refine(&self, original: &str, transcript: &[Turn]) -> Result<String, GenerationError> {
        let prompt = prompts::refine_prompt(original, &render_transcript(transcript));
        self.client.generate(GenerationTask::Refine, prompt).await
    }
}

/// Evaluates a refined statement. Sees nothing but the statement.
#[derive(Debug, Clone)]
pub struct StatementCritic {
    client: Arc<GenerationClient>,
}

impl StatementCritic {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    pub async fn critique(&self, refined: &str) -> Result<String, GenerationError> {
        self.client
            .generate(GenerationTask::Critique, prompts::critique_prompt(refined))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CompletionConfig;
    use crate::testing::ScriptedProvider;

    fn client(provider: Arc<ScriptedProvider>) -> Arc<GenerationClient> {
        Arc::new(GenerationClient::new(provider, CompletionConfig::default()))
    }

    #[tokio::test]
    async fn test_refiner_renders_transcript() {
        let provider = Arc::new(ScriptedProvider::new().reply("Refined.\n\nInferred: none."));
        let refiner = StatementRefiner::new(client(provider.clone()));

        let refined = refiner
            .refine(
                "Students are not engaged",
                &[Turn::ai("What changed?"), Turn::human("")],
            )
            .await
            .unwrap();

        assert_eq!(refined, "Refined.\n\nInferred: none.");
        let prompt = &provider.user_prompts()[0];
        assert!(prompt.contains("<original_statement>\nStudents are not engaged\n"));
        assert!(prompt.contains("AI: What changed?\nHuman: Question skipped."));
    }

    #[tokio::test]
    async fn test_critic_sees_only_refined_statement() {
        let provider = Arc::new(ScriptedProvider::new().reply("Evaluation.\n\nFeedback."));
        let critic = StatementCritic::new(client(provider.clone()));

        critic.critique("Refined statement").await.unwrap();

        let prompt = &provider.user_prompts()[0];
        assert!(prompt.contains("<refined_problem_statement>\nRefined statement\n"));
        assert!(!prompt.contains("AI:"));
    }
}
