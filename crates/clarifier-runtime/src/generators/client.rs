//! The single path every model call takes.
//!
//! Order of checks per call: circuit breaker, token budget, then the
//! provider call under a timeout, retried with exponential backoff while
//! the error is transient.

use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Instant;

use super::{GenerationError, GenerationTask};
use crate::config::{RetryPolicy, TimeoutConfig};
use crate::prompts;
use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};
use crate::resilience::{BudgetTracker, CircuitBreaker, LlmUsage};

/// Shared, stateless-per-call generation client.
pub struct GenerationClient {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    timeouts: TimeoutConfig,
    retry: RetryPolicy,
    circuit_breaker: Arc<CircuitBreaker>,
    budget: Arc<BudgetTracker>,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn LlmProvider>, completion: CompletionConfig) -> Self {
        Self {
            provider,
            completion,
            timeouts: TimeoutConfig::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            budget: Arc::new(BudgetTracker::unlimited()),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_budget(mut self, budget: Arc<BudgetTracker>) -> Self {
        self.budget = budget;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.completion.model
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    /// Usage summed over every call made so far.
    pub fn usage(&self) -> LlmUsage {
        self.budget.total_usage()
    }

    /// Run one task and return the trimmed reply.
    ///
    /// An empty reply is an error; callers never see blank output.
    pub async fn generate(
        &self,
        task: GenerationTask,
        prompt: String,
    ) -> Result<String, GenerationError> {
        if self.circuit_breaker.is_open(task) {
            tracing::warn!(task = ?task, "Circuit open, rejecting generation call");
            return Err(GenerationError::CircuitOpen { task });
        }

        let system = prompts::system_prompt(task).trim();
        let estimated_tokens = u64::from(self.provider.estimate_tokens(system))
            + u64::from(self.provider.estimate_tokens(&prompt))
            + u64::from(self.completion.max_tokens);

        // Held until this call returns, so concurrent calls see each other's estimate
        let Some(_reservation) = self.budget.reserve(estimated_tokens) else {
            tracing::warn!(
                task = ?task,
                estimated_tokens,
                remaining = ?self.budget.remaining(),
                "Token budget exceeded"
            );
            return Err(GenerationError::BudgetExceeded { task });
        };

        let config = CompletionConfig {
            timeout: self.timeouts.for_task(task),
            ..self.completion.clone()
        };

        tracing::debug!(
            task = ?task,
            provider = self.provider.name(),
            model = %config.model,
            prompt_chars = prompt.len(),
            estimated_tokens,
            "Sending generation request"
        );

        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        let started = Instant::now();

        let result = (|| self.attempt(&messages, &config))
            .retry(self.backoff())
            .when(ProviderError::is_transient)
            .notify(|err: &ProviderError, delay| {
                tracing::warn!(task = ?task, error = %err, delay = ?delay, "Retrying generation call");
            })
            .await;

        match result {
            Ok(response) => {
                self.budget.record_usage(task, &response.usage, &response.model);

                tracing::debug!(
                    task = ?task,
                    elapsed = ?started.elapsed(),
                    prompt_tokens = response.usage.prompt_tokens,
                    completion_tokens = response.usage.completion_tokens,
                    stop_reason = ?response.stop_reason,
                    "Generation call completed"
                );

                let content = response.content.trim();
                if content.is_empty() {
                    self.circuit_breaker.record_failure(task);
                    tracing::warn!(task = ?task, "Generation call returned empty output");
                    return Err(GenerationError::EmptyOutput { task });
                }

                self.circuit_breaker.record_success(task);
                Ok(content.to_string())
            }
            Err(ProviderError::Timeout(after)) => {
                self.circuit_breaker.record_failure(task);
                tracing::warn!(task = ?task, timeout = ?after, "Generation call timed out");
                Err(GenerationError::Timeout { task, after })
            }
            Err(source) => {
                self.circuit_breaker.record_failure(task);
                tracing::warn!(task = ?task, error = %source, "Generation call failed");
                Err(GenerationError::Provider { task, source })
            }
        }
    }

    async fn attempt(
        &self,
        messages: &[ChatMessage],
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        match tokio::time::timeout(config.timeout, self.provider.complete(messages.to_vec(), config))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(config.timeout)),
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.retry.min_delay)
            .with_max_delay(self.retry.max_delay)
            .with_max_times(self.retry.max_retries)
            .with_jitter()
    }
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("provider", &self.provider.name())
            .field("model", &self.completion.model)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerConfig;
    use crate::testing::ScriptedProvider;
    use std::time::Duration;

    fn fast_retry(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn client(provider: Arc<ScriptedProvider>) -> GenerationClient {
        GenerationClient::new(provider, CompletionConfig::default()).with_retry(fast_retry(2))
    }

    #[tokio::test]
    async fn test_reply_is_trimmed_and_usage_recorded() {
        let provider = Arc::new(ScriptedProvider::new().reply("  What changed?  \n"));
        let client = client(provider.clone());

        let reply = client
            .generate(GenerationTask::Question, "prompt".to_string())
            .await
            .unwrap();

        assert_eq!(reply, "What changed?");
        assert_eq!(client.usage().llm_calls, 1);
        assert_eq!(client.budget().tokens_for(GenerationTask::Question), 15);

        let calls = provider.calls();
        assert_eq!(calls[0][0].role, "system");
        assert_eq!(calls[0][1].content, "prompt");
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail(ProviderError::RateLimited { retry_after: None })
                .fail(ProviderError::HttpError("connection reset".to_string()))
                .reply("ok"),
        );
        let client = client(provider.clone());

        let reply = client.generate(GenerationTask::Issues, "p".to_string()).await;
        assert_eq!(reply.unwrap(), "ok");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail(ProviderError::HttpError("down".to_string()))
                .fail(ProviderError::HttpError("down".to_string()))
                .fail(ProviderError::HttpError("down".to_string()))
                .reply("too late"),
        );
        let client = client(provider.clone());

        let err = client
            .generate(GenerationTask::Issues, "p".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Provider { task: GenerationTask::Issues, .. }));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::new().fail(ProviderError::AuthError).reply("ok"));
        let client = client(provider.clone());

        let err = client
            .generate(GenerationTask::Refine, "p".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Provider {
                source: ProviderError::AuthError,
                ..
            }
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let provider = Arc::new(
            ScriptedProvider::always("late").with_delay(Duration::from_millis(500)),
        );
        let mut timeouts = TimeoutConfig::default();
        timeouts.per_task.title = Some(Duration::from_millis(20));

        let client = client(provider)
            .with_timeouts(timeouts)
            .with_retry(fast_retry(0));

        let err = client
            .generate(GenerationTask::Title, "p".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Timeout {
                task: GenerationTask::Title,
                after
            } if after == Duration::from_millis(20)
        ));
    }

    #[tokio::test]
    async fn test_empty_reply_is_an_error() {
        let provider = Arc::new(ScriptedProvider::new().reply("   \n"));
        let client = client(provider);

        let err = client
            .generate(GenerationTask::Critique, "p".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyOutput { task: GenerationTask::Critique }));
    }

    #[tokio::test]
    async fn test_open_circuit_skips_provider() {
        let provider = Arc::new(ScriptedProvider::new().fail(ProviderError::AuthError));
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }));
        let client = client(provider.clone()).with_circuit_breaker(breaker);

        assert!(client.generate(GenerationTask::Question, "p".to_string()).await.is_err());
        let err = client
            .generate(GenerationTask::Question, "p".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::CircuitOpen { .. }));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let provider = Arc::new(ScriptedProvider::always("ok"));
        let client = client(provider.clone()).with_budget(Arc::new(BudgetTracker::new(Some(10))));

        let err = client
            .generate(GenerationTask::Rephrase, "p".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::BudgetExceeded { .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_the_last_of_the_budget() {
        let provider = Arc::new(ScriptedProvider::always("ok").with_delay(Duration::from_millis(20)));
        let completion = CompletionConfig::default();
        let system = prompts::system_prompt(GenerationTask::Critique).trim();
        let estimate = u64::from(provider.estimate_tokens(system))
            + u64::from(provider.estimate_tokens("p"))
            + u64::from(completion.max_tokens);

        // Room for one estimate, not two
        let budget = Arc::new(BudgetTracker::new(Some(estimate + estimate / 2)));
        let client = client(provider.clone()).with_budget(budget);

        let (first, second) = tokio::join!(
            client.generate(GenerationTask::Critique, "p".to_string()),
            client.generate(GenerationTask::Critique, "p".to_string()),
        );

        let exceeded = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Err(GenerationError::BudgetExceeded { .. })))
            .count();
        assert_eq!(exceeded, 1);
        assert!(first.is_ok() || second.is_ok());
        assert_eq!(provider.call_count(), 1);
    }
}
