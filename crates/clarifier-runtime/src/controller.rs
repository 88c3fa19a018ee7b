//! Clarification controller.
//!
//! The controller drives a caller-owned [`Session`] through its phases. Every
//! operation follows the same order:
//! 1. Phase and input guards (no model call on a request that cannot succeed)
//! 2. Screening of user text
//! 3. Model calls
//! 4. One session transition
//!
//! A failure in steps 1-3 returns before the session is touched, so a failed
//! operation can simply be repeated.

use std::sync::Arc;
use thiserror::Error;

use clarifier_core::{
    export_session, ExportError, ExportFormat, ExportedDocument, Outcome, Phase, Session,
    TransitionError, Verdict,
};

use crate::cache::VerdictCache;
use crate::config::RuntimeConfig;
use crate::generators::{
    GenerationClient, GenerationError, IssueGenerator, IssueRephraser, QuestionGenerator,
    StatementCritic, StatementRefiner, TitleGenerator,
};
use crate::providers::{CompletionConfig, LlmProvider, ProviderError, ProviderRegistry};
use crate::resilience::{BudgetTracker, CircuitBreaker, LlmUsage};
use crate::screener::ThreatScreener;

/// Which piece of user text the screener rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputField {
    Statement,
    Issue,
    Answer,
}

impl std::fmt::Display for InputField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InputField::Statement => "problem statement",
            InputField::Issue => "issue",
            InputField::Answer => "answer",
        };
        f.write_str(name)
    }
}

/// Coarse error category, for callers that only need to pick a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputRejected,
    GenerationFailure,
    InvariantViolation,
}

/// Errors from controller operations.
#[derive(Error, Debug)]
pub enum ClarifyError {
    #[error("The {field} was rejected: {reason}")]
    InputRejected { field: InputField, reason: String },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Invariant(#[from] TransitionError),
}

impl ClarifyError {
    /// Whether the session is still usable after this error.
    ///
    /// Always true: no failed operation mutates the session.
    pub fn is_recoverable(&self) -> bool {
        true
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClarifyError::InputRejected { .. } => ErrorKind::InputRejected,
            ClarifyError::Generation(_) => ErrorKind::GenerationFailure,
            ClarifyError::Invariant(_) => ErrorKind::InvariantViolation,
        }
    }
}

/// Drives sessions through the clarification dialogue.
///
/// One controller may serve many sessions. It shares a generation client,
/// and with it the circuit breaker, token budget and verdict cache, across
/// all of them.
#[derive(Debug)]
pub struct ClarificationController {
    client: Arc<GenerationClient>,
    screener: ThreatScreener,
    issues: IssueGenerator,
    questions: QuestionGenerator,
    refiner: StatementRefiner,
    critic: StatementCritic,
    titles: TitleGenerator,
    rephraser: IssueRephraser,
}

impl ClarificationController {
    /// Build a controller around a ready generation client.
    pub fn new(client: Arc<GenerationClient>, cache: VerdictCache) -> Self {
        Self {
            screener: ThreatScreener::with_cache(client.clone(), cache),
            issues: IssueGenerator::new(client.clone()),
            questions: QuestionGenerator::new(client.clone()),
            refiner: StatementRefiner::new(client.clone()),
            critic: StatementCritic::new(client.clone()),
            titles: TitleGenerator::new(client.clone()),
            rephraser: IssueRephraser::new(client.clone()),
            client,
        }
    }

    pub fn builder() -> ClarificationControllerBuilder {
        ClarificationControllerBuilder::default()
    }

    /// Create the configured provider through `registry` and build on it.
    ///
    /// Without an explicit model the provider type's default model is used.
    pub fn from_config(
        config: RuntimeConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, ProviderError> {
        let kind = config.provider.kind.clone();
        let factory_config = config.provider.factory_config();

        registry.validate(&kind, &factory_config)?;
        let provider = registry.create(&kind, &factory_config)?;

        let mut builder = Self::builder().provider(provider);
        if config.provider.model.is_none() {
            if let Some(model) = registry.default_model(&kind) {
                builder = builder.model(model);
            }
        }

        builder.config(config).build()
    }

    pub fn screener(&self) -> &ThreatScreener {
        &self.screener
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Token usage across every session served so far.
    pub fn usage(&self) -> LlmUsage {
        self.client.usage()
    }

    // ---------------------------------------------------------------------
    // NOT_STARTED
    // ---------------------------------------------------------------------

    /// Screen the statement, generate candidate issues, and open issue
    /// selection.
    ///
    /// A rejected statement leaves the session in NOT_STARTED with nothing
    /// stored.
    pub async fn start(&self, session: &mut Session, statement: &str) -> Result<(), ClarifyError> {
        session.require_phase("start", Phase::NotStarted)?;

        let statement = statement.trim();
        if statement.is_empty() {
            return Err(TransitionError::BlankInput("statement").into());
        }

        self.require_safe(session, InputField::Statement, statement).await?;

        let issues = self.issues.generate(statement).await?;
        let count = issues.len();
        session.begin(statement, issues)?;

        tracing::info!(
            session = %session.id(),
            phase = ?session.phase(),
            issues = count,
            "Session started"
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // ISSUE_SELECTION
    // ---------------------------------------------------------------------

    /// Screen and rephrase a user-supplied issue, then add and select it.
    ///
    /// Returns the stored wording.
    pub async fn add_manual_issue(
        &self,
        session: &mut Session,
        issue: &str,
    ) -> Result<String, ClarifyError> {
        session.require_phase("add_manual_issue", Phase::IssueSelection)?;

        let issue = issue.trim();
        if issue.is_empty() {
            return Err(TransitionError::BlankInput("issue").into());
        }

        self.require_safe(session, InputField::Issue, issue).await?;

        let rephrased = self.rephraser.rephrase(issue).await?;
        let added = session.add_manual_issue(rephrased.clone())?;

        tracing::info!(
            session = %session.id(),
            added,
            selected = session.selected_issues().len(),
            "Manual issue added"
        );
        Ok(rephrased)
    }

    pub fn toggle_issue(&self, session: &mut Session, issue: &str) -> Result<bool, ClarifyError> {
        let selected = session.toggle_issue(issue)?;
        tracing::debug!(
            session = %session.id(),
            selected = session.selected_issues().len(),
            "Issue selection toggled"
        );
        Ok(selected)
    }

    pub fn set_issue_selected(
        &self,
        session: &mut Session,
        issue: &str,
        selected: bool,
    ) -> Result<(), ClarifyError> {
        session.set_issue_selected(issue, selected)?;
        Ok(())
    }

    /// Freeze the selection and move to the dialogue.
    pub fn confirm_issues(&self, session: &mut Session) -> Result<(), ClarifyError> {
        session.confirm_issues()?;
        tracing::info!(
            session = %session.id(),
            phase = ?session.phase(),
            selected = session.selected_issues().len(),
            "Issues confirmed"
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // CLARIFYING
    // ---------------------------------------------------------------------

    /// Steer later questions toward one selected issue, or back to all.
    pub fn focus(&self, session: &mut Session, issue: Option<&str>) -> Result<(), ClarifyError> {
        session.set_focus(issue)?;
        tracing::debug!(session = %session.id(), focused = issue.is_some(), "Focus changed");
        Ok(())
    }

    /// The question the user should answer next.
    ///
    /// When a question is already pending it is returned as-is and no model
    /// call is made.
    pub async fn request_question(&self, session: &mut Session) -> Result<String, ClarifyError> {
        session.require_phase("request_question", Phase::Clarifying)?;

        if let Some(pending) = session.pending_question() {
            return Ok(pending.to_string());
        }

        let question = self.questions.next_question(session).await?;
        session.set_pending_question(question.clone())?;

        tracing::info!(
            session = %session.id(),
            round = session.rounds() + 1,
            chars = question.len(),
            "Question asked"
        );
        Ok(question)
    }

    /// Answer the pending question. A blank answer skips it.
    pub async fn answer(&self, session: &mut Session, response: &str) -> Result<(), ClarifyError> {
        session.require_phase("answer", Phase::Clarifying)?;
        if session.pending_question().is_none() {
            return Err(TransitionError::NoPendingQuestion.into());
        }

        self.require_safe(session, InputField::Answer, response).await?;
        session.answer(response)?;

        tracing::info!(
            session = %session.id(),
            rounds = session.rounds(),
            skipped = response.trim().is_empty(),
            "Question answered"
        );
        Ok(())
    }

    /// Replace an earlier answer. `index` is a transcript position.
    pub async fn edit_response(
        &self,
        session: &mut Session,
        index: usize,
        response: &str,
    ) -> Result<(), ClarifyError> {
        session.check_editable(index)?;

        self.require_safe(session, InputField::Answer, response).await?;
        session.edit_response(index, response)?;

        tracing::debug!(session = %session.id(), index, chars = response.len(), "Response edited");
        Ok(())
    }

    /// Close the dialogue and derive the outcome.
    ///
    /// `response` answers the pending question, if there is one. The
    /// refined statement is produced first; the critique and the title are
    /// then requested together. The session only changes once all three
    /// calls have succeeded.
    pub async fn end(&self, session: &mut Session, response: &str) -> Result<(), ClarifyError> {
        let transcript = session.transcript_for_end(response)?;

        if session.pending_question().is_some() {
            self.require_safe(session, InputField::Answer, response).await?;
        }

        let original = session.initial_statement().unwrap_or_default();
        let refined = self.refiner.refine(original, &transcript).await?;

        let (feedback, title) = futures::try_join!(
            self.critic.critique(&refined),
            self.titles.title(&refined),
        )?;

        session.end(
            response,
            Outcome {
                title,
                refined_statement: refined,
                feedback,
            },
        )?;

        tracing::info!(
            session = %session.id(),
            phase = ?session.phase(),
            turns = session.transcript().len(),
            "Session ended"
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Any phase
    // ---------------------------------------------------------------------

    /// Discard the session and start over.
    pub fn restart(&self, session: &mut Session) {
        let previous = session.id();
        session.restart();
        tracing::info!(previous = %previous, session = %session.id(), "Session restarted");
    }

    /// Render the summary document of an ended session.
    pub fn export(
        &self,
        session: &Session,
        format: ExportFormat,
    ) -> Result<ExportedDocument, ExportError> {
        let document = export_session(session, format)?;
        tracing::info!(
            session = %session.id(),
            format = format.extension(),
            bytes = document.content.len(),
            "Session exported"
        );
        Ok(document)
    }

    async fn require_safe(
        &self,
        session: &Session,
        field: InputField,
        text: &str,
    ) -> Result<(), ClarifyError> {
        match self.screener.screen(text).await {
            Verdict::Safe => Ok(()),
            Verdict::Suspect { reason } => {
                tracing::warn!(
                    session = %session.id(),
                    field = %field,
                    chars = text.len(),
                    "Input rejected"
                );
                Err(ClarifyError::InputRejected { field, reason })
            }
        }
    }
}

/// Builder for [`ClarificationController`].
#[derive(Default)]
pub struct ClarificationControllerBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    config: RuntimeConfig,
    model: Option<String>,
}

impl ClarificationControllerBuilder {
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Model used when the configuration names none.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn build(self) -> Result<ClarificationController, ProviderError> {
        let provider = self
            .provider
            .ok_or_else(|| ProviderError::NotConfigured("no provider set".to_string()))?;
        let config = self.config;

        let model = config
            .provider
            .model
            .clone()
            .or(self.model)
            .unwrap_or_else(|| CompletionConfig::default().model);

        let completion = CompletionConfig {
            model,
            max_tokens: config.provider.max_tokens,
            temperature: config.provider.temperature,
            timeout: config.timeouts.default,
            prompt_caching: config.provider.prompt_caching,
        };

        let client = GenerationClient::new(provider, completion)
            .with_timeouts(config.timeouts.clone())
            .with_retry(config.retry.clone())
            .with_circuit_breaker(Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())))
            .with_budget(Arc::new(BudgetTracker::new(config.budget.max_tokens)));

        let cache = VerdictCache::new(config.screener.cache_capacity, config.screener.cache_ttl);

        tracing::debug!(
            provider = client.provider_name(),
            model = client.model(),
            "Clarification controller ready"
        );

        Ok(ClarificationController::new(Arc::new(client), cache))
    }
}
