//! # clarifier-runtime
//!
//! Model-backed half of Clarifier.
//!
//! `clarifier-core` owns the session and every rule that can be checked
//! without a language model. This crate adds the parts that cannot:
//! - Providers for the Anthropic and OpenAI chat APIs
//! - Generators for issues, questions, refined statements, critiques and titles
//! - The second screening stage (a model classifier) with a verdict cache
//! - The [`ClarificationController`] that ties them to a [`Session`]
//!
//! Every model call goes through one [`GenerationClient`], which applies the
//! circuit breaker, token budget, per-task timeout and retry policy.
//!
//! ## Example
//!
//! ```rust,ignore
//! use clarifier_core::{ExportFormat, Session};
//! use clarifier_runtime::{ClarificationController, ProviderRegistry, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("clarifier.yaml")?;
//! let controller = ClarificationController::from_config(config, &ProviderRegistry::with_defaults())?;
//!
//! let mut session = Session::new();
//! controller.start(&mut session, "Students are not engaged").await?;
//! controller.toggle_issue(&mut session, &session.candidate_issues()[0].clone())?;
//! controller.confirm_issues(&mut session)?;
//!
//! let question = controller.request_question(&mut session).await?;
//! controller.answer(&mut session, "Attendance has dropped 15% this term").await?;
//! controller.end(&mut session, "").await?;
//!
//! let document = controller.export(&session, ExportFormat::Markdown)?;
//! ```
//!
//! [`Session`]: clarifier_core::Session

pub mod cache;
pub mod config;
pub mod controller;
pub mod generators;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod screener;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::VerdictCache;
pub use config::{
    validate_config_schema, AccessConfig, BudgetConfig, ConfigError, PerTaskTimeouts,
    ProviderConfig, RetryPolicy, RuntimeConfig, ScreenerConfig, TimeoutConfig,
};
pub use controller::{
    ClarificationController, ClarificationControllerBuilder, ClarifyError, ErrorKind, InputField,
};
pub use generators::{GenerationClient, GenerationError, GenerationTask};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, CredentialSource,
    LlmProvider, ProviderError, ProviderFactory, ProviderRegistry, TokenUsage,
};
pub use resilience::{BudgetTracker, CircuitBreaker, CircuitBreakerConfig, CircuitState, LlmUsage};
pub use screener::ThreatScreener;
