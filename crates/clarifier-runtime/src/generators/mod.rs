//! Model-backed generators.
//!
//! Each generator is a thin, stateless wrapper that builds a prompt, sends
//! it through the shared [`GenerationClient`] and post-processes the reply.
//! None of them touch the session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::providers::ProviderError;

mod client;
mod issues;
mod question;
mod statement;
mod wording;

pub use client::GenerationClient;
pub use issues::IssueGenerator;
pub use question::QuestionGenerator;
pub use statement::{StatementCritic, StatementRefiner};
pub use wording::{clean_title, IssueRephraser, TitleGenerator};

/// The kinds of model call the runtime makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationTask {
    Issues,
    Question,
    Refine,
    Critique,
    Title,
    Rephrase,
    Classify,
}

impl GenerationTask {
    pub const ALL: [GenerationTask; 7] = [
        GenerationTask::Issues,
        GenerationTask::Question,
        GenerationTask::Refine,
        GenerationTask::Critique,
        GenerationTask::Title,
        GenerationTask::Rephrase,
        GenerationTask::Classify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationTask::Issues => "issues",
            GenerationTask::Question => "question",
            GenerationTask::Refine => "refine",
            GenerationTask::Critique => "critique",
            GenerationTask::Title => "title",
            GenerationTask::Rephrase => "rephrase",
            GenerationTask::Classify => "classify",
        }
    }
}

impl fmt::Display for GenerationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generation call that produced nothing usable.
///
/// Always recoverable: the caller may repeat the same operation.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("{task} call failed: {source}")]
    Provider {
        task: GenerationTask,
        #[source]
        source: ProviderError,
    },

    #[error("{task} call timed out after {after:?}")]
    Timeout { task: GenerationTask, after: Duration },

    #[error("{task} call returned empty output")]
    EmptyOutput { task: GenerationTask },

    #[error("{task} call returned malformed output: {reason}")]
    Malformed { task: GenerationTask, reason: String },

    #[error("{task} circuit open, try again later")]
    CircuitOpen { task: GenerationTask },

    #[error("token budget exceeded before {task} call")]
    BudgetExceeded { task: GenerationTask },
}

impl GenerationError {
    pub fn task(&self) -> GenerationTask {
        match self {
            GenerationError::Provider { task, .. }
            | GenerationError::Timeout { task, .. }
            | GenerationError::EmptyOutput { task }
            | GenerationError::Malformed { task, .. }
            | GenerationError::CircuitOpen { task }
            | GenerationError::BudgetExceeded { task } => *task,
        }
    }
}
