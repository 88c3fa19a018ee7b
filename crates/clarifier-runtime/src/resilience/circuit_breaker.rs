//! Circuit breaker keyed by generation task.
//!
//! When one kind of call keeps failing, its circuit opens and further calls
//! of that kind fail fast until the recovery timeout passes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::generators::GenerationTask;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,

    /// Time before a trial call is allowed
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,

    /// Trial successes needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32 },
}

/// Per-task circuits behind one lock.
pub struct CircuitBreaker {
    states: RwLock<HashMap<GenerationTask, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// True if calls for `task` should be rejected right now.
    ///
    /// An open circuit whose recovery timeout has passed moves to half-open
    /// and lets the caller through.
    pub fn is_open(&self, task: GenerationTask) -> bool {
        let mut states = self.states.write();
        match states.get(&task) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    states.insert(task, CircuitState::HalfOpen { successes: 0 });
                    tracing::info!(task = ?task, "Circuit half-open, allowing trial call");
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, task: GenerationTask) {
        let mut states = self.states.write();
        match states.get(&task).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(task, CircuitState::Closed { failures: 0 });
                    tracing::info!(task = ?task, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        task,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(task, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, task: GenerationTask) {
        let mut states = self.states.write();
        let failures = match states.get(&task) {
            Some(CircuitState::Closed { failures }) => *failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    task,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(task = ?task, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                task,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(task = ?task, failures, "Circuit opened after repeated failures");
        } else {
            states.insert(task, CircuitState::Closed { failures });
        }
    }

    pub fn state(&self, task: GenerationTask) -> CircuitState {
        self.states
            .read()
            .get(&task)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
