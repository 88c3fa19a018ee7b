//! Resilience around generation calls.
//!
//! - Circuit breaker per generation task
//! - Token budget and usage accounting
//!
//! Retry with backoff lives in [`GenerationClient`](crate::generators::GenerationClient).

mod budget;
mod circuit_breaker;

pub use budget::{BudgetReservation, BudgetTracker, LlmUsage, TokenBudget};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
