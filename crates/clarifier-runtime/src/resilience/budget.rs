//! Token budget and usage accounting for generation calls.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::generators::GenerationTask;
use crate::providers::TokenUsage;

/// A token allowance shared by every call.
///
/// `used` counts recorded usage plus the estimates of calls still in flight.
pub struct TokenBudget {
    pub max_tokens: u64,
    used: AtomicU64,
}

impl TokenBudget {
    pub fn new(max_tokens: u64) -> Self {
        Self {
            max_tokens,
            used: AtomicU64::new(0),
        }
    }

    pub fn can_afford(&self, tokens: u64) -> bool {
        self.remaining() >= tokens
    }

    pub fn record(&self, tokens: u64) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    /// Claim `tokens` if they fit. Check and claim are one atomic step, so
    /// concurrent callers cannot both take the last of the budget.
    pub fn try_reserve(&self, tokens: u64) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(tokens).filter(|next| *next <= self.max_tokens)
            })
            .is_ok()
    }

    /// Return tokens claimed by [`try_reserve`](Self::try_reserve).
    pub fn release(&self, tokens: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                Some(used.saturating_sub(tokens))
            });
    }

    pub fn remaining(&self) -> u64 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
    }
}

/// Accumulated usage for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub llm_calls: u32,
    /// Estimated cost in USD
    pub estimated_cost: f64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total());
        self.llm_calls += 1;
        self.cache_read_tokens += u64::from(usage.cache_read_tokens);
        self.cache_creation_tokens += u64::from(usage.cache_creation_tokens);
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    /// Fold another model's usage into this one.
    pub fn merge(&mut self, other: &LlmUsage) {
        self.total_tokens += other.total_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.llm_calls += other.llm_calls;
        self.estimated_cost += other.estimated_cost;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
    }

    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens: input, output, cache write, cache read
        let (input_rate, output_rate, cache_write_rate, cache_read_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6, 0.0, 0.075),
            m if m.contains("gpt-4o") => (2.5, 10.0, 0.0, 1.25),
            m if m.contains("gpt-3.5") => (0.5, 1.5, 0.0, 0.0),
            m if m.contains("haiku") => (1.0, 5.0, 1.25, 0.1),
            m if m.contains("opus") => (5.0, 25.0, 6.25, 0.5),
            _ => (3.0, 15.0, 3.75, 0.3),
        };

        let per_million = |tokens: u32, rate: f64| (tokens as f64 / 1_000_000.0) * rate;

        per_million(usage.prompt_tokens, input_rate)
            + per_million(usage.completion_tokens, output_rate)
            + per_million(usage.cache_creation_tokens, cache_write_rate)
            + per_million(usage.cache_read_tokens, cache_read_rate)
    }
}

/// Global budget plus per-model and per-task usage.
pub struct BudgetTracker {
    global_budget: Option<TokenBudget>,
    by_model: RwLock<BTreeMap<String, LlmUsage>>,
    by_task: RwLock<BTreeMap<GenerationTask, u64>>,
}

impl BudgetTracker {
    /// `None` means no limit.
    pub fn new(global_max: Option<u64>) -> Self {
        Self {
            global_budget: global_max.map(TokenBudget::new),
            by_model: RwLock::new(BTreeMap::new()),
            by_task: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn can_afford(&self, estimated_tokens: u64) -> bool {
        self.global_budget
            .as_ref()
            .map_or(true, |b| b.can_afford(estimated_tokens))
    }

    /// Hold `estimated_tokens` of the global budget for one call.
    ///
    /// `None` when the estimate does not fit. The hold is released when the
    /// returned guard drops; actual usage is still booked with
    /// [`record_usage`](Self::record_usage).
    pub fn reserve(&self, estimated_tokens: u64) -> Option<BudgetReservation<'_>> {
        match &self.global_budget {
            Some(budget) if !budget.try_reserve(estimated_tokens) => None,
            budget => Some(BudgetReservation {
                budget: budget.as_ref(),
                tokens: estimated_tokens,
            }),
        }
    }

    pub fn record_usage(&self, task: GenerationTask, usage: &TokenUsage, model: &str) {
        let total = u64::from(usage.total());

        if let Some(budget) = &self.global_budget {
            budget.record(total);
        }

        self.by_model
            .write()
            .entry(model.to_string())
            .or_default()
            .add(usage, model);
        *self.by_task.write().entry(task).or_default() += total;
    }

    /// Usage summed over every model.
    pub fn total_usage(&self) -> LlmUsage {
        self.by_model
            .read()
            .values()
            .fold(LlmUsage::default(), |mut acc, usage| {
                acc.merge(usage);
                acc
            })
    }

    pub fn usage_by_model(&self) -> BTreeMap<String, LlmUsage> {
        self.by_model.read().clone()
    }

    pub fn tokens_for(&self, task: GenerationTask) -> u64 {
        self.by_task.read().get(&task).copied().unwrap_or(0)
    }

    /// Remaining global budget, `None` when unlimited.
    pub fn remaining(&self) -> Option<u64> {
        self.global_budget.as_ref().map(TokenBudget::remaining)
    }

    pub fn reset(&self) {
        if let Some(budget) = &self.global_budget {
            budget.reset();
        }
        self.by_model.write().clear();
        self.by_task.write().clear();
    }
}

/// Tokens held for a call in flight.
#[must_use]
pub struct BudgetReservation<'a> {
    budget: Option<&'a TokenBudget>,
    tokens: u64,
}

impl Drop for BudgetReservation<'_> {
    fn drop(&mut self) {
        if let Some(budget) = self.budget {
            budget.release(self.tokens);
        }
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u32, completion: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            ..TokenUsage::default()
        }
    }

    #[test]
    fn test_budget_enforcement() {
        let budget = TokenBudget::new(100);

        assert!(budget.can_afford(100));
        assert!(!budget.can_afford(101));

        budget.record(60);
        assert_eq!(budget.remaining(), 40);
        assert!(!budget.can_afford(50));
        assert!(budget.can_afford(40));
    }

    #[test]
    fn test_tracker_limits_and_accounts() {
        let tracker = BudgetTracker::new(Some(500));
        assert!(tracker.can_afford(500));

        tracker.record_usage(GenerationTask::Issues, &usage(300, 100), "gpt-4o-mini");
        tracker.record_usage(GenerationTask::Question, &usage(40, 10), "claude-sonnet-4-5");

        assert_eq!(tracker.remaining(), Some(50));
        assert!(!tracker.can_afford(51));
        assert_eq!(tracker.tokens_for(GenerationTask::Issues), 400);
        assert_eq!(tracker.tokens_for(GenerationTask::Refine), 0);

        let total = tracker.total_usage();
        assert_eq!(total.total_tokens, 450);
        assert_eq!(total.llm_calls, 2);
        assert_eq!(tracker.usage_by_model().len(), 2);
    }

    #[test]
    fn test_reservations_cannot_overlap() {
        let tracker = BudgetTracker::new(Some(1000));
        tracker.record_usage(GenerationTask::Refine, &usage(500, 100), "gpt-4o");

        // Two calls estimated at 300 each; only one fits in the 400 left
        let first = tracker.reserve(300);
        assert!(first.is_some());
        assert!(tracker.reserve(300).is_none());
        assert_eq!(tracker.remaining(), Some(100));

        tracker.record_usage(GenerationTask::Critique, &usage(150, 50), "gpt-4o");
        drop(first);
        assert_eq!(tracker.remaining(), Some(200));
        assert!(tracker.reserve(200).is_some());
    }

    #[test]
    fn test_unlimited_tracker_always_reserves() {
        let tracker = BudgetTracker::unlimited();
        assert!(tracker.reserve(u64::MAX).is_some());
        assert!(tracker.reserve(u64::MAX).is_some());
    }

    #[test]
    fn test_unlimited_tracker() {
        let tracker = BudgetTracker::unlimited();
        tracker.record_usage(GenerationTask::Refine, &usage(1_000_000, 0), "gpt-4o");
        assert!(tracker.can_afford(u64::MAX));
        assert_eq!(tracker.remaining(), None);

        tracker.reset();
        assert_eq!(tracker.total_usage(), LlmUsage::default());
    }

    #[test]
    fn test_cost_estimation() {
        let mut total = LlmUsage::default();
        total.add(&usage(1000, 500), "claude-sonnet-4-5");

        // 1000 * $3/MTok + 500 * $15/MTok = $0.0105
        assert!(total.estimated_cost > 0.01 && total.estimated_cost < 0.02);
    }
}
