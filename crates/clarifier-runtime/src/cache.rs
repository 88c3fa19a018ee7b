//! Cache of classifier verdicts.
//!
//! Only clean stage-2 verdicts are stored. Rule hits are cheap to recompute
//! and classifier failures must be retried, so neither is cached.

use moka::future::Cache;
use std::time::Duration;

use clarifier_core::Verdict;

/// Verdicts keyed by the exact screened text.
pub struct VerdictCache {
    cache: Cache<String, Verdict>,
}

impl VerdictCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, text: &str) -> Option<Verdict> {
        self.cache.get(text).await
    }

    pub async fn insert(&self, text: &str, verdict: Verdict) {
        self.cache.insert(text.to_string(), verdict).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for VerdictCache {
    fn default() -> Self {
        Self::new(1024, Duration::from_secs(3600))
    }
}

impl std::fmt::Debug for VerdictCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerdictCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
