//! In-memory implementation of [`RateLimitRepository`].
//!
//! One instance backs one keyspace; the per-IP and per-identity limits
//! each get their own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use unimarket_core::error::MarketResult;
use unimarket_core::models::rate_limit::{RateLimitDecision, RateLimitEntry, RateLimitPolicy};
use unimarket_core::repository::RateLimitRepository;

#[derive(Clone, Default)]
pub struct InMemoryRateLimitRepository {
    entries: Arc<DashMap<String, RateLimitEntry>>,
}

impl InMemoryRateLimitRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries that are neither locked nor inside an active window.
    pub fn purge_stale(&self, window: chrono::Duration, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, e| {
            let keep = e.is_locked_at(now) || now - e.window_started_at <= window;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

impl RateLimitRepository for InMemoryRateLimitRepository {
    async fn hit(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> MarketResult<RateLimitDecision> {
        // The entry guard holds the shard lock for the whole update.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::new(now));
        Ok(entry.register(policy, now))
    }

    async fn get(&self, key: &str) -> MarketResult<Option<RateLimitEntry>> {
        Ok(self.entries.get(key).map(|e| e.clone()))
    }

    async fn reset(&self, key: &str) -> MarketResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
