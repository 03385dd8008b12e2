//! Windowed request counting with timed lockout.
//!
//! A [`RateLimiter`] pairs one keyspace (a repository) with one policy.
//! Login uses two of them, per client IP and per identity, combined in a
//! [`LoginGate`].

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use unimarket_core::error::MarketResult;
use unimarket_core::models::rate_limit::{RateLimitDecision, RateLimitPolicy};
use unimarket_core::repository::RateLimitRepository;

pub struct RateLimiter<L: RateLimitRepository> {
    store: L,
    policy: RateLimitPolicy,
}

impl<L: RateLimitRepository> RateLimiter<L> {
    pub fn new(store: L, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn store(&self) -> &L {
        &self.store
    }

    /// Register one request for `key` and decide whether it may proceed.
    pub async fn check(&self, key: &str) -> MarketResult<RateLimitDecision> {
        self.check_at(key, Utc::now()).await
    }

    pub async fn check_at(&self, key: &str, now: DateTime<Utc>) -> MarketResult<RateLimitDecision> {
        let decision = self.store.hit(key, &self.policy, now).await?;
        if !decision.allowed {
            warn!(
                key,
                count = decision.count,
                locked_until = ?decision.locked_until,
                "rate limit exceeded"
            );
        }
        Ok(decision)
    }

    /// Forget everything recorded for `key`.
    pub async fn reset(&self, key: &str) -> MarketResult<()> {
        debug!(key, "rate limit reset");
        self.store.reset(key).await
    }
}

/// Combined outcome of the IP and identity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    /// Latest lockout expiry across the blocking keyspaces.
    pub locked_until: Option<DateTime<Utc>>,
}

/// Per-IP and per-identity limiters evaluated as one AND gate.
///
/// Both keyspaces are always counted, so a blocked IP cannot be used to
/// probe an identity without that identity's counter advancing too.
pub struct LoginGate<L: RateLimitRepository> {
    ip: RateLimiter<L>,
    identity: RateLimiter<L>,
}

impl<L: RateLimitRepository> LoginGate<L> {
    pub fn new(ip: RateLimiter<L>, identity: RateLimiter<L>) -> Self {
        Self { ip, identity }
    }

    pub fn ip(&self) -> &RateLimiter<L> {
        &self.ip
    }

    pub fn identity(&self) -> &RateLimiter<L> {
        &self.identity
    }

    /// Requests without a known client address skip the IP keyspace.
    pub async fn check_at(
        &self,
        ip: Option<&str>,
        identity: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<GateDecision> {
        let by_ip = match ip {
            Some(addr) => Some(self.ip.check_at(addr, now).await?),
            None => None,
        };
        let by_identity = self.identity.check_at(identity, now).await?;

        let decisions = by_ip.iter().chain(std::iter::once(&by_identity));
        let allowed = decisions.clone().all(|d| d.allowed);
        let locked_until = decisions
            .filter(|d| !d.allowed)
            .filter_map(|d| d.locked_until)
            .max();

        Ok(GateDecision {
            allowed,
            locked_until,
        })
    }

    /// Forgive earlier failures on both keyspaces.
    pub async fn reset(&self, ip: Option<&str>, identity: &str) -> MarketResult<()> {
        if let Some(addr) = ip {
            self.ip.reset(addr).await?;
        }
        self.identity.reset(identity).await
    }
}
