//! Rate-limit window and lockout model.
//!
//! The counting rules live on [`RateLimitEntry`] so every store applies
//! them identically; stores only guarantee the update is atomic per key.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Window, threshold and lockout for one keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
    pub lockout: Duration,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, max_requests: u32, lockout: Duration) -> Self {
        Self {
            window,
            max_requests,
            lockout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_started_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Outcome of registering one request against a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests counted in the current window (unchanged while locked).
    pub count: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl RateLimitEntry {
    /// An empty window starting at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_started_at: now,
            locked_until: None,
        }
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Count one request made at `now` and decide whether it may proceed.
    ///
    /// A key that is still locked is rejected without touching the
    /// counter, so probing never extends its own lockout.
    pub fn register(&mut self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> RateLimitDecision {
        if let Some(until) = self.locked_until {
            if now < until {
                return RateLimitDecision {
                    allowed: false,
                    count: self.count,
                    locked_until: Some(until),
                };
            }
            *self = Self::new(now);
        }

        if now - self.window_started_at > policy.window {
            self.count = 1;
            self.window_started_at = now;
        } else {
            self.count = self.count.saturating_add(1);
        }

        if self.count > policy.max_requests {
            let until = now + policy.lockout;
            self.locked_until = Some(until);
            return RateLimitDecision {
                allowed: false,
                count: self.count,
                locked_until: Some(until),
            };
        }

        RateLimitDecision {
            allowed: true,
            count: self.count,
            locked_until: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RateLimitPolicy {
        RateLimitPolicy::new(Duration::minutes(15), 5, Duration::minutes(30))
    }

    #[test]
    fn sixth_request_in_window_locks() {
        let now = Utc::now();
        let mut entry = RateLimitEntry::new(now);
        for i in 1..=5 {
            let d = entry.register(&policy(), now + Duration::seconds(i));
            assert!(d.allowed, "request {i} should pass");
            assert_eq!(d.count, i as u32);
        }

        let at = now + Duration::seconds(6);
        let d = entry.register(&policy(), at);
        assert!(!d.allowed);
        assert_eq!(d.locked_until, Some(at + Duration::minutes(30)));
    }

    #[test]
    fn probing_locked_key_keeps_expiry() {
        let now = Utc::now();
        let mut entry = RateLimitEntry::new(now);
        for _ in 0..6 {
            entry.register(&policy(), now);
        }
        let until = entry.locked_until.unwrap();
        let count = entry.count;

        let d = entry.register(&policy(), now + Duration::minutes(10));
        assert!(!d.allowed);
        assert_eq!(d.locked_until, Some(until));
        assert_eq!(entry.count, count);
    }

    #[test]
    fn lockout_expiry_starts_fresh_window() {
        let now = Utc::now();
        let mut entry = RateLimitEntry::new(now);
        for _ in 0..6 {
            entry.register(&policy(), now);
        }

        let later = now + Duration::minutes(31);
        let d = entry.register(&policy(), later);
        assert!(d.allowed);
        assert_eq!(d.count, 1);
        assert_eq!(entry.window_started_at, later);
        assert!(entry.locked_until.is_none());
    }

    #[test]
    fn window_elapses_without_lockout() {
        let now = Utc::now();
        let mut entry = RateLimitEntry::new(now);
        for _ in 0..5 {
            entry.register(&policy(), now);
        }

        let d = entry.register(&policy(), now + Duration::minutes(16));
        assert!(d.allowed);
        assert_eq!(d.count, 1);
    }

    #[test]
    fn zero_budget_locks_first_request() {
        let now = Utc::now();
        let strict = RateLimitPolicy::new(Duration::minutes(1), 0, Duration::minutes(5));
        let d = RateLimitEntry::new(now).register(&strict, now);
        assert!(!d.allowed);
        assert_eq!(d.locked_until, Some(now + Duration::minutes(5)));
    }
}
