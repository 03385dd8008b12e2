//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations must make every
//! keyed operation atomic with respect to other operations on the same
//! key; operations on different keys may proceed concurrently.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::MarketResult;
use crate::models::{
    rate_limit::{RateLimitDecision, RateLimitEntry, RateLimitPolicy},
    security_event::{CreateSecurityEvent, SecurityEvent, SecurityEventKind},
    session::{CreateSession, Session},
    user::{CreateUser, UpdateUser, User},
};

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the email is taken.
    fn create(&self, input: CreateUser) -> impl Future<Output = MarketResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = MarketResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = MarketResult<User>> + Send;
    fn get_by_verification_token(
        &self,
        token: &str,
    ) -> impl Future<Output = MarketResult<User>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = MarketResult<User>> + Send;
    /// Clear the pending email code only if it still equals `code`.
    ///
    /// Returns `true` when this call consumed the code. Concurrent
    /// submissions of the same code see exactly one `true`.
    fn take_email_code(
        &self,
        id: Uuid,
        code: &str,
    ) -> impl Future<Output = MarketResult<bool>> + Send;
}

// ---------------------------------------------------------------------------
// Sessions (keyed by token hash)
// ---------------------------------------------------------------------------

pub trait SessionRepository: Send + Sync {
    /// Fails with `AlreadyExists` on a token hash collision.
    fn create(&self, input: CreateSession) -> impl Future<Output = MarketResult<Session>> + Send;
    fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = MarketResult<Session>> + Send;
    /// Set `last_refreshed_at` to `at` if the session was refreshed at or
    /// after `idle_cutoff`. A session idle past the cutoff is removed
    /// instead. Returns `false` (and creates nothing) when no live session
    /// was refreshed.
    fn touch(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
        idle_cutoff: DateTime<Utc>,
    ) -> impl Future<Output = MarketResult<bool>> + Send;
    /// Idempotent removal.
    fn delete(&self, token_hash: &str) -> impl Future<Output = MarketResult<()>> + Send;
    /// Remove every session owned by a user. Returns the number removed.
    fn delete_user_sessions(&self, user_id: Uuid)
    -> impl Future<Output = MarketResult<u64>> + Send;
    /// Remove sessions last refreshed before `cutoff`.
    fn delete_idle_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = MarketResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Rate limiting (one repository per keyspace)
// ---------------------------------------------------------------------------

pub trait RateLimitRepository: Send + Sync {
    /// Atomically register one request for `key` via
    /// [`RateLimitEntry::register`], creating the entry when missing.
    fn hit(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MarketResult<RateLimitDecision>> + Send;
    fn get(&self, key: &str) -> impl Future<Output = MarketResult<Option<RateLimitEntry>>> + Send;
    /// Drop the entry entirely.
    fn reset(&self, key: &str) -> impl Future<Output = MarketResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Security events (append-only)
// ---------------------------------------------------------------------------

/// Query filters for security events.
#[derive(Debug, Clone, Default)]
pub struct SecurityEventFilter {
    pub kind: Option<SecurityEventKind>,
    pub email: Option<String>,
    pub user_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
}

impl SecurityEventFilter {
    pub fn matches(&self, event: &SecurityEvent) -> bool {
        self.kind.is_none_or(|k| k == event.kind)
            && self
                .email
                .as_deref()
                .is_none_or(|e| event.context.email.as_deref() == Some(e))
            && self.user_id.is_none_or(|u| event.context.user_id == Some(u))
            && self.from.is_none_or(|f| event.timestamp >= f)
    }
}

pub trait SecurityEventRepository: Send + Sync {
    /// Append a new event. No update or delete operations exist.
    fn append(
        &self,
        input: CreateSecurityEvent,
    ) -> impl Future<Output = MarketResult<SecurityEvent>> + Send;
    /// Matching events in append order.
    fn list(
        &self,
        filter: SecurityEventFilter,
    ) -> impl Future<Output = MarketResult<Vec<SecurityEvent>>> + Send;
}
