//! Session domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-side session record.
///
/// Only the SHA-256 hash of the session id is kept; the raw id lives in
/// the caller's token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_refreshed_at: DateTime<Utc>,
}

impl Session {
    /// Sliding validity: live while the last refresh is within `ttl`.
    pub fn is_live_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_refreshed_at <= ttl
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}
