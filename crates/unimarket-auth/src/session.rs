//! Server-side session records with sliding expiry.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use unimarket_core::error::MarketResult;
use unimarket_core::models::session::{CreateSession, Session};
use unimarket_core::repository::SessionRepository;
use uuid::Uuid;

use crate::error::AuthError;
use crate::token;

/// Issues, refreshes and revokes sessions.
///
/// Callers hold the raw session id; the store is keyed by its hash.
pub struct SessionManager<S: SessionRepository> {
    store: S,
    ttl: Duration,
}

impl<S: SessionRepository> SessionManager<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a session for `user_id` and return its raw id.
    pub async fn create_session(&self, user_id: Uuid) -> MarketResult<String> {
        self.create_session_at(user_id, Utc::now()).await
    }

    pub async fn create_session_at(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> MarketResult<String> {
        let raw = token::generate_opaque_token();
        self.store
            .create(CreateSession {
                token_hash: token::hash_session_id(&raw),
                user_id,
                created_at: now,
            })
            .await?;
        debug!(%user_id, "session created");
        Ok(raw)
    }

    /// Slide the session forward. Unknown ids are ignored, and a session
    /// already idle past the TTL is dropped rather than revived.
    pub async fn refresh_session(&self, session_id: &str) -> MarketResult<()> {
        self.refresh_session_at(session_id, Utc::now()).await
    }

    pub async fn refresh_session_at(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let touched = self
            .store
            .touch(&token::hash_session_id(session_id), now, now - self.ttl)
            .await?;
        if !touched {
            debug!("refresh of unknown or idle session ignored");
        }
        Ok(())
    }

    /// Remove the session; a missing session is not an error.
    pub async fn delete_session(&self, session_id: &str) -> MarketResult<()> {
        self.store
            .delete(&token::hash_session_id(session_id))
            .await
    }

    /// The session record if it exists and is still live at `now`.
    ///
    /// Missing and idle sessions are both `SessionNotFound`.
    pub async fn live_session_at(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        match self
            .store
            .get_by_token_hash(&token::hash_session_id(session_id))
            .await
        {
            Ok(session) if session.is_live_at(self.ttl, now) => Ok(session),
            Ok(_) => Err(AuthError::SessionNotFound),
            Err(e) if e.is_not_found() => Err(AuthError::SessionNotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn is_live(&self, session_id: &str) -> Result<bool, AuthError> {
        match self.live_session_at(session_id, Utc::now()).await {
            Ok(_) => Ok(true),
            Err(AuthError::SessionNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Revoke every session of a user. Returns how many were removed.
    pub async fn revoke_user_sessions(&self, user_id: Uuid) -> MarketResult<u64> {
        let removed = self.store.delete_user_sessions(user_id).await?;
        debug!(%user_id, removed, "user sessions revoked");
        Ok(removed)
    }

    /// Drop sessions idle for longer than the TTL.
    pub async fn purge_idle(&self) -> MarketResult<u64> {
        self.purge_idle_at(Utc::now()).await
    }

    pub async fn purge_idle_at(&self, now: DateTime<Utc>) -> MarketResult<u64> {
        self.store.delete_idle_since(now - self.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use unimarket_store::repository::InMemorySessionRepository;

    use super::*;

    fn manager() -> SessionManager<InMemorySessionRepository> {
        SessionManager::new(InMemorySessionRepository::new(), Duration::hours(1))
    }

    #[tokio::test]
    async fn created_session_is_live_and_stored_hashed() {
        let sessions = manager();
        let user_id = Uuid::new_v4();

        let id = sessions.create_session(user_id).await.unwrap();
        assert!(sessions.is_live(&id).await.unwrap());

        let stored = sessions
            .store()
            .get_by_token_hash(&token::hash_session_id(&id))
            .await
            .unwrap();
        assert_eq!(stored.user_id, user_id);
        assert!(sessions.store().get_by_token_hash(&id).await.is_err());
    }

    #[tokio::test]
    async fn refresh_slides_expiry() {
        let sessions = manager();
        let start = Utc::now();
        let id = sessions
            .create_session_at(Uuid::new_v4(), start)
            .await
            .unwrap();

        let later = start + Duration::minutes(50);
        sessions.refresh_session_at(&id, later).await.unwrap();

        let check = start + Duration::minutes(100);
        assert!(sessions.live_session_at(&id, check).await.is_ok());
        let too_late = later + Duration::minutes(61);
        assert!(matches!(
            sessions.live_session_at(&id, too_late).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn refresh_after_idle_expiry_does_not_revive() {
        let sessions = manager();
        let start = Utc::now();
        let id = sessions
            .create_session_at(Uuid::new_v4(), start)
            .await
            .unwrap();

        let late = start + Duration::hours(3);
        assert!(sessions.live_session_at(&id, late).await.is_err());

        sessions.refresh_session_at(&id, late).await.unwrap();
        assert!(sessions.live_session_at(&id, late).await.is_err());
        assert!(sessions.store().is_empty());
    }

    #[tokio::test]
    async fn refresh_unknown_session_is_a_silent_no_op() {
        let sessions = manager();
        sessions.refresh_session("nope").await.unwrap();
        assert!(sessions.store().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let sessions = manager();
        let id = sessions.create_session(Uuid::new_v4()).await.unwrap();

        sessions.delete_session(&id).await.unwrap();
        sessions.delete_session(&id).await.unwrap();
        assert!(!sessions.is_live(&id).await.unwrap());
    }

    #[tokio::test]
    async fn purge_idle_keeps_recent_sessions() {
        let sessions = manager();
        let now = Utc::now();
        let stale = sessions
            .create_session_at(Uuid::new_v4(), now - Duration::hours(2))
            .await
            .unwrap();
        let fresh = sessions.create_session_at(Uuid::new_v4(), now).await.unwrap();

        assert_eq!(sessions.purge_idle_at(now).await.unwrap(), 1);
        assert!(sessions.live_session_at(&fresh, now).await.is_ok());
        assert!(matches!(
            sessions.live_session_at(&stale, now).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn revoke_user_sessions_only_touches_that_user() {
        let sessions = manager();
        let alice = Uuid::new_v4();
        sessions.create_session(alice).await.unwrap();
        sessions.create_session(alice).await.unwrap();
        let bob_session = sessions.create_session(Uuid::new_v4()).await.unwrap();

        assert_eq!(sessions.revoke_user_sessions(alice).await.unwrap(), 2);
        assert!(sessions.is_live(&bob_session).await.unwrap());
    }
}
