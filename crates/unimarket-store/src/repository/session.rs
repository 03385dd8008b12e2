//! In-memory implementation of [`SessionRepository`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use unimarket_core::error::MarketResult;
use unimarket_core::models::session::{CreateSession, Session};
use unimarket_core::repository::SessionRepository;
use uuid::Uuid;

use crate::error::StoreError;

/// In-memory implementation of the Session repository, keyed by token
/// hash.
#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn remove_where(&self, pred: impl Fn(&Session) -> bool) -> u64 {
        let mut removed = 0;
        self.sessions.retain(|_, s| {
            let stale = pred(s);
            if stale {
                removed += 1;
            }
            !stale
        });
        removed
    }
}

impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, input: CreateSession) -> MarketResult<Session> {
        match self.sessions.entry(input.token_hash.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                entity: "session".into(),
                key: input.token_hash,
            }
            .into()),
            Entry::Vacant(slot) => {
                let session = Session {
                    token_hash: input.token_hash,
                    user_id: input.user_id,
                    created_at: input.created_at,
                    last_refreshed_at: input.created_at,
                };
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> MarketResult<Session> {
        self.sessions
            .get(token_hash)
            .map(|s| s.clone())
            .ok_or_else(|| {
                StoreError::NotFound {
                    entity: "session".into(),
                    id: token_hash.to_string(),
                }
                .into()
            })
    }

    async fn touch(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
        idle_cutoff: DateTime<Utc>,
    ) -> MarketResult<bool> {
        // Decided under the entry lock so a concurrent purge or refresh
        // cannot interleave.
        match self.sessions.entry(token_hash.to_string()) {
            Entry::Occupied(slot) if slot.get().last_refreshed_at < idle_cutoff => {
                slot.remove();
                Ok(false)
            }
            Entry::Occupied(mut slot) => {
                slot.get_mut().last_refreshed_at = at;
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn delete(&self, token_hash: &str) -> MarketResult<()> {
        self.sessions.remove(token_hash);
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> MarketResult<u64> {
        Ok(self.remove_where(|s| s.user_id == user_id))
    }

    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> MarketResult<u64> {
        Ok(self.remove_where(|s| s.last_refreshed_at < cutoff))
    }
}
