//! In-memory implementation of [`SecurityEventRepository`].

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use unimarket_core::error::MarketResult;
use unimarket_core::models::security_event::{CreateSecurityEvent, SecurityEvent};
use unimarket_core::repository::{SecurityEventFilter, SecurityEventRepository};
use uuid::Uuid;

/// Append-only event log held in memory.
#[derive(Clone, Default)]
pub struct InMemorySecurityEventRepository {
    events: Arc<RwLock<Vec<SecurityEvent>>>,
}

impl InMemorySecurityEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl SecurityEventRepository for InMemorySecurityEventRepository {
    async fn append(&self, input: CreateSecurityEvent) -> MarketResult<SecurityEvent> {
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            kind: input.kind,
            context: input.context,
            timestamp: Utc::now(),
        };
        self.events.write().await.push(event.clone());
        Ok(event)
    }

    async fn list(&self, filter: SecurityEventFilter) -> MarketResult<Vec<SecurityEvent>> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|e| filter.matches(e)).cloned().collect())
    }
}
