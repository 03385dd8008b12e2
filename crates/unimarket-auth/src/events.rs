//! Security event recording.

use tracing::{info, warn};
use unimarket_core::error::MarketResult;
use unimarket_core::models::security_event::{
    CreateSecurityEvent, EventContext, SecurityEvent, SecurityEventKind,
};
use unimarket_core::repository::{SecurityEventFilter, SecurityEventRepository};

/// Append-only log of security events, mirrored to the `security`
/// tracing target.
///
/// Recording never fails the caller: a store error is logged and dropped.
pub struct SecurityEventLog<E: SecurityEventRepository> {
    store: E,
}

impl<E: SecurityEventRepository> SecurityEventLog<E> {
    pub fn new(store: E) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &E {
        &self.store
    }

    pub async fn record(&self, kind: SecurityEventKind, context: EventContext) {
        if kind.is_failure() {
            warn!(
                target: "security",
                event = kind.as_str(),
                email = context.email.as_deref(),
                ip = context.ip.as_deref(),
                user_id = ?context.user_id,
                reason = context.reason.as_deref(),
                "security event"
            );
        } else {
            info!(
                target: "security",
                event = kind.as_str(),
                email = context.email.as_deref(),
                ip = context.ip.as_deref(),
                user_id = ?context.user_id,
                "security event"
            );
        }

        if let Err(e) = self.store.append(CreateSecurityEvent { kind, context }).await {
            warn!(
                target: "security",
                event = kind.as_str(),
                error = %e,
                "failed to persist security event"
            );
        }
    }

    pub async fn list(&self, filter: SecurityEventFilter) -> MarketResult<Vec<SecurityEvent>> {
        self.store.list(filter).await
    }
}

#[cfg(test)]
mod tests {
    use unimarket_store::repository::InMemorySecurityEventRepository;

    use super::*;

    #[tokio::test]
    async fn records_are_appended_in_order() {
        let log = SecurityEventLog::new(InMemorySecurityEventRepository::new());
        log.record(
            SecurityEventKind::LoginAttemptInvalidPassword,
            EventContext::new().email("a@b.c").ip(Some("10.0.0.1")),
        )
        .await;
        log.record(
            SecurityEventKind::LoginSuccess,
            EventContext::new().email("a@b.c"),
        )
        .await;

        let all = log.list(SecurityEventFilter::default()).await.unwrap();
        let kinds: Vec<_> = all.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [
                SecurityEventKind::LoginAttemptInvalidPassword,
                SecurityEventKind::LoginSuccess
            ]
        );
        assert_eq!(all[0].context.ip.as_deref(), Some("10.0.0.1"));
    }
}
