//! Audit sink - append-only recording of auth events.
//!
//! `record` is fire-and-forget from the caller's perspective: a failed
//! write is logged and swallowed, never propagated, so auditing can never
//! be the reason an auth operation fails.

use std::sync::Arc;

use crate::error::AppError;
use crate::models::{AuthEvent, AuthEventResponse};
use crate::store::AuthStore;

/// Upper bound on the user-facing auth-log listing.
pub const AUTH_LOG_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn AuthStore>,
}

impl AuditSink {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Append an event. Errors are logged, never returned.
    pub async fn record(&self, event: AuthEvent) {
        if let Err(e) = self.store.append_event(&event).await {
            tracing::error!(
                error = %e,
                action = %event.action.as_str(),
                account_id = ?event.account_id,
                "Failed to write auth event"
            );
        }
    }

    /// Recent events for one account, most-recent-first, bounded.
    pub async fn recent_for_account(
        &self,
        account_id: &str,
    ) -> Result<Vec<AuthEventResponse>, AppError> {
        let events = self.store.recent_events(account_id, AUTH_LOG_LIMIT).await?;
        Ok(events.into_iter().map(AuthEventResponse::from).collect())
    }
}
