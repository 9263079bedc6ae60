//! Auth audit events - immutable facts about auth-relevant actions,
//! retained for a bounded window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Provider;

/// Audit records expire this many days after creation.
pub const EVENT_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthAction {
    Login,
    Logout,
    Link,
    Unlink,
    FailedLogin,
    TokenRefresh,
}

impl AuthAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthAction::Login => "login",
            AuthAction::Logout => "logout",
            AuthAction::Link => "link",
            AuthAction::Unlink => "unlink",
            AuthAction::FailedLogin => "failed_login",
            AuthAction::TokenRefresh => "token_refresh",
        }
    }
}

/// Credential source recorded on an event. `Jwt` covers token refreshes
/// and logouts, where no external provider is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventProvider {
    Google,
    Facebook,
    Jwt,
}

impl From<Provider> for EventProvider {
    fn from(p: Provider) -> Self {
        match p {
            Provider::Google => EventProvider::Google,
            Provider::Facebook => EventProvider::Facebook,
        }
    }
}

/// Append-only audit record. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthEvent {
    #[serde(rename = "_id")]
    pub id: String,
    pub account_id: Option<String>,
    pub action: AuthAction,
    pub provider: Option<EventProvider>,
    pub success: bool,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub correlation_id: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl AuthEvent {
    pub fn success(
        action: AuthAction,
        account_id: impl Into<String>,
        provider: Option<EventProvider>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: Some(account_id.into()),
            action,
            provider,
            success: true,
            error_message: None,
            ip_address: None,
            user_agent: None,
            correlation_id: None,
            created_at: Utc::now(),
        }
    }

    /// Failure record; `account_id` is absent when no identity resolved.
    pub fn failure(
        action: AuthAction,
        account_id: Option<String>,
        provider: Option<EventProvider>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id,
            action,
            provider,
            success: false,
            error_message: Some(error_message.into()),
            ip_address: None,
            user_agent: None,
            correlation_id: None,
            created_at: Utc::now(),
        }
    }

    /// Attach request context for tracing.
    pub fn with_context(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
        correlation_id: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self.correlation_id = correlation_id;
        self
    }

    /// Whether the record has outlived its retention window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.created_at + Duration::days(EVENT_RETENTION_DAYS) < now
    }
}

/// Audit record shape for the user-facing listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthEventResponse {
    pub action: AuthAction,
    pub provider: Option<EventProvider>,
    pub success: bool,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuthEvent> for AuthEventResponse {
    fn from(e: AuthEvent) -> Self {
        Self {
            action: e.action,
            provider: e.provider,
            success: e.success,
            error_message: e.error_message,
            ip_address: e.ip_address,
            created_at: e.created_at,
        }
    }
}
