//! User-facing account handlers: profile, provider link/unlink, auth logs.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension, Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::{CorrelationId, CurrentAccount};
use crate::models::{AuthAction, AuthEvent, Provider};
use crate::utils::ValidatedJson;
use crate::AppState;

use super::client_meta;

/// GET /user/profile
pub async fn get_profile(CurrentAccount(account): CurrentAccount) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "user": account.sanitized() }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(url)]
    pub avatar_url: Option<String>,
}

/// Update display attributes.
///
/// PUT /user/profile
#[tracing::instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = state
        .store
        .update_profile(&account.id, req.name, req.avatar_url)
        .await?;

    tracing::info!(account_id = %updated.id, "Profile updated");
    Ok(Json(serde_json::json!({
        "user": updated.sanitized(),
        "message": "Profile updated successfully",
    })))
}

/// Begin a linking handshake for the authenticated account. The client
/// follows the returned URL, which re-enters the OAuth flow in linking
/// mode.
///
/// POST /user/link/:provider
#[tracing::instrument(skip_all)]
pub async fn link_provider(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(provider): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tag: Provider = provider.parse().map_err(AppError::Validation)?;
    state.providers.get(tag)?;

    if account.has_provider(tag) {
        return Err(AppError::DuplicateLink(tag));
    }

    Ok(Json(serde_json::json!({
        "redirect_url": format!("/auth/{}?link=true", tag),
    })))
}

/// Unlink a provider, guarded so the final identity can never be removed.
///
/// DELETE /user/unlink/:provider
#[tracing::instrument(skip_all)]
pub async fn unlink_provider(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(provider): Path<String>,
    headers: HeaderMap,
    addr: Option<ConnectInfo<SocketAddr>>,
    Extension(correlation): Extension<CorrelationId>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tag: Provider = provider.parse().map_err(AppError::Validation)?;
    let (ip, user_agent) = client_meta(&headers, addr.as_ref().map(|ConnectInfo(a)| a));

    let updated = state.resolver.unlink(&account, tag).await?;

    state
        .audit
        .record(
            AuthEvent::success(AuthAction::Unlink, updated.id.clone(), Some(tag.into()))
                .with_context(ip, user_agent, Some(correlation.0)),
        )
        .await;

    Ok(Json(serde_json::json!({
        "user": updated.sanitized(),
        "message": format!("{} account unlinked successfully", tag),
    })))
}

/// The caller's recent auth events, most-recent-first, bounded.
///
/// GET /user/auth-logs
pub async fn auth_logs(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<serde_json::Value>, AppError> {
    let logs = state.audit.recent_for_account(&account.id).await?;
    Ok(Json(serde_json::json!({ "logs": logs })))
}
