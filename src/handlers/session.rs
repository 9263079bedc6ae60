//! Session lifecycle handlers: refresh, logout, current account.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension, State},
    http::HeaderMap,
    Json,
};
use axum_extra::extract::cookie::CookieJar;

use crate::error::AppError;
use crate::middleware::{CorrelationId, CurrentAccount};
use crate::models::{AuthAction, AuthEvent, EventProvider};
use crate::utils::cookies;
use crate::AppState;

use super::client_meta;

/// Rotate the token pair presented in the refresh cookie.
///
/// POST /auth/refresh
///
/// Every failure clears both session cookies before responding, so a
/// stale session can never loop.
#[tracing::instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    addr: Option<ConnectInfo<SocketAddr>>,
    Extension(correlation): Extension<CorrelationId>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>), (CookieJar, AppError)> {
    let (ip, user_agent) = client_meta(&headers, addr.as_ref().map(|ConnectInfo(a)| a));

    let presented = match jar
        .get(cookies::REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
    {
        Some(token) => token,
        None => {
            return Err((
                cookies::clear_session(jar),
                AppError::InvalidToken("Refresh token required".to_string()),
            ));
        }
    };

    match state.tokens.rotate(&presented).await {
        Ok((account, pair)) => {
            state
                .audit
                .record(
                    AuthEvent::success(
                        AuthAction::TokenRefresh,
                        account.id.clone(),
                        Some(EventProvider::Jwt),
                    )
                    .with_context(ip, user_agent, Some(correlation.0)),
                )
                .await;
            tracing::info!(account_id = %account.id, "Token pair rotated");

            let jar = cookies::apply_session(jar, &pair, &state.config);
            Ok((jar, Json(serde_json::json!({ "message": "Token refreshed" }))))
        }
        Err(e) => {
            state
                .audit
                .record(
                    AuthEvent::failure(
                        AuthAction::TokenRefresh,
                        None,
                        Some(EventProvider::Jwt),
                        e.to_string(),
                    )
                    .with_context(ip, user_agent, Some(correlation.0)),
                )
                .await;
            Err((cookies::clear_session(jar), e))
        }
    }
}

/// Revoke the presented refresh token and clear the session cookies.
/// Other devices' sessions keep their tokens.
///
/// POST /auth/logout
#[tracing::instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    headers: HeaderMap,
    addr: Option<ConnectInfo<SocketAddr>>,
    Extension(correlation): Extension<CorrelationId>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>), AppError> {
    let (ip, user_agent) = client_meta(&headers, addr.as_ref().map(|ConnectInfo(a)| a));

    if let Some(cookie) = jar.get(cookies::REFRESH_TOKEN_COOKIE) {
        // The cookies are cleared regardless; a failed revocation only
        // leaves a token that expires on its own.
        if let Err(e) = state.tokens.revoke(&account.id, cookie.value()).await {
            tracing::warn!(account_id = %account.id, error = %e, "Refresh token revocation failed");
        }
    }

    state
        .audit
        .record(
            AuthEvent::success(AuthAction::Logout, account.id.clone(), None)
                .with_context(ip, user_agent, Some(correlation.0)),
        )
        .await;
    tracing::info!(account_id = %account.id, "Logged out");

    Ok((
        cookies::clear_session(jar),
        Json(serde_json::json!({ "message": "Logged out successfully" })),
    ))
}

/// The authenticated account.
///
/// GET /auth/me
pub async fn me(CurrentAccount(account): CurrentAccount) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "user": account.sanitized() }))
}
