//! Access-token authentication middleware.
//!
//! Accepts the session cookie (browser flow) or a bearer header (API
//! clients), validates the access token, loads the account, and exposes
//! it to handlers via the `CurrentAccount` extractor.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::error::AppError;
use crate::models::Account;
use crate::utils::cookies::ACCESS_TOKEN_COOKIE;
use crate::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let jar = CookieJar::from_headers(req.headers());
    let token = jar
        .get(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .ok_or_else(|| AppError::Unauthorized("Missing access token".to_string()))?;

    let claims = state.jwt.validate_access_token(&token)?;

    let account = state
        .store
        .find_account(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account not found".to_string()))?;

    req.extensions_mut().insert(account);
    Ok(next.run(req).await)
}

/// Extractor for the authenticated account placed by `auth_middleware`.
pub struct CurrentAccount(pub Account);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account = parts.extensions.get::<Account>().cloned().ok_or_else(|| {
            AppError::Unauthorized("Authentication context missing".to_string())
        })?;
        Ok(CurrentAccount(account))
    }
}
