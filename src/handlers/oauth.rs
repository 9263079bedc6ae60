//! OAuth handshake handlers: initiate and callback.
//!
//! The callback never renders an error page - every failure records a
//! `success=false` audit event, consumes the handshake cookies, and
//! redirects to the frontend with an `error` query parameter.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension, Path, Query, State},
    http::HeaderMap,
    response::Redirect,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::CorrelationId;
use crate::models::{Account, AuthAction, AuthEvent, EventProvider, Provider};
use crate::services::{generate_state, validate_state};
use crate::utils::cookies;
use crate::AppState;

use super::client_meta;

const ERR_AUTH_FAILED: &str = "auth_failed";
const ERR_CALLBACK_FAILED: &str = "callback_failed";
const ERR_ACCESS_DENIED: &str = "access_denied";

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    #[serde(rename = "returnTo")]
    return_to: Option<String>,
    link: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Begin a handshake: persist the state and return-path binding in
/// short-lived cookies and redirect to the provider.
///
/// GET /auth/:provider
#[tracing::instrument(skip_all)]
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<StartQuery>,
    mut jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let tag: Provider = provider.parse().map_err(AppError::Validation)?;
    let provider = state.providers.get(tag)?.clone();

    // A linking handshake is only available to an authenticated session;
    // the intent cookie flags the callback to resolve in linking mode.
    if query.link.unwrap_or(false) {
        let account = authenticated_account(&state, &jar).await?;
        tracing::info!(account_id = %account.id, provider = %tag, "Linking handshake started");
        jar = jar.add(cookies::handshake_cookie(
            cookies::LINK_COOKIE,
            "1".to_string(),
            &state.config,
        ));
    }

    let handshake_state = generate_state();
    let return_to = sanitize_return_path(query.return_to.as_deref().unwrap_or("/"));

    jar = jar
        .add(cookies::handshake_cookie(
            cookies::STATE_COOKIE,
            handshake_state.clone(),
            &state.config,
        ))
        .add(cookies::handshake_cookie(
            cookies::RETURN_TO_COOKIE,
            return_to,
            &state.config,
        ));

    Ok((jar, Redirect::to(&provider.authorize_url(&handshake_state))))
}

/// Complete a handshake: validate state, resolve the identity, issue the
/// token pair, audit, and redirect to the stored return path.
///
/// GET /auth/:provider/callback
#[tracing::instrument(skip_all)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    addr: Option<ConnectInfo<SocketAddr>>,
    Extension(correlation): Extension<CorrelationId>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    let (ip, user_agent) = client_meta(&headers, addr.as_ref().map(|ConnectInfo(a)| a));
    let correlation_id = correlation.0;

    match run_callback(&state, &provider, query, jar).await {
        Ok(success) => {
            tracing::info!(
                account_id = %success.account_id,
                provider = ?success.provider,
                action = %success.action.as_str(),
                "OAuth callback succeeded"
            );
            state
                .audit
                .record(
                    AuthEvent::success(
                        success.action,
                        success.account_id,
                        Some(success.provider),
                    )
                    .with_context(ip, user_agent, Some(correlation_id)),
                )
                .await;
            (success.jar, success.redirect)
        }
        Err(failure) => {
            tracing::warn!(error = %failure.detail, "OAuth callback failed");
            state
                .audit
                .record(
                    AuthEvent::failure(
                        failure.action,
                        failure.account_id,
                        failure.provider,
                        failure.detail,
                    )
                    .with_context(ip, user_agent, Some(correlation_id)),
                )
                .await;
            let redirect = Redirect::to(&format!(
                "{}/login?error={}",
                state.config.frontend_url, failure.error_code
            ));
            (failure.jar, redirect)
        }
    }
}

struct CallbackSuccess {
    jar: CookieJar,
    redirect: Redirect,
    account_id: String,
    action: AuthAction,
    provider: EventProvider,
}

struct CallbackFailure {
    jar: CookieJar,
    error_code: &'static str,
    action: AuthAction,
    provider: Option<EventProvider>,
    account_id: Option<String>,
    detail: String,
}

impl CallbackFailure {
    /// Every failure consumes the handshake cookies so the binding can
    /// never validate twice.
    fn new(
        jar: CookieJar,
        error_code: &'static str,
        provider: Option<Provider>,
        current: Option<&Account>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            jar: cookies::clear_handshake(jar),
            error_code,
            action: if current.is_some() {
                AuthAction::Link
            } else {
                AuthAction::FailedLogin
            },
            provider: provider.map(Into::into),
            account_id: current.map(|a| a.id.clone()),
            detail: detail.into(),
        }
    }
}

async fn run_callback(
    state: &AppState,
    provider_param: &str,
    query: CallbackQuery,
    jar: CookieJar,
) -> Result<CallbackSuccess, CallbackFailure> {
    let tag = match provider_param.parse::<Provider>() {
        Ok(tag) => tag,
        Err(e) => {
            return Err(CallbackFailure::new(jar, ERR_AUTH_FAILED, None, None, e));
        }
    };
    let provider = match state.providers.get(tag) {
        Ok(p) => p.clone(),
        Err(e) => {
            return Err(CallbackFailure::new(
                jar,
                ERR_AUTH_FAILED,
                Some(tag),
                None,
                e.to_string(),
            ));
        }
    };

    // The user declined at the provider's consent screen.
    if let Some(denial) = query.error {
        return Err(CallbackFailure::new(
            jar,
            ERR_ACCESS_DENIED,
            Some(tag),
            None,
            format!("Provider denied access: {}", denial),
        ));
    }

    let stored_state = jar.get(cookies::STATE_COOKIE).map(|c| c.value().to_string());
    if let Err(e) = validate_state(query.state.as_deref(), stored_state.as_deref()) {
        return Err(CallbackFailure::new(
            jar,
            ERR_AUTH_FAILED,
            Some(tag),
            None,
            e.to_string(),
        ));
    }

    let return_to = jar
        .get(cookies::RETURN_TO_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_else(|| "/".to_string());
    let linking = jar.get(cookies::LINK_COOKIE).is_some();

    let current = if linking {
        match authenticated_account(state, &jar).await {
            Ok(account) => Some(account),
            Err(e) => {
                return Err(CallbackFailure::new(
                    jar,
                    ERR_CALLBACK_FAILED,
                    Some(tag),
                    None,
                    format!("Linking without a valid session: {}", e),
                ));
            }
        }
    } else {
        None
    };

    let code = match query.code {
        Some(code) => code,
        None => {
            return Err(CallbackFailure::new(
                jar,
                ERR_CALLBACK_FAILED,
                Some(tag),
                current.as_ref(),
                "Missing authorization code",
            ));
        }
    };

    let profile = match provider.exchange(&code).await {
        Ok(profile) => profile,
        Err(e) => {
            return Err(CallbackFailure::new(
                jar,
                ERR_CALLBACK_FAILED,
                Some(tag),
                current.as_ref(),
                e.to_string(),
            ));
        }
    };

    let account = match state.resolver.resolve(&profile, current.as_ref()).await {
        Ok(account) => account,
        Err(e) => {
            return Err(CallbackFailure::new(
                jar,
                ERR_CALLBACK_FAILED,
                Some(tag),
                current.as_ref(),
                e.to_string(),
            ));
        }
    };

    // Last login moves on OAuth logins only, never on linking.
    if !linking {
        if let Err(e) = state.store.touch_last_login(&account.id).await {
            return Err(CallbackFailure::new(
                jar,
                ERR_CALLBACK_FAILED,
                Some(tag),
                current.as_ref(),
                e.to_string(),
            ));
        }
    }

    let pair = match state.tokens.issue_pair(&account).await {
        Ok(pair) => pair,
        Err(e) => {
            return Err(CallbackFailure::new(
                jar,
                ERR_CALLBACK_FAILED,
                Some(tag),
                current.as_ref(),
                e.to_string(),
            ));
        }
    };

    let jar = cookies::apply_session(cookies::clear_handshake(jar), &pair, &state.config);
    let redirect = Redirect::to(&format!(
        "{}{}",
        state.config.frontend_url,
        sanitize_return_path(&return_to)
    ));

    Ok(CallbackSuccess {
        jar,
        redirect,
        account_id: account.id,
        action: if linking {
            AuthAction::Link
        } else {
            AuthAction::Login
        },
        provider: tag.into(),
    })
}

/// Resolve the session behind the access-token cookie (linking flows run
/// outside the auth-middleware routes).
pub(crate) async fn authenticated_account(
    state: &AppState,
    jar: &CookieJar,
) -> Result<Account, AppError> {
    let token = jar
        .get(cookies::ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized("Missing access token".to_string()))?;
    let claims = state.jwt.validate_access_token(&token)?;
    state
        .store
        .find_account(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account not found".to_string()))
}

/// Return paths are site-relative; anything else falls back to `/`.
fn sanitize_return_path(path: &str) -> String {
    if path.starts_with('/') && !path.starts_with("//") {
        path.to_string()
    } else {
        "/".to_string()
    }
}
