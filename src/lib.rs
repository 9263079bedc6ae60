pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::error::AppError;
use crate::providers::ProviderRegistry;
use crate::services::{AuditSink, IdentityResolver, JwtService, TokenService};
use crate::store::AuthStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn AuthStore>,
    pub jwt: JwtService,
    pub tokens: TokenService,
    pub resolver: IdentityResolver,
    pub audit: AuditSink,
    pub providers: ProviderRegistry,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn AuthStore>, providers: ProviderRegistry) -> Self {
        let jwt = JwtService::new(&config.jwt);
        Self {
            tokens: TokenService::new(store.clone(), jwt.clone()),
            resolver: IdentityResolver::new(store.clone()),
            audit: AuditSink::new(store.clone()),
            config,
            store,
            jwt,
            providers,
        }
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    // Routes behind a valid access token.
    let authed = Router::new()
        .route("/auth/logout", post(handlers::session::logout))
        .route("/auth/me", get(handlers::session::me))
        .route(
            "/user/profile",
            get(handlers::user::get_profile).put(handlers::user::update_profile),
        )
        .route("/user/link/:provider", post(handlers::user::link_provider))
        .route(
            "/user/unlink/:provider",
            delete(handlers::user::unlink_provider),
        )
        .route("/user/auth-logs", get(handlers::user::auth_logs))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let frontend_origin = state
        .config
        .frontend_url
        .parse::<HeaderValue>()
        .map_err(|e| {
            AppError::Config(anyhow::anyhow!(
                "Invalid FRONTEND_URL '{}': {}",
                state.config.frontend_url,
                e
            ))
        })?;

    let cors = CorsLayer::new()
        .allow_origin(frontend_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(middleware::CORRELATION_HEADER),
        ]);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/auth/:provider", get(handlers::oauth::oauth_start))
        .route(
            "/auth/:provider/callback",
            get(handlers::oauth::oauth_callback),
        )
        .route("/auth/refresh", post(handlers::session::refresh))
        .merge(authed)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<axum::body::Body>| {
                    let correlation_id = request
                        .headers()
                        .get(middleware::CORRELATION_HEADER)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        correlation_id = %correlation_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                },
            ),
        )
        .layer(from_fn(middleware::correlation_id_middleware))
        .layer(cors);

    Ok(app)
}

/// Service health check: liveness plus a store round-trip.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "checks": { "store": "up" },
    })))
}
