//! Application error taxonomy.
//!
//! Every fallible path in the service surfaces one of these variants; the
//! `IntoResponse` impl maps them onto HTTP statuses. Persistence and
//! provider failures are logged with full detail here and degraded to a
//! generic client-facing message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::Provider;

#[derive(Debug, Error)]
pub enum AppError {
    /// CSRF state mismatch or replay during the OAuth handshake.
    #[error("Invalid state parameter")]
    StateMismatch,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} account already linked")]
    DuplicateLink(Provider),

    #[error("Cannot unlink last authentication method")]
    LastProvider,

    #[error("{0} account is not linked")]
    NotLinked(Provider),

    /// Bad, expired, reused, or absent token.
    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// Upstream identity-provider failure (timeout, non-2xx, bad payload).
    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(#[source] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    /// Status code this error maps to at the HTTP boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::StateMismatch
            | AppError::Validation(_)
            | AppError::DuplicateLink(_)
            | AppError::LastProvider
            | AppError::NotLinked(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidToken(_) | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::Persistence(_) | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal detail stays in the correlation-tagged log; the client
        // only ever sees a generic message for 5xx-class failures.
        let message = match &self {
            AppError::Persistence(source) => {
                tracing::error!(error = %source, "Persistence failure");
                "Internal server error".to_string()
            }
            AppError::Config(source) => {
                tracing::error!(error = %source, "Configuration failure");
                "Internal server error".to_string()
            }
            AppError::Provider(detail) => {
                tracing::error!(error = %detail, "Identity provider failure");
                "Identity provider unavailable".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Persistence(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_errors_map_to_400() {
        assert_eq!(AppError::StateMismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::LastProvider.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::DuplicateLink(Provider::Google).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn token_errors_map_to_401() {
        assert_eq!(
            AppError::InvalidToken("Refresh token required".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn persistence_detail_is_not_leaked() {
        let err = AppError::Persistence(anyhow::anyhow!("connection pool exhausted at 10.0.0.3"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
