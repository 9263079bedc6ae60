//! JWT signing and verification for the token pair.
//!
//! Access and refresh tokens are HS256-signed with distinct secrets, so
//! one kind never verifies as the other.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::AppError;
use crate::models::{Account, Role};

const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims for access tokens (short-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (account ID)
    pub sub: String,
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Claims for refresh tokens (long-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject (account ID)
    pub sub: String,
    pub token_type: String,
    pub exp: i64,
    pub iat: i64,
    /// Unique per token so two refresh tokens for one account never
    /// collide in the retention window.
    pub jti: String,
}

#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        }
    }

    /// Generate an access token carrying the account id and role.
    pub fn generate_access_token(&self, account: &Account) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: account.id.clone(),
            role: account.role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| AppError::Config(anyhow::anyhow!("Failed to encode access token: {}", e)))
    }

    /// Generate a refresh token signed with the refresh secret.
    pub fn generate_refresh_token(&self, account: &Account) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = now + Duration::days(self.refresh_token_expiry_days);

        let claims = RefreshTokenClaims {
            sub: account.id.clone(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| AppError::Config(anyhow::anyhow!("Failed to encode refresh token: {}", e)))
    }

    /// Validate signature and expiry of an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, AppError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<AccessTokenClaims>(token, &self.access_decoding, &validation)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
        Ok(data.claims)
    }

    /// Validate signature, expiry, and token type of a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, AppError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<RefreshTokenClaims>(token, &self.refresh_decoding, &validation)
            .map_err(|_| AppError::InvalidToken("Invalid refresh token".to_string()))?;
        if data.claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(AppError::InvalidToken("Invalid refresh token".to_string()));
        }
        Ok(data.claims)
    }

    /// Access token expiry in seconds (for cookie max-age and clients).
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_expiry_days(&self) -> i64 {
        self.refresh_token_expiry_days
    }
}
