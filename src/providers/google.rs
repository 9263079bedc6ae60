//! Google OAuth 2.0 provider.
//!
//! Authorization-code flow: redirect to the consent screen, exchange the
//! callback code for an access token, then fetch the userinfo profile.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::OAuthClientConfig;
use crate::error::AppError;
use crate::models::Provider;

use super::{callback_url, IdentityProvider, ProviderProfile};

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

pub struct GoogleProvider {
    http: reqwest::Client,
    config: OAuthClientConfig,
    redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleProvider {
    pub fn new(http: reqwest::Client, config: OAuthClientConfig, callback_base: &str) -> Self {
        Self {
            http,
            config,
            redirect_uri: callback_url(callback_base, Provider::Google),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn tag(&self) -> Provider {
        Provider::Google
    }

    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&state={}&prompt=select_account",
            AUTH_ENDPOINT,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state),
        )
    }

    async fn exchange(&self, code: &str) -> Result<ProviderProfile, AppError> {
        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("redirect_uri", &self.redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Google token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(%status, error = %detail, "Google token exchange rejected");
            return Err(AppError::Provider(format!(
                "Google token exchange rejected ({})",
                status
            )));
        }

        let tokens: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Invalid Google token response: {}", e)))?;

        let info: GoogleUserInfo = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Google profile fetch failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Provider(format!("Google profile fetch rejected: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Invalid Google profile: {}", e)))?;

        Ok(ProviderProfile {
            provider: Provider::Google,
            subject: info.id,
            email: info.email,
            display_name: info.name,
            avatar_url: info.picture,
        })
    }
}
