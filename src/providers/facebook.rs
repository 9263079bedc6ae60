//! Facebook Login provider.
//!
//! Same authorization-code shape as Google, against the Graph API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::OAuthClientConfig;
use crate::error::AppError;
use crate::models::Provider;

use super::{callback_url, IdentityProvider, ProviderProfile};

const AUTH_ENDPOINT: &str = "https://www.facebook.com/v19.0/dialog/oauth";
const TOKEN_ENDPOINT: &str = "https://graph.facebook.com/v19.0/oauth/access_token";
const PROFILE_ENDPOINT: &str = "https://graph.facebook.com/me";

pub struct FacebookProvider {
    http: reqwest::Client,
    config: OAuthClientConfig,
    redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct FacebookTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct FacebookProfile {
    id: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<FacebookPicture>,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: Option<String>,
}

impl FacebookProvider {
    pub fn new(http: reqwest::Client, config: OAuthClientConfig, callback_base: &str) -> Self {
        Self {
            http,
            config,
            redirect_uri: callback_url(callback_base, Provider::Facebook),
        }
    }
}

#[async_trait]
impl IdentityProvider for FacebookProvider {
    fn tag(&self) -> Provider {
        Provider::Facebook
    }

    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&state={}&scope=email%2Cpublic_profile",
            AUTH_ENDPOINT,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state),
        )
    }

    async fn exchange(&self, code: &str) -> Result<ProviderProfile, AppError> {
        let tokens: FacebookTokenResponse = self
            .http
            .get(TOKEN_ENDPOINT)
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Facebook token exchange failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Provider(format!("Facebook token exchange rejected: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Invalid Facebook token response: {}", e)))?;

        let profile: FacebookProfile = self
            .http
            .get(PROFILE_ENDPOINT)
            .query(&[
                ("fields", "id,name,email,picture.type(large)"),
                ("access_token", tokens.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Facebook profile fetch failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Provider(format!("Facebook profile fetch rejected: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Invalid Facebook profile: {}", e)))?;

        Ok(ProviderProfile {
            provider: Provider::Facebook,
            subject: profile.id,
            email: profile.email,
            display_name: profile.name,
            avatar_url: profile.picture.and_then(|p| p.data.url),
        })
    }
}
