//! Identity-provider abstraction.
//!
//! Each provider implements the redirect-based handshake behind one trait:
//! build the authorization URL, then exchange a callback code for a
//! normalized profile. Implementations are chosen once at startup from
//! configuration; nothing is registered globally.

mod facebook;
mod google;
mod mock;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ProvidersConfig;
use crate::error::AppError;
use crate::models::Provider;

pub use facebook::FacebookProvider;
pub use google::GoogleProvider;
pub use mock::MockProvider;

/// Normalized profile produced by a completed handshake.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub provider: Provider,
    /// Provider-assigned user id.
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn tag(&self) -> Provider;

    /// Authorization URL the user agent is redirected to.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange the callback code for the user's profile.
    async fn exchange(&self, code: &str) -> Result<ProviderProfile, AppError>;
}

/// Providers enabled for this process, keyed by tag.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Provider, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, AppError> {
        let mut registry = Self::default();

        if config.mock {
            for tag in Provider::ALL {
                registry.insert(Arc::new(MockProvider::new(tag, &config.callback_base_url)));
            }
            tracing::warn!("MOCK_OAUTH enabled: all identity providers are mocked");
            return Ok(registry);
        }

        // Outbound calls to providers must never hang; the client carries a
        // request timeout surfaced as AppError::Provider.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()
            .map_err(|e| AppError::Config(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        if let Some(google) = &config.google {
            registry.insert(Arc::new(GoogleProvider::new(
                http.clone(),
                google.clone(),
                &config.callback_base_url,
            )));
        }
        if let Some(facebook) = &config.facebook {
            registry.insert(Arc::new(FacebookProvider::new(
                http.clone(),
                facebook.clone(),
                &config.callback_base_url,
            )));
        }

        Ok(registry)
    }

    pub fn insert(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.providers.insert(provider.tag(), provider);
    }

    pub fn get(&self, tag: Provider) -> Result<&Arc<dyn IdentityProvider>, AppError> {
        self.providers
            .get(&tag)
            .ok_or_else(|| AppError::Validation(format!("Provider not enabled: {}", tag)))
    }
}

/// Callback URL this service exposes for a provider.
fn callback_url(base: &str, tag: Provider) -> String {
    format!("{}/auth/{}/callback", base.trim_end_matches('/'), tag)
}
