//! Mock identity provider for local development and tests.
//!
//! Skips the external handshake entirely: the authorization URL points
//! straight back at this service's callback, and the code exchange returns
//! a canned profile.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::Provider;

use super::{callback_url, IdentityProvider, ProviderProfile};

pub const MOCK_CODE: &str = "mock-code";

pub struct MockProvider {
    tag: Provider,
    redirect_uri: String,
    profile: ProviderProfile,
}

impl MockProvider {
    pub fn new(tag: Provider, callback_base: &str) -> Self {
        let profile = ProviderProfile {
            provider: tag,
            subject: format!("mock-{}-user", tag),
            email: Some(format!("mock-{}@example.com", tag)),
            display_name: Some(format!("Mock {} User", tag)),
            avatar_url: Some("https://via.placeholder.com/150".to_string()),
        };
        Self::with_profile(tag, callback_base, profile)
    }

    /// Mock with a caller-chosen profile; used by tests to drive the
    /// resolver down specific paths.
    pub fn with_profile(tag: Provider, callback_base: &str, profile: ProviderProfile) -> Self {
        Self {
            tag,
            redirect_uri: callback_url(callback_base, tag),
            profile,
        }
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    fn tag(&self) -> Provider {
        self.tag
    }

    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?code={}&state={}",
            self.redirect_uri,
            MOCK_CODE,
            urlencoding::encode(state)
        )
    }

    async fn exchange(&self, code: &str) -> Result<ProviderProfile, AppError> {
        if code.is_empty() {
            return Err(AppError::Provider("Empty authorization code".to_string()));
        }
        Ok(self.profile.clone())
    }
}
