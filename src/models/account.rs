//! Account model - a unique end-user identity with linked provider
//! identities and its bounded refresh-token window.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Maximum refresh tokens retained per account; oldest evicted first.
pub const REFRESH_TOKEN_CAP: usize = 5;

/// Refresh-token entries go stale this many days after issuance.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// External identity providers an account can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
        }
    }

    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Facebook];
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "facebook" => Ok(Provider::Facebook),
            other => Err(format!("Invalid provider: {}", other)),
        }
    }
}

/// Account roles. The core never escalates a role on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// One provider-assigned identity. `(provider, subject)` is unique across
/// all accounts; the store enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub provider: Provider,
    pub subject: String,
}

impl ProviderIdentity {
    pub fn new(provider: Provider, subject: impl Into<String>) -> Self {
        Self {
            provider,
            subject: subject.into(),
        }
    }
}

/// One slot of the refresh-token window. Only the SHA-256 hash of the
/// token string is retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenEntry {
    pub token_hash: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub issued_at: DateTime<Utc>,
}

impl RefreshTokenEntry {
    pub fn new(token: &str) -> Self {
        Self {
            token_hash: Self::hash_token(token),
            issued_at: Utc::now(),
        }
    }

    /// Hash a token string with SHA-256.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Entries older than the retention window never satisfy the rotation
    /// gate and are pruned on the next write.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.issued_at + Duration::days(REFRESH_TOKEN_TTL_DAYS) < now
    }
}

/// Account entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: String,
    /// Lowercase-normalized; unique when present.
    pub email: Option<String>,
    pub name: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    /// Provider tags currently linked; never empties once non-empty.
    pub providers: Vec<Provider>,
    /// Provider -> provider-assigned id mapping.
    pub identities: Vec<ProviderIdentity>,
    #[serde(default)]
    pub refresh_tokens: VecDeque<RefreshTokenEntry>,
    #[serde(default, with = "crate::models::bson_datetime_opt")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account around its first provider identity.
    pub fn new(
        email: Option<String>,
        name: String,
        avatar_url: Option<String>,
        identity: ProviderIdentity,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.map(|e| e.trim().to_lowercase()),
            name,
            avatar_url,
            role: Role::User,
            providers: vec![identity.provider],
            identities: vec![identity],
            refresh_tokens: VecDeque::new(),
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_provider(&self, provider: Provider) -> bool {
        self.providers.contains(&provider)
    }

    /// The provider-assigned id for `provider`, if linked.
    pub fn identity_subject(&self, provider: Provider) -> Option<&str> {
        self.identities
            .iter()
            .find(|i| i.provider == provider)
            .map(|i| i.subject.as_str())
    }

    /// Attach an identity and its provider tag, idempotently on the tag.
    pub fn add_identity(&mut self, identity: ProviderIdentity) {
        if !self.providers.contains(&identity.provider) {
            self.providers.push(identity.provider);
        }
        if self.identity_subject(identity.provider).is_none() {
            self.identities.push(identity);
        }
        self.updated_at = Utc::now();
    }

    /// Remove a provider tag and its identity mapping.
    pub fn remove_identity(&mut self, provider: Provider) {
        self.providers.retain(|p| *p != provider);
        self.identities.retain(|i| i.provider != provider);
        self.updated_at = Utc::now();
    }

    /// Append a refresh-token entry, pruning stale slots and evicting the
    /// oldest entry once the window is full.
    pub fn push_refresh_token(&mut self, entry: RefreshTokenEntry) {
        let now = Utc::now();
        self.refresh_tokens.retain(|e| !e.is_stale(now));
        self.refresh_tokens.push_back(entry);
        while self.refresh_tokens.len() > REFRESH_TOKEN_CAP {
            self.refresh_tokens.pop_front();
        }
        self.updated_at = now;
    }

    /// Remove the entry matching `token_hash`; `false` when absent or stale.
    pub fn remove_refresh_token(&mut self, token_hash: &str) -> bool {
        let now = Utc::now();
        let position = self
            .refresh_tokens
            .iter()
            .position(|e| e.token_hash == token_hash && !e.is_stale(now));
        match position {
            Some(idx) => {
                let _ = self.refresh_tokens.remove(idx);
                self.updated_at = now;
                true
            }
            None => false,
        }
    }

    /// Response shape without sensitive fields.
    pub fn sanitized(&self) -> AccountResponse {
        AccountResponse::from(self.clone())
    }
}

/// Account response for the API (no refresh tokens).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: Option<String>,
    pub name: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub providers: Vec<Provider>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            email: a.email,
            name: a.name,
            avatar_url: a.avatar_url,
            role: a.role,
            providers: a.providers,
            last_login: a.last_login,
            created_at: a.created_at,
        }
    }
}
