//! Persistent-store boundary.
//!
//! The core talks to storage through `AuthStore`, which exposes the two
//! atomic primitives the auth flows depend on: insert-if-absent on
//! `(provider, subject)` identity keys, and a per-account conditional
//! remove-and-replace for refresh-token rotation. `MongoStore` backs
//! production; `MemoryStore` backs tests and mock-mode development.

mod memory;
mod mongo;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{Account, AuthEvent, Provider, ProviderIdentity, RefreshTokenEntry};

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Result of inserting a new account.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A uniqueness constraint (identity key or email) was violated; the
    /// caller re-runs its lookup instead of failing.
    Conflict,
}

/// Result of attaching an identity to an existing account.
#[derive(Debug)]
pub enum AttachOutcome {
    Attached(Account),
    /// Another account already owns this `(provider, subject)` pair.
    IdentityTaken,
    /// This account already has an identity for the provider.
    AlreadyLinked,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn find_account(&self, account_id: &str) -> Result<Option<Account>, AppError>;

    async fn find_account_by_identity(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<Account>, AppError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    /// Insert a new account. Uniqueness violations surface as
    /// `InsertOutcome::Conflict`, never as an error.
    async fn insert_account(&self, account: &Account) -> Result<InsertOutcome, AppError>;

    /// Atomically attach `identity` to the account unless the provider is
    /// already linked there or the identity is claimed elsewhere.
    async fn attach_identity(
        &self,
        account_id: &str,
        identity: ProviderIdentity,
    ) -> Result<AttachOutcome, AppError>;

    /// Remove the provider tag and identity mapping; returns the updated
    /// account. The caller is responsible for the last-provider guard.
    async fn detach_identity(
        &self,
        account_id: &str,
        provider: Provider,
    ) -> Result<Account, AppError>;

    async fn update_profile(
        &self,
        account_id: &str,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Account, AppError>;

    async fn touch_last_login(&self, account_id: &str) -> Result<(), AppError>;

    /// Append a refresh-token entry under the FIFO cap.
    async fn push_refresh_token(
        &self,
        account_id: &str,
        entry: RefreshTokenEntry,
    ) -> Result<(), AppError>;

    /// Atomic rotation step: remove `presented_hash` if (and only if) it is
    /// still present and fresh, then append `replacement` under the cap.
    /// Returns `false` when the presented hash was absent - the
    /// reuse-detection gate. Of two concurrent calls presenting the same
    /// hash, exactly one observes `true`.
    async fn rotate_refresh_token(
        &self,
        account_id: &str,
        presented_hash: &str,
        replacement: RefreshTokenEntry,
    ) -> Result<bool, AppError>;

    /// Remove exactly one refresh token (logout on one device).
    async fn remove_refresh_token(
        &self,
        account_id: &str,
        token_hash: &str,
    ) -> Result<bool, AppError>;

    async fn append_event(&self, event: &AuthEvent) -> Result<(), AppError>;

    /// Most-recent-first events for one account, bounded by `limit`.
    async fn recent_events(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, AppError>;
}
