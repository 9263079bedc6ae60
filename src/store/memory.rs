//! In-memory store for tests and mock-mode development.
//!
//! One mutex over the whole state gives every multi-key operation the
//! atomicity the trait demands; no lock is held across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::AppError;
use crate::models::{Account, AuthEvent, Provider, ProviderIdentity, RefreshTokenEntry};

use super::{AttachOutcome, AuthStore, InsertOutcome};

#[derive(Default)]
struct MemoryInner {
    accounts: HashMap<String, Account>,
    events: Vec<AuthEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // Lock poisoning only happens after a panic mid-mutation; there is
        // no state worth salvaging at that point.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MemoryInner {
    fn identity_owner(&self, provider: Provider, subject: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.identity_subject(provider) == Some(subject))
    }

    fn account_mut(&mut self, account_id: &str) -> Result<&mut Account, AppError> {
        self.accounts
            .get_mut(account_id)
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn find_account(&self, account_id: &str) -> Result<Option<Account>, AppError> {
        Ok(self.lock().accounts.get(account_id).cloned())
    }

    async fn find_account_by_identity(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<Account>, AppError> {
        Ok(self.lock().identity_owner(provider, subject).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| a.email.as_deref() == Some(email.as_str()))
            .cloned())
    }

    async fn insert_account(&self, account: &Account) -> Result<InsertOutcome, AppError> {
        let mut inner = self.lock();

        for identity in &account.identities {
            if inner
                .identity_owner(identity.provider, &identity.subject)
                .is_some()
            {
                return Ok(InsertOutcome::Conflict);
            }
        }
        if let Some(email) = &account.email {
            if inner
                .accounts
                .values()
                .any(|a| a.email.as_deref() == Some(email.as_str()))
            {
                return Ok(InsertOutcome::Conflict);
            }
        }

        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn attach_identity(
        &self,
        account_id: &str,
        identity: ProviderIdentity,
    ) -> Result<AttachOutcome, AppError> {
        let mut inner = self.lock();

        if let Some(owner) = inner.identity_owner(identity.provider, &identity.subject) {
            if owner.id != account_id {
                return Ok(AttachOutcome::IdentityTaken);
            }
        }

        let account = inner.account_mut(account_id)?;
        if account.identity_subject(identity.provider).is_some() {
            return Ok(AttachOutcome::AlreadyLinked);
        }
        account.add_identity(identity);
        Ok(AttachOutcome::Attached(account.clone()))
    }

    async fn detach_identity(
        &self,
        account_id: &str,
        provider: Provider,
    ) -> Result<Account, AppError> {
        let mut inner = self.lock();
        let account = inner.account_mut(account_id)?;
        account.remove_identity(provider);
        Ok(account.clone())
    }

    async fn update_profile(
        &self,
        account_id: &str,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Account, AppError> {
        let mut inner = self.lock();
        let account = inner.account_mut(account_id)?;
        if let Some(name) = name {
            account.name = name;
        }
        if let Some(avatar_url) = avatar_url {
            account.avatar_url = Some(avatar_url);
        }
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn touch_last_login(&self, account_id: &str) -> Result<(), AppError> {
        let mut inner = self.lock();
        let account = inner.account_mut(account_id)?;
        account.last_login = Some(Utc::now());
        Ok(())
    }

    async fn push_refresh_token(
        &self,
        account_id: &str,
        entry: RefreshTokenEntry,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        let account = inner.account_mut(account_id)?;
        account.push_refresh_token(entry);
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        account_id: &str,
        presented_hash: &str,
        replacement: RefreshTokenEntry,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let account = inner.account_mut(account_id)?;
        if !account.remove_refresh_token(presented_hash) {
            return Ok(false);
        }
        account.push_refresh_token(replacement);
        Ok(true)
    }

    async fn remove_refresh_token(
        &self,
        account_id: &str,
        token_hash: &str,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let account = inner.account_mut(account_id)?;
        Ok(account.remove_refresh_token(token_hash))
    }

    async fn append_event(&self, event: &AuthEvent) -> Result<(), AppError> {
        let mut inner = self.lock();
        let now = Utc::now();
        inner.events.retain(|e| !e.is_expired(now));
        inner.events.push(event.clone());
        Ok(())
    }

    async fn recent_events(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, AppError> {
        let inner = self.lock();
        let now = Utc::now();
        let mut events: Vec<AuthEvent> = inner
            .events
            .iter()
            .filter(|e| e.account_id.as_deref() == Some(account_id) && !e.is_expired(now))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthAction, EventProvider};

    fn account_with(provider: Provider, subject: &str, email: Option<&str>) -> Account {
        Account::new(
            email.map(String::from),
            "Test".to_string(),
            None,
            ProviderIdentity::new(provider, subject),
        )
    }

    #[tokio::test]
    async fn insert_conflicts_on_claimed_identity() {
        let store = MemoryStore::new();
        let first = account_with(Provider::Google, "g1", Some("a@x.com"));
        assert_eq!(
            store.insert_account(&first).await.unwrap(),
            InsertOutcome::Inserted
        );

        let rival = account_with(Provider::Google, "g1", Some("b@x.com"));
        assert_eq!(
            store.insert_account(&rival).await.unwrap(),
            InsertOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn attach_reports_taken_and_already_linked() {
        let store = MemoryStore::new();
        let owner = account_with(Provider::Google, "g1", None);
        let other = account_with(Provider::Facebook, "f1", None);
        store.insert_account(&owner).await.unwrap();
        store.insert_account(&other).await.unwrap();

        let taken = store
            .attach_identity(&other.id, ProviderIdentity::new(Provider::Google, "g1"))
            .await
            .unwrap();
        assert!(matches!(taken, AttachOutcome::IdentityTaken));

        let dup = store
            .attach_identity(&owner.id, ProviderIdentity::new(Provider::Google, "g2"))
            .await
            .unwrap();
        assert!(matches!(dup, AttachOutcome::AlreadyLinked));

        let ok = store
            .attach_identity(&other.id, ProviderIdentity::new(Provider::Google, "g2"))
            .await
            .unwrap();
        assert!(matches!(ok, AttachOutcome::Attached(_)));
    }

    #[tokio::test]
    async fn rotation_gate_admits_exactly_one_winner() {
        let store = MemoryStore::new();
        let acc = account_with(Provider::Google, "g1", None);
        store.insert_account(&acc).await.unwrap();

        let presented = RefreshTokenEntry::hash_token("old-token");
        store
            .push_refresh_token(&acc.id, RefreshTokenEntry::new("old-token"))
            .await
            .unwrap();

        let first = store
            .rotate_refresh_token(&acc.id, &presented, RefreshTokenEntry::new("new-1"))
            .await
            .unwrap();
        let second = store
            .rotate_refresh_token(&acc.id, &presented, RefreshTokenEntry::new("new-2"))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn recent_events_are_bounded_and_most_recent_first() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store
                .append_event(&AuthEvent::success(
                    AuthAction::Login,
                    "acc-1",
                    Some(EventProvider::Google),
                ))
                .await
                .unwrap();
        }
        store
            .append_event(&AuthEvent::success(AuthAction::Logout, "acc-1", None))
            .await
            .unwrap();

        let events = store.recent_events("acc-1", 2).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, AuthAction::Logout);
    }
}
