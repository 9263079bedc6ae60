//! Identity resolution: map a completed provider handshake onto exactly
//! one account - linking, returning, merging by email, or creating.
//!
//! Resolution is race-safe without locks: creation goes through the
//! store's insert-if-absent primitive, and a uniqueness conflict re-runs
//! the lookups instead of failing. Precedence is fixed: a provider-id
//! match always wins; email is only consulted when no provider-id match
//! exists.

use std::sync::Arc;

use crate::error::AppError;
use crate::models::{Account, Provider, ProviderIdentity};
use crate::providers::ProviderProfile;
use crate::store::{AttachOutcome, AuthStore, InsertOutcome};

/// Display name fallback when the provider profile has none.
const DEFAULT_DISPLAY_NAME: &str = "User";

#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn AuthStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Resolve a profile to an account. With `current` set (the caller
    /// holds a valid session) this is a linking request; otherwise it is
    /// a login that returns, merges, or creates.
    pub async fn resolve(
        &self,
        profile: &ProviderProfile,
        current: Option<&Account>,
    ) -> Result<Account, AppError> {
        if let Some(current) = current {
            return self.link(current, profile).await;
        }

        let email = profile.email.as_ref().map(|e| e.trim().to_lowercase());

        // Two passes: a lost race on create/attach re-runs the lookups,
        // which then find the winner.
        for _ in 0..2 {
            if let Some(account) = self
                .store
                .find_account_by_identity(profile.provider, &profile.subject)
                .await?
            {
                tracing::info!(
                    account_id = %account.id,
                    provider = %profile.provider,
                    "Returning user login"
                );
                return Ok(account);
            }

            if let Some(email) = &email {
                if let Some(account) = self.store.find_account_by_email(email).await? {
                    match self
                        .store
                        .attach_identity(
                            &account.id,
                            ProviderIdentity::new(profile.provider, profile.subject.clone()),
                        )
                        .await?
                    {
                        AttachOutcome::Attached(account) => {
                            tracing::info!(
                                account_id = %account.id,
                                provider = %profile.provider,
                                "Provider linked to existing email account"
                            );
                            return Ok(account);
                        }
                        // The identity was claimed since the lookup; the
                        // next pass resolves to its owner.
                        AttachOutcome::IdentityTaken => continue,
                        // The email account already carries a different
                        // identity for this provider; merging would
                        // overwrite it.
                        AttachOutcome::AlreadyLinked => {
                            return Err(AppError::Validation(format!(
                                "Email already belongs to an account with a different {} identity",
                                profile.provider
                            )));
                        }
                    }
                }
            }

            let account = Account::new(
                email.clone(),
                profile
                    .display_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
                profile.avatar_url.clone(),
                ProviderIdentity::new(profile.provider, profile.subject.clone()),
            );
            match self.store.insert_account(&account).await? {
                InsertOutcome::Inserted => {
                    tracing::info!(
                        account_id = %account.id,
                        provider = %profile.provider,
                        "New account created"
                    );
                    return Ok(account);
                }
                InsertOutcome::Conflict => continue,
            }
        }

        Err(AppError::Persistence(anyhow::anyhow!(
            "Identity resolution did not converge for provider {}",
            profile.provider
        )))
    }

    /// Attach the profile's identity to an already-authenticated account.
    async fn link(&self, current: &Account, profile: &ProviderProfile) -> Result<Account, AppError> {
        if current.identity_subject(profile.provider).is_some() {
            return Err(AppError::DuplicateLink(profile.provider));
        }

        match self
            .store
            .attach_identity(
                &current.id,
                ProviderIdentity::new(profile.provider, profile.subject.clone()),
            )
            .await?
        {
            AttachOutcome::Attached(account) => {
                tracing::info!(
                    account_id = %account.id,
                    provider = %profile.provider,
                    "Provider linked to existing account"
                );
                Ok(account)
            }
            AttachOutcome::AlreadyLinked => Err(AppError::DuplicateLink(profile.provider)),
            AttachOutcome::IdentityTaken => Err(AppError::Validation(format!(
                "This {} identity is already linked to another account",
                profile.provider
            ))),
        }
    }

    /// Unlink guard: refuse to remove the final identity or one that is
    /// not linked; otherwise drop the tag and mapping.
    pub async fn unlink(&self, account: &Account, provider: Provider) -> Result<Account, AppError> {
        if account.providers.len() <= 1 {
            return Err(AppError::LastProvider);
        }
        if !account.has_provider(provider) {
            return Err(AppError::NotLinked(provider));
        }

        let account = self.store.detach_identity(&account.id, provider).await?;
        tracing::info!(account_id = %account.id, provider = %provider, "Provider unlinked");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn resolver() -> (Arc<MemoryStore>, IdentityResolver) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), IdentityResolver::new(store))
    }

    fn google_profile(subject: &str, email: Option<&str>) -> ProviderProfile {
        ProviderProfile {
            provider: Provider::Google,
            subject: subject.to_string(),
            email: email.map(String::from),
            display_name: Some("Ada".to_string()),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn same_identity_resolves_to_one_account() {
        let (_, resolver) = resolver();
        let profile = google_profile("g1", Some("a@x.com"));

        let first = resolver.resolve(&profile, None).await.unwrap();
        let second = resolver.resolve(&profile, None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.role, crate::models::Role::User);
        assert_eq!(first.providers, vec![Provider::Google]);
    }

    #[tokio::test]
    async fn missing_display_name_gets_generic_label() {
        let (_, resolver) = resolver();
        let profile = ProviderProfile {
            display_name: None,
            ..google_profile("g-anon", None)
        };

        let account = resolver.resolve(&profile, None).await.unwrap();
        assert_eq!(account.name, "User");
    }

    #[tokio::test]
    async fn email_match_merges_identity_onto_existing_account() {
        let (store, resolver) = resolver();

        let existing = Account::new(
            Some("a@x.com".to_string()),
            "Ada".to_string(),
            None,
            ProviderIdentity::new(Provider::Facebook, "f1"),
        );
        store.insert_account(&existing).await.unwrap();

        let merged = resolver
            .resolve(&google_profile("g1", Some("A@X.com")), None)
            .await
            .unwrap();

        assert_eq!(merged.id, existing.id);
        assert_eq!(merged.identity_subject(Provider::Google), Some("g1"));
        assert!(merged.has_provider(Provider::Facebook));
    }

    #[tokio::test]
    async fn email_account_with_no_providers_gains_the_identity() {
        let (store, resolver) = resolver();

        // Pre-existing account with an email and nothing linked yet.
        let bare = Account {
            providers: Vec::new(),
            identities: Vec::new(),
            ..Account::new(
                Some("a@x.com".to_string()),
                "Ada".to_string(),
                None,
                ProviderIdentity::new(Provider::Google, "placeholder"),
            )
        };
        store.insert_account(&bare).await.unwrap();

        let resolved = resolver
            .resolve(&google_profile("g1", Some("a@x.com")), None)
            .await
            .unwrap();

        assert_eq!(resolved.id, bare.id);
        assert_eq!(resolved.providers, vec![Provider::Google]);
        assert_eq!(resolved.identity_subject(Provider::Google), Some("g1"));
    }

    #[tokio::test]
    async fn provider_id_match_wins_over_email_match() {
        let (store, resolver) = resolver();

        // Account X owns the google identity; account Y owns the email.
        let x = resolver
            .resolve(&google_profile("g1", Some("x@x.com")), None)
            .await
            .unwrap();
        let y = Account::new(
            Some("y@x.com".to_string()),
            "Y".to_string(),
            None,
            ProviderIdentity::new(Provider::Facebook, "f1"),
        );
        store.insert_account(&y).await.unwrap();

        let resolved = resolver
            .resolve(&google_profile("g1", Some("y@x.com")), None)
            .await
            .unwrap();
        assert_eq!(resolved.id, x.id);
    }

    #[tokio::test]
    async fn linking_adds_identity_and_rejects_duplicates() {
        let (_, resolver) = resolver();
        let account = resolver
            .resolve(&google_profile("g1", Some("a@x.com")), None)
            .await
            .unwrap();

        let fb = ProviderProfile {
            provider: Provider::Facebook,
            subject: "f1".to_string(),
            email: None,
            display_name: None,
            avatar_url: None,
        };
        let linked = resolver.resolve(&fb, Some(&account)).await.unwrap();
        assert!(linked.has_provider(Provider::Facebook));

        let again = resolver.resolve(&fb, Some(&linked)).await;
        assert!(matches!(again, Err(AppError::DuplicateLink(Provider::Facebook))));
        // No duplicate tag was produced by the rejected attempt.
        assert_eq!(
            linked.providers,
            vec![Provider::Google, Provider::Facebook]
        );
    }

    #[tokio::test]
    async fn linking_an_identity_owned_elsewhere_fails() {
        let (_, resolver) = resolver();
        let owner = resolver
            .resolve(&google_profile("g1", Some("a@x.com")), None)
            .await
            .unwrap();
        let other = resolver
            .resolve(&google_profile("g2", Some("b@x.com")), None)
            .await
            .unwrap();
        assert_ne!(owner.id, other.id);

        // `other` already has google linked: duplicate-link guard first.
        let dup = resolver
            .resolve(&google_profile("g1", None), Some(&other))
            .await;
        assert!(matches!(dup, Err(AppError::DuplicateLink(_))));
    }

    #[tokio::test]
    async fn unlink_guards_last_provider_and_unlinked_tags() {
        let (_, resolver) = resolver();
        let account = resolver
            .resolve(&google_profile("g1", Some("a@x.com")), None)
            .await
            .unwrap();

        let last = resolver.unlink(&account, Provider::Google).await;
        assert!(matches!(last, Err(AppError::LastProvider)));

        let not_linked = resolver.unlink(&account, Provider::Facebook).await;
        assert!(matches!(not_linked, Err(AppError::NotLinked(_))));

        let fb = ProviderProfile {
            provider: Provider::Facebook,
            subject: "f1".to_string(),
            email: None,
            display_name: None,
            avatar_url: None,
        };
        let linked = resolver.resolve(&fb, Some(&account)).await.unwrap();

        let unlinked = resolver.unlink(&linked, Provider::Google).await.unwrap();
        assert_eq!(unlinked.providers, vec![Provider::Facebook]);
        assert_eq!(unlinked.identity_subject(Provider::Google), None);
    }

    #[tokio::test]
    async fn concurrent_first_logins_create_one_account() {
        let (store, resolver) = resolver();
        let profile = google_profile("g1", Some("a@x.com"));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let resolver = resolver.clone();
            let profile = profile.clone();
            handles.push(tokio::spawn(async move {
                resolver.resolve(&profile, None).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1);

        // Exactly one account exists for the identity.
        let account = store
            .find_account_by_identity(Provider::Google, "g1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.id, ids[0]);
    }
}
