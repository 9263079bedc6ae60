//! Token lifecycle: pair issuance, rotation with reuse detection, and
//! single-token revocation.
//!
//! The rotation gate rides on the store's atomic conditional update: a
//! refresh token removed by one rotation can never satisfy a second one.

use std::sync::Arc;

use crate::error::AppError;
use crate::models::{Account, RefreshTokenEntry};
use crate::store::AuthStore;

use super::JwtService;

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn AuthStore>,
    jwt: JwtService,
}

impl TokenService {
    pub fn new(store: Arc<dyn AuthStore>, jwt: JwtService) -> Self {
        Self { store, jwt }
    }

    /// Mint a pair for `account` and retain the refresh token hash in its
    /// bounded window.
    pub async fn issue_pair(&self, account: &Account) -> Result<IssuedPair, AppError> {
        let pair = self.mint(account)?;
        self.store
            .push_refresh_token(&account.id, RefreshTokenEntry::new(&pair.refresh_token))
            .await?;
        Ok(pair)
    }

    /// Exchange a presented refresh token for a new pair.
    ///
    /// Signature, expiry, account existence, and presence in the account's
    /// token window are all required; the remove-and-replace is atomic per
    /// account, so a concurrent rotation of the same token loses the gate.
    pub async fn rotate(&self, presented: &str) -> Result<(Account, IssuedPair), AppError> {
        let claims = self.jwt.validate_refresh_token(presented)?;

        let account = self
            .store
            .find_account(&claims.sub)
            .await?
            .ok_or_else(|| AppError::InvalidToken("Invalid refresh token".to_string()))?;

        let pair = self.mint(&account)?;
        let rotated = self
            .store
            .rotate_refresh_token(
                &account.id,
                &RefreshTokenEntry::hash_token(presented),
                RefreshTokenEntry::new(&pair.refresh_token),
            )
            .await?;

        if !rotated {
            tracing::warn!(account_id = %account.id, "Refresh token reuse detected");
            return Err(AppError::InvalidToken("Invalid refresh token".to_string()));
        }

        Ok((account, pair))
    }

    /// Remove exactly the presented refresh token (logout on one device);
    /// other active sessions keep their tokens.
    pub async fn revoke(&self, account_id: &str, presented: &str) -> Result<bool, AppError> {
        self.store
            .remove_refresh_token(account_id, &RefreshTokenEntry::hash_token(presented))
            .await
    }

    fn mint(&self, account: &Account) -> Result<IssuedPair, AppError> {
        Ok(IssuedPair {
            access_token: self.jwt.generate_access_token(account)?,
            refresh_token: self.jwt.generate_refresh_token(account)?,
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::models::{Provider, ProviderIdentity, REFRESH_TOKEN_CAP};
    use crate::store::MemoryStore;

    fn token_service() -> (Arc<MemoryStore>, TokenService) {
        let store = Arc::new(MemoryStore::new());
        let jwt = JwtService::new(&JwtConfig {
            access_secret: "access-secret".to_string(),
            refresh_secret: "refresh-secret".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        });
        let service = TokenService::new(store.clone(), jwt);
        (store, service)
    }

    async fn seeded_account(store: &MemoryStore) -> Account {
        let account = Account::new(
            Some("a@x.com".to_string()),
            "Test".to_string(),
            None,
            ProviderIdentity::new(Provider::Google, "g1"),
        );
        store.insert_account(&account).await.unwrap();
        account
    }

    #[tokio::test]
    async fn issued_refresh_token_rotates_once() {
        let (store, tokens) = token_service();
        let account = seeded_account(&store).await;

        let pair = tokens.issue_pair(&account).await.unwrap();
        let (_, rotated) = tokens.rotate(&pair.refresh_token).await.unwrap();
        assert!(!rotated.refresh_token.is_empty());

        // The consumed token must never rotate again.
        let reuse = tokens.rotate(&pair.refresh_token).await;
        assert!(matches!(reuse, Err(AppError::InvalidToken(_))));

        // The replacement still works.
        assert!(tokens.rotate(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn garbage_and_unknown_account_tokens_fail() {
        let (_store, tokens) = token_service();
        assert!(matches!(
            tokens.rotate("not-a-jwt").await,
            Err(AppError::InvalidToken(_))
        ));

        // Well-formed token for an account the store has never seen.
        let ghost = Account::new(
            None,
            "Ghost".to_string(),
            None,
            ProviderIdentity::new(Provider::Google, "ghost"),
        );
        let jwt = JwtService::new(&JwtConfig {
            access_secret: "access-secret".to_string(),
            refresh_secret: "refresh-secret".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        });
        let token = jwt.generate_refresh_token(&ghost).unwrap();
        assert!(matches!(
            tokens.rotate(&token).await,
            Err(AppError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn window_never_exceeds_cap() {
        let (store, tokens) = token_service();
        let account = seeded_account(&store).await;

        for _ in 0..8 {
            tokens.issue_pair(&account).await.unwrap();
        }

        let stored = store.find_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_tokens.len(), REFRESH_TOKEN_CAP);
    }

    #[tokio::test]
    async fn revoke_removes_only_the_presented_token() {
        let (store, tokens) = token_service();
        let account = seeded_account(&store).await;

        let first = tokens.issue_pair(&account).await.unwrap();
        let second = tokens.issue_pair(&account).await.unwrap();

        assert!(tokens.revoke(&account.id, &first.refresh_token).await.unwrap());

        // The other device's session survives.
        assert!(tokens.rotate(&second.refresh_token).await.is_ok());
        // Revoking the same token twice is a no-op.
        assert!(!tokens.revoke(&account.id, &first.refresh_token).await.unwrap());
    }
}
