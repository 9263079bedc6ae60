//! MongoDB store.
//!
//! Uniqueness and retention live in the indexes: a unique compound index
//! on identity keys backs the resolver's insert-if-absent primitive, and a
//! TTL index expires audit events. Rotation is a conditional `$pull`
//! against the matched token hash, so concurrent rotations of the same
//! token admit exactly one winner.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc},
    options::{
        ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
    },
    Client as MongoClient, Collection, Database, IndexModel,
};

use crate::config::StoreConfig;
use crate::error::AppError;
use crate::models::{
    Account, AuthEvent, Provider, ProviderIdentity, RefreshTokenEntry, EVENT_RETENTION_DAYS,
    REFRESH_TOKEN_CAP, REFRESH_TOKEN_TTL_DAYS,
};

use super::{AttachOutcome, AuthStore, InsertOutcome};

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    /// Connect with bounded connect/server-selection timeouts so store
    /// calls surface `Persistence` errors instead of hanging.
    pub async fn connect(config: &StoreConfig) -> Result<Self, AppError> {
        tracing::info!(database = %config.mongodb_database, "Connecting to MongoDB");
        let mut options = ClientOptions::parse(&config.mongodb_uri)
            .await
            .map_err(|e| AppError::Persistence(anyhow::anyhow!("Invalid MongoDB URI: {}", e)))?;
        options.connect_timeout = Some(Duration::from_secs(config.timeout_seconds));
        options.server_selection_timeout = Some(Duration::from_secs(config.timeout_seconds));

        let client = MongoClient::with_options(options)
            .map_err(|e| AppError::Persistence(anyhow::anyhow!(e)))?;
        let db = client.database(&config.mongodb_database);
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        let accounts = self.accounts();

        // Sparse so accounts without an email coexist.
        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("email_unique".to_string())
                    .unique(true)
                    .sparse(true)
                    .build(),
            )
            .build();
        accounts.create_index(email_index, None).await?;

        // Global uniqueness of (provider, subject): the resolver's
        // insert-if-absent primitive.
        let identity_index = IndexModel::builder()
            .keys(doc! { "identities.provider": 1, "identities.subject": 1 })
            .options(
                IndexOptions::builder()
                    .name("identity_unique".to_string())
                    .unique(true)
                    .sparse(true)
                    .build(),
            )
            .build();
        accounts.create_index(identity_index, None).await?;

        let events = self.auth_events();

        let account_created_index = IndexModel::builder()
            .keys(doc! { "account_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("account_created_lookup".to_string())
                    .build(),
            )
            .build();
        events.create_index(account_created_index, None).await?;

        let ttl_index = IndexModel::builder()
            .keys(doc! { "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("created_at_ttl".to_string())
                    .expire_after(Duration::from_secs(EVENT_RETENTION_DAYS as u64 * 86_400))
                    .build(),
            )
            .build();
        events.create_index(ttl_index, None).await?;

        let correlation_index = IndexModel::builder()
            .keys(doc! { "correlation_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("correlation_lookup".to_string())
                    .build(),
            )
            .build();
        events.create_index(correlation_index, None).await?;

        tracing::info!("MongoDB indexes initialized");
        Ok(())
    }

    fn accounts(&self) -> Collection<Account> {
        self.db.collection("accounts")
    }

    fn auth_events(&self) -> Collection<AuthEvent> {
        self.db.collection("auth_events")
    }

    fn stale_cutoff() -> bson::DateTime {
        bson::DateTime::from_chrono(Utc::now() - chrono::Duration::days(REFRESH_TOKEN_TTL_DAYS))
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match &*err.kind {
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(we)) => {
            we.code == 11000
        }
        mongodb::error::ErrorKind::Command(ce) => ce.code == 11000,
        _ => false,
    }
}

#[async_trait]
impl AuthStore for MongoStore {
    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }

    async fn find_account(&self, account_id: &str) -> Result<Option<Account>, AppError> {
        Ok(self
            .accounts()
            .find_one(doc! { "_id": account_id }, None)
            .await?)
    }

    async fn find_account_by_identity(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<Account>, AppError> {
        let filter = doc! {
            "identities": {
                "$elemMatch": { "provider": provider.as_str(), "subject": subject }
            }
        };
        Ok(self.accounts().find_one(filter, None).await?)
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        Ok(self
            .accounts()
            .find_one(doc! { "email": email.trim().to_lowercase() }, None)
            .await?)
    }

    async fn insert_account(&self, account: &Account) -> Result<InsertOutcome, AppError> {
        match self.accounts().insert_one(account, None).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_duplicate_key(&e) => Ok(InsertOutcome::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn attach_identity(
        &self,
        account_id: &str,
        identity: ProviderIdentity,
    ) -> Result<AttachOutcome, AppError> {
        let identity_bson = bson::to_bson(&identity)
            .map_err(|e| AppError::Persistence(anyhow::anyhow!(e)))?;

        // The filter refuses a second identity for the same provider on
        // this account; the unique index refuses identities claimed by
        // other accounts.
        let filter = doc! {
            "_id": account_id,
            "identities.provider": { "$ne": identity.provider.as_str() },
        };
        let update = doc! {
            "$push": { "identities": identity_bson },
            "$addToSet": { "providers": identity.provider.as_str() },
            "$set": { "updated_at": bson::DateTime::now() },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        match self
            .accounts()
            .find_one_and_update(filter, update, options)
            .await
        {
            Ok(Some(account)) => Ok(AttachOutcome::Attached(account)),
            Ok(None) => {
                // Unmatched filter: either the account is gone or the
                // provider is already linked there.
                if self.find_account(account_id).await?.is_some() {
                    Ok(AttachOutcome::AlreadyLinked)
                } else {
                    Err(AppError::NotFound("Account not found".to_string()))
                }
            }
            Err(e) if is_duplicate_key(&e) => Ok(AttachOutcome::IdentityTaken),
            Err(e) => Err(e.into()),
        }
    }

    async fn detach_identity(
        &self,
        account_id: &str,
        provider: Provider,
    ) -> Result<Account, AppError> {
        let update = doc! {
            "$pull": {
                "identities": { "provider": provider.as_str() },
                "providers": provider.as_str(),
            },
            "$set": { "updated_at": bson::DateTime::now() },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.accounts()
            .find_one_and_update(doc! { "_id": account_id }, update, options)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    async fn update_profile(
        &self,
        account_id: &str,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Account, AppError> {
        let mut set = doc! { "updated_at": bson::DateTime::now() };
        if let Some(name) = name {
            set.insert("name", name);
        }
        if let Some(avatar_url) = avatar_url {
            set.insert("avatar_url", avatar_url);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.accounts()
            .find_one_and_update(doc! { "_id": account_id }, doc! { "$set": set }, options)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    async fn touch_last_login(&self, account_id: &str) -> Result<(), AppError> {
        self.accounts()
            .update_one(
                doc! { "_id": account_id },
                doc! { "$set": { "last_login": bson::DateTime::now() } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn push_refresh_token(
        &self,
        account_id: &str,
        entry: RefreshTokenEntry,
    ) -> Result<(), AppError> {
        let entry_bson =
            bson::to_bson(&entry).map_err(|e| AppError::Persistence(anyhow::anyhow!(e)))?;

        // Drop stale entries first so they never count against the cap.
        self.accounts()
            .update_one(
                doc! { "_id": account_id },
                doc! { "$pull": { "refresh_tokens": { "issued_at": { "$lt": Self::stale_cutoff() } } } },
                None,
            )
            .await?;

        let result = self
            .accounts()
            .update_one(
                doc! { "_id": account_id },
                doc! {
                    "$push": {
                        "refresh_tokens": {
                            "$each": [entry_bson],
                            "$slice": -(REFRESH_TOKEN_CAP as i64),
                        }
                    },
                    "$set": { "updated_at": bson::DateTime::now() },
                },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        account_id: &str,
        presented_hash: &str,
        replacement: RefreshTokenEntry,
    ) -> Result<bool, AppError> {
        // Conditional pull: matches only while the presented hash is still
        // in the window and fresh. The losing concurrent rotation matches
        // nothing and fails the gate.
        let filter = doc! {
            "_id": account_id,
            "refresh_tokens": {
                "$elemMatch": {
                    "token_hash": presented_hash,
                    "issued_at": { "$gte": Self::stale_cutoff() },
                }
            }
        };
        let removed = self
            .accounts()
            .update_one(
                filter,
                doc! { "$pull": { "refresh_tokens": { "token_hash": presented_hash } } },
                None,
            )
            .await?;

        if removed.modified_count == 0 {
            return Ok(false);
        }

        self.push_refresh_token(account_id, replacement).await?;
        Ok(true)
    }

    async fn remove_refresh_token(
        &self,
        account_id: &str,
        token_hash: &str,
    ) -> Result<bool, AppError> {
        let result = self
            .accounts()
            .update_one(
                doc! { "_id": account_id },
                doc! { "$pull": { "refresh_tokens": { "token_hash": token_hash } } },
                None,
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn append_event(&self, event: &AuthEvent) -> Result<(), AppError> {
        self.auth_events().insert_one(event, None).await?;
        Ok(())
    }

    async fn recent_events(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .build();
        let cursor = self
            .auth_events()
            .find(doc! { "account_id": account_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }
}
