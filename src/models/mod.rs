pub mod account;
pub mod auth_event;

pub use account::{
    Account, AccountResponse, Provider, ProviderIdentity, RefreshTokenEntry, Role,
    REFRESH_TOKEN_CAP, REFRESH_TOKEN_TTL_DAYS,
};
pub use auth_event::{AuthAction, AuthEvent, AuthEventResponse, EventProvider, EVENT_RETENTION_DAYS};

/// BSON (de)serialization for `Option<DateTime<Utc>>` fields, the optional
/// counterpart of `mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime`.
pub mod bson_datetime_opt {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => bson::DateTime::from_chrono(*dt).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<bson::DateTime>::deserialize(deserializer)?;
        Ok(value.map(|dt| dt.to_chrono()))
    }
}
