//! Environment-driven configuration.
//!
//! Everything is read once at startup via `Config::from_env()`; missing
//! values fall back to dev defaults and are hard errors in production.

use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    /// Frontend origin used for post-auth redirects and CORS.
    pub frontend_url: String,
    pub store: StoreConfig,
    pub jwt: JwtConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("Invalid environment: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    /// Connect / server-selection timeout for store calls.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    /// Distinct secret so a refresh token never verifies as an access token.
    pub refresh_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    /// Replace the real providers with the mock provider (local dev, tests).
    pub mock: bool,
    /// Base URL of this service, used to build provider callback URLs.
    pub callback_base_url: String,
    pub http_timeout_seconds: u64,
    pub google: Option<OAuthClientConfig>,
    pub facebook: Option<OAuthClientConfig>,
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::Config(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let port = get_env("PORT", Some("5000"), is_prod)?
            .parse()
            .map_err(|e: std::num::ParseIntError| AppError::Config(anyhow::anyhow!(e)))?;

        let mock_oauth = get_env("MOCK_OAUTH", Some("false"), false)?
            .parse()
            .unwrap_or(false);
        if mock_oauth && is_prod {
            return Err(AppError::Config(anyhow::anyhow!(
                "MOCK_OAUTH must not be enabled in production"
            )));
        }

        let backend = match get_env("STORE_BACKEND", Some("memory"), is_prod)?.as_str() {
            "mongo" | "mongodb" => StoreBackend::Mongo,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(AppError::Config(anyhow::anyhow!(
                    "Invalid STORE_BACKEND: {}",
                    other
                )))
            }
        };
        if backend == StoreBackend::Memory && is_prod {
            return Err(AppError::Config(anyhow::anyhow!(
                "STORE_BACKEND=memory is not allowed in production"
            )));
        }

        let config = Config {
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port,
            frontend_url: get_env("FRONTEND_URL", Some("http://localhost:3000"), is_prod)?,
            store: StoreConfig {
                backend,
                mongodb_uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                mongodb_database: get_env("MONGODB_DATABASE", Some("identity"), is_prod)?,
                timeout_seconds: get_env("STORE_TIMEOUT_SECONDS", Some("5"), false)?
                    .parse()
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                access_secret: get_env("JWT_SECRET", Some("dev-access-secret"), is_prod)?,
                refresh_secret: get_env("JWT_REFRESH_SECRET", Some("dev-refresh-secret"), is_prod)?,
                access_token_expiry_minutes: get_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    false,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| AppError::Config(anyhow::anyhow!(e)))?,
                refresh_token_expiry_days: get_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("7"),
                    false,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| AppError::Config(anyhow::anyhow!(e)))?,
            },
            providers: ProvidersConfig {
                mock: mock_oauth,
                callback_base_url: {
                    let default_base = format!("http://localhost:{}", port);
                    get_env("CALLBACK_BASE_URL", Some(default_base.as_str()), is_prod)?
                },
                http_timeout_seconds: get_env("PROVIDER_TIMEOUT_SECONDS", Some("10"), false)?
                    .parse()
                    .unwrap_or(10),
                google: oauth_client_from_env("GOOGLE", is_prod && !mock_oauth)?,
                facebook: oauth_client_from_env("FACEBOOK", false)?,
            },
            environment,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.port == 0 {
            return Err(AppError::Config(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }
        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::Config(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }
        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::Config(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }
        if self.jwt.access_secret == self.jwt.refresh_secret {
            return Err(AppError::Config(anyhow::anyhow!(
                "JWT_SECRET and JWT_REFRESH_SECRET must differ"
            )));
        }
        if !self.providers.mock
            && self.providers.google.is_none()
            && self.providers.facebook.is_none()
        {
            return Err(AppError::Config(anyhow::anyhow!(
                "At least one identity provider must be configured (or MOCK_OAUTH=true)"
            )));
        }
        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }

    /// Session cookies are `Secure` only over HTTPS deployments.
    pub fn cookie_secure(&self) -> bool {
        self.is_prod()
    }
}

/// Read the `<PREFIX>_CLIENT_ID` / `<PREFIX>_CLIENT_SECRET` pair for one
/// provider. Absent pairs disable the provider unless `required`.
fn oauth_client_from_env(
    prefix: &str,
    required: bool,
) -> Result<Option<OAuthClientConfig>, AppError> {
    let client_id = env::var(format!("{}_CLIENT_ID", prefix)).ok();
    let client_secret = env::var(format!("{}_CLIENT_SECRET", prefix)).ok();

    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(Some(OAuthClientConfig {
            client_id,
            client_secret,
        })),
        (None, None) if !required => Ok(None),
        _ if required => Err(AppError::Config(anyhow::anyhow!(
            "{}_CLIENT_ID and {}_CLIENT_SECRET are required in production",
            prefix,
            prefix
        ))),
        _ => Err(AppError::Config(anyhow::anyhow!(
            "{}_CLIENT_ID and {}_CLIENT_SECRET must be set together",
            prefix,
            prefix
        ))),
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::Config(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::Config(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
