//! Test helpers: an app over the in-memory store and mock providers,
//! driven through the router without binding a socket, plus a minimal
//! browser-like cookie store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use identity_service::{
    build_router,
    config::{
        Config, Environment, JwtConfig, ProvidersConfig, StoreBackend, StoreConfig,
    },
    models::Provider,
    providers::{MockProvider, ProviderRegistry},
    store::MemoryStore,
    AppState,
};

pub const FRONTEND_URL: &str = "http://localhost:3000";

pub fn test_config() -> Config {
    Config {
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        port: 5000,
        frontend_url: FRONTEND_URL.to_string(),
        store: StoreConfig {
            backend: StoreBackend::Memory,
            mongodb_uri: String::new(),
            mongodb_database: String::new(),
            timeout_seconds: 5,
        },
        jwt: JwtConfig {
            access_secret: "test-access-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        providers: ProvidersConfig {
            mock: true,
            callback_base_url: "http://localhost:5000".to_string(),
            http_timeout_seconds: 5,
            google: None,
            facebook: None,
        },
    }
}

/// Test application over the memory store and mock providers.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn spawn() -> Self {
        let config = test_config();

        let mut providers = ProviderRegistry::default();
        for tag in Provider::ALL {
            providers.insert(Arc::new(MockProvider::new(
                tag,
                &config.providers.callback_base_url,
            )));
        }

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(config, store, providers);
        let router = build_router(state.clone()).expect("Failed to build router");

        Self { router, state }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        cookies: &CookieStore,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie_header) = cookies.header() {
            builder = builder.header(header::COOKIE, cookie_header);
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("Failed to build request"),
            None => builder.body(Body::empty()).expect("Failed to build request"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    pub async fn get(&self, path: &str, cookies: &CookieStore) -> Response<Body> {
        self.request(Method::GET, path, cookies, None).await
    }

    pub async fn post(&self, path: &str, cookies: &CookieStore) -> Response<Body> {
        self.request(Method::POST, path, cookies, None).await
    }

    /// Complete a full mock login for `provider`, applying every
    /// Set-Cookie the way a browser would. Returns the session cookies.
    pub async fn login(&self, provider: Provider, cookies: &mut CookieStore) {
        let start = self.get(&format!("/auth/{}", provider), cookies).await;
        assert!(
            start.status().is_redirection(),
            "OAuth start should redirect, got {}",
            start.status()
        );
        cookies.apply(&start);

        let state_value = cookies
            .get("oauth_state")
            .expect("state cookie missing after start")
            .to_string();

        let callback = self
            .get(
                &format!(
                    "/auth/{}/callback?code=mock-code&state={}",
                    provider, state_value
                ),
                cookies,
            )
            .await;
        assert!(
            callback.status().is_redirection(),
            "OAuth callback should redirect, got {}",
            callback.status()
        );
        let target = location(&callback);
        assert!(
            !target.contains("error="),
            "Login callback redirected with error: {}",
            target
        );
        cookies.apply(&callback);
    }
}

/// Minimal browser-like cookie store: applies Set-Cookie headers,
/// including removals.
#[derive(Debug, Default, Clone)]
pub struct CookieStore {
    cookies: HashMap<String, String>,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, response: &Response<Body>) {
        for value in response.headers().get_all(header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or(raw);
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let removed = value.is_empty() || raw.to_lowercase().contains("max-age=0");
            if removed {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn remove(&mut self, name: &str) {
        self.cookies.remove(name);
    }

    pub fn header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Cookie names a response is clearing (empty value or max-age=0).
pub fn cleared_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|raw| {
            let pair = raw.split(';').next().unwrap_or(raw);
            pair.ends_with('=') || raw.to_lowercase().contains("max-age=0")
        })
        .filter_map(|raw| raw.split('=').next().map(str::to_string))
        .collect()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not valid JSON")
}
