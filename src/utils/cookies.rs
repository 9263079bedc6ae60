//! Session and handshake cookie assembly.
//!
//! All cookies are HTTP-only on `/`; `Secure` and `SameSite=Strict` in
//! production, `SameSite=Lax` otherwise (the provider redirect must carry
//! the handshake cookies back in dev).

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::Config;
use crate::services::{IssuedPair, HANDSHAKE_TTL_MINUTES};

pub const STATE_COOKIE: &str = "oauth_state";
pub const RETURN_TO_COOKIE: &str = "oauth_return_to";
pub const LINK_COOKIE: &str = "oauth_link";
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

fn build(name: &'static str, value: String, max_age: time::Duration, config: &Config) -> Cookie<'static> {
    let same_site = if config.is_prod() {
        SameSite::Strict
    } else {
        SameSite::Lax
    };
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure())
        .same_site(same_site)
        .max_age(max_age)
        .build()
}

/// Short-lived cookie binding one in-flight handshake.
pub fn handshake_cookie(name: &'static str, value: String, config: &Config) -> Cookie<'static> {
    build(
        name,
        value,
        time::Duration::minutes(HANDSHAKE_TTL_MINUTES),
        config,
    )
}

/// Set both session cookies from a freshly issued pair.
pub fn apply_session(jar: CookieJar, pair: &IssuedPair, config: &Config) -> CookieJar {
    jar.add(build(
        ACCESS_TOKEN_COOKIE,
        pair.access_token.clone(),
        time::Duration::seconds(pair.expires_in),
        config,
    ))
    .add(build(
        REFRESH_TOKEN_COOKIE,
        pair.refresh_token.clone(),
        time::Duration::days(config.jwt.refresh_token_expiry_days),
        config,
    ))
}

fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

/// Consume the handshake binding; it must never validate twice.
pub fn clear_handshake(jar: CookieJar) -> CookieJar {
    jar.remove(removal(STATE_COOKIE))
        .remove(removal(RETURN_TO_COOKIE))
        .remove(removal(LINK_COOKIE))
}

/// Drop both session cookies (logout, failed refresh).
pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(removal(ACCESS_TOKEN_COOKIE))
        .remove(removal(REFRESH_TOKEN_COOKIE))
}
