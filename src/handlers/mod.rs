//! HTTP handlers - the session boundary.
//!
//! The only layer the framework invokes directly; each handler composes
//! the state guard, resolver, token issuer, and audit sink into one
//! request flow.

pub mod oauth;
pub mod session;
pub mod user;

use std::net::SocketAddr;

use axum::http::{header, HeaderMap};

/// Client ip (proxy-aware) and user agent for audit records.
pub(crate) fn client_meta(
    headers: &HeaderMap,
    addr: Option<&SocketAddr>,
) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| addr.map(|a| a.ip().to_string()));

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    (ip, user_agent)
}
