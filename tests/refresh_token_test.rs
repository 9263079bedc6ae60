//! Refresh rotation over the HTTP surface: single-use tokens, cleared
//! cookies on failure.

mod common;

use axum::http::StatusCode;
use common::{body_json, cleared_cookies, CookieStore, TestApp};
use identity_service::models::Provider;

#[tokio::test]
async fn refresh_rotates_the_pair() {
    let app = TestApp::spawn();
    let mut cookies = CookieStore::new();
    app.login(Provider::Google, &mut cookies).await;

    let old_refresh = cookies.get("refreshToken").unwrap().to_string();

    let response = app.post("/auth/refresh", &cookies).await;
    assert_eq!(response.status(), StatusCode::OK);
    cookies.apply(&response);

    let new_refresh = cookies.get("refreshToken").unwrap().to_string();
    assert_ne!(old_refresh, new_refresh);

    // The rotated session still authenticates.
    let me = app.get("/auth/me", &cookies).await;
    assert_eq!(me.status(), StatusCode::OK);
}

#[tokio::test]
async fn rotated_token_cannot_be_used_again() {
    let app = TestApp::spawn();
    let mut cookies = CookieStore::new();
    app.login(Provider::Google, &mut cookies).await;

    let old_refresh = cookies.get("refreshToken").unwrap().to_string();

    let first = app.post("/auth/refresh", &cookies).await;
    assert_eq!(first.status(), StatusCode::OK);

    // Present the pre-rotation token again.
    let mut stale = cookies.clone();
    stale.set("refreshToken", &old_refresh);
    let second = app.post("/auth/refresh", &stale).await;
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);

    // The failed rotation cleared both session cookies.
    let cleared = cleared_cookies(&second);
    assert!(cleared.contains(&"accessToken".to_string()));
    assert!(cleared.contains(&"refreshToken".to_string()));
}

#[tokio::test]
async fn garbage_refresh_cookie_clears_session() {
    let app = TestApp::spawn();
    let mut cookies = CookieStore::new();
    cookies.set("refreshToken", "not-a-jwt");

    let response = app.post("/auth/refresh", &cookies).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid refresh token");
}

#[tokio::test]
async fn logout_on_one_device_leaves_other_sessions_intact() {
    let app = TestApp::spawn();

    let mut device_a = CookieStore::new();
    app.login(Provider::Google, &mut device_a).await;
    let mut device_b = CookieStore::new();
    app.login(Provider::Google, &mut device_b).await;

    let logout = app.post("/auth/logout", &device_a).await;
    assert_eq!(logout.status(), StatusCode::OK);

    // Device B's refresh token survived the revocation on device A.
    let refresh = app.post("/auth/refresh", &device_b).await;
    assert_eq!(refresh.status(), StatusCode::OK);
}
