//! End-to-end OAuth flow tests against the mock provider.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, cleared_cookies, location, CookieStore, TestApp, FRONTEND_URL};
use identity_service::models::Provider;
use identity_service::store::AuthStore;

#[tokio::test]
async fn new_login_creates_account_and_session() {
    let app = TestApp::spawn();
    let mut cookies = CookieStore::new();

    // Initiate: state + return-path cookies, redirect to the provider.
    let start = app.get("/auth/google?returnTo=/dashboard", &cookies).await;
    assert!(start.status().is_redirection());
    assert!(location(&start).contains("/auth/google/callback"));
    cookies.apply(&start);
    assert!(cookies.get("oauth_state").is_some());
    assert_eq!(cookies.get("oauth_return_to"), Some("/dashboard"));

    // Callback: session cookies set, redirect to the stored return path.
    let state_value = cookies.get("oauth_state").unwrap().to_string();
    let callback = app
        .get(
            &format!("/auth/google/callback?code=mock-code&state={}", state_value),
            &cookies,
        )
        .await;
    assert!(callback.status().is_redirection());
    assert_eq!(
        location(&callback),
        format!("{}/dashboard", FRONTEND_URL)
    );
    cookies.apply(&callback);
    assert!(cookies.get("accessToken").is_some());
    assert!(cookies.get("refreshToken").is_some());
    // The handshake binding was consumed.
    assert!(cookies.get("oauth_state").is_none());

    // The session authenticates /auth/me.
    let me = app.get("/auth/me", &cookies).await;
    assert_eq!(me.status(), StatusCode::OK);
    let body = body_json(me).await;
    assert_eq!(body["user"]["role"], "user");
    assert_eq!(body["user"]["providers"], serde_json::json!(["google"]));
    assert_eq!(body["user"]["email"], "mock-google@example.com");

    // Exactly one account exists for the mock identity.
    let account = app
        .state
        .store
        .find_account_by_identity(Provider::Google, "mock-google-user")
        .await
        .unwrap()
        .expect("account should exist");
    assert_eq!(body["user"]["id"], account.id.as_str());
    assert!(account.last_login.is_some());
}

#[tokio::test]
async fn second_login_reuses_the_account() {
    let app = TestApp::spawn();

    let mut first = CookieStore::new();
    app.login(Provider::Google, &mut first).await;
    let mut second = CookieStore::new();
    app.login(Provider::Google, &mut second).await;

    let first_id = body_json(app.get("/auth/me", &first).await).await["user"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let second_id = body_json(app.get("/auth/me", &second).await).await["user"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(first_id, second_id);
}

#[tokio::test]
async fn consumed_state_cannot_be_replayed() {
    let app = TestApp::spawn();
    let mut cookies = CookieStore::new();

    let start = app.get("/auth/google", &cookies).await;
    cookies.apply(&start);
    let state_value = cookies.get("oauth_state").unwrap().to_string();
    let callback_path = format!("/auth/google/callback?code=mock-code&state={}", state_value);

    let first = app.get(&callback_path, &cookies).await;
    assert!(!location(&first).contains("error="));
    cookies.apply(&first);

    // The binding was consumed with the first validation; replaying the
    // same redirect fails the state check.
    let replay = app.get(&callback_path, &cookies).await;
    assert!(replay.status().is_redirection());
    assert_eq!(
        location(&replay),
        format!("{}/login?error=auth_failed", FRONTEND_URL)
    );
}

#[tokio::test]
async fn state_mismatch_redirects_with_auth_failed() {
    let app = TestApp::spawn();
    let mut cookies = CookieStore::new();

    let start = app.get("/auth/google", &cookies).await;
    cookies.apply(&start);

    let callback = app
        .get(
            "/auth/google/callback?code=mock-code&state=forged-state",
            &cookies,
        )
        .await;
    assert_eq!(
        location(&callback),
        format!("{}/login?error=auth_failed", FRONTEND_URL)
    );
    cookies.apply(&callback);
    assert!(cookies.get("accessToken").is_none());
}

#[tokio::test]
async fn provider_denial_redirects_with_access_denied() {
    let app = TestApp::spawn();
    let mut cookies = CookieStore::new();

    let start = app.get("/auth/google", &cookies).await;
    cookies.apply(&start);

    let callback = app
        .get("/auth/google/callback?error=access_denied", &cookies)
        .await;
    assert_eq!(
        location(&callback),
        format!("{}/login?error=access_denied", FRONTEND_URL)
    );
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let app = TestApp::spawn();
    let cookies = CookieStore::new();

    let response = app.get("/auth/github", &cookies).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_logout_refresh_end_to_end() {
    let app = TestApp::spawn();
    let mut cookies = CookieStore::new();

    app.login(Provider::Google, &mut cookies).await;
    let account_id = body_json(app.get("/auth/me", &cookies).await).await["user"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Logout clears both session cookies and audits the action.
    let logout = app.post("/auth/logout", &cookies).await;
    assert_eq!(logout.status(), StatusCode::OK);
    let cleared = cleared_cookies(&logout);
    assert!(cleared.contains(&"accessToken".to_string()));
    assert!(cleared.contains(&"refreshToken".to_string()));
    cookies.apply(&logout);

    let events = app
        .state
        .audit
        .recent_for_account(&account_id)
        .await
        .unwrap();
    assert!(events
        .iter()
        .any(|e| e.action == identity_service::models::AuthAction::Logout && e.success));

    // With no refresh cookie the rotation is refused outright.
    let refresh = app.post("/auth/refresh", &cookies).await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(refresh).await;
    assert_eq!(body["error"], "Refresh token required");
}

#[tokio::test]
async fn me_without_session_is_unauthorized() {
    let app = TestApp::spawn();
    let response = app.get("/auth/me", &CookieStore::new()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_check_reports_store_up() {
    let app = TestApp::spawn();
    let response = app.get("/health", &CookieStore::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["store"], "up");
}

#[tokio::test]
async fn correlation_id_is_echoed() {
    let app = TestApp::spawn();
    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header("x-correlation-id", "test-correlation-1234")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::util::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("x-correlation-id")
            .and_then(|v| v.to_str().ok()),
        Some("test-correlation-1234")
    );
}
