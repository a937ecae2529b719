//! Tests for the session authentication endpoints.
//!
//! Tests cover:
//! - Registration (field validation, duplicate accounts, issued cookies)
//! - Password login and credential failures
//! - Identity lookup via the access cookie
//! - The refresh protocol, including rotation and version-based revocation
//! - Logout revocation semantics and idempotency
//! - The cookie-presence probe

use authgate::{
    ServerConfig, create_app,
    db::Database,
    jwt::{AccessClaims, JwtConfig},
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

const ACCESS_SECRET: &[u8] = b"test-access-secret-of-decent-length";
const REFRESH_SECRET: &[u8] = b"test-refresh-secret-of-decent-length";

/// Create a test app and return (app, db, jwt_config).
async fn create_test_app() -> (axum::Router, Database, JwtConfig) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let jwt_config = JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET);
    let config = ServerConfig {
        db: db.clone(),
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        secure_cookies: false,
    };
    (create_app(&config), db, jwt_config)
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extract Set-Cookie headers from a response.
fn extract_set_cookies(response: &axum::http::Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Pull the bare `name=value` pair out of a Set-Cookie header.
fn cookie_pair<'a>(set_cookie: &'a str) -> &'a str {
    set_cookie.split(';').next().unwrap().trim()
}

fn find_cookie<'a>(cookies: &'a [String], name: &str) -> Option<&'a String> {
    cookies
        .iter()
        .find(|c| c.starts_with(&format!("{}=", name)))
}

/// Register a user and return the (auth_token, refresh_token) cookie pairs.
async fn register_user(app: &axum::Router, email: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(json_request(
            "/auth/register",
            serde_json::json!({ "name": "Ann", "email": email, "password": "hunter2" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    let auth = cookie_pair(find_cookie(&cookies, "auth_token").unwrap()).to_string();
    let refresh = cookie_pair(find_cookie(&cookies, "refresh_token").unwrap()).to_string();
    (auth, refresh)
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_sets_both_cookies_with_max_ages() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(json_request(
            "/auth/register",
            serde_json::json!({ "name": "Ann", "email": "a@x.com", "password": "pw" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let auth = find_cookie(&cookies, "auth_token").expect("auth cookie set");
    let refresh = find_cookie(&cookies, "refresh_token").expect("refresh cookie set");

    assert!(auth.contains("Max-Age=900"));
    assert!(auth.contains("HttpOnly"));
    assert!(auth.contains("Path=/"));
    assert!(refresh.contains("Max-Age=604800"));
    assert!(refresh.contains("HttpOnly"));

    let body = response_json(response).await;
    assert_eq!(body["user"]["email"], "a@x.com");
    assert_eq!(body["user"]["name"], "Ann");
    assert_eq!(body["user"]["tokenVersion"], 0);
    // Password hash never leaves the server
    assert!(body["user"].get("password").is_none());
    assert!(body["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_register_missing_fields() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "/auth/register",
            serde_json::json!({ "email": "a@x.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Empty strings count as missing
    let response = app
        .oneshot(json_request(
            "/auth/register",
            serde_json::json!({ "name": "", "email": "a@x.com", "password": "pw" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let (app, _, _) = create_test_app().await;

    register_user(&app, "a@x.com").await;

    let response = app
        .oneshot(json_request(
            "/auth/register",
            serde_json::json!({ "name": "Other", "email": "a@x.com", "password": "pw" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["message"], "User already exists");
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_returns_user_and_cookies() {
    let (app, _, _) = create_test_app().await;
    register_user(&app, "a@x.com").await;

    let response = app
        .oneshot(json_request(
            "/auth/login",
            serde_json::json!({ "email": "a@x.com", "password": "hunter2" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    assert!(find_cookie(&cookies, "auth_token").is_some());
    assert!(find_cookie(&cookies, "refresh_token").is_some());

    let body = response_json(response).await;
    assert_eq!(body["user"]["email"], "a@x.com");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let (app, _, _) = create_test_app().await;
    register_user(&app, "a@x.com").await;

    let response = app
        .oneshot(json_request(
            "/auth/login",
            serde_json::json!({ "email": "a@x.com", "password": "wrong" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&response).is_empty());

    let body = response_json(response).await;
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_unknown_email_same_response() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(json_request(
            "/auth/login",
            serde_json::json!({ "email": "nobody@x.com", "password": "pw" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_missing_fields() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(json_request(
            "/auth/login",
            serde_json::json!({ "email": "a@x.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Identity lookup
// =============================================================================

#[tokio::test]
async fn test_me_requires_access_token() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_current_user() {
    let (app, _, _) = create_test_app().await;
    let (auth, _) = register_user(&app, "a@x.com").await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/me")
                .header("cookie", auth)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["user"]["email"], "a@x.com");
    assert_eq!(body["user"]["role"], "user");
}

#[tokio::test]
async fn test_me_rejects_garbage_token() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/me")
                .header("cookie", "auth_token=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_user_gone_returns_not_found() {
    let (app, db, _) = create_test_app().await;
    let (auth, _) = register_user(&app, "a@x.com").await;

    sqlx::query("DELETE FROM users")
        .execute(db.pool())
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/me")
                .header("cookie", auth)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Refresh protocol
// =============================================================================

/// Mint an access token that expired in the past, correctly signed.
fn expired_access_token(uuid: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = AccessClaims {
        sub: uuid.to_string(),
        iat: now - 1000,
        exp: now - 100,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(ACCESS_SECRET),
    )
    .unwrap()
}

#[tokio::test]
async fn test_refresh_without_cookie() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["error"], "no_refresh_token");
}

#[tokio::test]
async fn test_refresh_with_garbage_token() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("cookie", "refresh_token=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_refresh_rotates_both_tokens() {
    let (app, _, _) = create_test_app().await;
    let (_, refresh) = register_user(&app, "a@x.com").await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("cookie", &refresh)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let new_auth = find_cookie(&cookies, "auth_token").expect("new access cookie");
    let new_refresh = find_cookie(&cookies, "refresh_token").expect("new refresh cookie");
    assert!(new_auth.contains("Max-Age=900"));
    assert!(new_refresh.contains("Max-Age=604800"));

    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["email"], "a@x.com");
}

/// Expired access token -> 401 from /me -> refresh -> new pair works on /me.
#[tokio::test]
async fn test_session_survives_access_expiry_via_refresh() {
    let (app, db, _) = create_test_app().await;
    let (_, refresh) = register_user(&app, "a@x.com").await;

    let user = db.users().get_by_email("a@x.com").await.unwrap().unwrap();
    let expired = format!("auth_token={}", expired_access_token(&user.uuid));

    // Expired access token is rejected even though it is correctly signed
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/me")
                .header("cookie", &expired)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The still-valid refresh cookie rescues the session
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("cookie", &refresh)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let new_auth = cookie_pair(find_cookie(&cookies, "auth_token").unwrap());

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/me")
                .header("cookie", new_auth)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Logout and revocation
// =============================================================================

#[tokio::test]
async fn test_logout_clears_cookies_and_increments_version() {
    let (app, db, _) = create_test_app().await;
    let (_, refresh) = register_user(&app, "a@x.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header("cookie", &refresh)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    assert!(
        cookies
            .iter()
            .any(|c| c.starts_with("auth_token=;") && c.contains("Max-Age=0"))
    );
    assert!(
        cookies
            .iter()
            .any(|c| c.starts_with("refresh_token=;") && c.contains("Max-Age=0"))
    );

    let user = db.users().get_by_email("a@x.com").await.unwrap().unwrap();
    assert_eq!(user.token_version, 1);
}

/// A refresh token that survived logout client-side is dead on arrival.
#[tokio::test]
async fn test_stale_refresh_token_rejected_after_logout() {
    let (app, _, _) = create_test_app().await;
    let (_, refresh) = register_user(&app, "a@x.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header("cookie", &refresh)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Replay the original refresh token: unexpired, correctly signed, stale version
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("cookie", &refresh)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["error"], "invalid_token_version");
}

#[tokio::test]
async fn test_logout_without_token_increments_nothing() {
    let (app, db, _) = create_test_app().await;
    register_user(&app, "a@x.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header("cookie", "refresh_token=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let user = db.users().get_by_email("a@x.com").await.unwrap().unwrap();
    assert_eq!(user.token_version, 0);
}

#[tokio::test]
async fn test_each_logout_increments_once() {
    let (app, db, jwt) = create_test_app().await;
    register_user(&app, "a@x.com").await;

    // Re-mint a matching refresh token before each logout; every call with a
    // valid token bumps the counter exactly once
    for expected in 1..=3 {
        let user = db.users().get_by_email("a@x.com").await.unwrap().unwrap();
        let refresh = jwt
            .generate_refresh_token(&user.uuid, user.token_version)
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/logout")
                    .header("cookie", format!("refresh_token={}", refresh.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let user = db.users().get_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(user.token_version, expected);
    }
}

// =============================================================================
// Cookie probe
// =============================================================================

#[tokio::test]
async fn test_cookie_status_reports_presence() {
    let (app, _, _) = create_test_app().await;
    let (auth, refresh) = register_user(&app, "a@x.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/cookie-status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["hasAuthToken"], false);
    assert_eq!(body["hasRefreshToken"], false);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/cookie-status")
                .header("cookie", format!("{}; {}", auth, refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["hasAuthToken"], true);
    assert_eq!(body["hasRefreshToken"], true);
}
