//! Tests for the session endpoints.
//!
//! Tests cover:
//! - POST /api/auth/refresh (forced refresh, reuse of an interceptor refresh, failures)
//! - GET /api/auth/session
//! - POST /api/auth/signout
//! - GET /api/profile

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use readlist_session::provider::{AuthClient, AuthClientError};
use readlist_session::session::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, unix_now};
use tower::ServiceExt;

fn request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

// =============================================================================
// Refresh
// =============================================================================

#[tokio::test]
async fn test_refresh_endpoint_forces_refresh() {
    let (app, _db, client) = create_test_app().await;
    let session = client.issue_session("user-1", "reader@example.com").await.unwrap();

    let response = app
        .oneshot(request("POST", "/api/auth/refresh", Some(&auth_cookies(&session))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    let refresh = set_cookie_value(&cookies, REFRESH_COOKIE_NAME).expect("rotated refresh token");
    assert_ne!(refresh, session.refresh_token);
    assert!(set_cookie_value(&cookies, ACCESS_COOKIE_NAME).is_some());

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["id"], "user-1");
    assert_eq!(body["user"]["email"], "reader@example.com");
    let expires_in = body["expires"]["in"].as_i64().unwrap();
    assert!(expires_in > 3500 && expires_in <= 3600);
    assert!(body["expires"]["at"].as_i64().unwrap() > unix_now());
}

#[tokio::test]
async fn test_refresh_endpoint_reuses_interceptor_refresh() {
    let client = Arc::new(MockAuthClient::new());
    let (app, _db) = create_mock_app(client.clone()).await;
    let session = mock_session("user-1", unix_now() + 60, "refresh-1");

    let response = app
        .oneshot(request("POST", "/api/auth/refresh", Some(&auth_cookies(&session))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(client.refresh_calls(), 1);

    let cookies = extract_set_cookies(&response);
    assert_eq!(
        set_cookie_value(&cookies, REFRESH_COOKIE_NAME).as_deref(),
        Some("refresh-1-r1")
    );
    assert_eq!(
        cookies
            .iter()
            .filter(|c| c.starts_with("rl-refresh-token="))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_refresh_endpoint_without_session() {
    let (app, _db, _client) = create_test_app().await;

    let response = app
        .oneshot(request("POST", "/api/auth/refresh", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Authentication required");
}

#[tokio::test]
async fn test_refresh_endpoint_revoked_token() {
    let (app, _db, client) = create_test_app().await;
    let session = client.issue_session("user-1", "reader@example.com").await.unwrap();
    client.sign_out(&session.refresh_token).await.unwrap();

    let response = app
        .oneshot(request("POST", "/api/auth/refresh", Some(&auth_cookies(&session))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, ACCESS_COOKIE_NAME));
    assert!(has_cleared_cookie(&cookies, REFRESH_COOKIE_NAME));
    assert_eq!(
        body_json(response).await["error"],
        "Your session has expired. Please sign in again."
    );
}

#[tokio::test]
async fn test_refresh_endpoint_transient_failure() {
    let client = Arc::new(MockAuthClient::new());
    client.push_error(AuthClientError::Upstream {
        status: 503,
        message: "upstream exploded at line 12".into(),
    });
    let (app, _db) = create_mock_app(client.clone()).await;
    let session = mock_session("user-1", unix_now() + 3600, "refresh-1");

    let response = app
        .oneshot(request("POST", "/api/auth/refresh", Some(&auth_cookies(&session))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(extract_set_cookies(&response).is_empty());
    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "The authentication service is temporarily unavailable. Please try again."
    );
}

// =============================================================================
// Session info
// =============================================================================

#[tokio::test]
async fn test_session_info_anonymous() {
    let (app, _db, _client) = create_test_app().await;

    let response = app
        .oneshot(request("GET", "/api/auth/session", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        serde_json::json!({
            "authenticated": false,
            "status": "absent",
            "refresh": { "needed": false, "reason": "none" }
        })
    );
}

#[tokio::test]
async fn test_session_info_fresh() {
    let (app, _db, client) = create_test_app().await;
    let session = client.issue_session("user-1", "reader@example.com").await.unwrap();

    let response = app
        .oneshot(request("GET", "/api/auth/session", Some(&auth_cookies(&session))))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["status"], "fresh");
    assert_eq!(body["user"]["id"], "user-1");
    assert_eq!(body["expires"]["at"], session.expires_at);
    assert_eq!(body["refresh"]["needed"], false);
}

#[tokio::test]
async fn test_session_info_stale() {
    let client = Arc::new(MockAuthClient::new());
    client.push_error(AuthClientError::Network("timeout".into()));
    let (app, _db) = create_mock_app(client).await;
    let expired = mock_session("user-1", unix_now() - 30, "refresh-1");

    let response = app
        .oneshot(request("GET", "/api/auth/session", Some(&auth_cookies(&expired))))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["status"], "stale");
    assert_eq!(body["expires"]["in"], 0);
    assert_eq!(body["refresh"]["needed"], true);
    assert_eq!(body["refresh"]["reason"], "expired");
}

// =============================================================================
// Sign-out
// =============================================================================

#[tokio::test]
async fn test_signout_revokes_and_clears() {
    let (app, db, client) = create_test_app().await;
    let session = client.issue_session("user-1", "reader@example.com").await.unwrap();
    assert_eq!(db.refresh_tokens().count_by_user("user-1").await.unwrap(), 1);

    let cookie = format!("{}; sb-old-auth-token=x", auth_cookies(&session));
    let response = app
        .oneshot(request("POST", "/api/auth/signout", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, ACCESS_COOKIE_NAME));
    assert!(has_cleared_cookie(&cookies, REFRESH_COOKIE_NAME));
    assert!(has_cleared_cookie(&cookies, "sb-old-auth-token"));
    assert_eq!(body_json(response).await, serde_json::json!({ "success": true }));

    assert_eq!(db.refresh_tokens().count_by_user("user-1").await.unwrap(), 0);
    assert!(client.refresh_session(&session.refresh_token).await.is_err());
}

#[tokio::test]
async fn test_signout_without_session() {
    let client = Arc::new(MockAuthClient::new());
    let (app, _db) = create_mock_app(client.clone()).await;

    let response = app
        .oneshot(request("POST", "/api/auth/signout", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(has_cleared_cookie(&extract_set_cookies(&response), ACCESS_COOKIE_NAME));
    assert_eq!(client.sign_out_calls(), 0);
}

#[tokio::test]
async fn test_signout_overrides_renewal() {
    let client = Arc::new(MockAuthClient::new());
    let (app, _db) = create_mock_app(client.clone()).await;
    let session = mock_session("user-1", unix_now() + 60, "refresh-1");

    let response = app
        .oneshot(request("POST", "/api/auth/signout", Some(&auth_cookies(&session))))
        .await
        .unwrap();

    assert_eq!(client.refresh_calls(), 1);
    assert_eq!(client.sign_out_calls(), 1);
    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, ACCESS_COOKIE_NAME));
    assert!(set_cookie_value(&cookies, ACCESS_COOKIE_NAME).is_none());
}

// =============================================================================
// Profile
// =============================================================================

#[tokio::test]
async fn test_profile_uses_stored_row() {
    let (app, db, client) = create_test_app().await;
    let session = client.issue_session("user-1", "reader@example.com").await.unwrap();
    db.profiles()
        .upsert("user-1", "reader@example.com", Some("Avid Reader"))
        .await
        .unwrap();

    let response = app
        .oneshot(request("GET", "/api/profile", Some(&auth_cookies(&session))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["display_name"], "Avid Reader");
    assert!(body["created_at"].is_string());
}

#[tokio::test]
async fn test_profile_falls_back_to_session_identity() {
    let client = Arc::new(MockAuthClient::new());
    let (app, _db) = create_mock_app(client).await;
    let session = mock_session("user-9", unix_now() + 3600, "refresh-9");

    let response = app
        .oneshot(request("GET", "/api/profile", Some(&auth_cookies(&session))))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["id"], "user-9");
    assert_eq!(body["email"], "user-9@example.com");
    assert!(body["display_name"].is_null());
}
