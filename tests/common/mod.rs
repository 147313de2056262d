#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{Router, body::Body, http::Response};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use readlist_session::{
    AppConfig, create_app,
    db::Database,
    provider::{AuthClient, AuthClientError, AuthStateChange, LocalAuthClient},
    session::{ACCESS_COOKIE_NAME, CookieSettings, REFRESH_COOKIE_NAME, Session, unix_now},
};
use tokio::sync::broadcast;

pub const TEST_SECRET: &[u8] = b"test-secret-key-for-testing-only";

/// App config with insecure cookies so tests can inspect plain attributes.
pub fn test_config() -> AppConfig {
    AppConfig {
        cookies: CookieSettings {
            secure: false,
            ..CookieSettings::default()
        },
        ..AppConfig::default()
    }
}

/// Create a test app backed by the local provider and an in-memory database.
pub async fn create_test_app() -> (Router, Database, Arc<LocalAuthClient>) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let client = Arc::new(LocalAuthClient::new(TEST_SECRET, db.clone()));
    (create_app(&test_config(), client.clone(), db.clone()), db, client)
}

/// Create a test app around a mock provider.
pub async fn create_mock_app(client: Arc<MockAuthClient>) -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    (create_app(&test_config(), client, db.clone()), db)
}

pub fn auth_cookies(session: &Session) -> String {
    format!(
        "{}={}; {}={}",
        ACCESS_COOKIE_NAME, session.access_token, REFRESH_COOKIE_NAME, session.refresh_token
    )
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of the Set-Cookie for `name`, unless it is a deletion.
pub fn set_cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .filter(|c| c.starts_with(&prefix) && !c.contains("Max-Age=0"))
        .find_map(|c| c[prefix.len()..].split(';').next().map(str::to_string))
}

/// Check if cookies contain `name` being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .any(|c| c.starts_with(&prefix) && c.contains("Max-Age=0"))
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// A session whose access token decodes like a JWT but carries `signature`.
pub fn mock_session(user_id: &str, expires_at: i64, refresh_token: &str) -> Session {
    mock_session_signed(user_id, expires_at, refresh_token, "valid")
}

pub fn mock_session_signed(
    user_id: &str,
    expires_at: i64,
    refresh_token: &str,
    signature: &str,
) -> Session {
    let email = format!("{}@example.com", user_id);
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "sub": user_id, "email": email, "exp": expires_at }).to_string(),
    );
    Session {
        access_token: format!("{}.{}.{}", header, payload, signature),
        refresh_token: refresh_token.to_string(),
        user_id: user_id.to_string(),
        user_email: email,
        expires_at,
    }
}

/// Scriptable identity provider.
///
/// Refreshes pop scripted results first; with the script empty they succeed
/// with a one-hour session and a fresh refresh token. Access tokens whose
/// signature segment is `forged` fail verification.
pub struct MockAuthClient {
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    script: Mutex<VecDeque<Result<Session, AuthClientError>>>,
    provider_session: Mutex<Option<Session>>,
    delay: Duration,
    events: broadcast::Sender<AuthStateChange>,
}

impl MockAuthClient {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            provider_session: Mutex::new(None),
            delay: Duration::ZERO,
            events,
        }
    }

    /// Make every refresh take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_result(&self, result: Result<Session, AuthClientError>) {
        self.script.lock().push_back(result);
    }

    pub fn push_error(&self, error: AuthClientError) {
        self.push_result(Err(error));
    }

    pub fn set_provider_session(&self, session: Option<Session>) {
        *self.provider_session.lock() = session;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    pub fn emit(&self, change: AuthStateChange) {
        let _ = self.events.send(change);
    }
}

impl AuthClient for MockAuthClient {
    async fn get_session(&self) -> Result<Option<Session>, AuthClientError> {
        Ok(self.provider_session.lock().clone())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthClientError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(mock_session(
                "user-1",
                unix_now() + 3600,
                &format!("{}-r{}", refresh_token, n),
            ))
        })
    }

    async fn sign_out(&self, _refresh_token: &str) -> Result<(), AuthClientError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }

    fn verify_access_token(&self, access_token: &str) -> Result<(), AuthClientError> {
        if access_token.ends_with(".forged") {
            Err(AuthClientError::InvalidGrant("bad signature".into()))
        } else {
            Ok(())
        }
    }
}
