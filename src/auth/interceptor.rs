//! Session middleware.

use std::collections::HashSet;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::SessionState;
use crate::provider::AuthClient;
use crate::session::{
    CookieRead, CookieRecord, Recoverability, Session, TokenStore, UserIdentity, classify, decide,
    unix_now,
};

/// Outcome of session reconstruction for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session cookies, or cookies that could not be trusted.
    Absent,
    /// Valid and not due for refresh.
    Fresh,
    /// Refreshed during this request; new cookies go out on the response.
    Renewed,
    /// Refresh was due but failed transiently; the old session is kept.
    Stale,
    /// The identity provider rejected the refresh; cookies are deleted. The
    /// old session stays visible but no longer authenticates.
    Revoked,
}

/// The session as established for the current request.
#[derive(Debug, Clone)]
pub struct RequestSession {
    pub session: Option<Session>,
    pub status: SessionStatus,
    /// Unix seconds at which the interceptor evaluated the session
    pub checked_at: i64,
}

impl RequestSession {
    pub fn anonymous(now: i64) -> Self {
        Self {
            session: None,
            status: SessionStatus::Absent,
            checked_at: now,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some() && self.status != SessionStatus::Revoked
    }

    /// Identity of an authenticated session.
    pub fn user(&self) -> Option<UserIdentity> {
        self.authenticated_session().map(Session::user)
    }

    pub fn authenticated_session(&self) -> Option<&Session> {
        self.session
            .as_ref()
            .filter(|_| self.status != SessionStatus::Revoked)
    }

    /// Whether the session may be used for a request with `method`.
    ///
    /// Reads tolerate an expired session that could not be renewed;
    /// anything else needs an unexpired one.
    pub fn permits(&self, method: &Method, now: i64) -> Result<&Session, AuthErrorKind> {
        let session = self
            .authenticated_session()
            .ok_or(AuthErrorKind::NotAuthenticated)?;
        if session.is_expired(now) && !method.is_safe() {
            return Err(AuthErrorKind::SessionExpired);
        }
        Ok(session)
    }
}

/// Middleware that establishes the [`RequestSession`] and keeps the session
/// cookies in sync.
///
/// Install with `axum::middleware::from_fn_with_state`.
pub async fn session_interceptor<C: AuthClient>(
    State(state): State<SessionState<C>>,
    mut req: Request,
    next: Next,
) -> Response {
    let now = unix_now();
    let path = req.uri().path().to_string();
    let protected = state.routes.is_protected(&path);

    let incoming = incoming_cookies(req.headers());
    let mut outbound = state.cookies.purge_legacy(&incoming);
    if !outbound.is_empty() {
        debug!(path = %path, count = outbound.len(), "Purging legacy cookies");
    }

    let store = TokenStore::new();
    match state.cookies.read(&incoming) {
        CookieRead::Present(session) => {
            match state.client.verify_access_token(&session.access_token) {
                Ok(()) => {
                    store.set(session);
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Rejecting session cookie");
                    outbound.extend(state.cookies.purge(&incoming));
                }
            }
        }
        CookieRead::Corrupt(reason) => {
            warn!(path = %path, %reason, "Discarding corrupt session cookies");
            outbound.extend(state.cookies.purge(&incoming));
        }
        CookieRead::Absent => {}
    }

    let status = match store.get() {
        None => SessionStatus::Absent,
        Some(session) if !decide(Some(&session), now).must_refresh => SessionStatus::Fresh,
        Some(session) => match state.refresher.refresh(&state.client, &session.refresh_token).await {
            Ok(renewed) => {
                debug!(path = %path, user_id = %renewed.user_id, "Session renewed");
                outbound.extend(state.cookies.write(&renewed, now));
                store.replace(Some(renewed));
                SessionStatus::Renewed
            }
            Err(e) => match classify(&e) {
                Recoverability::Retryable => {
                    warn!(
                        path = %path,
                        user_id = %session.user_id,
                        error = %e,
                        "Refresh failed, continuing with current session"
                    );
                    SessionStatus::Stale
                }
                Recoverability::Terminal => {
                    info!(
                        path = %path,
                        user_id = %session.user_id,
                        error = %e,
                        "Refresh rejected, clearing session"
                    );
                    outbound.extend(state.cookies.clear());
                    SessionStatus::Revoked
                }
            },
        },
    };

    let request_session = RequestSession {
        session: store.get(),
        status,
        checked_at: now,
    };

    if protected {
        if let Err(kind) = request_session.permits(req.method(), now) {
            debug!(path = %path, ?status, ?kind, "Rejecting unauthenticated request");
            return ApiAuthError::new(AuthErrorKind::NotAuthenticated)
                .with_cookies(outbound)
                .into_response();
        }
    }

    req.extensions_mut().insert(request_session);
    let mut response = next.run(req).await;
    append_set_cookies(response.headers_mut(), &outbound);
    response
}

/// Append `records` as `Set-Cookie` headers.
///
/// A name that already has a `Set-Cookie` header is skipped, as is a repeat
/// within `records`; the first value for a name wins.
pub fn append_set_cookies(headers: &mut HeaderMap, records: &[CookieRecord]) {
    let mut seen: HashSet<String> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split_once('='))
        .map(|(name, _)| name.trim().to_string())
        .collect();

    for record in records {
        if !seen.insert(record.name.clone()) {
            continue;
        }
        match HeaderValue::from_str(&record.to_header_value()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(name = %record.name, error = %e, "Skipping unencodable cookie"),
        }
    }
}

fn incoming_cookies(headers: &HeaderMap) -> Vec<CookieRecord> {
    CookieJar::from_headers(headers)
        .iter()
        .map(|cookie| CookieRecord::incoming(cookie.name(), cookie.value()))
        .collect()
}
