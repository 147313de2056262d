//! Session endpoints.
//!
//! - POST `/refresh` - Force a refresh of the cookie session
//! - GET `/session` - Describe the current session
//! - POST `/signout` - Revoke the refresh token and delete auth cookies

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::{info, warn};

use super::error::ApiError;
use crate::auth::{
    ApiAuthError, AuthErrorKind, CurrentSession, SessionState, SessionStatus, append_set_cookies,
};
use crate::provider::AuthClient;
use crate::session::{
    Recoverability, RefreshReason, Session, UserIdentity, classify, decide, error_message,
    unix_now,
};

pub fn router<C: AuthClient>(state: SessionState<C>) -> Router {
    Router::new()
        .route("/refresh", post(refresh::<C>))
        .route("/session", get(session_info))
        .route("/signout", post(sign_out::<C>))
        .with_state(state)
}

#[derive(Serialize)]
struct ExpiresInfo {
    /// Unix seconds
    at: i64,
    /// Seconds from now, clamped at zero
    #[serde(rename = "in")]
    in_secs: i64,
}

impl ExpiresInfo {
    fn of(session: &Session, now: i64) -> Self {
        Self {
            at: session.expires_at,
            in_secs: session.expires_in(now),
        }
    }
}

#[derive(Serialize)]
struct RefreshResponse {
    success: bool,
    user: UserIdentity,
    expires: ExpiresInfo,
}

/// Refresh the session carried by the request cookies.
///
/// If the interceptor already renewed the session for this request, that
/// result is returned instead of spending the rotated refresh token again.
async fn refresh<C: AuthClient>(
    State(state): State<SessionState<C>>,
    CurrentSession(current): CurrentSession,
) -> Result<Response, RefreshError> {
    let now = unix_now();
    // A revoked session already had its cookies cleared by the interceptor
    let session = current
        .authenticated_session()
        .cloned()
        .ok_or_else(|| RefreshError::Auth(AuthErrorKind::NotAuthenticated.into()))?;

    let (session, cookies) = if current.status == SessionStatus::Renewed {
        // Cookies for the renewed session are added by the interceptor
        (session, Vec::new())
    } else {
        match state
            .refresher
            .refresh(&state.client, &session.refresh_token)
            .await
        {
            Ok(renewed) => {
                let cookies = state.cookies.write(&renewed, now);
                (renewed, cookies)
            }
            Err(e) => {
                let message = error_message(&e);
                return Err(match classify(&e) {
                    Recoverability::Terminal => {
                        info!(user_id = %session.user_id, error = %e, "Refresh rejected");
                        RefreshError::Auth(
                            ApiAuthError::new(AuthErrorKind::Rejected(message))
                                .with_cookies(state.cookies.clear()),
                        )
                    }
                    Recoverability::Retryable => {
                        warn!(user_id = %session.user_id, error = %e, "Refresh failed");
                        RefreshError::Api(ApiError::internal(message))
                    }
                });
            }
        }
    };

    let mut response = Json(RefreshResponse {
        success: true,
        user: session.user(),
        expires: ExpiresInfo::of(&session, now),
    })
    .into_response();
    append_set_cookies(response.headers_mut(), &cookies);
    Ok(response)
}

enum RefreshError {
    Auth(ApiAuthError),
    Api(ApiError),
}

impl IntoResponse for RefreshError {
    fn into_response(self) -> Response {
        match self {
            RefreshError::Auth(e) => e.into_response(),
            RefreshError::Api(e) => e.into_response(),
        }
    }
}

#[derive(Serialize)]
struct RefreshInfo {
    needed: bool,
    reason: RefreshReason,
}

#[derive(Serialize)]
struct SessionResponse {
    authenticated: bool,
    status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<UserIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires: Option<ExpiresInfo>,
    refresh: RefreshInfo,
}

async fn session_info(CurrentSession(current): CurrentSession) -> Json<SessionResponse> {
    let now = unix_now();
    let decision = decide(current.authenticated_session(), now);

    Json(SessionResponse {
        authenticated: current.is_authenticated(),
        status: current.status,
        user: current.user(),
        expires: current
            .authenticated_session()
            .map(|s| ExpiresInfo::of(s, now)),
        refresh: RefreshInfo {
            needed: decision.must_refresh,
            reason: decision.reason,
        },
    })
}

#[derive(Serialize)]
struct SignOutResponse {
    success: bool,
}

/// Sign out. Provider failures are logged; the cookies are deleted regardless.
async fn sign_out<C: AuthClient>(
    State(state): State<SessionState<C>>,
    CurrentSession(current): CurrentSession,
) -> Response {
    if let Some(session) = current.authenticated_session() {
        match state.client.sign_out(&session.refresh_token).await {
            Ok(()) => info!(user_id = %session.user_id, "User signed out"),
            Err(e) => warn!(user_id = %session.user_id, error = %e, "Provider sign-out failed"),
        }
    }

    let mut response = Json(SignOutResponse { success: true }).into_response();
    append_set_cookies(response.headers_mut(), &state.cookies.clear());
    response
}
