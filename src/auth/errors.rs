//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::interceptor::append_set_cookies;
use crate::session::CookieRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No usable session on a route that needs one.
    NotAuthenticated,
    /// A session exists but has expired, and the request would write.
    SessionExpired,
    /// The identity provider refused to renew the session.
    Rejected(&'static str),
}

/// 401 JSON response, optionally carrying cookie deletions.
#[derive(Debug)]
pub struct ApiAuthError {
    kind: AuthErrorKind,
    cookies: Vec<CookieRecord>,
}

impl ApiAuthError {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self {
            kind,
            cookies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<CookieRecord>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Authentication required",
            AuthErrorKind::SessionExpired => "Session expired",
            AuthErrorKind::Rejected(message) => message,
        }
    }
}

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();
        append_set_cookies(response.headers_mut(), &self.cookies);
        response
    }
}
