//! Cookie wire format for sessions.
//!
//! The canonical format is a split pair: the access token (a JWT whose
//! payload carries `sub`, `email` and `exp`) and the opaque refresh token.
//! Any other auth-looking cookie name is legacy debt. Legacy cookies are
//! only ever deleted, never read, so client and server cannot disagree about
//! which of several encodings is the active session.

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use super::Session;

/// Cookie holding the access token.
pub const ACCESS_COOKIE_NAME: &str = "rl-access-token";

/// Cookie holding the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "rl-refresh-token";

/// Extra cookie lifetime past access token expiry (7 days).
///
/// Keeps an expired-but-refreshable session visible to the server.
pub const DEFAULT_COOKIE_GRACE_SECS: i64 = 7 * 24 * 60 * 60;

/// Name prefixes of cookies written by earlier session encodings.
pub const DEFAULT_LEGACY_PREFIXES: &[&str] = &["sb-", "supabase-auth-token", "rl-session"];

/// One cookie, either parsed from a request or destined for `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub path: String,
    /// Lifetime in seconds; zero marks a deletion.
    pub max_age: i64,
    pub same_site: SameSite,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

impl CookieRecord {
    /// A cookie as received in a `Cookie` request header (name and value only).
    pub fn incoming(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".into(),
            max_age: 0,
            same_site: SameSite::Lax,
            domain: None,
            secure: false,
            http_only: false,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.max_age <= 0
    }

    pub fn to_cookie(&self) -> Cookie<'static> {
        let mut builder = Cookie::build((self.name.clone(), self.value.clone()))
            .path(self.path.clone())
            .same_site(self.same_site)
            .secure(self.secure)
            .http_only(self.http_only)
            .max_age(Duration::seconds(self.max_age.max(0)));
        if self.is_removal() {
            builder = builder.expires(OffsetDateTime::UNIX_EPOCH);
        }
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        self.to_cookie().to_string()
    }
}

/// Attributes applied to every outbound session cookie.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub secure: bool,
    pub http_only: bool,
    pub domain: Option<String>,
    pub grace_secs: i64,
    pub legacy_prefixes: Vec<String>,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true,
            http_only: true,
            domain: None,
            grace_secs: DEFAULT_COOKIE_GRACE_SECS,
            legacy_prefixes: DEFAULT_LEGACY_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Why a cookie pair could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CorruptCookie {
    #[error("only one half of the token pair is present")]
    IncompletePair,
    #[error("access token does not have three segments")]
    SegmentCount,
    #[error("access token payload is not base64url")]
    Encoding,
    #[error("access token payload is not valid JSON")]
    Payload,
    #[error("access token has no subject")]
    MissingSubject,
    #[error("access token expiry is negative")]
    NegativeExpiry,
    #[error("refresh token contains invalid characters")]
    RefreshToken,
}

/// Outcome of decoding request cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieRead {
    Absent,
    Present(Session),
    Corrupt(CorruptCookie),
}

#[derive(Deserialize)]
struct AccessPayload {
    sub: String,
    #[serde(default)]
    email: String,
    exp: i64,
}

/// Encodes sessions to cookies and back.
#[derive(Debug, Clone, Default)]
pub struct CookieSynchronizer {
    settings: CookieSettings,
}

impl CookieSynchronizer {
    pub fn new(settings: CookieSettings) -> Self {
        Self { settings }
    }

    /// Serialize `session` into the canonical cookie pair.
    pub fn write(&self, session: &Session, now: i64) -> Vec<CookieRecord> {
        let max_age = session
            .expires_at
            .saturating_sub(now)
            .saturating_add(self.settings.grace_secs)
            .max(0);

        vec![
            self.record(ACCESS_COOKIE_NAME, &session.access_token, max_age),
            self.record(REFRESH_COOKIE_NAME, &session.refresh_token, max_age),
        ]
    }

    /// Decode the canonical cookie pair.
    ///
    /// Only the canonical names are consulted; the first occurrence of each
    /// name wins. Never panics on malformed input.
    pub fn read(&self, cookies: &[CookieRecord]) -> CookieRead {
        let find = |name: &str| {
            cookies
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.value.as_str())
                .filter(|v| !v.is_empty())
        };

        let (access, refresh) = match (find(ACCESS_COOKIE_NAME), find(REFRESH_COOKIE_NAME)) {
            (None, None) => return CookieRead::Absent,
            (Some(access), Some(refresh)) => (access, refresh),
            _ => return CookieRead::Corrupt(CorruptCookie::IncompletePair),
        };

        match decode_pair(access, refresh) {
            Ok(session) => CookieRead::Present(session),
            Err(reason) => CookieRead::Corrupt(reason),
        }
    }

    /// Deletion records for every auth-related cookie in `cookies`.
    pub fn purge(&self, cookies: &[CookieRecord]) -> Vec<CookieRecord> {
        self.removals(cookies, |name| self.is_canonical(name) || self.is_legacy(name))
    }

    /// Deletion records for legacy cookies only.
    pub fn purge_legacy(&self, cookies: &[CookieRecord]) -> Vec<CookieRecord> {
        self.removals(cookies, |name| self.is_legacy(name))
    }

    /// Deletion records for the canonical pair, whether or not it was sent.
    pub fn clear(&self) -> Vec<CookieRecord> {
        vec![
            self.record(ACCESS_COOKIE_NAME, "", 0),
            self.record(REFRESH_COOKIE_NAME, "", 0),
        ]
    }

    pub fn is_canonical(&self, name: &str) -> bool {
        name == ACCESS_COOKIE_NAME || name == REFRESH_COOKIE_NAME
    }

    pub fn is_legacy(&self, name: &str) -> bool {
        !self.is_canonical(name)
            && self
                .settings
                .legacy_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
    }

    fn removals(
        &self,
        cookies: &[CookieRecord],
        matches: impl Fn(&str) -> bool,
    ) -> Vec<CookieRecord> {
        let mut out: Vec<CookieRecord> = Vec::new();
        for cookie in cookies {
            if matches(&cookie.name) && !out.iter().any(|r| r.name == cookie.name) {
                out.push(self.record(&cookie.name, "", 0));
            }
        }
        out
    }

    fn record(&self, name: &str, value: &str, max_age: i64) -> CookieRecord {
        CookieRecord {
            name: name.to_string(),
            value: value.to_string(),
            path: "/".into(),
            max_age,
            same_site: SameSite::Lax,
            domain: self.settings.domain.clone(),
            secure: self.settings.secure,
            http_only: self.settings.http_only,
        }
    }
}

fn decode_pair(access: &str, refresh: &str) -> Result<Session, CorruptCookie> {
    let segments: Vec<&str> = access.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(CorruptCookie::SegmentCount);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|_| CorruptCookie::Encoding)?;
    let payload: AccessPayload =
        serde_json::from_slice(&payload).map_err(|_| CorruptCookie::Payload)?;

    if payload.sub.is_empty() {
        return Err(CorruptCookie::MissingSubject);
    }
    if payload.exp < 0 {
        return Err(CorruptCookie::NegativeExpiry);
    }
    if refresh
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == ';' || c == ',')
    {
        return Err(CorruptCookie::RefreshToken);
    }

    Ok(Session {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        user_id: payload.sub,
        user_email: payload.email,
        expires_at: payload.exp,
    })
}
