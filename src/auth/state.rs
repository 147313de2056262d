use std::sync::Arc;

use crate::provider::AuthClient;
use crate::session::{CookieSynchronizer, RefreshDeduplicator};

/// Path prefixes that require a session unless configured otherwise.
pub const DEFAULT_PROTECTED_PREFIXES: &[&str] = &[
    "/api/profile",
    "/api/ai",
    "/api/articles",
    "/api/highlights",
    "/api/chat",
    "/library",
];

/// Allow-list of protected path prefixes.
///
/// A prefix matches whole path segments: `/api/chat` covers `/api/chat` and
/// `/api/chat/42`, not `/api/chatter`.
#[derive(Debug, Clone)]
pub struct ProtectedRoutes {
    prefixes: Vec<String>,
}

impl ProtectedRoutes {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.into().trim_end_matches('/').to_string())
                .collect(),
        }
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            prefix.is_empty()
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

impl Default for ProtectedRoutes {
    fn default() -> Self {
        Self::new(DEFAULT_PROTECTED_PREFIXES.iter().copied())
    }
}

/// Shared state for the interceptor and the session endpoints.
pub struct SessionState<C> {
    pub client: Arc<C>,
    pub cookies: CookieSynchronizer,
    pub routes: Arc<ProtectedRoutes>,
    pub refresher: Arc<RefreshDeduplicator>,
}

impl<C: AuthClient> SessionState<C> {
    pub fn new(
        client: Arc<C>,
        cookies: CookieSynchronizer,
        routes: ProtectedRoutes,
        refresher: RefreshDeduplicator,
    ) -> Self {
        Self {
            client,
            cookies,
            routes: Arc::new(routes),
            refresher: Arc::new(refresher),
        }
    }
}

// Manual impl: `C` itself need not be `Clone`
impl<C> Clone for SessionState<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            cookies: self.cookies.clone(),
            routes: self.routes.clone(),
            refresher: self.refresher.clone(),
        }
    }
}
