//! Per-request session handling.
//!
//! [`session_interceptor`] runs in front of every route. It rebuilds the
//! session from the request cookies, refreshes it when the refresh policy
//! says so, and hands handlers a [`RequestSession`]. Handlers read that
//! through [`CurrentSession`] or [`ValidSession`] and never look at the
//! auth cookies themselves.

mod errors;
mod extractors;
mod interceptor;
mod state;

pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{CurrentSession, ValidSession};
pub use interceptor::{RequestSession, SessionStatus, append_set_cookies, session_interceptor};
pub use state::{DEFAULT_PROTECTED_PREFIXES, ProtectedRoutes, SessionState};
