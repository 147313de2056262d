mod error;
mod profile;
mod session;

use axum::Router;

use crate::auth::SessionState;
use crate::db::Database;
use crate::provider::AuthClient;

pub use error::{ApiError, ResultExt};

/// Create the API router.
pub fn create_api_router<C: AuthClient>(state: SessionState<C>, db: Database) -> Router {
    Router::new()
        .nest("/auth", session::router(state))
        .merge(profile::router(profile::ProfileState { db }))
}
