pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod db;
pub mod provider;
pub mod session;

use api::create_api_router;
use auth::{DEFAULT_PROTECTED_PREFIXES, ProtectedRoutes, SessionState, session_interceptor};
use axum::{Router, middleware};
use db::Database;
use provider::AuthClient;
use session::single_flight::DEFAULT_DEDUP_WINDOW;
use session::{CookieSettings, CookieSynchronizer, RefreshDeduplicator};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct AppConfig {
    /// Attributes for outbound session cookies
    pub cookies: CookieSettings,
    /// Path prefixes that require a session
    pub protected_prefixes: Vec<String>,
    /// How long a completed refresh is shared with duplicate requests
    pub dedup_window: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cookies: CookieSettings::default(),
            protected_prefixes: DEFAULT_PROTECTED_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

/// Create the application router with the given configuration.
///
/// Every route, including unmatched protected paths, passes through the
/// session interceptor.
pub fn create_app<C: AuthClient>(config: &AppConfig, client: Arc<C>, db: Database) -> Router {
    let state = SessionState::new(
        client,
        CookieSynchronizer::new(config.cookies.clone()),
        ProtectedRoutes::new(config.protected_prefixes.iter().cloned()),
        RefreshDeduplicator::new(config.dedup_window),
    );

    Router::new()
        .nest("/api", create_api_router(state.clone(), db))
        .layer(middleware::from_fn_with_state(state, session_interceptor::<C>))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server<C: AuthClient>(
    config: AppConfig,
    client: Arc<C>,
    db: Database,
    listener: TcpListener,
) -> Result<(), std::io::Error> {
    let app = create_app(&config, client, db);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
