//! Reader profile endpoint.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::error::{ApiError, ResultExt};
use crate::auth::ValidSession;
use crate::db::Database;

#[derive(Clone)]
pub struct ProfileState {
    pub db: Database,
}

pub fn router(state: ProfileState) -> Router {
    Router::new()
        .route("/profile", get(get_profile))
        .with_state(state)
}

#[derive(Serialize)]
struct ProfileResponse {
    id: String,
    email: String,
    display_name: Option<String>,
    created_at: Option<String>,
}

/// Profile of the signed-in reader. Falls back to the session identity when
/// no profile row exists yet.
async fn get_profile(
    State(state): State<ProfileState>,
    ValidSession { session, .. }: ValidSession,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = state
        .db
        .profiles()
        .get(&session.user_id)
        .await
        .db_err("Failed to load profile")?;

    Ok(Json(match profile {
        Some(profile) => ProfileResponse {
            id: profile.user_id,
            email: profile.email,
            display_name: profile.display_name,
            created_at: Some(profile.created_at),
        },
        None => ProfileResponse {
            id: session.user_id,
            email: session.user_email,
            display_name: None,
            created_at: None,
        },
    }))
}
