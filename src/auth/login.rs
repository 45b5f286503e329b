use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    appresult::{AppError, AppResult},
    config::Config,
    models::User,
    session::USER_ID,
    store, AppState,
};

use super::validate_username;

#[derive(Deserialize)]
pub(crate) struct LoginBody {
    username: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    auth_user: User,
}

/// POST /api/login
///
/// Development sign-in by username, only served on localhost. Unknown
/// usernames are registered on the spot.
#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    session: Session,
    Json(LoginBody { username }): Json<LoginBody>,
) -> AppResult<Json<LoginResponse>> {
    if !config.is_local() {
        return Err(AppError::NotFound("Not Found"));
    }

    let username = username.trim();
    validate_username(username)?;

    let user = match store::user_by_username(&db_pool, username).await? {
        Some(user) => user,
        None => {
            let user = store::create_user(&db_pool, username, None).await?;
            tracing::info!(user_id = %user.id, username = %user.username, "user signed up");
            user
        }
    };

    session.cycle_id().await?;
    session.insert(USER_ID, user.id).await?;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(LoginResponse { auth_user: user }))
}
