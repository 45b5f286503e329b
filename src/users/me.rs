use axum::{debug_handler, extract::State, Json};
use sqlx::SqlitePool;

use crate::{
    appresult::{AppError, AppResult},
    models::User,
    session::AuthUser,
    store, AppState,
};

/// GET /api/auth_user
#[debug_handler(state = AppState)]
pub(crate) async fn auth_user(
    AuthUser(user_id): AuthUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<User>> {
    // a session can outlive its user row
    store::user(&db_pool, user_id)
        .await?
        .map(Json)
        .ok_or(AppError::Unauthorized)
}
