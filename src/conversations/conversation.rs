use axum::{debug_handler, extract::{Path, State}, Json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    appresult::{AppError, AppResult},
    models::{Conversation, User},
    session::AuthUser,
    store, AppState,
};

#[debug_handler(state = AppState)]
pub(crate) async fn conversation(
    AuthUser(user_id): AuthUser,
    State(db_pool): State<SqlitePool>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<Conversation>> {
    store::conversation(&db_pool, user_id, conversation_id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Conversation not found"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn other_participant(
    AuthUser(user_id): AuthUser,
    State(db_pool): State<SqlitePool>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let mut tx = db_pool.begin().await?;

    if !store::is_participant(&mut *tx, user_id, conversation_id).await? {
        return Err(AppError::NotFound("Conversation not found"));
    }

    let other = store::other_participant_user(&mut *tx, user_id, conversation_id)
        .await?
        .ok_or(AppError::NotFound("Could not find the other participant of this conversation"))?;

    tx.commit().await?;
    Ok(Json(other))
}
