use axum::{
    debug_handler,
    extract::State,
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    appresult::{AppError, AppResult},
    db,
    models::Conversation,
    session::AuthUser,
    store, AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct NewConversationBody {
    username: String,
}

/// POST /api/conversations
///
/// One conversation per pair of users: asking again redirects to the one
/// that already exists.
#[debug_handler(state = AppState)]
pub(crate) async fn new_conversation(
    AuthUser(user_id): AuthUser,
    State(db_pool): State<SqlitePool>,
    Json(NewConversationBody { username }): Json<NewConversationBody>,
) -> AppResult<Response> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::invalid("username", "Username required"));
    }

    let mut tx = db::begin_write(&db_pool).await?;

    let Some(other) = store::user_by_username(&mut *tx, username).await? else {
        return Err(AppError::NotFound("User not found"));
    };

    if other.id == user_id {
        return Err(AppError::Forbidden("Try start a conversation with someone else"));
    }

    if let Some(existing) = store::common_conversation(&mut *tx, user_id, other.id).await? {
        return Ok((StatusCode::FOUND, [(LOCATION, format!("/api/conversations/{existing}"))]).into_response());
    }

    let id = store::create_conversation(&mut tx, user_id, other.id).await?;
    tx.commit().await?;

    tracing::info!(conversation_id = %id, user_id = %user_id, other_id = %other.id, "conversation created");

    let conversation = Conversation {
        id,
        other_participant: other,
        last_message: None,
        has_unread_messages: false,
    };
    Ok((StatusCode::CREATED, Json(conversation)).into_response())
}
