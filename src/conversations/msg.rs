use axum::{
    debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    appresult::{AppError, AppResult},
    db,
    live::Hub,
    models::Message,
    session::AuthUser,
    spawn_detached, store, AppState,
};

use super::Page;

pub const MAX_CONTENT_CHARS: usize = 480;

#[derive(Deserialize)]
pub(crate) struct SendMessageBody {
    content: String,
}

/// Collapses ASCII whitespace runs inside each line, trims lines and drops the
/// empty ones. Other spaces (U+00A0 and friends) are content unless they sit at
/// either end of a line.
pub fn normalize_content(raw: &str) -> String {
    raw.split('\n')
        .map(|line| line.split_ascii_whitespace().collect::<Vec<_>>().join(" "))
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn validate_content(raw: &str) -> AppResult<String> {
    let content = normalize_content(raw);
    if content.is_empty() {
        return Err(AppError::invalid("content", "Message content required"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(AppError::invalid("content", format!("Message too long. {MAX_CONTENT_CHARS} max")));
    }
    Ok(content)
}

/// Persists a message and hands it to live delivery.
///
/// The message row and the conversation's last message pointer are written in
/// one transaction. Everything after the commit (marking the author's own read
/// time, resolving the recipient, dispatching to their live sessions) runs
/// detached, so the returned message never waits on it and its failures are
/// only logged.
pub async fn send_msg(
    db_pool: &SqlitePool,
    hub: &Hub,
    author: Uuid,
    conversation_id: Uuid,
    content: &str,
) -> AppResult<Message> {
    let content = validate_content(content)?;

    let mut tx = db::begin_write(db_pool).await?;

    if !store::is_participant(&mut *tx, author, conversation_id).await? {
        return Err(AppError::NotFound("Conversation not found"));
    }

    let message = store::create_message(&mut *tx, author, conversation_id, &content).await?;
    store::set_last_message(&mut *tx, conversation_id, message.id).await?;

    tx.commit().await?;

    tracing::info!(
        message_id = %message.id,
        conversation_id = %conversation_id,
        user_id = %author,
        "message created"
    );

    {
        let db_pool = db_pool.clone();
        spawn_detached("mark author read", async move {
            store::mark_read(&db_pool, author, conversation_id, OffsetDateTime::now_utc()).await?;
            Ok(())
        });
    }

    {
        let db_pool = db_pool.clone();
        let hub = hub.clone();
        let message = message.clone();
        spawn_detached("dispatch message", async move { deliver(&db_pool, &hub, message).await });
    }

    Ok(message)
}

async fn deliver(db_pool: &SqlitePool, hub: &Hub, mut message: Message) -> anyhow::Result<()> {
    let receiver_id = store::other_participant(db_pool, message.user_id, message.conversation_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("conversation {} has no other participant", message.conversation_id))?;
    message.receiver_id = Some(receiver_id);

    let delivery = hub.dispatch(&message);
    tracing::debug!(
        message_id = %message.id,
        receiver_id = %receiver_id,
        delivered = delivery.delivered,
        dropped = delivery.dropped,
        "message dispatched"
    );
    Ok(())
}

/// POST /api/conversations/{conversation_id}/messages
#[debug_handler(state = AppState)]
pub(crate) async fn create_message(
    AuthUser(user_id): AuthUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    Path(conversation_id): Path<Uuid>,
    Json(SendMessageBody { content }): Json<SendMessageBody>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let message = send_msg(&db_pool, &hub, user_id, conversation_id, &content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/conversations/{conversation_id}/messages?before={message_id}
#[debug_handler(state = AppState)]
pub(crate) async fn messages(
    AuthUser(user_id): AuthUser,
    State(db_pool): State<SqlitePool>,
    Path(conversation_id): Path<Uuid>,
    Query(Page { before }): Query<Page>,
) -> AppResult<Json<Vec<Message>>> {
    if !store::is_participant(&db_pool, user_id, conversation_id).await? {
        return Err(AppError::NotFound("Conversation not found"));
    }

    let messages = store::messages(&db_pool, user_id, conversation_id, before).await?;

    spawn_detached("mark reader read", async move {
        store::mark_read(&db_pool, user_id, conversation_id, OffsetDateTime::now_utc()).await?;
        Ok(())
    });

    Ok(Json(messages))
}

/// POST /api/conversations/{conversation_id}/read_messages
#[debug_handler(state = AppState)]
pub(crate) async fn read_messages(
    AuthUser(user_id): AuthUser,
    State(db_pool): State<SqlitePool>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    store::mark_read(&db_pool, user_id, conversation_id, OffsetDateTime::now_utc()).await?;
    Ok(StatusCode::NO_CONTENT)
}
