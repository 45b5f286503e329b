//! Queries against the relational store.
//!
//! Functions take any SQLite executor so callers decide whether a query runs
//! on the pool or inside an open transaction (`&mut *tx`).

use sqlx::{FromRow, SqliteConnection, SqliteExecutor};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{created_at_of, Conversation, Message, User};

pub const PAGE_SIZE: i64 = 25;

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    content: String,
    user_id: Uuid,
    conversation_id: Uuid,
    created_at: OffsetDateTime,
}

impl MessageRow {
    fn seen_by(self, viewer: Uuid) -> Message {
        Message {
            id: self.id,
            content: self.content,
            user_id: self.user_id,
            conversation_id: self.conversation_id,
            created_at: self.created_at,
            mine: self.user_id == viewer,
            receiver_id: None,
        }
    }
}

#[derive(FromRow)]
struct ConversationRow {
    id: Uuid,
    messages_read_at: OffsetDateTime,
    other_id: Uuid,
    other_username: String,
    other_avatar_url: Option<String>,
    message_id: Option<Uuid>,
    message_content: Option<String>,
    message_user_id: Option<Uuid>,
    message_created_at: Option<OffsetDateTime>,
}

impl ConversationRow {
    fn seen_by(self, viewer: Uuid) -> Conversation {
        let last_message = match (self.message_id, self.message_content, self.message_user_id, self.message_created_at) {
            (Some(id), Some(content), Some(user_id), Some(created_at)) => Some(Message {
                id,
                content,
                user_id,
                conversation_id: self.id,
                created_at,
                mine: user_id == viewer,
                receiver_id: None,
            }),
            _ => None,
        };

        Conversation {
            id: self.id,
            has_unread_messages: last_message
                .as_ref()
                .is_some_and(|m| self.messages_read_at < m.created_at),
            other_participant: User {
                id: self.other_id,
                username: self.other_username,
                avatar_url: self.other_avatar_url,
            },
            last_message,
        }
    }
}

const CONVERSATION_SELECT: &str = r#"
    SELECT
        c.id AS id,
        me.messages_read_at AS messages_read_at,
        u.id AS other_id,
        u.username AS other_username,
        u.avatar_url AS other_avatar_url,
        m.id AS message_id,
        m.content AS message_content,
        m.user_id AS message_user_id,
        m.created_at AS message_created_at
    FROM conversations c
    INNER JOIN participants me ON me.conversation_id = c.id AND me.user_id = ?1
    INNER JOIN participants other ON other.conversation_id = c.id AND other.user_id != ?1
    INNER JOIN users u ON u.id = other.user_id
"#;

// users

pub async fn create_user<'e>(
    exec: impl SqliteExecutor<'e>,
    username: &str,
    avatar_url: Option<&str>,
) -> Result<User, sqlx::Error> {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO users (id, username, avatar_url) VALUES (?, ?, ?)")
        .bind(id)
        .bind(username)
        .bind(avatar_url)
        .execute(exec)
        .await?;

    Ok(User {
        id,
        username: username.to_owned(),
        avatar_url: avatar_url.map(str::to_owned),
    })
}

pub async fn user<'e>(exec: impl SqliteExecutor<'e>, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT id, username, avatar_url FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
}

pub async fn user_by_username<'e>(
    exec: impl SqliteExecutor<'e>,
    username: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT id, username, avatar_url FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(exec)
        .await
}

/// Up to five usernames starting with `prefix`, never including `viewer`.
pub async fn search_usernames<'e>(
    exec: impl SqliteExecutor<'e>,
    viewer: Uuid,
    prefix: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let pattern = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
        + "%";

    let rows: Vec<(String,)> = sqlx::query_as(
        r#"SELECT username FROM users
        WHERE id != ? AND username LIKE ? ESCAPE '\'
        ORDER BY username
        LIMIT 5"#,
    )
    .bind(viewer)
    .bind(pattern)
    .fetch_all(exec)
    .await?;

    Ok(rows.into_iter().map(|(username,)| username).collect())
}

// conversations

pub async fn common_conversation<'e>(
    exec: impl SqliteExecutor<'e>,
    a: Uuid,
    b: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"SELECT conversation_id FROM participants WHERE user_id = ?
        INTERSECT
        SELECT conversation_id FROM participants WHERE user_id = ?"#,
    )
    .bind(a)
    .bind(b)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(|(id,)| id))
}

/// Inserts the conversation and both participant rows, neither having read anything yet.
/// Run it inside a transaction.
pub async fn create_conversation(conn: &mut SqliteConnection, a: Uuid, b: Uuid) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::now_v7();

    sqlx::query("INSERT INTO conversations (id) VALUES (?)")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("INSERT INTO participants (user_id, conversation_id, messages_read_at) VALUES (?1, ?2, ?3), (?4, ?2, ?3)")
        .bind(a)
        .bind(id)
        .bind(OffsetDateTime::UNIX_EPOCH)
        .bind(b)
        .execute(&mut *conn)
        .await?;

    Ok(id)
}

/// The caller's conversations that have at least one message, newest activity first.
pub async fn conversations<'e>(
    exec: impl SqliteExecutor<'e>,
    viewer: Uuid,
    before: Option<Uuid>,
) -> Result<Vec<Conversation>, sqlx::Error> {
    let query = format!(
        "{CONVERSATION_SELECT}
        INNER JOIN messages m ON m.id = c.last_message_id
        WHERE (?2 IS NULL OR m.id < ?2)
        ORDER BY m.id DESC
        LIMIT ?3"
    );

    let rows: Vec<ConversationRow> = sqlx::query_as(&query)
        .bind(viewer)
        .bind(before)
        .bind(PAGE_SIZE)
        .fetch_all(exec)
        .await?;

    Ok(rows.into_iter().map(|row| row.seen_by(viewer)).collect())
}

/// `None` both when the conversation is missing and when `viewer` is not in it.
pub async fn conversation<'e>(
    exec: impl SqliteExecutor<'e>,
    viewer: Uuid,
    id: Uuid,
) -> Result<Option<Conversation>, sqlx::Error> {
    let query = format!(
        "{CONVERSATION_SELECT}
        LEFT JOIN messages m ON m.id = c.last_message_id
        WHERE c.id = ?2"
    );

    let row: Option<ConversationRow> = sqlx::query_as(&query)
        .bind(viewer)
        .bind(id)
        .fetch_optional(exec)
        .await?;

    Ok(row.map(|row| row.seen_by(viewer)))
}

// participants

pub async fn is_participant<'e>(
    exec: impl SqliteExecutor<'e>,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM participants WHERE user_id = ? AND conversation_id = ?)",
    )
    .bind(user_id)
    .bind(conversation_id)
    .fetch_one(exec)
    .await?;

    Ok(exists)
}

pub async fn other_participant<'e>(
    exec: impl SqliteExecutor<'e>,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "SELECT user_id FROM participants WHERE user_id != ? AND conversation_id = ? LIMIT 1",
    )
    .bind(user_id)
    .bind(conversation_id)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(|(id,)| id))
}

pub async fn other_participant_user<'e>(
    exec: impl SqliteExecutor<'e>,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT users.id, users.username, users.avatar_url
        FROM participants
        INNER JOIN users ON participants.user_id = users.id
        WHERE participants.user_id != ? AND participants.conversation_id = ?
        LIMIT 1"#,
    )
    .bind(user_id)
    .bind(conversation_id)
    .fetch_optional(exec)
    .await
}

pub async fn mark_read<'e>(
    exec: impl SqliteExecutor<'e>,
    user_id: Uuid,
    conversation_id: Uuid,
    at: OffsetDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE participants SET messages_read_at = ? WHERE user_id = ? AND conversation_id = ?")
        .bind(at)
        .bind(user_id)
        .bind(conversation_id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn messages_read_at<'e>(
    exec: impl SqliteExecutor<'e>,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<Option<OffsetDateTime>, sqlx::Error> {
    let row: Option<(OffsetDateTime,)> = sqlx::query_as(
        "SELECT messages_read_at FROM participants WHERE user_id = ? AND conversation_id = ?",
    )
    .bind(user_id)
    .bind(conversation_id)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(|(at,)| at))
}

// messages

/// Inserts a message authored by `author`. The returned message is `mine`.
pub async fn create_message<'e>(
    exec: impl SqliteExecutor<'e>,
    author: Uuid,
    conversation_id: Uuid,
    content: &str,
) -> Result<Message, sqlx::Error> {
    let id = Uuid::now_v7();
    let created_at = created_at_of(id);

    sqlx::query("INSERT INTO messages (id, content, user_id, conversation_id, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(content)
        .bind(author)
        .bind(conversation_id)
        .bind(created_at)
        .execute(exec)
        .await?;

    Ok(Message {
        id,
        content: content.to_owned(),
        user_id: author,
        conversation_id,
        created_at,
        mine: true,
        receiver_id: None,
    })
}

pub async fn set_last_message<'e>(
    exec: impl SqliteExecutor<'e>,
    conversation_id: Uuid,
    message_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE conversations SET last_message_id = ? WHERE id = ?")
        .bind(message_id)
        .bind(conversation_id)
        .execute(exec)
        .await?;
    Ok(())
}

/// One page of history, newest first.
pub async fn messages<'e>(
    exec: impl SqliteExecutor<'e>,
    viewer: Uuid,
    conversation_id: Uuid,
    before: Option<Uuid>,
) -> Result<Vec<Message>, sqlx::Error> {
    let rows: Vec<MessageRow> = sqlx::query_as(
        r#"SELECT id, content, user_id, conversation_id, created_at
        FROM messages
        WHERE conversation_id = ?1 AND (?2 IS NULL OR id < ?2)
        ORDER BY id DESC
        LIMIT ?3"#,
    )
    .bind(conversation_id)
    .bind(before)
    .bind(PAGE_SIZE)
    .fetch_all(exec)
    .await?;

    Ok(rows.into_iter().map(|row| row.seen_by(viewer)).collect())
}
