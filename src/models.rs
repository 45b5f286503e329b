use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(rename = "avatarURL")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub other_participant: User,
    pub last_message: Option<Message>,
    pub has_unread_messages: bool,
}

/// A persisted message as seen by one viewer; `mine` is relative to that viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    #[serde(skip)]
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub mine: bool,
    /// Resolved other participant, only known on the delivery path.
    #[serde(skip)]
    pub receiver_id: Option<Uuid>,
}

/// Creation time carried by a v7 id. Ids are minted monotonically, so this
/// never goes backwards for messages created by one process.
pub fn created_at_of(id: Uuid) -> OffsetDateTime {
    let nanos = id
        .get_timestamp()
        .map(|ts| {
            let (secs, subsec) = ts.to_unix();
            i128::from(secs) * 1_000_000_000 + i128::from(subsec)
        })
        .unwrap_or_default();
    OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
