mod conversation;
mod list;
mod msg;
mod new;

use axum::{routing::{get, post}, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;

pub use msg::{normalize_content, send_msg, validate_content, MAX_CONTENT_CHARS};

/// `?before=` cursor shared by the paginated listings.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Page {
    pub(crate) before: Option<Uuid>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::conversations).post(new::new_conversation))
        .route("/{conversation_id}", get(conversation::conversation))
        .route("/{conversation_id}/other_participant", get(conversation::other_participant))
        .route("/{conversation_id}/messages", get(msg::messages).post(msg::create_message))
        .route("/{conversation_id}/read_messages", post(msg::read_messages))
}
