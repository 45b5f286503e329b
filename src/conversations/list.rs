use axum::{debug_handler, extract::{Query, State}, Json};
use sqlx::SqlitePool;

use crate::{appresult::AppResult, models::Conversation, session::AuthUser, store, AppState};

use super::Page;

/// GET /api/conversations?before={message_id}
#[debug_handler(state = AppState)]
pub(crate) async fn conversations(
    AuthUser(user_id): AuthUser,
    State(db_pool): State<SqlitePool>,
    Query(Page { before }): Query<Page>,
) -> AppResult<Json<Vec<Conversation>>> {
    Ok(Json(store::conversations(&db_pool, user_id, before).await?))
}
