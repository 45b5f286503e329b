use axum::{debug_handler, extract::{Query, State}, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    appresult::{AppError, AppResult},
    session::AuthUser,
    store, AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    search: Option<String>,
}

/// GET /api/usernames?search={prefix}
#[debug_handler(state = AppState)]
pub(crate) async fn usernames(
    AuthUser(user_id): AuthUser,
    State(db_pool): State<SqlitePool>,
    Query(SearchQuery { search }): Query<SearchQuery>,
) -> AppResult<Json<Vec<String>>> {
    let search = search.as_deref().map(str::trim).unwrap_or_default();
    if search.is_empty() {
        return Err(AppError::invalid("search", "Search required"));
    }

    Ok(Json(store::search_usernames(&db_pool, user_id, search).await?))
}
