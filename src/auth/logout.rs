use axum::{debug_handler, http::StatusCode};
use tower_sessions::Session;

use crate::appresult::AppResult;

/// POST /api/logout
#[debug_handler]
pub(crate) async fn logout(session: Session) -> AppResult<StatusCode> {
    session.flush().await?;
    Ok(StatusCode::NO_CONTENT)
}
