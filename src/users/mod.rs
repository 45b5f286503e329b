mod me;
mod search;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth_user", get(me::auth_user))
        .route("/usernames", get(search::usernames))
}
