pub mod appresult;
pub mod auth;
pub mod config;
pub mod conversations;
pub mod db;
pub mod live;
pub mod models;
pub mod session;
pub mod store;
pub mod users;

use std::{future::Future, sync::Arc};

use axum::{extract::FromRef, routing::get, Router};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};
pub use config::Config;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: live::Hub,
    pub config: Arc<Config>,
    /// Cancelled on shutdown; ends every open live stream.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> Self {
        AppState {
            db_pool,
            hub: live::Hub::new(config.session_queue_capacity),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.config.origin.scheme_str() == Some("https"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(state.config.session_idle));

    let api = Router::new()
        .merge(auth::router())
        .merge(users::router())
        .nest("/conversations", conversations::router())
        .route("/messages", get(live::subscribe));

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}

/// Runs `task` in the background. Nobody awaits it, so failures end up in the
/// log under `name` instead of vanishing.
pub fn spawn_detached<F>(name: &'static str, task: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = task.await {
            tracing::warn!(task = name, error = %err, "background task failed");
        }
    })
}
