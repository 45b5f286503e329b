use std::{convert::Infallible, sync::Arc};

use axum::{
    debug_handler,
    extract::State,
    http::{header::ACCEPT, HeaderMap},
    response::sse::{Event, Sse},
};
use futures_util::{stream, Stream};
use tokio_util::sync::CancellationToken;

use crate::{appresult::{AppError, AppResult}, config::Config, session::AuthUser, AppState};

use super::{Hub, LiveSession};

/// GET /api/messages
///
/// Streams every message addressed to the caller for as long as the
/// connection stays open. When the client goes away the response stream is
/// dropped, which drops the session and takes it out of the hub.
#[debug_handler(state = AppState)]
pub async fn subscribe(
    AuthUser(user_id): AuthUser,
    State(hub): State<Hub>,
    State(config): State<Arc<Config>>,
    State(shutdown): State<CancellationToken>,
    headers: HeaderMap,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let wants_events = headers
        .get(ACCEPT)
        .and_then(|accept| accept.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));
    if !wants_events {
        return Err(AppError::NotAcceptable("This endpoint requires an EventSource connection"));
    }

    let session = LiveSession::open(&hub, user_id, config.keep_alive, shutdown);
    tracing::info!(user_id = %user_id, "live stream opened");

    let events = stream::unfold(session, |mut session| async move {
        let event = session.next_event().await?;
        Some((Ok(event.into_sse()), session))
    });

    Ok(Sse::new(events))
}
