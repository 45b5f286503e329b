use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use uuid::Uuid;

use crate::appresult::AppError;

pub const USER_ID: &str = "user_id";

/// The signed-in user, handed to handlers as a plain parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, why)| AppError::Internal(anyhow::anyhow!(why)))?;

        session
            .get::<Uuid>(USER_ID)
            .await?
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}
