use std::collections::BTreeMap;

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

/// Field name to human readable reason, answered as `{"errors": {...}}`.
#[derive(Debug, Default, Serialize)]
pub struct FieldErrors {
    pub errors: BTreeMap<&'static str, String>,
}

impl FieldErrors {
    pub fn single(field: &'static str, reason: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field, reason.into());
        Self { errors }
    }
}

#[derive(Debug)]
pub enum AppError {
    Invalid(FieldErrors),
    NotFound(&'static str),
    Forbidden(&'static str),
    NotAcceptable(&'static str),
    Unauthorized,
    Internal(anyhow::Error),
}

impl AppError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid(FieldErrors::single(field, reason))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Invalid(errors) => (StatusCode::UNPROCESSABLE_ENTITY, Json(errors)).into_response(),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, what).into_response(),
            AppError::Forbidden(why) => (StatusCode::FORBIDDEN, why).into_response(),
            AppError::NotAcceptable(why) => (StatusCode::NOT_ACCEPTABLE, why).into_response(),
            AppError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            AppError::Internal(err) => {
                tracing::error!(error = %err, backtrace = %err.backtrace(), "request failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
