//! Errors returned by the HTTP handlers and how they map to responses.
use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use recipe_backend_core::{RecipeError, SessionError, UserError};
use serde::Serialize;

/// Validation failures, keyed by field name.
pub type FieldErrors = BTreeMap<&'static str, String>;

/// An error returned by a handler.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// A recipe operation failed.
    #[error(transparent)]
    Recipe(#[from] RecipeError),

    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Signing up or signing in failed.
    #[error(transparent)]
    User(#[from] UserError),

    /// The request body failed validation.
    #[error("validation failed")]
    Validation(FieldErrors),

    /// The request could not be understood.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body is not JSON.
    #[error("content type must be application/json")]
    UnsupportedMediaType,

    /// The route requires a signed-in visitor.
    #[error("authentication required")]
    Unauthenticated,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a FieldErrors>,
}

impl ApiError {
    /// The status code this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Recipe(RecipeError::NotFound) => StatusCode::NOT_FOUND,
            Self::Recipe(RecipeError::Conflict) | Self::User(UserError::EmailTaken) => {
                StatusCode::CONFLICT
            }
            Self::User(UserError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            Self::Recipe(RecipeError::Timeout(_))
            | Self::Session(SessionError::Timeout(_))
            | Self::User(UserError::Timeout(_)) => StatusCode::REQUEST_TIMEOUT,
            Self::Recipe(RecipeError::Unexpected(_))
            | Self::Session(_)
            | Self::User(UserError::Unexpected(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            Self::Recipe(RecipeError::NotFound) => "the requested recipe could not be found".to_string(),
            Self::Recipe(RecipeError::Conflict) => {
                "the recipe was modified by another request, reload it and try again".to_string()
            }
            Self::Recipe(RecipeError::Timeout(_))
            | Self::Session(SessionError::Timeout(_))
            | Self::User(UserError::Timeout(_)) => "the request timed out".to_string(),
            _ if status.is_server_error() => {
                tracing::error!(err = %self, "request failed");
                "the server encountered a problem and could not process the request".to_string()
            }
            other => other.to_string(),
        };

        let fields = match &self {
            Self::Validation(fields) => Some(fields),
            _ => None,
        };

        let body = ErrorBody {
            message: &message,
            fields,
        };

        (status, Json(body)).into_response()
    }
}
