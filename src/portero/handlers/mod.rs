pub mod health;
pub mod me;
pub mod password;
pub mod session;
pub mod types;
pub mod users;


// common functions for the handlers
use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::error::Error as _;
use tracing::error;

use crate::auth::{extract_bearer_token, AuthError};
use types::ErrorBody;

/// Bearer token from the `authorization` header, if present and well formed.
pub(crate) fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
}

pub(crate) const fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidInput(_) | AuthError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
        AuthError::EmailTaken => StatusCode::CONFLICT,
        AuthError::NotFound => StatusCode::NOT_FOUND,
        AuthError::BadCredentials | AuthError::Unauthenticated | AuthError::InvalidToken => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::PermissionDenied => StatusCode::FORBIDDEN,
        AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthError::HashingUnavailable
        | AuthError::TokenIssueFailure
        | AuthError::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = if self.is_internal() {
            match self.source() {
                Some(source) => error!("{self}: {source}"),
                None => error!("{self}"),
            }
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub(crate) fn missing_payload() -> Response {
    AuthError::InvalidInput("missing or invalid payload").into_response()
}
