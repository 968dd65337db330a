//! Registration and bearer session endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    bearer, missing_payload,
    types::{ErrorBody, LoginRequest, LoginResponse, LogoutRequest, MessageResponse, RegisterRequest},
};
use crate::auth::{AuthError, AuthService};

#[utoipa::path(
    post,
    path = "/v1/register",
    request_body = RegisterRequest,
    responses (
        (status = 201, description = "Account created", body = MessageResponse),
        (status = 400, description = "Invalid name, email or password", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<RegisterRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match auth
        .register(&request.name, &request.email, &request.password)
        .await
    {
        Ok(_) => (
            StatusCode::CREATED,
            Json(MessageResponse::new("user registered")),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Bearer token issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Too many login attempts", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match auth.login(&request.email, &request.password).await {
        Ok(access_token) => Json(LoginResponse { access_token }).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/logout",
    request_body = LogoutRequest,
    responses (
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 401, description = "Token missing or not issued by this service", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    Extension(auth): Extension<Arc<AuthService>>,
    headers: HeaderMap,
    payload: Option<Json<LogoutRequest>>,
) -> Response {
    let body_token = payload
        .and_then(|Json(request)| request.access_token)
        .filter(|token| !token.trim().is_empty());
    let token = match body_token.as_deref() {
        Some(token) => token.trim(),
        None => match bearer(&headers) {
            Some(token) => token,
            None => return AuthError::InvalidToken.into_response(),
        },
    };

    match auth.logout(token).await {
        Ok(()) => Json(MessageResponse::new("logged out")).into_response(),
        Err(err) => err.into_response(),
    }
}
