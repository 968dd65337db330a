//! Self-service profile endpoints for the bearer of the token.

use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    bearer, missing_payload,
    types::{ErrorBody, MessageResponse, UpdateProfileRequest, UserView},
};
use crate::auth::AuthService;

#[utoipa::path(
    get,
    path = "/v1/me",
    responses (
        (status = 200, description = "Profile of the token owner", body = UserView),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorBody),
        (status = 404, description = "Account no longer exists", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
#[instrument(skip_all)]
pub async fn get_profile(
    Extension(auth): Extension<Arc<AuthService>>,
    headers: HeaderMap,
) -> Response {
    match auth.get_profile(bearer(&headers)).await {
        Ok(account) => Json(UserView::from(account)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/me",
    request_body = UpdateProfileRequest,
    responses (
        (status = 200, description = "Profile updated", body = MessageResponse),
        (status = 400, description = "Invalid name or email", body = ErrorBody),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
#[instrument(skip_all)]
pub async fn update_profile(
    Extension(auth): Extension<Arc<AuthService>>,
    headers: HeaderMap,
    payload: Option<Json<UpdateProfileRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match auth
        .update_profile(bearer(&headers), &request.name, &request.email)
        .await
    {
        Ok(()) => Json(MessageResponse::new("profile updated")).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me",
    responses (
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
#[instrument(skip_all)]
pub async fn delete_profile(
    Extension(auth): Extension<Arc<AuthService>>,
    headers: HeaderMap,
) -> Response {
    match auth.delete_profile(bearer(&headers)).await {
        Ok(()) => Json(MessageResponse::new("account deleted")).into_response(),
        Err(err) => err.into_response(),
    }
}
