//! Self-service password recovery.
//!
//! Delivery of the reset token (email, SMS, ...) is not handled here; the
//! token is returned to the caller.

use axum::{
    extract::Extension,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    missing_payload,
    types::{
        ErrorBody, ForgotPasswordRequest, ForgotPasswordResponse, MessageResponse,
        ResetPasswordRequest,
    },
};
use crate::auth::AuthService;

#[utoipa::path(
    post,
    path = "/v1/password/forgot",
    request_body = ForgotPasswordRequest,
    responses (
        (status = 200, description = "Reset token issued", body = ForgotPasswordResponse),
        (status = 404, description = "No active account with this email", body = ErrorBody),
    ),
    tag = "password"
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match auth.request_password_reset(&request.email).await {
        Ok(reset_token) => Json(ForgotPasswordResponse { reset_token }).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/password/reset",
    request_body = ResetPasswordRequest,
    responses (
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Weak password or invalid/expired reset token", body = ErrorBody),
    ),
    tag = "password"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match auth
        .reset_password(&request.token, &request.new_password)
        .await
    {
        Ok(()) => Json(MessageResponse::new("password updated")).into_response(),
        Err(err) => err.into_response(),
    }
}
