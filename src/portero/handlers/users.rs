//! Admin listing of active accounts.

use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    bearer,
    types::{ErrorBody, ListUsersParams, UserListResponse, UserView},
};
use crate::auth::{AuthError, AuthService, UserQuery};

#[utoipa::path(
    get,
    path = "/v1/users",
    params(ListUsersParams),
    responses (
        (status = 200, description = "One page of active accounts", body = UserListResponse),
        (status = 400, description = "Invalid query parameters", body = ErrorBody),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn list_users(
    Extension(auth): Extension<Arc<AuthService>>,
    headers: HeaderMap,
    params: Option<Query<ListUsersParams>>,
) -> Response {
    let Some(Query(params)) = params else {
        return AuthError::InvalidInput("invalid query parameters").into_response();
    };

    let query = UserQuery {
        name: params.name,
        email: params.email,
        page: params.page.unwrap_or(0),
        limit: params.limit.unwrap_or(0),
    };

    match auth.list_users(bearer(&headers), query).await {
        Ok(listing) => Json(UserListResponse {
            users: listing.users.into_iter().map(UserView::from).collect(),
            total: listing.total,
            page: listing.page,
            limit: listing.limit,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}
