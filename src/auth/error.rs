use thiserror::Error;

use crate::store::StoreError;

/// Failure kinds surfaced by `AuthService` operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("email already registered")]
    EmailTaken,
    #[error("user not found")]
    NotFound,
    /// Unknown email and wrong password are deliberately indistinguishable.
    #[error("invalid credentials")]
    BadCredentials,
    #[error("too many login attempts, please wait")]
    RateLimited,
    #[error("missing or invalid token")]
    Unauthenticated,
    #[error("admin access only")]
    PermissionDenied,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid or expired reset token")]
    InvalidOrExpiredToken,
    #[error("failed to hash password")]
    HashingUnavailable,
    #[error("failed to issue token")]
    TokenIssueFailure,
    #[error("store failure")]
    StoreFailure(#[source] StoreError),
}

impl AuthError {
    /// Infrastructure failures are not caused by the client.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::HashingUnavailable | Self::TokenIssueFailure | Self::StoreFailure(_)
        )
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::EmailTaken,
            backend @ StoreError::Backend(_) => Self::StoreFailure(backend),
        }
    }
}
