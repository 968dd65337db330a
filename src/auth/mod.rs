//! Authentication and session core.
//!
//! Flow Overview:
//! 1) `register` validates input, hashes the password with Argon2id and lets
//!    the `UserStore` enforce email uniqueness.
//! 2) `login` is throttled per normalized email, then issues an HS256 token
//!    carrying `{sub, role, iat, exp, jti}`.
//! 3) Every bearer-authorized operation goes through `AuthService::authorize`,
//!    which verifies the signature and expiry and then checks the blacklist.
//! 4) `logout` blacklists the token digest until the token's own expiry.
//! 5) Password reset issues a random one-time token (stored as a digest) that
//!    is consumed after the new password has been written.

mod error;
mod hasher;
mod rate_limit;
mod service;
mod token;
mod utils;

pub use error::AuthError;
pub use hasher::PasswordHasher;
pub use rate_limit::{
    NoopRateLimiter, RateLimitDecision, RateLimiter, SlidingWindowRateLimiter,
    DEFAULT_LOGIN_ATTEMPTS, DEFAULT_LOGIN_WINDOW,
};
pub use service::{AuthConfig, AuthService, UserListing, UserQuery};
pub use token::{Claims, TokenError, TokenIssuer, DEFAULT_TOKEN_TTL_SECONDS};
pub use utils::{extract_bearer_token, MIN_PASSWORD_LENGTH};
