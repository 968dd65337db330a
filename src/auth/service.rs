//! Auth core: orchestrates stores, hashing, tokens and throttling into the
//! account and session operations.
//!
//! The service keeps no per-request state. The only shared mutable state is
//! the injected rate limiter.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{
    error::AuthError,
    hasher::PasswordHasher,
    rate_limit::{
        RateLimitDecision, RateLimiter, SlidingWindowRateLimiter, DEFAULT_LOGIN_ATTEMPTS,
        DEFAULT_LOGIN_WINDOW,
    },
    token::{Claims, TokenIssuer, DEFAULT_TOKEN_TTL_SECONDS},
    utils::{generate_reset_token, hash_token, normalize_email, valid_email, valid_password},
};
use crate::store::{Account, AccountUpdate, NewAccount, Role, Stores, UserFilter};

const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_PAGE_LIMIT: u32 = 10;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    default_page_limit: u32,
    login_attempts: usize,
    login_window: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            login_attempts: DEFAULT_LOGIN_ATTEMPTS,
            login_window: DEFAULT_LOGIN_WINDOW,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_login_attempts(mut self, attempts: usize) -> Self {
        self.login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_login_window(mut self, window: Duration) -> Self {
        self.login_window = window;
        self
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    #[must_use]
    pub fn default_page_limit(&self) -> u32 {
        self.default_page_limit
    }

    #[must_use]
    pub fn login_attempts(&self) -> usize {
        self.login_attempts
    }

    #[must_use]
    pub fn login_window(&self) -> Duration {
        self.login_window
    }
}

/// Filters and pagination for `list_users`. Zero page or limit means "use the default".
#[derive(Clone, Debug, Default)]
pub struct UserQuery {
    pub name: Option<String>,
    pub email: Option<String>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Clone, Debug)]
pub struct UserListing {
    pub users: Vec<Account>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

pub struct AuthService {
    stores: Stores,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
    rate_limiter: Arc<dyn RateLimiter>,
    config: AuthConfig,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    /// Build the service with a sliding-window login limiter sized from `config`.
    #[must_use]
    pub fn new(stores: Stores, secret: SecretString, config: AuthConfig) -> Self {
        let rate_limiter = Arc::new(SlidingWindowRateLimiter::new(
            config.login_attempts(),
            config.login_window(),
        ));
        Self {
            stores,
            hasher: PasswordHasher::default(),
            tokens: TokenIssuer::new(secret).with_ttl_seconds(config.token_ttl_seconds()),
            rate_limiter,
            config,
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    #[must_use]
    pub fn rate_limiter(&self) -> Arc<dyn RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Create a `user` account.
    ///
    /// # Errors
    /// `InvalidInput`, `EmailTaken`, `HashingUnavailable` or `StoreFailure`.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Account, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::InvalidInput("name is required"));
        }
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("invalid email format"));
        }
        if !valid_password(password) {
            return Err(AuthError::InvalidInput(
                "password must be at least 8 characters",
            ));
        }

        // Skips the hash for obvious duplicates; the store constraint is what
        // actually guarantees uniqueness.
        if self.stores.users.find_active_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash_password(password).await?;
        let account = self
            .stores
            .users
            .create(NewAccount {
                name: name.to_string(),
                email,
                password_hash,
                role: Role::User,
            })
            .await?;

        info!(user_id = %account.id, "account registered");
        Ok(account)
    }

    /// Authenticate and issue a bearer token.
    ///
    /// # Errors
    /// `RateLimited`, `BadCredentials`, `TokenIssueFailure` or `StoreFailure`.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        if self.rate_limiter.check(&email) == RateLimitDecision::Limited {
            warn!("login rate limited");
            return Err(AuthError::RateLimited);
        }

        let Some(account) = self.stores.users.find_active_by_email(&email).await? else {
            debug!("login failed");
            return Err(AuthError::BadCredentials);
        };
        if !self.verify_password(password, &account.password_hash).await? {
            debug!("login failed");
            return Err(AuthError::BadCredentials);
        }

        self.tokens
            .issue(&account.id.to_string(), account.role)
            .map_err(|err| {
                error!("failed to issue token: {err}");
                AuthError::TokenIssueFailure
            })
    }

    /// Revoke a token until its original expiry. Expired tokens are accepted.
    ///
    /// # Errors
    /// `InvalidToken` or `StoreFailure`.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let claims = self
            .tokens
            .verify_signature(token)
            .map_err(|_| AuthError::InvalidToken)?;
        let expires_at =
            DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or(AuthError::InvalidToken)?;

        self.stores
            .blacklist
            .insert(&hash_token(token), expires_at)
            .await?;

        info!(user_id = %claims.sub, jti = %claims.jti, "token revoked");
        Ok(())
    }

    /// Resolve a bearer token to its claims. Missing, invalid, expired and
    /// revoked tokens are all `Unauthenticated`.
    ///
    /// # Errors
    /// `Unauthenticated` or `StoreFailure`.
    pub async fn authorize(&self, token: Option<&str>) -> Result<Claims, AuthError> {
        let token = token.ok_or(AuthError::Unauthenticated)?;
        let claims = self.tokens.verify(token).map_err(|err| {
            debug!("rejected bearer token: {err}");
            AuthError::Unauthenticated
        })?;

        if self.stores.blacklist.contains(&hash_token(token)).await? {
            debug!(jti = %claims.jti, "rejected revoked token");
            return Err(AuthError::Unauthenticated);
        }

        Ok(claims)
    }

    /// Admin-only listing of active accounts.
    ///
    /// # Errors
    /// `Unauthenticated`, `PermissionDenied` or `StoreFailure`.
    #[instrument(skip(self, token))]
    pub async fn list_users(
        &self,
        token: Option<&str>,
        query: UserQuery,
    ) -> Result<UserListing, AuthError> {
        let claims = self.authorize(token).await?;
        if claims.role != Role::Admin {
            return Err(AuthError::PermissionDenied);
        }

        let page = query.page.max(1);
        let limit = if query.limit == 0 {
            self.config.default_page_limit
        } else {
            query.limit
        };
        let offset = u64::from(page - 1) * u64::from(limit);
        let filter = UserFilter::new(query.name.as_deref(), query.email.as_deref());

        let result = self
            .stores
            .users
            .find_active(&filter, offset, u64::from(limit))
            .await?;

        Ok(UserListing {
            users: result.users,
            total: result.total,
            page,
            limit,
        })
    }

    /// # Errors
    /// `Unauthenticated`, `NotFound` or `StoreFailure`.
    pub async fn get_profile(&self, token: Option<&str>) -> Result<Account, AuthError> {
        let id = self.authorized_account_id(token).await?;
        self.stores
            .users
            .find_active_by_id(id)
            .await?
            .ok_or(AuthError::NotFound)
    }

    /// Replace the caller's name and email.
    ///
    /// # Errors
    /// `Unauthenticated`, `InvalidInput`, `EmailTaken`, `NotFound` or `StoreFailure`.
    #[instrument(skip(self, token))]
    pub async fn update_profile(
        &self,
        token: Option<&str>,
        name: &str,
        email: &str,
    ) -> Result<(), AuthError> {
        let id = self.authorized_account_id(token).await?;

        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() || email.is_empty() {
            return Err(AuthError::InvalidInput("name and email must not be empty"));
        }
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("invalid email format"));
        }

        let update = AccountUpdate {
            name: Some(name.to_string()),
            email: Some(email),
        };
        if self.stores.users.update(id, update).await? {
            Ok(())
        } else {
            Err(AuthError::NotFound)
        }
    }

    /// Soft-delete the caller's account.
    ///
    /// # Errors
    /// `Unauthenticated`, `NotFound` or `StoreFailure`.
    #[instrument(skip_all)]
    pub async fn delete_profile(&self, token: Option<&str>) -> Result<(), AuthError> {
        let id = self.authorized_account_id(token).await?;
        if self.stores.users.soft_delete(id).await? {
            info!(user_id = %id, "account deleted");
            Ok(())
        } else {
            Err(AuthError::NotFound)
        }
    }

    /// Issue a one-time reset token for an active account. Delivery of the
    /// token is up to the caller.
    ///
    /// # Errors
    /// `NotFound` or `StoreFailure`.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        let account = self
            .stores
            .users
            .find_active_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;

        let token = generate_reset_token().map_err(|err| {
            error!("{err:#}");
            AuthError::StoreFailure(err.into())
        })?;
        let expires_at = Utc::now() + ChronoDuration::seconds(self.config.reset_token_ttl_seconds);
        self.stores
            .resets
            .insert(account.id, &account.email, &hash_token(&token), expires_at)
            .await?;

        info!(user_id = %account.id, "password reset requested");
        Ok(token)
    }

    /// Consume a reset token and set a new password on the account it was
    /// issued to. The store applies the password and consumes the token as
    /// one step, so a token resets at most once.
    ///
    /// # Errors
    /// `InvalidInput`, `InvalidOrExpiredToken`, `HashingUnavailable` or `StoreFailure`.
    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        if !valid_password(new_password) {
            return Err(AuthError::InvalidInput(
                "password must be at least 8 characters",
            ));
        }

        let token_hash = hash_token(token);
        if self
            .stores
            .resets
            .find_active_email(&token_hash, Utc::now())
            .await?
            .is_none()
        {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let password_hash = self.hash_password(new_password).await?;
        match self
            .stores
            .resets
            .redeem(&token_hash, &password_hash, Utc::now())
            .await?
        {
            Some(account_id) => {
                info!(user_id = %account_id, "password reset completed");
                Ok(())
            }
            None => {
                debug!("reset token already used, expired or no longer owned");
                Err(AuthError::InvalidOrExpiredToken)
            }
        }
    }

    async fn authorized_account_id(&self, token: Option<&str>) -> Result<Uuid, AuthError> {
        let claims = self.authorize(token).await?;
        Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Unauthenticated)
    }

    // Argon2 is CPU-bound; keep it off the async workers.
    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| {
                error!("password hashing task failed: {err}");
                AuthError::HashingUnavailable
            })?
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|err| {
                error!("password verification task failed: {err}");
                AuthError::HashingUnavailable
            })
    }
}
