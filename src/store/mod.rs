//! Persistence interfaces used by the auth core.
//!
//! Flow Overview:
//! 1) `UserStore` owns account records. Every read path is scoped to active
//!    (non-deleted) accounts by the method itself, so callers cannot forget
//!    the predicate.
//! 2) `TokenBlacklist` records revoked bearer tokens until their original expiry.
//! 3) `PasswordResetStore` holds one-time reset tokens with a short TTL.
//!
//! Tokens are never stored raw: both token stores are keyed by the SHA-256
//! digest of the token string.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};
use uuid::Uuid;

use crate::auth::RateLimiter;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryBlacklist, MemoryResetStore, MemoryUserStore};
pub use postgres::{PgBlacklist, PgResetStore, PgUserStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (duplicate active email).
    #[error("record conflicts with an existing record")]
    Conflict,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An account record as persisted by a `UserStore`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the core when creating an account; the store assigns
/// the id and creation timestamp.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Profile update; `None` leaves the column untouched. Passwords change
/// only through `PasswordResetStore::redeem`.
#[derive(Clone, Debug, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Case-insensitive substring filters for account listing.
#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserFilter {
    /// Build a filter, treating blank terms as "no filter".
    #[must_use]
    pub fn new(name: Option<&str>, email: Option<&str>) -> Self {
        let clean = |term: Option<&str>| {
            term.map(str::trim)
                .filter(|term| !term.is_empty())
                .map(str::to_lowercase)
        };
        Self {
            name: clean(name),
            email: clean(email),
        }
    }

    pub(crate) fn matches(&self, account: &Account) -> bool {
        let contains = |field: &str, term: &Option<String>| {
            term.as_ref()
                .map_or(true, |term| field.to_lowercase().contains(term.as_str()))
        };
        contains(&account.name, &self.name) && contains(&account.email, &self.email)
    }
}

/// One page of accounts plus the total number matching the filter.
#[derive(Clone, Debug)]
pub struct UserPage {
    pub users: Vec<Account>,
    pub total: u64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_active_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn find_active_by_id(&self, id: Uuid) -> StoreResult<Option<Account>>;

    /// Active accounts matching `filter`, ordered by creation time.
    async fn find_active(
        &self,
        filter: &UserFilter,
        offset: u64,
        limit: u64,
    ) -> StoreResult<UserPage>;

    /// Insert a new account.
    ///
    /// # Errors
    /// Returns `StoreError::Conflict` when an active account already uses the email.
    async fn create(&self, account: NewAccount) -> StoreResult<Account>;

    /// Apply `update` to an active account. Returns `false` when no active
    /// account has this id.
    ///
    /// # Errors
    /// Returns `StoreError::Conflict` when the new email belongs to another active account.
    async fn update(&self, id: Uuid, update: AccountUpdate) -> StoreResult<bool>;

    /// Mark an active account deleted. Returns `false` when nothing changed.
    async fn soft_delete(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Record a revoked token. Inserting the same digest twice is not an error.
    async fn insert(&self, token_hash: &[u8], expires_at: DateTime<Utc>) -> StoreResult<()>;

    async fn contains(&self, token_hash: &[u8]) -> StoreResult<bool>;

    /// Drop entries whose original expiry has passed; returns how many were removed.
    async fn prune_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Reset tokens are bound to the account they were issued to and to that
/// account's email at issue time. A token whose account was deleted or has
/// since changed email can no longer set a password.
#[async_trait]
pub trait PasswordResetStore: Send + Sync {
    async fn insert(
        &self,
        account_id: Uuid,
        email: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Owning email of a reset token whose expiry is after `now`.
    async fn find_active_email(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> StoreResult<Option<String>>;

    /// Set `password_hash` on the owning account and consume the token in one
    /// atomic step; of concurrent callers with the same token at most one wins.
    ///
    /// Returns the account id, or `None` when the token is unknown or expired,
    /// or when its account is gone or no longer holds the email. A live token
    /// is consumed in the last case too.
    async fn redeem(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>>;

    async fn prune_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// The three collaborators the auth core persists through.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub blacklist: Arc<dyn TokenBlacklist>,
    pub resets: Arc<dyn PasswordResetStore>,
}

impl Stores {
    #[must_use]
    pub fn in_memory() -> Self {
        let users = Arc::new(MemoryUserStore::default());
        Self {
            users: users.clone(),
            blacklist: Arc::new(MemoryBlacklist::default()),
            resets: Arc::new(MemoryResetStore::new(users)),
        }
    }

    #[must_use]
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            blacklist: Arc::new(PgBlacklist::new(pool.clone())),
            resets: Arc::new(PgResetStore::new(pool)),
        }
    }
}

impl fmt::Debug for Stores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

/// Periodically drop expired blacklist entries, reset tokens and idle rate
/// limiter keys. Expired entries are harmless, so failures are only logged.
pub fn spawn_pruner(
    stores: Stores,
    rate_limiter: Arc<dyn RateLimiter>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            prune_once(&stores, rate_limiter.as_ref()).await;
        }
    })
}

pub(crate) async fn prune_once(stores: &Stores, rate_limiter: &dyn RateLimiter) {
    let now = Utc::now();

    match stores.blacklist.prune_expired(now).await {
        Ok(removed) => debug!(removed, "pruned expired blacklist entries"),
        Err(err) => error!("failed to prune blacklist: {err}"),
    }

    match stores.resets.prune_expired(now).await {
        Ok(removed) => debug!(removed, "pruned expired reset tokens"),
        Err(err) => error!("failed to prune reset tokens: {err}"),
    }

    rate_limiter.prune();
}
