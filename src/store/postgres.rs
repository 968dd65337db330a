//! `PostgreSQL` stores backed by `sqlx`.
//!
//! Schema lives in `db/sql/schema.sql`. Email uniqueness among active accounts
//! is a partial unique index, so concurrent registrations with the same email
//! are settled by the database and surface as `StoreError::Conflict`.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{Instrument, Span};
use uuid::Uuid;

use super::{
    Account, AccountUpdate, NewAccount, PasswordResetStore, Role, StoreError, StoreResult,
    TokenBlacklist, UserFilter, UserPage, UserStore,
};

const ACCOUNT_COLUMNS: &str = "id, name, email, password_hash, role, is_deleted, created_at";

fn query_span(operation: &str, statement: &str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Turn a filter term into an `ILIKE` substring pattern with metacharacters escaped.
pub(super) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    let role: String = row.try_get("role").context("failed to read role")?;
    Ok(Account {
        id: row.try_get("id").context("failed to read id")?,
        name: row.try_get("name").context("failed to read name")?,
        email: row.try_get("email").context("failed to read email")?,
        password_hash: row
            .try_get("password_hash")
            .context("failed to read password_hash")?,
        role: role.parse::<Role>().map_err(|err| anyhow!(err))?,
        is_deleted: row.try_get("is_deleted").context("failed to read is_deleted")?,
        created_at: row.try_get("created_at").context("failed to read created_at")?,
    })
}

fn write_error(err: sqlx::Error, what: &'static str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict
    } else {
        StoreError::Backend(anyhow::Error::new(err).context(what))
    }
}

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_active_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1 AND NOT is_deleted LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup account by email")?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_active_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let query =
            format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1 AND NOT is_deleted LIMIT 1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup account by id")?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_active(
        &self,
        filter: &UserFilter,
        offset: u64,
        limit: u64,
    ) -> StoreResult<UserPage> {
        let predicate = r"
            NOT is_deleted
              AND ($1::text IS NULL OR name ILIKE $1 ESCAPE '\')
              AND ($2::text IS NULL OR email ILIKE $2 ESCAPE '\')
        ";
        let name = filter.name.as_deref().map(like_pattern);
        let email = filter.email.as_deref().map(like_pattern);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE {predicate} ORDER BY created_at, id OFFSET $3 LIMIT $4"
        );
        let rows = sqlx::query(&query)
            .bind(name.as_deref())
            .bind(email.as_deref())
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to list accounts")?;

        let query = format!("SELECT COUNT(*) AS total FROM users WHERE {predicate}");
        let total: i64 = sqlx::query(&query)
            .bind(name.as_deref())
            .bind(email.as_deref())
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to count accounts")?
            .try_get("total")
            .context("failed to read account count")?;

        let users = rows
            .iter()
            .map(account_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(UserPage {
            users,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn create(&self, account: NewAccount) -> StoreResult<Account> {
        let query = format!(
            r"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {ACCOUNT_COLUMNS}
        "
        );
        let row = sqlx::query(&query)
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", &query))
            .await
            .map_err(|err| write_error(err, "failed to insert account"))?;

        account_from_row(&row)
    }

    async fn update(&self, id: Uuid, update: AccountUpdate) -> StoreResult<bool> {
        let query = r"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email)
            WHERE id = $1
              AND NOT is_deleted
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(update.name)
            .bind(update.email)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .map_err(|err| write_error(err, "failed to update account"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, id: Uuid) -> StoreResult<bool> {
        let query = "UPDATE users SET is_deleted = TRUE WHERE id = $1 AND NOT is_deleted";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to soft delete account")?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone, Debug)]
pub struct PgBlacklist {
    pool: PgPool,
}

impl PgBlacklist {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenBlacklist for PgBlacklist {
    async fn insert(&self, token_hash: &[u8], expires_at: DateTime<Utc>) -> StoreResult<()> {
        // Logging out twice is fine; keep the first row.
        let query = r"
            INSERT INTO revoked_tokens (token_hash, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (token_hash) DO NOTHING
        ";
        sqlx::query(query)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert revoked token")?;
        Ok(())
    }

    async fn contains(&self, token_hash: &[u8]) -> StoreResult<bool> {
        let query = "SELECT 1 FROM revoked_tokens WHERE token_hash = $1 LIMIT 1";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup revoked token")?;
        Ok(row.is_some())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let query = "DELETE FROM revoked_tokens WHERE expires_at <= $1";
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to prune revoked tokens")?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone, Debug)]
pub struct PgResetStore {
    pool: PgPool,
}

impl PgResetStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PasswordResetStore for PgResetStore {
    async fn insert(
        &self,
        account_id: Uuid,
        email: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let query = r"
            INSERT INTO password_resets (token_hash, account_id, email, expires_at)
            VALUES ($1, $2, $3, $4)
        ";
        sqlx::query(query)
            .bind(token_hash)
            .bind(account_id)
            .bind(email)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert password reset token")?;
        Ok(())
    }

    async fn find_active_email(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> StoreResult<Option<String>> {
        let query = r"
            SELECT email
            FROM password_resets
            WHERE token_hash = $1
              AND expires_at > $2
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup password reset token")?;

        row.map(|row| row.try_get::<String, _>("email"))
            .transpose()
            .context("failed to read reset email")
            .map_err(StoreError::from)
    }

    async fn redeem(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin password reset transaction")?;

        // The row lock serializes concurrent redemptions of one token; the
        // loser sees the row gone once the winner commits.
        let claim = r"
            SELECT account_id, email
            FROM password_resets
            WHERE token_hash = $1
              AND expires_at > $2
            FOR UPDATE
        ";
        let row = sqlx::query(claim)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(query_span("SELECT", claim))
            .await
            .context("failed to claim password reset token")?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .context("failed to roll back password reset transaction")?;
            return Ok(None);
        };
        let account_id: Uuid = row.try_get("account_id").context("failed to read account_id")?;
        let email: String = row.try_get("email").context("failed to read reset email")?;

        let update = r"
            UPDATE users
            SET password_hash = $3
            WHERE id = $1
              AND email = $2
              AND NOT is_deleted
        ";
        let updated = sqlx::query(update)
            .bind(account_id)
            .bind(&email)
            .bind(password_hash)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", update))
            .await
            .context("failed to update password")?
            .rows_affected()
            > 0;

        let delete = "DELETE FROM password_resets WHERE token_hash = $1";
        sqlx::query(delete)
            .bind(token_hash)
            .execute(&mut *tx)
            .instrument(query_span("DELETE", delete))
            .await
            .context("failed to delete password reset token")?;

        tx.commit()
            .await
            .context("failed to commit password reset")?;

        Ok(updated.then_some(account_id))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let query = "DELETE FROM password_resets WHERE expires_at <= $1";
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to prune password reset tokens")?;
        Ok(result.rows_affected())
    }
}
