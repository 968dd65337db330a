//! In-memory stores for tests and database-less runs.
//!
//! Each store guards its state with a single `parking_lot` lock, so the
//! uniqueness check and the insert in `create` happen in one critical section.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

use super::{
    Account, AccountUpdate, NewAccount, PasswordResetStore, StoreError, StoreResult,
    TokenBlacklist, UserFilter, UserPage, UserStore,
};

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    accounts: RwLock<Vec<Account>>,
}

impl MemoryUserStore {
    fn email_in_use(accounts: &[Account], email: &str, except: Option<Uuid>) -> bool {
        accounts
            .iter()
            .any(|account| !account.is_deleted && account.email == email && Some(account.id) != except)
    }

    /// Set the role of an account directly. There is no operation that
    /// promotes users, so admins are provisioned out of band.
    pub fn set_role(&self, id: Uuid, role: super::Role) -> bool {
        let mut accounts = self.accounts.write();
        match accounts.iter_mut().find(|account| account.id == id) {
            Some(account) => {
                account.role = role;
                true
            }
            None => false,
        }
    }

    /// Replace the password of the active account `id`, provided it still
    /// holds `email`.
    fn set_password_hash(&self, id: Uuid, email: &str, password_hash: &str) -> bool {
        let mut accounts = self.accounts.write();
        match accounts
            .iter_mut()
            .find(|account| !account.is_deleted && account.id == id && account.email == email)
        {
            Some(account) => {
                account.password_hash = password_hash.to_string();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_active_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .iter()
            .find(|account| !account.is_deleted && account.email == email)
            .cloned())
    }

    async fn find_active_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .iter()
            .find(|account| !account.is_deleted && account.id == id)
            .cloned())
    }

    async fn find_active(
        &self,
        filter: &UserFilter,
        offset: u64,
        limit: u64,
    ) -> StoreResult<UserPage> {
        let accounts = self.accounts.read();
        // Records are appended on create, so vector order is creation order.
        let matching: Vec<&Account> = accounts
            .iter()
            .filter(|account| !account.is_deleted && filter.matches(account))
            .collect();

        let total = matching.len() as u64;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        let users = matching.into_iter().skip(skip).take(take).cloned().collect();

        Ok(UserPage { users, total })
    }

    async fn create(&self, account: NewAccount) -> StoreResult<Account> {
        let mut accounts = self.accounts.write();
        if Self::email_in_use(&accounts, &account.email, None) {
            return Err(StoreError::Conflict);
        }

        let record = Account {
            id: Uuid::new_v4(),
            name: account.name,
            email: account.email,
            password_hash: account.password_hash,
            role: account.role,
            is_deleted: false,
            created_at: Utc::now(),
        };
        accounts.push(record.clone());

        Ok(record)
    }

    async fn update(&self, id: Uuid, update: AccountUpdate) -> StoreResult<bool> {
        let mut accounts = self.accounts.write();
        let Some(index) = accounts
            .iter()
            .position(|account| !account.is_deleted && account.id == id)
        else {
            return Ok(false);
        };
        if let Some(email) = update.email.as_deref() {
            if Self::email_in_use(&accounts, email, Some(id)) {
                return Err(StoreError::Conflict);
            }
        }

        let account = &mut accounts[index];

        if let Some(name) = update.name {
            account.name = name;
        }
        if let Some(email) = update.email {
            account.email = email;
        }

        Ok(true)
    }

    async fn soft_delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut accounts = self.accounts.write();
        match accounts
            .iter_mut()
            .find(|account| !account.is_deleted && account.id == id)
        {
            Some(account) => {
                account.is_deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlacklist {
    entries: Mutex<HashMap<Vec<u8>, DateTime<Utc>>>,
}

#[async_trait]
impl TokenBlacklist for MemoryBlacklist {
    async fn insert(&self, token_hash: &[u8], expires_at: DateTime<Utc>) -> StoreResult<()> {
        self.entries.lock().insert(token_hash.to_vec(), expires_at);
        Ok(())
    }

    async fn contains(&self, token_hash: &[u8]) -> StoreResult<bool> {
        Ok(self.entries.lock().contains_key(token_hash))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Debug)]
struct ResetEntry {
    account_id: Uuid,
    email: String,
    expires_at: DateTime<Utc>,
}

/// Reset tokens over a shared `MemoryUserStore`. Redemption holds the token
/// lock across the password write.
#[derive(Debug)]
pub struct MemoryResetStore {
    users: Arc<MemoryUserStore>,
    entries: Mutex<HashMap<Vec<u8>, ResetEntry>>,
}

impl MemoryResetStore {
    #[must_use]
    pub fn new(users: Arc<MemoryUserStore>) -> Self {
        Self {
            users,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PasswordResetStore for MemoryResetStore {
    async fn insert(
        &self,
        account_id: Uuid,
        email: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.entries.lock().insert(
            token_hash.to_vec(),
            ResetEntry {
                account_id,
                email: email.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn find_active_email(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> StoreResult<Option<String>> {
        Ok(self
            .entries
            .lock()
            .get(token_hash)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.email.clone()))
    }

    async fn redeem(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries
            .get(token_hash)
            .filter(|entry| entry.expires_at > now)
        else {
            return Ok(None);
        };

        let account_id = entry.account_id;
        let updated = self
            .users
            .set_password_hash(account_id, &entry.email, password_hash);
        entries.remove(token_hash);

        Ok(updated.then_some(account_id))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use anyhow::{Context, Result};
    use chrono::Duration;

    fn new_account(name: &str, email: &str) -> NewAccount {
        NewAccount {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_active_email() -> Result<()> {
        let store = MemoryUserStore::default();
        store.create(new_account("Ada", "ada@example.com")).await?;

        let second = store.create(new_account("Other", "ada@example.com")).await;
        assert!(matches!(second, Err(StoreError::Conflict)));
        Ok(())
    }

    #[tokio::test]
    async fn deleted_email_can_be_reused() -> Result<()> {
        let store = MemoryUserStore::default();
        let first = store.create(new_account("Ada", "ada@example.com")).await?;
        assert!(store.soft_delete(first.id).await?);

        let second = store.create(new_account("Ada", "ada@example.com")).await?;
        assert_ne!(first.id, second.id);
        assert!(store.find_active_by_id(first.id).await?.is_none());

        let found = store
            .find_active_by_email("ada@example.com")
            .await?
            .context("active account missing")?;
        assert_eq!(found.id, second.id);
        Ok(())
    }

    #[tokio::test]
    async fn soft_delete_is_not_repeated() -> Result<()> {
        let store = MemoryUserStore::default();
        let account = store.create(new_account("Ada", "ada@example.com")).await?;
        assert!(store.soft_delete(account.id).await?);
        assert!(!store.soft_delete(account.id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn update_rejects_email_owned_by_another_account() -> Result<()> {
        let store = MemoryUserStore::default();
        store.create(new_account("Ada", "ada@example.com")).await?;
        let grace = store.create(new_account("Grace", "grace@example.com")).await?;

        let update = AccountUpdate {
            email: Some("ada@example.com".to_string()),
            ..AccountUpdate::default()
        };
        assert!(matches!(
            store.update(grace.id, update).await,
            Err(StoreError::Conflict)
        ));

        // Keeping your own email is not a conflict.
        let update = AccountUpdate {
            name: Some("Grace Hopper".to_string()),
            email: Some("grace@example.com".to_string()),
            ..AccountUpdate::default()
        };
        assert!(store.update(grace.id, update).await?);
        Ok(())
    }

    #[tokio::test]
    async fn update_ignores_deleted_accounts() -> Result<()> {
        let store = MemoryUserStore::default();
        let account = store.create(new_account("Ada", "ada@example.com")).await?;
        store.soft_delete(account.id).await?;

        let update = AccountUpdate {
            name: Some("Ghost".to_string()),
            ..AccountUpdate::default()
        };
        assert!(!store.update(account.id, update).await?);
        Ok(())
    }

    #[tokio::test]
    async fn deleted_account_update_is_not_found_before_conflict() -> Result<()> {
        let store = MemoryUserStore::default();
        let ghost = store.create(new_account("Ghost", "ghost@example.com")).await?;
        store.soft_delete(ghost.id).await?;
        store.create(new_account("Ada", "ada@example.com")).await?;

        let update = AccountUpdate {
            email: Some("ada@example.com".to_string()),
            ..AccountUpdate::default()
        };
        assert!(!store.update(ghost.id, update).await?);
        Ok(())
    }

    #[tokio::test]
    async fn find_active_filters_and_paginates() -> Result<()> {
        let store = MemoryUserStore::default();
        for index in 0..5 {
            store
                .create(new_account(&format!("User {index}"), &format!("u{index}@example.com")))
                .await?;
        }
        let deleted = store.create(new_account("User gone", "gone@example.com")).await?;
        store.soft_delete(deleted.id).await?;

        let page = store.find_active(&UserFilter::default(), 2, 2).await?;
        assert_eq!(page.total, 5);
        let names: Vec<_> = page.users.iter().map(|user| user.name.as_str()).collect();
        assert_eq!(names, vec!["User 2", "User 3"]);

        let filtered = store
            .find_active(&UserFilter::new(Some("user 4"), None), 0, 10)
            .await?;
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.users[0].email, "u4@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn blacklist_insert_is_idempotent() -> Result<()> {
        let blacklist = MemoryBlacklist::default();
        let expiry = Utc::now() + Duration::hours(1);
        blacklist.insert(b"digest", expiry).await?;
        blacklist.insert(b"digest", expiry).await?;

        assert!(blacklist.contains(b"digest").await?);
        assert!(!blacklist.contains(b"other").await?);
        assert_eq!(blacklist.prune_expired(Utc::now()).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn reset_tokens_expire() -> Result<()> {
        let users = Arc::new(MemoryUserStore::default());
        let ada = users.create(new_account("Ada", "ada@example.com")).await?;
        let resets = MemoryResetStore::new(users.clone());
        let now = Utc::now();
        resets
            .insert(ada.id, "ada@example.com", b"live", now + Duration::minutes(15))
            .await?;
        resets
            .insert(ada.id, "ada@example.com", b"stale", now - Duration::seconds(1))
            .await?;

        assert_eq!(
            resets.find_active_email(b"live", now).await?.as_deref(),
            Some("ada@example.com")
        );
        assert!(resets.find_active_email(b"stale", now).await?.is_none());
        assert!(resets.redeem(b"stale", "new-hash", now).await?.is_none());

        assert_eq!(resets.redeem(b"live", "new-hash", now).await?, Some(ada.id));
        assert!(resets.find_active_email(b"live", now).await?.is_none());
        assert!(resets.redeem(b"live", "newer-hash", now).await?.is_none());
        assert_eq!(resets.prune_expired(now).await?, 1);

        let stored = users
            .find_active_by_id(ada.id)
            .await?
            .context("account missing")?;
        assert_eq!(stored.password_hash, "new-hash");
        Ok(())
    }

    #[tokio::test]
    async fn redeem_requires_owner_to_keep_email() -> Result<()> {
        let users = Arc::new(MemoryUserStore::default());
        let ada = users.create(new_account("Ada", "ada@example.com")).await?;
        let resets = MemoryResetStore::new(users.clone());
        let expiry = Utc::now() + Duration::minutes(15);
        resets.insert(ada.id, "ada@example.com", b"moved", expiry).await?;

        let update = AccountUpdate {
            email: Some("ada2@example.com".to_string()),
            ..AccountUpdate::default()
        };
        assert!(users.update(ada.id, update).await?);
        let bob = users.create(new_account("Bob", "ada@example.com")).await?;

        assert!(resets.redeem(b"moved", "taken-over", Utc::now()).await?.is_none());
        // Consumed even though nothing was written.
        assert!(resets.find_active_email(b"moved", Utc::now()).await?.is_none());

        for id in [ada.id, bob.id] {
            let account = users.find_active_by_id(id).await?.context("account missing")?;
            assert_eq!(account.password_hash, "hash");
        }
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redeem_has_one_winner() -> Result<()> {
        let users = Arc::new(MemoryUserStore::default());
        let ada = users.create(new_account("Ada", "ada@example.com")).await?;
        let resets = Arc::new(MemoryResetStore::new(users));
        let expiry = Utc::now() + Duration::minutes(15);

        for round in 0..20u8 {
            let token = [round];
            resets.insert(ada.id, "ada@example.com", &token, expiry).await?;

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let resets = Arc::clone(&resets);
                    tokio::spawn(async move { resets.redeem(&token, "hash", Utc::now()).await })
                })
                .collect();

            let mut winners = 0;
            for handle in handles {
                if handle.await??.is_some() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1, "round {round}");
        }
        Ok(())
    }
}
