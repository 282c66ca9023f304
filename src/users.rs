//! User directory: the SRP-relevant record (verifier, salts) plus the
//! filesystem side effect of giving every user their own vault directory.
//!
//! Grounded on `original_source`'s `src/users.py` (directory creation
//! wraps the DB insert) and `src/db/tables/user.py` (the record shape).

use futures_util::future::BoxFuture;
use num_bigint::BigUint;

use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub auk_salt: Vec<u8>,
    pub srp_salt: Vec<u8>,
    pub verifier: BigUint,
    pub key_enc: Option<Vec<u8>>,
}

/// Dyn-safe persistence boundary for the SRP auth channel, so it can be
/// driven in tests against an in-memory fake without a real database.
pub trait UserStore: Send + Sync {
    fn get_user<'a>(&'a self, username: &'a str) -> BoxFuture<'a, anyhow::Result<Option<UserRecord>>>;
    fn add_user<'a>(&'a self, record: UserRecord) -> BoxFuture<'a, anyhow::Result<()>>;
    fn remove_user<'a>(&'a self, username: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Production `UserStore`: SQLite-backed records plus a per-user directory
/// under the configured vault folder.
pub struct VaultUserStore {
    storage: Storage,
    vault_folder: std::path::PathBuf,
}

impl VaultUserStore {
    pub fn new(storage: Storage, vault_folder: std::path::PathBuf) -> Self {
        Self { storage, vault_folder }
    }

    pub fn user_directory(&self, username: &str) -> std::path::PathBuf {
        self.vault_folder.join(username)
    }
}

impl UserStore for VaultUserStore {
    fn get_user<'a>(&'a self, username: &'a str) -> BoxFuture<'a, anyhow::Result<Option<UserRecord>>> {
        Box::pin(async move {
            let Some(row) = self.storage.get_user(username).await? else {
                return Ok(None);
            };
            Ok(Some(UserRecord {
                username: row.username,
                auk_salt: row.auk_salt,
                srp_salt: row.srp_salt,
                verifier: BigUint::from_bytes_be(&row.verifier),
                key_enc: row.key_enc,
            }))
        })
    }

    fn add_user<'a>(&'a self, record: UserRecord) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(self.user_directory(&record.username)).await?;
            self.storage
                .add_user(
                    &record.username,
                    &record.auk_salt,
                    &record.srp_salt,
                    &record.verifier.to_bytes_be(),
                )
                .await
        })
    }

    fn remove_user<'a>(&'a self, username: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.storage.remove_user(username).await?;
            let dir = self.user_directory(username);
            if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(dir).await?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (VaultUserStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(&dir.path().join("test.db")).await.unwrap();
        let store = VaultUserStore::new(storage, dir.path().join("vault"));
        (store, dir)
    }

    #[tokio::test]
    async fn add_user_creates_directory_and_record() {
        let (store, dir) = test_store().await;
        store
            .add_user(UserRecord {
                username: "alice".into(),
                auk_salt: vec![1; 16],
                srp_salt: vec![2; 16],
                verifier: BigUint::from(12345u32),
                key_enc: None,
            })
            .await
            .unwrap();

        assert!(dir.path().join("vault").join("alice").is_dir());
        let fetched = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(fetched.verifier, BigUint::from(12345u32));
    }

    #[tokio::test]
    async fn remove_user_deletes_directory_and_record() {
        let (store, dir) = test_store().await;
        store
            .add_user(UserRecord {
                username: "bob".into(),
                auk_salt: vec![0; 16],
                srp_salt: vec![0; 16],
                verifier: BigUint::from(1u32),
                key_enc: None,
            })
            .await
            .unwrap();
        store.remove_user("bob").await.unwrap();

        assert!(!dir.path().join("vault").join("bob").exists());
        assert!(store.get_user("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let (store, _dir) = test_store().await;
        assert!(store.get_user("nobody").await.unwrap().is_none());
    }
}
