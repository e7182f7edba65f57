//! Registered users, stored in SQLite at `<data_dir>/users.sqlite`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

use crate::core::error::StoreError;

/// User record stored in database
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    /// Avatar file name under the avatar directory
    pub avatar: String,
    pub created_at: DateTime<Utc>,
}

/// get/put capability over persisted user profiles.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a new user. Returns `false` if the username is taken.
    async fn insert(&self, user: &UserRecord) -> Result<bool, StoreError>;

    /// Returns `false` if no such user exists.
    async fn set_avatar(&self, username: &str, avatar: &str) -> Result<bool, StoreError>;
}

pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                avatar TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("[Users] Initialized at {:?}", db_path);

        Ok(Self { pool })
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn get(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT username, password_hash, avatar, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(username, password_hash, avatar, created_at)| UserRecord {
            username,
            password_hash,
            avatar,
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        }))
    }

    async fn insert(&self, user: &UserRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO users (username, password_hash, avatar, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.avatar)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_avatar(&self, username: &str, avatar: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET avatar = ? WHERE username = ?")
            .bind(avatar)
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(username: &str) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            password_hash: "hash".to_string(),
            avatar: "default.jpg".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let dir = TempDir::new().unwrap();
        let store = SqliteUserStore::open(&dir.path().join("users.sqlite"))
            .await
            .unwrap();

        assert!(store.insert(&record("alice")).await.unwrap());
        let user = store.get("alice").await.unwrap().unwrap();
        assert_eq!(user.avatar, "default.jpg");
        assert!(store.get("Alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = SqliteUserStore::open(&dir.path().join("users.sqlite"))
            .await
            .unwrap();

        assert!(store.insert(&record("alice")).await.unwrap());
        assert!(!store.insert(&record("alice")).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_avatar() {
        let dir = TempDir::new().unwrap();
        let store = SqliteUserStore::open(&dir.path().join("users.sqlite"))
            .await
            .unwrap();

        assert!(!store.set_avatar("ghost", "ghost.jpg").await.unwrap());
        store.insert(&record("bob")).await.unwrap();
        assert!(store.set_avatar("bob", "bob.jpg").await.unwrap());
        assert_eq!(store.get("bob").await.unwrap().unwrap().avatar, "bob.jpg");
    }
}
